//! Configuration Module
//!
//! Environment-driven configuration for the feed router binary.

mod settings;

pub use settings::{
    ChartSettings, ConfigError, FeedSettings, RouterConfig, ServerSettings, WebSocketSettings,
};
