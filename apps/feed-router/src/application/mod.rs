//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the router services and the port interfaces
//! that define how the core interacts with transports, history
//! providers and sinks.

/// Port interfaces for external systems (feed transport, history, sinks).
pub mod ports;

/// Router services: command loop, connections, dispatch, chart loading.
pub mod services;
