//! Subscription Registry
//!
//! Domain types for tracking which sinks are interested in which tickers.
//!
//! # Design
//!
//! The registry tracks:
//! - One [`SubscriptionState`] per ticker, holding the last-known market
//!   fields and the ordered set of sinks interested in it
//! - A reverse index from sink to tickers so unsubscribe is sink-scoped
//! - Which upstream subscribes/unsubscribes a change requires
//!
//! Many sinks can share a ticker while only one upstream subscription
//! exists. A ticker's state exists iff its sink set is non-empty.
//!
//! The registry is owned by the router worker and mutated through
//! `&mut self`; it carries no locks.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::streaming::{SecurityClass, SubscriptionKind, Tick, TickSnapshot, Ticker};

// =============================================================================
// Types
// =============================================================================

/// Identity of a sink. Equality of sinks is equality of ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SinkId(u64);

impl SinkId {
    /// Raw id value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for SinkId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// An upstream subscription: a ticker on a channel family.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subscription {
    /// Instrument.
    pub ticker: Ticker,
    /// Channel family.
    pub kind: SubscriptionKind,
}

impl Subscription {
    /// Exchange channel name for this subscription.
    #[must_use]
    pub fn channel(&self) -> String {
        self.kind.channel(&self.ticker)
    }
}

// =============================================================================
// Subscription Changes
// =============================================================================

/// Changes to upstream subscriptions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionChanges {
    /// Subscriptions to open upstream.
    pub subscribe: Vec<Subscription>,
    /// Subscriptions to close upstream.
    pub unsubscribe: Vec<Subscription>,
}

impl SubscriptionChanges {
    /// Check if there are any changes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscribe.is_empty() && self.unsubscribe.is_empty()
    }

    /// Create changes with only subscribes.
    #[must_use]
    pub fn subscribe_only(subscriptions: impl IntoIterator<Item = Subscription>) -> Self {
        Self {
            subscribe: subscriptions.into_iter().collect(),
            unsubscribe: Vec::new(),
        }
    }

    /// Create changes with only unsubscribes.
    #[must_use]
    pub fn unsubscribe_only(subscriptions: impl IntoIterator<Item = Subscription>) -> Self {
        Self {
            subscribe: Vec::new(),
            unsubscribe: subscriptions.into_iter().collect(),
        }
    }
}

/// A ticker is already streamed under a different security class.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{ticker} is already subscribed under {existing}, not {requested}")]
pub struct ClassConflict {
    /// Ticker in conflict.
    pub ticker: Ticker,
    /// Class the ticker is registered under.
    pub existing: SecurityClass,
    /// Class the caller asked for.
    pub requested: SecurityClass,
}

// =============================================================================
// Subscription State (per ticker)
// =============================================================================

/// Last-known state of one ticker and the sinks interested in it.
#[derive(Debug, Clone)]
pub struct SubscriptionState {
    ticker: Ticker,
    security_class: SecurityClass,
    kind: SubscriptionKind,
    last_price: Option<Decimal>,
    last_volume: Option<Decimal>,
    last_event_time: Option<DateTime<Utc>>,
    sinks: Vec<SinkId>,
}

impl SubscriptionState {
    fn new(ticker: Ticker, security_class: SecurityClass, kind: SubscriptionKind) -> Self {
        Self {
            ticker,
            security_class,
            kind,
            last_price: None,
            last_volume: None,
            last_event_time: None,
            sinks: Vec::new(),
        }
    }

    /// Ticker this state belongs to.
    #[must_use]
    pub const fn ticker(&self) -> &Ticker {
        &self.ticker
    }

    /// Class the ticker is streamed under.
    #[must_use]
    pub const fn security_class(&self) -> SecurityClass {
        self.security_class
    }

    /// Channel family the ticker is streamed on.
    #[must_use]
    pub const fn kind(&self) -> SubscriptionKind {
        self.kind
    }

    /// Last price seen, if any tick arrived yet.
    #[must_use]
    pub const fn last_price(&self) -> Option<Decimal> {
        self.last_price
    }

    /// Last volume seen.
    #[must_use]
    pub const fn last_volume(&self) -> Option<Decimal> {
        self.last_volume
    }

    /// Time of the last tick.
    #[must_use]
    pub const fn last_event_time(&self) -> Option<DateTime<Utc>> {
        self.last_event_time
    }

    /// Sinks in insertion order.
    #[must_use]
    pub fn sinks(&self) -> &[SinkId] {
        &self.sinks
    }

    /// The upstream subscription this state is backed by.
    #[must_use]
    pub fn subscription(&self) -> Subscription {
        Subscription {
            ticker: self.ticker.clone(),
            kind: self.kind,
        }
    }

    /// Fold a tick into the last-known state and return the new snapshot.
    pub fn apply(&mut self, tick: &Tick) -> TickSnapshot {
        self.last_price = Some(tick.price);
        self.last_volume = Some(tick.volume);
        self.last_event_time = Some(tick.event_time);

        TickSnapshot {
            ticker: self.ticker.clone(),
            security_class: self.security_class,
            kind: self.kind,
            price: tick.price,
            volume: tick.volume,
            event_time: tick.event_time,
        }
    }

    /// Current snapshot, or `None` before the first tick.
    #[must_use]
    pub fn snapshot(&self) -> Option<TickSnapshot> {
        Some(TickSnapshot {
            ticker: self.ticker.clone(),
            security_class: self.security_class,
            kind: self.kind,
            price: self.last_price?,
            volume: self.last_volume?,
            event_time: self.last_event_time?,
        })
    }
}

// =============================================================================
// Subscription Registry
// =============================================================================

/// Maps tickers to interested sinks and reference-counts upstream
/// subscriptions.
///
/// # Example
///
/// ```rust
/// use feed_router::domain::streaming::{SecurityClass, SubscriptionKind, Ticker};
/// use feed_router::domain::subscription::{SinkId, SubscriptionRegistry};
///
/// let mut registry = SubscriptionRegistry::new();
/// let btc = Ticker::parse("BTC-USDT").unwrap();
/// let (a, b) = (SinkId::from(1), SinkId::from(2));
///
/// // First sink opens the upstream subscription
/// let changes = registry
///     .subscribe(a, btc.clone(), SecurityClass::Crypto, SubscriptionKind::AggTrade)
///     .unwrap();
/// assert_eq!(changes.subscribe.len(), 1);
///
/// // Second sink shares it
/// let changes = registry
///     .subscribe(b, btc.clone(), SecurityClass::Crypto, SubscriptionKind::AggTrade)
///     .unwrap();
/// assert!(changes.is_empty());
///
/// // Dropping one sink keeps the ticker alive
/// assert!(registry.unsubscribe(a).is_empty());
///
/// // Dropping the last sink closes it upstream
/// let changes = registry.unsubscribe(b);
/// assert_eq!(changes[&SecurityClass::Crypto].unsubscribe.len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    /// Per-ticker state.
    states: HashMap<Ticker, SubscriptionState>,
    /// Tickers each sink is subscribed to, in subscription order.
    sink_tickers: HashMap<SinkId, Vec<Ticker>>,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sink to a ticker.
    ///
    /// Returns the upstream subscribe needed when the ticker is new.
    /// Re-subscribing a sink already on the ticker changes nothing.
    ///
    /// # Errors
    ///
    /// Returns [`ClassConflict`] when the ticker is registered under
    /// another security class.
    pub fn subscribe(
        &mut self,
        sink: SinkId,
        ticker: Ticker,
        class: SecurityClass,
        kind: SubscriptionKind,
    ) -> Result<SubscriptionChanges, ClassConflict> {
        self.check_class(&ticker, class)?;

        let mut created = false;
        let state = self.states.entry(ticker.clone()).or_insert_with(|| {
            created = true;
            SubscriptionState::new(ticker.clone(), class, kind)
        });

        // Skip if sink already subscribed
        if state.sinks.contains(&sink) {
            return Ok(SubscriptionChanges::default());
        }

        state.sinks.push(sink);
        let subscription = state.subscription();
        self.sink_tickers.entry(sink).or_default().push(ticker);

        if created {
            Ok(SubscriptionChanges::subscribe_only([subscription]))
        } else {
            Ok(SubscriptionChanges::default())
        }
    }

    /// Remove a sink from every ticker it holds.
    ///
    /// Returns, per class, the upstream unsubscribes for tickers whose
    /// last sink this was. Their state is destroyed.
    pub fn unsubscribe(&mut self, sink: SinkId) -> BTreeMap<SecurityClass, SubscriptionChanges> {
        let Some(tickers) = self.sink_tickers.remove(&sink) else {
            return BTreeMap::new();
        };

        let mut changes: BTreeMap<SecurityClass, SubscriptionChanges> = BTreeMap::new();

        for ticker in tickers {
            let Some(state) = self.states.get_mut(&ticker) else {
                continue;
            };

            state.sinks.retain(|s| *s != sink);

            // Last sink removed - needs upstream unsubscribe
            if state.sinks.is_empty()
                && let Some(state) = self.states.remove(&ticker)
            {
                changes
                    .entry(state.security_class)
                    .or_default()
                    .unsubscribe
                    .push(state.subscription());
            }
        }

        changes
    }

    /// Check that `ticker` can be subscribed under `class`.
    ///
    /// # Errors
    ///
    /// Returns [`ClassConflict`] when the ticker is registered under
    /// another security class.
    pub fn check_class(&self, ticker: &Ticker, class: SecurityClass) -> Result<(), ClassConflict> {
        match self.states.get(ticker) {
            Some(existing) if existing.security_class != class => Err(ClassConflict {
                ticker: ticker.clone(),
                existing: existing.security_class,
                requested: class,
            }),
            _ => Ok(()),
        }
    }

    /// Drop every ticker of a class, returning the removed states.
    ///
    /// Used when a class's connection is given up on; the sinks are told
    /// by the caller and must subscribe again.
    pub fn remove_class(&mut self, class: SecurityClass) -> Vec<SubscriptionState> {
        let tickers: Vec<Ticker> = self
            .states
            .values()
            .filter(|s| s.security_class == class)
            .map(|s| s.ticker.clone())
            .collect();

        let mut removed = Vec::with_capacity(tickers.len());
        for ticker in tickers {
            if let Some(state) = self.states.remove(&ticker) {
                for sink in &state.sinks {
                    if let Some(held) = self.sink_tickers.get_mut(sink) {
                        held.retain(|t| *t != ticker);
                        if held.is_empty() {
                            self.sink_tickers.remove(sink);
                        }
                    }
                }
                removed.push(state);
            }
        }

        removed.sort_by(|a, b| a.ticker.cmp(&b.ticker));
        removed
    }

    /// Upstream subscriptions of a class, sorted by ticker.
    #[must_use]
    pub fn subscriptions_for(&self, class: SecurityClass) -> Vec<Subscription> {
        let mut subs: Vec<Subscription> = self
            .states
            .values()
            .filter(|s| s.security_class == class)
            .map(SubscriptionState::subscription)
            .collect();
        subs.sort_by(|a, b| a.ticker.cmp(&b.ticker));
        subs
    }

    /// Tickers of a class, sorted.
    #[must_use]
    pub fn tickers_for(&self, class: SecurityClass) -> Vec<Ticker> {
        self.subscriptions_for(class)
            .into_iter()
            .map(|s| s.ticker)
            .collect()
    }

    /// Whether any ticker of the class is subscribed.
    #[must_use]
    pub fn has_class(&self, class: SecurityClass) -> bool {
        self.states.values().any(|s| s.security_class == class)
    }

    /// Sinks holding at least one ticker of the class, deduplicated.
    #[must_use]
    pub fn sinks_in_class(&self, class: SecurityClass) -> Vec<SinkId> {
        let mut sinks: Vec<SinkId> = self
            .states
            .values()
            .filter(|s| s.security_class == class)
            .flat_map(|s| s.sinks.iter().copied())
            .collect();
        sinks.sort_unstable();
        sinks.dedup();
        sinks
    }

    /// State of a ticker.
    #[must_use]
    pub fn get(&self, ticker: &Ticker) -> Option<&SubscriptionState> {
        self.states.get(ticker)
    }

    /// Mutable state of a ticker.
    pub fn get_mut(&mut self, ticker: &Ticker) -> Option<&mut SubscriptionState> {
        self.states.get_mut(ticker)
    }

    /// Tickers a sink is subscribed to, in subscription order.
    #[must_use]
    pub fn sink_tickers(&self, sink: SinkId) -> Vec<Ticker> {
        self.sink_tickers.get(&sink).cloned().unwrap_or_default()
    }

    /// Whether the sink holds any ticker.
    #[must_use]
    pub fn contains_sink(&self, sink: SinkId) -> bool {
        self.sink_tickers.contains_key(&sink)
    }

    /// Get registry statistics.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            ticker_count: self.states.len(),
            sink_count: self.sink_tickers.len(),
        }
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// Registry statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Number of tickers with at least one sink.
    pub ticker_count: usize,
    /// Number of sinks holding at least one ticker.
    pub sink_count: usize,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn dec(raw: &str) -> Decimal {
        raw.parse().unwrap()
    }

    const CRYPTO: SecurityClass = SecurityClass::Crypto;
    const AGG: SubscriptionKind = SubscriptionKind::AggTrade;

    fn t(raw: &str) -> Ticker {
        Ticker::parse(raw).unwrap()
    }

    fn sink(id: u64) -> SinkId {
        SinkId::from(id)
    }

    #[test]
    fn first_subscribe_creates_upstream() {
        let mut registry = SubscriptionRegistry::new();

        let changes = registry.subscribe(sink(1), t("BTCUSDT"), CRYPTO, AGG).unwrap();

        assert_eq!(changes.subscribe.len(), 1);
        assert_eq!(changes.subscribe[0].channel(), "btcusdt@aggTrade");
        assert!(changes.unsubscribe.is_empty());
    }

    #[test]
    fn second_sink_shares_upstream() {
        let mut registry = SubscriptionRegistry::new();

        registry.subscribe(sink(1), t("BTCUSDT"), CRYPTO, AGG).unwrap();
        let changes = registry.subscribe(sink(2), t("btc-usdt"), CRYPTO, AGG).unwrap();

        assert!(changes.is_empty());
        assert_eq!(registry.get(&t("BTCUSDT")).unwrap().sinks(), &[sink(1), sink(2)]);
    }

    #[test]
    fn resubscribe_same_sink_is_noop() {
        let mut registry = SubscriptionRegistry::new();

        registry.subscribe(sink(1), t("BTCUSDT"), CRYPTO, AGG).unwrap();
        let changes = registry.subscribe(sink(1), t("BTCUSDT"), CRYPTO, AGG).unwrap();

        assert!(changes.is_empty());
        assert_eq!(registry.get(&t("BTCUSDT")).unwrap().sinks(), &[sink(1)]);
        assert_eq!(registry.sink_tickers(sink(1)), vec![t("BTCUSDT")]);
    }

    #[test]
    fn class_conflict_is_rejected() {
        let mut registry = SubscriptionRegistry::new();

        registry.subscribe(sink(1), t("BTCUSD"), CRYPTO, AGG).unwrap();
        let err = registry
            .subscribe(sink(2), t("BTCUSD"), SecurityClass::Equity, AGG)
            .unwrap_err();

        assert_eq!(err.existing, CRYPTO);
        assert_eq!(err.requested, SecurityClass::Equity);
        assert!(!registry.contains_sink(sink(2)));
    }

    #[test]
    fn check_class_only_rejects_other_classes() {
        let mut registry = SubscriptionRegistry::new();
        registry.subscribe(sink(1), t("BTCUSD"), CRYPTO, AGG).unwrap();

        assert!(registry.check_class(&t("BTCUSD"), CRYPTO).is_ok());
        assert!(registry.check_class(&t("ETHUSD"), SecurityClass::Equity).is_ok());
        assert_eq!(
            registry.check_class(&t("BTCUSD"), SecurityClass::Equity),
            Err(ClassConflict {
                ticker: t("BTCUSD"),
                existing: CRYPTO,
                requested: SecurityClass::Equity,
            })
        );
    }

    #[test]
    fn unsubscribe_with_remaining_sinks_keeps_state() {
        let mut registry = SubscriptionRegistry::new();

        registry.subscribe(sink(1), t("BTCUSD"), CRYPTO, AGG).unwrap();
        registry.subscribe(sink(2), t("BTCUSD"), CRYPTO, AGG).unwrap();

        let changes = registry.unsubscribe(sink(1));

        assert!(changes.is_empty());
        assert_eq!(registry.get(&t("BTCUSD")).unwrap().sinks(), &[sink(2)]);
    }

    #[test]
    fn unsubscribe_last_sink_destroys_state() {
        let mut registry = SubscriptionRegistry::new();

        registry.subscribe(sink(1), t("BTCUSD"), CRYPTO, AGG).unwrap();
        let changes = registry.unsubscribe(sink(1));

        assert_eq!(changes[&CRYPTO].unsubscribe.len(), 1);
        assert_eq!(changes[&CRYPTO].unsubscribe[0].ticker, t("BTCUSD"));
        assert!(registry.get(&t("BTCUSD")).is_none());
        assert_eq!(registry.stats(), RegistryStats::default());
    }

    #[test]
    fn unsubscribe_is_sink_scoped_across_classes() {
        let mut registry = SubscriptionRegistry::new();

        registry.subscribe(sink(1), t("BTCUSDT"), CRYPTO, AGG).unwrap();
        registry.subscribe(sink(1), t("ETHUSDT"), CRYPTO, AGG).unwrap();
        registry
            .subscribe(sink(1), t("AAPL"), SecurityClass::Equity, SubscriptionKind::Trade)
            .unwrap();

        let changes = registry.unsubscribe(sink(1));

        assert_eq!(changes[&CRYPTO].unsubscribe.len(), 2);
        assert_eq!(changes[&SecurityClass::Equity].unsubscribe.len(), 1);
        assert!(!registry.contains_sink(sink(1)));
    }

    #[test]
    fn unsubscribe_unknown_sink_no_changes() {
        let mut registry = SubscriptionRegistry::new();

        registry.subscribe(sink(1), t("BTCUSDT"), CRYPTO, AGG).unwrap();

        assert!(registry.unsubscribe(sink(99)).is_empty());
        assert_eq!(registry.stats().ticker_count, 1);
    }

    #[test]
    fn resubscribe_after_removal_starts_fresh() {
        let mut registry = SubscriptionRegistry::new();
        let tick = Tick {
            ticker: t("BTCUSDT"),
            price: dec("30000.5"),
            volume: dec("0.25"),
            event_time: Utc.timestamp_millis_opt(1_688_913_452_159).unwrap(),
        };

        registry.subscribe(sink(1), t("BTCUSDT"), CRYPTO, AGG).unwrap();
        registry.get_mut(&t("BTCUSDT")).unwrap().apply(&tick);
        registry.unsubscribe(sink(1));

        let changes = registry.subscribe(sink(1), t("BTCUSDT"), CRYPTO, AGG).unwrap();

        assert_eq!(changes.subscribe.len(), 1);
        let state = registry.get(&t("BTCUSDT")).unwrap();
        assert!(state.last_price().is_none());
        assert!(state.snapshot().is_none());
    }

    #[test]
    fn apply_updates_last_known_state() {
        let mut registry = SubscriptionRegistry::new();
        registry.subscribe(sink(1), t("BTCUSDT"), CRYPTO, AGG).unwrap();
        let event_time = Utc.timestamp_millis_opt(1_688_913_452_159).unwrap();

        let snapshot = registry.get_mut(&t("BTCUSDT")).unwrap().apply(&Tick {
            ticker: t("BTCUSDT"),
            price: dec("30418.73"),
            volume: dec("1.5"),
            event_time,
        });

        assert_eq!(snapshot.price, dec("30418.73"));
        assert_eq!(snapshot.security_class, CRYPTO);
        let state = registry.get(&t("BTCUSDT")).unwrap();
        assert_eq!(state.last_volume(), Some(dec("1.5")));
        assert_eq!(state.last_event_time(), Some(event_time));
        assert_eq!(state.snapshot(), Some(snapshot));
    }

    #[test]
    fn remove_class_returns_states_and_cleans_index() {
        let mut registry = SubscriptionRegistry::new();

        registry.subscribe(sink(1), t("BTCUSDT"), CRYPTO, AGG).unwrap();
        registry.subscribe(sink(2), t("ETHUSDT"), CRYPTO, AGG).unwrap();
        registry
            .subscribe(sink(2), t("AAPL"), SecurityClass::Equity, AGG)
            .unwrap();

        let removed = registry.remove_class(CRYPTO);

        assert_eq!(removed.len(), 2);
        assert_eq!(removed[0].ticker(), &t("BTCUSDT"));
        assert!(!registry.contains_sink(sink(1)));
        assert_eq!(registry.sink_tickers(sink(2)), vec![t("AAPL")]);
        assert!(!registry.has_class(CRYPTO));
    }

    #[test]
    fn subscriptions_for_class_sorted() {
        let mut registry = SubscriptionRegistry::new();

        registry.subscribe(sink(1), t("ETHUSDT"), CRYPTO, AGG).unwrap();
        registry
            .subscribe(sink(1), t("BTCUSDT"), CRYPTO, SubscriptionKind::Trade)
            .unwrap();

        let channels: Vec<String> = registry
            .subscriptions_for(CRYPTO)
            .iter()
            .map(Subscription::channel)
            .collect();

        assert_eq!(channels, vec!["btcusdt@trade", "ethusdt@aggTrade"]);
        assert_eq!(registry.tickers_for(CRYPTO), vec![t("BTCUSDT"), t("ETHUSDT")]);
        assert!(registry.subscriptions_for(SecurityClass::Equity).is_empty());
    }

    #[test]
    fn sinks_in_class_deduplicated() {
        let mut registry = SubscriptionRegistry::new();

        registry.subscribe(sink(2), t("BTCUSDT"), CRYPTO, AGG).unwrap();
        registry.subscribe(sink(1), t("ETHUSDT"), CRYPTO, AGG).unwrap();
        registry.subscribe(sink(2), t("ETHUSDT"), CRYPTO, AGG).unwrap();

        assert_eq!(registry.sinks_in_class(CRYPTO), vec![sink(1), sink(2)]);
    }

    // -------------------------------------------------------------------------
    // Property tests
    // -------------------------------------------------------------------------

    #[derive(Debug, Clone)]
    enum Op {
        Subscribe(u64, usize),
        Unsubscribe(u64),
    }

    const TICKERS: &[&str] = &["BTCUSDT", "ETHUSDT", "SOLUSDT"];

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (1u64..5, 0..TICKERS.len()).prop_map(|(s, t)| Op::Subscribe(s, t)),
            (1u64..5).prop_map(Op::Unsubscribe),
        ]
    }

    proptest! {
        #[test]
        fn registry_matches_sequential_model(ops in proptest::collection::vec(op_strategy(), 0..64)) {
            let mut registry = SubscriptionRegistry::new();
            let mut model: BTreeMap<&str, Vec<u64>> = BTreeMap::new();
            let mut upstream_subscribes = 0usize;
            let mut upstream_unsubscribes = 0usize;
            let mut expected_subscribes = 0usize;
            let mut expected_unsubscribes = 0usize;

            for op in ops {
                match op {
                    Op::Subscribe(s, i) => {
                        let entry = model.entry(TICKERS[i]).or_default();
                        if entry.is_empty() {
                            expected_subscribes += 1;
                        }
                        if !entry.contains(&s) {
                            entry.push(s);
                        }
                        let changes = registry.subscribe(sink(s), t(TICKERS[i]), CRYPTO, AGG).unwrap();
                        upstream_subscribes += changes.subscribe.len();
                    }
                    Op::Unsubscribe(s) => {
                        for sinks in model.values_mut() {
                            if let Some(pos) = sinks.iter().position(|x| *x == s) {
                                sinks.remove(pos);
                                if sinks.is_empty() {
                                    expected_unsubscribes += 1;
                                }
                            }
                        }
                        model.retain(|_, sinks| !sinks.is_empty());
                        let changes = registry.unsubscribe(sink(s));
                        upstream_unsubscribes += changes.values().map(|c| c.unsubscribe.len()).sum::<usize>();
                    }
                }
            }

            prop_assert_eq!(upstream_subscribes, expected_subscribes);
            prop_assert_eq!(upstream_unsubscribes, expected_unsubscribes);
            prop_assert_eq!(registry.stats().ticker_count, model.len());

            for name in TICKERS {
                let expected: Vec<SinkId> = model
                    .get(name)
                    .map(|s| s.iter().copied().map(sink).collect())
                    .unwrap_or_default();
                let actual: Vec<SinkId> = registry
                    .get(&t(name))
                    .map(|s| s.sinks().to_vec())
                    .unwrap_or_default();
                prop_assert_eq!(actual, expected);
            }
        }
    }
}
