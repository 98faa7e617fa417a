//! Shared dashboard state.
//!
//! One [`StateHandle`] is created per session and passed to the components that need it.
//! Readers get typed accessors; mutation is limited to a handful of named operations used by
//! the batcher (add batch, clear), the connector (status, error) and the processor (filtered
//! count). Readers only ever observe the result of a completed flush.

use crate::{
    projection::{ViewFilters, project},
    trade::{NormalizedTradeRecord, TradeId},
};
use derive_more::Display;
use fnv::FnvHashSet;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};
use tokio::sync::watch;

/// Connection status of the stream connector.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Display, Deserialize, Serialize)]
pub enum ConnectionStatus {
    #[default]
    #[display("disconnected")]
    Disconnected,
    #[display("connecting")]
    Connecting,
    #[display("connected")]
    Connected,
    #[display("error")]
    Error,
}

/// Running totals over every record admitted since the last clear.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct AggregateCounters {
    pub total_trades: u64,
    pub filtered_trades: u64,
    pub tracked_trades: u64,
    pub large_trades: u64,
    pub total_volume: Decimal,
}

/// Bounded, newest-first display buffer plus the aggregates derived from it.
#[derive(Debug)]
pub struct DashboardState {
    records: VecDeque<NormalizedTradeRecord>,
    capacity: usize,
    counters: AggregateCounters,
    last_error: Option<String>,
    filters: ViewFilters,
}

impl DashboardState {
    fn new(capacity: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
            counters: AggregateCounters::default(),
            last_error: None,
            filters: ViewFilters::default(),
        }
    }

    /// Records currently retained, newest first.
    pub fn records(&self) -> &VecDeque<NormalizedTradeRecord> {
        &self.records
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn filters(&self) -> &ViewFilters {
        &self.filters
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Merge a batch in submission order.
    ///
    /// Records whose id is already retained, or repeated earlier in the same batch, are
    /// dropped. Survivors are prepended newest first, the buffer is truncated to capacity,
    /// and counters are advanced over the survivors only. Returns the number admitted.
    fn add_batch(&mut self, batch: Vec<NormalizedTradeRecord>) -> usize {
        let mut seen = self
            .records
            .iter()
            .map(|record| record.id.clone())
            .collect::<FnvHashSet<TradeId>>();

        let admitted = batch
            .into_iter()
            .filter(|record| seen.insert(record.id.clone()))
            .collect::<Vec<_>>();

        for record in &admitted {
            self.counters.total_trades += 1;
            self.counters.total_volume += record.notional;
            if record.is_tracked {
                self.counters.tracked_trades += 1;
            }
            if record.is_large {
                self.counters.large_trades += 1;
            }
        }

        let count = admitted.len();
        for record in admitted {
            self.records.push_front(record);
        }
        self.records.truncate(self.capacity);

        count
    }

    fn clear(&mut self) {
        self.records.clear();
        self.counters = AggregateCounters::default();
    }
}

#[derive(Debug)]
struct StateInner {
    state: RwLock<DashboardState>,
    filtered: AtomicU64,
    status: watch::Sender<ConnectionStatus>,
}

/// Cheaply cloneable handle onto the session state.
#[derive(Debug, Clone)]
pub struct StateHandle {
    inner: Arc<StateInner>,
}

impl StateHandle {
    /// Create session state retaining at most `capacity` records.
    pub fn new(capacity: usize) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::default());
        Self {
            inner: Arc::new(StateInner {
                state: RwLock::new(DashboardState::new(capacity)),
                filtered: AtomicU64::new(0),
                status,
            }),
        }
    }

    /// Run `f` against a consistent view of the state.
    pub fn read<R>(&self, f: impl FnOnce(&DashboardState) -> R) -> R {
        f(&self.inner.state.read())
    }

    /// Copy of the retained records, newest first.
    pub fn records(&self) -> Vec<NormalizedTradeRecord> {
        self.read(|state| state.records.iter().cloned().collect())
    }

    /// Retained records passing the current [`ViewFilters`], newest first.
    pub fn projected(&self) -> Vec<NormalizedTradeRecord> {
        self.read(|state| project(&state.records, &state.filters).cloned().collect())
    }

    pub fn len(&self) -> usize {
        self.read(|state| state.records.len())
    }

    pub fn is_empty(&self) -> bool {
        self.read(|state| state.records.is_empty())
    }

    /// Snapshot of the aggregate counters.
    pub fn stats(&self) -> AggregateCounters {
        let mut counters = self.read(|state| state.counters.clone());
        counters.filtered_trades = self.inner.filtered.load(Ordering::Relaxed);
        counters
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.inner.status.borrow()
    }

    /// Subscribe to connection status changes.
    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.status.subscribe()
    }

    pub fn last_error(&self) -> Option<String> {
        self.read(|state| state.last_error.clone())
    }

    pub fn filters(&self) -> ViewFilters {
        self.read(|state| state.filters.clone())
    }

    /// Replace the display filters.
    pub fn set_filters(&self, filters: ViewFilters) {
        self.inner.state.write().filters = filters;
    }

    pub(crate) fn add_batch(&self, batch: Vec<NormalizedTradeRecord>) -> usize {
        self.inner.state.write().add_batch(batch)
    }

    pub(crate) fn clear(&self) {
        self.inner.state.write().clear();
        self.inner.filtered.store(0, Ordering::Relaxed);
    }

    pub(crate) fn record_filtered(&self) {
        self.inner.filtered.fetch_add(1, Ordering::Relaxed);
    }

    /// Set the connection status, returning `true` if it changed. Repeated transitions to the
    /// current status are not published to subscribers.
    pub(crate) fn set_status(&self, status: ConnectionStatus) -> bool {
        self.inner.status.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        })
    }

    pub(crate) fn set_error(&self, error: Option<String>) {
        self.inner.state.write().last_error = error;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trade::{Side, datetime_utc_from_epoch_ms};
    use rust_decimal_macros::dec;

    fn record(tid: u64, notional: Decimal, is_tracked: bool, is_large: bool) -> NormalizedTradeRecord {
        NormalizedTradeRecord {
            id: TradeId::derive(tid, "0xfeed"),
            time: datetime_utc_from_epoch_ms(tid),
            coin: "BTC".into(),
            side: Side::Short,
            price: dec!(10),
            notional,
            wallet: "0xwallet".to_string(),
            label: None,
            is_large,
            is_tracked,
            hash: "0xfeed".to_string(),
        }
    }

    fn tids(state: &StateHandle) -> Vec<u64> {
        state
            .records()
            .iter()
            .map(|record| record.time.timestamp_millis() as u64)
            .collect()
    }

    #[test]
    fn test_add_batch_prepends_newest_first() {
        let state = StateHandle::new(10);
        assert_eq!(state.add_batch(vec![record(1, dec!(1), false, false), record(2, dec!(1), false, false)]), 2);
        assert_eq!(state.add_batch(vec![record(3, dec!(1), false, false)]), 1);

        assert_eq!(tids(&state), vec![3, 2, 1]);
    }

    #[test]
    fn test_add_batch_dedups_against_buffer_and_within_batch() {
        let state = StateHandle::new(10);
        state.add_batch(vec![record(1, dec!(5000), true, false)]);

        let admitted = state.add_batch(vec![
            record(1, dec!(5000), true, false),
            record(2, dec!(200000), false, true),
            record(2, dec!(200000), false, true),
        ]);

        assert_eq!(admitted, 1);
        assert_eq!(tids(&state), vec![2, 1]);

        let stats = state.stats();
        assert_eq!(stats.total_trades, 2);
        assert_eq!(stats.tracked_trades, 1);
        assert_eq!(stats.large_trades, 1);
        assert_eq!(stats.total_volume, dec!(205000));
    }

    #[test]
    fn test_add_batch_truncates_oldest() {
        let state = StateHandle::new(3);
        state.add_batch((1..=2).map(|tid| record(tid, dec!(1), false, false)).collect());
        state.add_batch((3..=5).map(|tid| record(tid, dec!(1), false, false)).collect());

        assert_eq!(tids(&state), vec![5, 4, 3]);
        assert_eq!(state.stats().total_trades, 5);
    }

    #[test]
    fn test_clear_resets_records_and_counters() {
        let state = StateHandle::new(3);
        state.add_batch(vec![record(1, dec!(100), true, true)]);
        state.record_filtered();
        state.set_filters(ViewFilters::default().with_large_only(true));

        state.clear();

        assert!(state.is_empty());
        assert_eq!(state.stats(), AggregateCounters::default());
        assert!(state.filters().large_only);
    }

    #[test]
    fn test_set_status_suppresses_repeats() {
        let state = StateHandle::new(1);
        let mut rx = state.subscribe_status();

        assert!(!state.set_status(ConnectionStatus::Disconnected));
        assert!(!rx.has_changed().unwrap());

        assert!(state.set_status(ConnectionStatus::Connecting));
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), ConnectionStatus::Connecting);

        assert!(!state.set_status(ConnectionStatus::Connecting));
        assert!(!rx.has_changed().unwrap());
        assert_eq!(state.status(), ConnectionStatus::Connecting);
    }

    #[test]
    fn test_projected_applies_filters() {
        let state = StateHandle::new(10);
        state.add_batch(vec![
            record(1, dec!(5000), true, false),
            record(2, dec!(500), false, false),
        ]);
        state.set_filters(ViewFilters::default().with_tracked_only(true));

        let projected = state.projected();
        assert_eq!(projected.len(), 1);
        assert_eq!(projected[0].time.timestamp_millis(), 1);
    }
}
