//! Timer-flushed batching of enriched trades into the display buffer.
//!
//! `submit` only queues. The first submit after an idle period arms a single flush timer;
//! further submits ride along until it fires. This caps display updates at one per
//! `flush_interval` no matter how bursty the feed is.

use crate::{config::BatcherConfig, state::StateHandle, trade::NormalizedTradeRecord};
use parking_lot::Mutex;
use std::{sync::Arc, time::Duration};
use tokio::task::JoinHandle;
use tracing::debug;

/// Flush timer state. At most one timer is ever pending.
#[derive(Debug, Default)]
enum FlushTimer {
    #[default]
    Idle,
    Scheduled { generation: u64, handle: JoinHandle<()> },
}

#[derive(Debug, Default)]
struct Pending {
    records: Vec<NormalizedTradeRecord>,
    timer: FlushTimer,
    generation: u64,
}

/// Batching and aggregation buffer in front of the [`StateHandle`].
///
/// Cheap to clone; clones share the same pending list and timer.
#[derive(Debug, Clone)]
pub struct Batcher {
    pending: Arc<Mutex<Pending>>,
    state: StateHandle,
    flush_interval: Duration,
}

impl Batcher {
    pub fn new(config: BatcherConfig, state: StateHandle) -> Self {
        Self {
            pending: Arc::new(Mutex::new(Pending::default())),
            state,
            flush_interval: config.flush_interval,
        }
    }

    pub fn state(&self) -> &StateHandle {
        &self.state
    }

    /// Number of records waiting for the next flush.
    pub fn pending_len(&self) -> usize {
        self.pending.lock().records.len()
    }

    pub fn is_flush_scheduled(&self) -> bool {
        matches!(self.pending.lock().timer, FlushTimer::Scheduled { .. })
    }

    /// Queue a record, arming the flush timer if none is pending.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit(&self, record: NormalizedTradeRecord) {
        let mut pending = self.pending.lock();
        pending.records.push(record);

        if matches!(pending.timer, FlushTimer::Idle) {
            pending.generation = pending.generation.wrapping_add(1);
            let generation = pending.generation;
            let batcher = self.clone();
            let interval = self.flush_interval;
            let handle = tokio::spawn(async move {
                tokio::time::sleep(interval).await;
                batcher.flush_inner(Some(generation));
            });
            pending.timer = FlushTimer::Scheduled { generation, handle };
        }
    }

    /// Merge every pending record into the display buffer now, cancelling any armed timer.
    ///
    /// Returns the number of records admitted after deduplication.
    pub fn flush(&self) -> usize {
        self.flush_inner(None)
    }

    /// `fired` carries the generation of the timer that triggered this flush, `None` for a
    /// manual flush.
    fn flush_inner(&self, fired: Option<u64>) -> usize {
        // Held across the merge so no submit can interleave with a flush
        let mut pending = self.pending.lock();

        match (fired, std::mem::take(&mut pending.timer)) {
            (None, FlushTimer::Scheduled { handle, .. }) => handle.abort(),
            (Some(fired), FlushTimer::Scheduled { generation, handle }) if fired != generation => {
                // Stale timer woken after a manual flush re-armed a newer one
                pending.timer = FlushTimer::Scheduled { generation, handle };
                return 0;
            }
            (Some(_), FlushTimer::Idle) => return 0,
            _ => {}
        }

        if pending.records.is_empty() {
            return 0;
        }

        let batch = std::mem::take(&mut pending.records);
        let submitted = batch.len();
        let admitted = self.state.add_batch(batch);

        debug!(submitted, admitted, duplicates = submitted - admitted, "flushed trade batch");
        admitted
    }

    /// Empty the display buffer and reset every aggregate counter.
    ///
    /// Pending records are left untouched and land with the next flush.
    pub fn clear(&self) {
        let _pending = self.pending.lock();
        self.state.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trade::{Side, TradeId, datetime_utc_from_epoch_ms};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn record(tid: u64, notional: Decimal) -> NormalizedTradeRecord {
        NormalizedTradeRecord {
            id: TradeId::derive(tid, "0xbeef"),
            time: datetime_utc_from_epoch_ms(tid),
            coin: "ETH".into(),
            side: Side::Long,
            price: dec!(1),
            notional,
            wallet: "0xwallet".to_string(),
            label: None,
            is_large: notional >= dec!(100000),
            is_tracked: false,
            hash: "0xbeef".to_string(),
        }
    }

    fn batcher(capacity: usize) -> Batcher {
        let config = BatcherConfig::default().with_capacity(capacity);
        Batcher::new(config, StateHandle::new(capacity))
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_defers_until_flush_interval() {
        let batcher = batcher(10);

        batcher.submit(record(1, dec!(5000)));
        batcher.submit(record(2, dec!(5000)));

        assert!(batcher.state().is_empty());
        assert_eq!(batcher.pending_len(), 2);
        assert!(batcher.is_flush_scheduled());

        tokio::time::sleep(Duration::from_millis(99)).await;
        assert!(batcher.state().is_empty());

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(batcher.state().len(), 2);
        assert_eq!(batcher.pending_len(), 0);
        assert!(!batcher.is_flush_scheduled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_arms_single_timer() {
        let batcher = batcher(100);

        for tid in 0..50 {
            batcher.submit(record(tid, dec!(2000)));
        }

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(batcher.state().len(), 50);
        assert_eq!(batcher.state().stats().total_trades, 50);

        // Next submit after the flush arms a fresh timer
        batcher.submit(record(50, dec!(2000)));
        assert!(batcher.is_flush_scheduled());
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(batcher.state().len(), 51);
    }

    #[tokio::test]
    async fn test_idempotent_dedup_across_flushes() {
        let batcher = batcher(10);

        batcher.submit(record(7, dec!(5000)));
        assert_eq!(batcher.flush(), 1);

        batcher.submit(record(7, dec!(5000)));
        assert_eq!(batcher.flush(), 0);

        let stats = batcher.state().stats();
        assert_eq!(batcher.state().len(), 1);
        assert_eq!(stats.total_trades, 1);
        assert_eq!(stats.total_volume, dec!(5000));
    }

    #[tokio::test]
    async fn test_bounded_retention_keeps_most_recent() {
        let batcher = batcher(5);

        for tid in 1..=12 {
            batcher.submit(record(tid, dec!(1000)));
            if tid % 4 == 0 {
                batcher.flush();
            }
        }
        batcher.flush();

        let tids = batcher
            .state()
            .records()
            .iter()
            .map(|record| record.time.timestamp_millis())
            .collect::<Vec<_>>();
        assert_eq!(tids, vec![12, 11, 10, 9, 8]);
        assert_eq!(batcher.state().stats().total_trades, 12);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_flush_cancels_timer() {
        let batcher = batcher(10);

        batcher.submit(record(1, dec!(1000)));
        assert!(batcher.is_flush_scheduled());

        assert_eq!(batcher.flush(), 1);
        assert!(!batcher.is_flush_scheduled());

        batcher.submit(record(2, dec!(1000)));
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(batcher.state().len(), 2);
    }

    #[tokio::test]
    async fn test_flush_on_empty_is_noop() {
        let batcher = batcher(10);
        assert_eq!(batcher.flush(), 0);
        assert!(batcher.state().is_empty());
    }

    #[tokio::test]
    async fn test_clear_resets_buffer_and_counters() {
        let batcher = batcher(10);

        batcher.submit(record(1, dec!(250000)));
        batcher.flush();
        assert_eq!(batcher.state().stats().large_trades, 1);

        batcher.clear();
        assert!(batcher.state().is_empty());
        assert_eq!(batcher.state().stats().total_volume, Decimal::ZERO);

        // Same record is admitted again once cleared
        batcher.submit(record(1, dec!(250000)));
        assert_eq!(batcher.flush(), 1);
    }
}
