//! End-to-end wiring of connector, enrichment and batching.

use crate::{
    batcher::Batcher,
    config::PipelineConfig,
    connector::StreamConnector,
    directory::WalletDirectory,
    error::FeedError,
    processor::Processor,
    state::StateHandle,
    trade::RawTradeEvent,
};
use std::sync::Arc;
use tracing::info;

/// A running ingestion session: raw trades from the [`StreamConnector`] are enriched by the
/// [`Processor`] and merged into the shared [`StateHandle`] by the [`Batcher`].
#[derive(Debug)]
pub struct Pipeline {
    connector: StreamConnector,
    processor: Arc<Processor>,
    batcher: Batcher,
    directory: Arc<WalletDirectory>,
}

impl Pipeline {
    /// Build a pipeline with fresh session state.
    pub fn new(config: PipelineConfig, directory: Arc<WalletDirectory>) -> Result<Self, FeedError> {
        config.connector.validate()?;

        let state = StateHandle::new(config.batcher.capacity);
        let processor = Arc::new(Processor::new(
            config.enrichment,
            Arc::clone(&directory),
            state.clone(),
        ));
        let batcher = Batcher::new(config.batcher, state.clone());
        let connector = StreamConnector::new(config.connector, state);

        Ok(Self {
            connector,
            processor,
            batcher,
            directory,
        })
    }

    pub fn state(&self) -> &StateHandle {
        self.batcher.state()
    }

    pub fn directory(&self) -> &Arc<WalletDirectory> {
        &self.directory
    }

    pub fn processor(&self) -> &Processor {
        &self.processor
    }

    pub fn is_running(&self) -> bool {
        self.connector.is_running()
    }

    /// Connect and start streaming. Idempotent while already running.
    pub fn start(&mut self) {
        let processor = Arc::clone(&self.processor);
        let batcher = self.batcher.clone();

        info!(
            url = %self.connector.config().url,
            wallets = self.directory.len(),
            "starting trade pipeline"
        );
        self.connector.start(move |raw| {
            if let Some(record) = processor.process(&raw) {
                batcher.submit(record);
            }
        });
    }

    /// Feed one raw trade through enrichment and batching without a connection.
    ///
    /// Returns `true` if the trade survived enrichment and was queued.
    pub fn ingest(&self, raw: &RawTradeEvent) -> bool {
        match self.processor.process(raw) {
            Some(record) => {
                self.batcher.submit(record);
                true
            }
            None => false,
        }
    }

    /// Merge pending records into the display buffer now.
    pub fn flush(&self) -> usize {
        self.batcher.flush()
    }

    /// Disconnect, then flush anything still pending.
    pub async fn stop(&mut self) {
        self.connector.stop().await;
        let admitted = self.batcher.flush();
        info!(admitted, stats = ?self.state().stats(), "trade pipeline stopped");
    }

    /// Empty the display buffer and reset every counter.
    pub fn clear(&self) {
        self.batcher.clear();
    }
}
