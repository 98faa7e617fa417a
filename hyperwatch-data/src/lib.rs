#![forbid(unsafe_code)]

//! # Hyperwatch Data
//! Streaming trade ingestion for a Hyperliquid tracked-wallet dashboard.
//!
//! The library includes:
//! - [`StreamConnector`]: WebSocket subscription with heartbeat, read timeout and linear
//!   reconnect backoff
//! - [`Processor`]: enrichment of raw trades against a swappable [`WalletDirectory`],
//!   notional thresholds and noise filtering
//! - [`Batcher`]: timer-flushed, deduplicating merge into a bounded newest-first buffer
//! - [`StateHandle`]: shared dashboard state, aggregate counters and connection status
//! - [`ViewFilters`]: read-side projection of the buffer
//!
//! [`Pipeline`] wires all of the above into a single session.

/// All [`Error`](std::error::Error)s generated in Hyperwatch Data.
pub mod error;

/// Exchange trade payload and the normalised record built from it.
pub mod trade;

/// Tracked wallet reference table.
pub mod directory;

/// Wire frames exchanged with the exchange WebSocket.
pub mod protocol;

/// Enrichment engine.
pub mod processor;

/// Shared session state.
pub mod state;

/// Timer-flushed batching buffer.
pub mod batcher;

/// Display projection.
pub mod projection;

/// WebSocket stream connector and read timeout.
pub mod connector;

/// Connector, processor and batcher wired together.
pub mod pipeline;

/// Environment driven configuration.
pub mod config;

pub use batcher::Batcher;
pub use config::{BatcherConfig, ConnectorConfig, EnrichmentConfig, PipelineConfig};
pub use connector::{ReconnectPolicy, StreamConnector};
pub use directory::{TrackedWalletEntry, WalletDirectory, WalletTable, WalletTier};
pub use error::{DirectoryError, FeedError, FrameError, TradeParseError};
pub use pipeline::Pipeline;
pub use processor::Processor;
pub use projection::ViewFilters;
pub use state::{AggregateCounters, ConnectionStatus, StateHandle};
pub use trade::{NormalizedTradeRecord, RawTradeEvent, Side, TradeId};
