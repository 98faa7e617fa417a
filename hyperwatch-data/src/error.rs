use std::time::Duration;
use thiserror::Error;

/// All errors generated in `hyperwatch-data`.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("SocketError: {0}")]
    Socket(String),

    #[error("failed to connect to {url}: {reason}")]
    Connect { url: String, reason: String },

    #[error("reconnection abandoned after {attempts} consecutive failed attempts")]
    ReconnectExhausted { attempts: u32 },

    #[error("WebSocket read timeout: no data received for {} ms", .0.as_millis())]
    ReadTimeout(Duration),

    #[error("wallet directory: {0}")]
    Directory(#[from] DirectoryError),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl FeedError {
    /// Determine if an error ends the current session and requires manual intervention.
    ///
    /// Every other failure is recovered by the connector's reconnect policy.
    pub fn is_terminal(&self) -> bool {
        matches!(self, FeedError::ReconnectExhausted { .. })
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for FeedError {
    fn from(value: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Socket(value.to_string())
    }
}

/// Failure to turn a single raw trade into a normalised record.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum TradeParseError {
    #[error("invalid side indicator: {0:?} (expected \"A\" or \"B\")")]
    InvalidSide(String),

    #[error("invalid decimal for {field}: {value:?}")]
    InvalidDecimal { field: &'static str, value: String },
}

/// A frame received from the exchange that could not be decoded.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("malformed frame JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unexpected frame shape on channel {channel}: {reason}")]
    Shape { channel: String, reason: String },
}

/// Errors loading the tracked wallet directory.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("failed to read wallet directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse wallet directory: {0}")]
    Json(#[from] serde_json::Error),

    #[error("wallet {address} has no labels")]
    EmptyLabels { address: String },
}
