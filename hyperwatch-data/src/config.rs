//! Pipeline configuration.
//!
//! Every struct has sensible defaults, `with_*` builder setters, and a `from_env` constructor
//! that falls back to the default for any variable that is absent or fails to parse.

use crate::error::FeedError;
use rust_decimal::Decimal;
use smol_str::SmolStr;
use std::{str::FromStr, time::Duration};
use url::Url;

/// Default exchange WebSocket endpoint.
pub const DEFAULT_WS_URL: &str = "wss://api.hyperliquid.xyz/ws";

/// Stream connector configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectorConfig {
    /// WebSocket server URL
    pub url: String,
    /// Coins to subscribe to; empty subscribes to the unfiltered trades channel
    pub coins: Vec<SmolStr>,
    /// Application-level heartbeat interval, only ticking while connected
    pub heartbeat_interval: Duration,
    /// Linear backoff unit: attempt `n` waits `n × reconnect_base_delay`
    pub reconnect_base_delay: Duration,
    /// Consecutive failures tolerated before entering the terminal error state
    pub max_reconnect_attempts: u32,
    /// Silence on the socket longer than this is treated as an abnormal closure
    pub read_timeout: Duration,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_WS_URL.to_string(),
            coins: Vec::new(),
            heartbeat_interval: Duration::from_secs(30),
            reconnect_base_delay: Duration::from_millis(1000),
            max_reconnect_attempts: 5,
            read_timeout: Duration::from_secs(90),
        }
    }
}

impl ConnectorConfig {
    /// Create a new configuration with custom URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Build from `HYPERWATCH_*` environment variables.
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            url: std::env::var("HYPERWATCH_WS_URL").unwrap_or(default.url),
            coins: std::env::var("HYPERWATCH_COINS")
                .map(|coins| parse_coins(&coins))
                .unwrap_or(default.coins),
            heartbeat_interval: env_parse("HYPERWATCH_HEARTBEAT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(default.heartbeat_interval),
            reconnect_base_delay: env_parse("HYPERWATCH_RECONNECT_BASE_MS")
                .map(Duration::from_millis)
                .unwrap_or(default.reconnect_base_delay),
            max_reconnect_attempts: env_parse("HYPERWATCH_MAX_RECONNECT_ATTEMPTS")
                .unwrap_or(default.max_reconnect_attempts),
            read_timeout: env_parse("HYPERWATCH_READ_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(default.read_timeout),
        }
    }

    /// Set subscribed coins
    pub fn with_coins<I, C>(mut self, coins: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<SmolStr>,
    {
        self.coins = coins.into_iter().map(Into::into).collect();
        self
    }

    /// Set heartbeat interval
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Set reconnect backoff unit
    pub fn with_reconnect_base_delay(mut self, delay: Duration) -> Self {
        self.reconnect_base_delay = delay;
        self
    }

    /// Set maximum consecutive reconnect attempts
    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    /// Set read timeout
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Check the URL is a `ws` or `wss` endpoint and every interval is non-zero.
    pub fn validate(&self) -> Result<(), FeedError> {
        let url = Url::parse(&self.url)
            .map_err(|error| FeedError::Config(format!("invalid url {:?}: {error}", self.url)))?;

        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(FeedError::Config(format!(
                "unsupported url scheme {:?}, expected ws or wss",
                url.scheme()
            )));
        }
        if self.heartbeat_interval.is_zero() {
            return Err(FeedError::Config("heartbeat interval must be non-zero".to_string()));
        }
        if self.read_timeout.is_zero() {
            return Err(FeedError::Config("read timeout must be non-zero".to_string()));
        }
        Ok(())
    }
}

/// Enrichment thresholds and noise filter switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnrichmentConfig {
    /// Notional at or above which a trade is large (inclusive)
    pub large_notional: Decimal,
    /// Untracked, non-large trades strictly below this notional are discarded
    pub noise_notional: Decimal,
    pub noise_filter_enabled: bool,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            large_notional: Decimal::from(100_000),
            noise_notional: Decimal::from(1_000),
            noise_filter_enabled: true,
        }
    }
}

impl EnrichmentConfig {
    /// Build from `HYPERWATCH_*` environment variables.
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            large_notional: env_parse("HYPERWATCH_LARGE_NOTIONAL").unwrap_or(default.large_notional),
            noise_notional: env_parse("HYPERWATCH_NOISE_NOTIONAL").unwrap_or(default.noise_notional),
            noise_filter_enabled: std::env::var("HYPERWATCH_NOISE_FILTER")
                .ok()
                .and_then(|value| parse_flag(&value))
                .unwrap_or(default.noise_filter_enabled),
        }
    }

    pub fn with_large_notional(mut self, threshold: Decimal) -> Self {
        self.large_notional = threshold;
        self
    }

    pub fn with_noise_notional(mut self, threshold: Decimal) -> Self {
        self.noise_notional = threshold;
        self
    }

    pub fn with_noise_filter(mut self, enabled: bool) -> Self {
        self.noise_filter_enabled = enabled;
        self
    }
}

/// Batching buffer configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatcherConfig {
    /// Delay between the first pending submit and the flush it schedules
    pub flush_interval: Duration,
    /// Maximum number of records retained for display
    pub capacity: usize,
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            flush_interval: Duration::from_millis(100),
            capacity: 100,
        }
    }
}

impl BatcherConfig {
    /// Build from `HYPERWATCH_*` environment variables.
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            flush_interval: env_parse("HYPERWATCH_FLUSH_MS")
                .map(Duration::from_millis)
                .unwrap_or(default.flush_interval),
            capacity: env_parse::<usize>("HYPERWATCH_BUFFER_CAPACITY")
                .filter(|capacity| *capacity > 0)
                .unwrap_or(default.capacity),
        }
    }

    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }
}

/// Configuration for a complete ingestion pipeline.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineConfig {
    pub connector: ConnectorConfig,
    pub enrichment: EnrichmentConfig,
    pub batcher: BatcherConfig,
}

impl PipelineConfig {
    /// Build every section from `HYPERWATCH_*` environment variables.
    pub fn from_env() -> Self {
        Self {
            connector: ConnectorConfig::from_env(),
            enrichment: EnrichmentConfig::from_env(),
            batcher: BatcherConfig::from_env(),
        }
    }

    pub fn with_connector(mut self, connector: ConnectorConfig) -> Self {
        self.connector = connector;
        self
    }

    pub fn with_enrichment(mut self, enrichment: EnrichmentConfig) -> Self {
        self.enrichment = enrichment;
        self
    }

    pub fn with_batcher(mut self, batcher: BatcherConfig) -> Self {
        self.batcher = batcher;
        self
    }
}

pub(crate) fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|value| value.trim().parse().ok())
}

pub(crate) fn parse_coins(coins: &str) -> Vec<SmolStr> {
    coins
        .split(',')
        .map(str::trim)
        .filter(|coin| !coin.is_empty())
        .map(SmolStr::from)
        .collect()
}

pub(crate) fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}
