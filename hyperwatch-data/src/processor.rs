//! Trade enrichment.
//!
//! Turns one [`RawTradeEvent`] into a [`NormalizedTradeRecord`], or discards it. Apart from
//! the discard/enrich counters this is a pure function of the event, the wallet table
//! snapshot and the configured thresholds.

use crate::{
    config::EnrichmentConfig,
    directory::{TrackedWalletEntry, WalletDirectory},
    error::TradeParseError,
    state::StateHandle,
    trade::{
        LARGE_TRADE_LABEL, NormalizedTradeRecord, RawTradeEvent, Side, TradeId,
        datetime_utc_from_epoch_ms,
    },
};
use rust_decimal::Decimal;
use smol_str::SmolStr;
use std::{
    str::FromStr,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};
use tracing::debug;

/// Enrichment engine.
#[derive(Debug)]
pub struct Processor {
    config: EnrichmentConfig,
    directory: Arc<WalletDirectory>,
    state: StateHandle,
    enriched: AtomicU64,
}

impl Processor {
    pub fn new(config: EnrichmentConfig, directory: Arc<WalletDirectory>, state: StateHandle) -> Self {
        Self {
            config,
            directory,
            state,
            enriched: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &EnrichmentConfig {
        &self.config
    }

    /// Lifetime count of records emitted with a tracked wallet.
    pub fn enriched(&self) -> u64 {
        self.enriched.load(Ordering::Relaxed)
    }

    /// Enrich a raw trade.
    ///
    /// Returns `None` if the event fails to parse or is caught by the noise filter; both cases
    /// increment the filtered counter.
    pub fn process(&self, raw: &RawTradeEvent) -> Option<NormalizedTradeRecord> {
        let table = self.directory.snapshot();
        let lookup = |address: &str| table.get(&address.to_lowercase());

        match enrich(raw, lookup, &self.config) {
            Ok(Some(record)) => {
                if record.is_tracked {
                    self.enriched.fetch_add(1, Ordering::Relaxed);
                }
                Some(record)
            }
            Ok(None) => {
                self.state.record_filtered();
                None
            }
            Err(error) => {
                debug!(tid = raw.tid, coin = %raw.coin, %error, "discarding unparseable trade");
                self.state.record_filtered();
                None
            }
        }
    }
}

/// Core enrichment rule, parameterised over the wallet lookup.
///
/// `Ok(None)` means the trade was caught by the noise filter.
pub fn enrich<'a, F>(
    raw: &RawTradeEvent,
    lookup: F,
    config: &EnrichmentConfig,
) -> Result<Option<NormalizedTradeRecord>, TradeParseError>
where
    F: Fn(&str) -> Option<&'a TrackedWalletEntry>,
{
    let side = Side::from_indicator(&raw.side)?;
    let price = parse_decimal("px", &raw.px)?;
    let size = parse_decimal("sz", &raw.sz)?;
    let notional = price
        .checked_mul(size)
        .ok_or_else(|| TradeParseError::InvalidDecimal {
            field: "notional",
            value: format!("{price} * {size}"),
        })?;

    let maker_entry = lookup(raw.maker());
    let taker_entry = lookup(raw.taker());

    let is_tracked = maker_entry.is_some() || taker_entry.is_some();
    let is_large = notional >= config.large_notional;

    if config.noise_filter_enabled && !is_tracked && !is_large && notional < config.noise_notional {
        return Ok(None);
    }

    let (wallet, label) = attribute(raw, maker_entry, taker_entry, is_large);

    Ok(Some(NormalizedTradeRecord {
        id: TradeId::derive(raw.tid, &raw.hash),
        time: datetime_utc_from_epoch_ms(raw.time),
        coin: raw.coin.clone(),
        side,
        price,
        notional,
        wallet: wallet.to_string(),
        label,
        is_large,
        is_tracked,
        hash: raw.hash.clone(),
    }))
}

/// Pick the wallet a record is shown against.
///
/// Tracked maker wins over tracked taker. An untracked large trade goes to the taker with the
/// "Large" label, anything else to the maker unlabelled.
fn attribute<'e>(
    raw: &'e RawTradeEvent,
    maker_entry: Option<&TrackedWalletEntry>,
    taker_entry: Option<&TrackedWalletEntry>,
    is_large: bool,
) -> (&'e str, Option<SmolStr>) {
    match (maker_entry, taker_entry) {
        (Some(entry), _) => (raw.maker(), entry.primary_label().cloned()),
        (None, Some(entry)) => (raw.taker(), entry.primary_label().cloned()),
        (None, None) if is_large => (raw.taker(), Some(SmolStr::new_static(LARGE_TRADE_LABEL))),
        (None, None) => (raw.maker(), None),
    }
}

fn parse_decimal(field: &'static str, value: &str) -> Result<Decimal, TradeParseError> {
    Decimal::from_str(value.trim())
        .or_else(|_| Decimal::from_scientific(value.trim()))
        .map_err(|_| TradeParseError::InvalidDecimal {
            field,
            value: value.to_string(),
        })
}
