use crate::error::TradeParseError;
use chrono::{DateTime, Utc};
use derive_more::Display;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Number of leading transaction hash characters folded into a [`TradeId`].
const HASH_PREFIX_LEN: usize = 10;

/// Label attributed to untracked wallets behind a large-notional trade.
pub const LARGE_TRADE_LABEL: &str = "Large";

/// Public trade as delivered on the exchange `trades` channel.
///
/// ### Raw Payload Example
/// See docs: <https://hyperliquid.gitbook.io/hyperliquid-docs/for-developers/api/websocket/subscriptions>
///```json
/// {
///     "coin": "BTC",
///     "side": "B",
///     "px": "50000.0",
///     "sz": "2.0",
///     "time": 1700000000000,
///     "hash": "0xdeadbeef00000000000000000000000000000000000000000000000000000000",
///     "tid": 1,
///     "users": ["0xaaa", "0xbbb"]
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct RawTradeEvent {
    pub coin: SmolStr,
    /// Aggressor side indicator: "B" (bid) or "A" (ask).
    pub side: String,
    pub px: String,
    pub sz: String,
    /// Exchange epoch milliseconds.
    pub time: u64,
    pub hash: String,
    pub tid: u64,
    /// `[maker, taker]`, order is fixed by the exchange.
    pub users: [String; 2],
}

impl RawTradeEvent {
    pub fn maker(&self) -> &str {
        &self.users[0]
    }

    pub fn taker(&self) -> &str {
        &self.users[1]
    }
}

/// Display side of a normalised trade.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Display, Deserialize, Serialize)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// Map the exchange side indicator: bid ("B") → Long, ask ("A") → Short.
    pub fn from_indicator(indicator: &str) -> Result<Self, TradeParseError> {
        match indicator {
            "B" => Ok(Side::Long),
            "A" => Ok(Side::Short),
            other => Err(TradeParseError::InvalidSide(other.to_string())),
        }
    }

    pub fn is_long(&self) -> bool {
        matches!(self, Side::Long)
    }
}

/// Stable identifier for a trade, identical across redeliveries of the same fill.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Display, Deserialize, Serialize)]
pub struct TradeId(pub SmolStr);

impl TradeId {
    /// Derive the identifier from the exchange trade id and a short prefix of the tx hash.
    pub fn derive(tid: u64, hash: &str) -> Self {
        let prefix = hash
            .char_indices()
            .nth(HASH_PREFIX_LEN)
            .map_or(hash, |(end, _)| &hash[..end]);
        Self(smol_str::format_smolstr!("{tid}-{prefix}"))
    }
}

/// Enriched, display-ready trade.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct NormalizedTradeRecord {
    pub id: TradeId,
    pub time: DateTime<Utc>,
    pub coin: SmolStr,
    pub side: Side,
    pub price: Decimal,
    /// `price × size` in quote currency.
    pub notional: Decimal,
    /// Attributed wallet address, in the casing it arrived with.
    pub wallet: String,
    pub label: Option<SmolStr>,
    pub is_large: bool,
    pub is_tracked: bool,
    pub hash: String,
}

/// Convert exchange epoch milliseconds into a [`DateTime<Utc>`], saturating to the epoch
/// for values chrono cannot represent.
pub fn datetime_utc_from_epoch_ms(epoch_ms: u64) -> DateTime<Utc> {
    i64::try_from(epoch_ms)
        .ok()
        .and_then(DateTime::from_timestamp_millis)
        .unwrap_or(DateTime::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_from_indicator() {
        struct TestCase {
            input: &'static str,
            expected: Result<Side, TradeParseError>,
        }

        let tests = vec![
            TestCase {
                // TC0: bid maps to Long
                input: "B",
                expected: Ok(Side::Long),
            },
            TestCase {
                // TC1: ask maps to Short
                input: "A",
                expected: Ok(Side::Short),
            },
            TestCase {
                // TC2: lowercase is not a valid indicator
                input: "b",
                expected: Err(TradeParseError::InvalidSide("b".to_string())),
            },
            TestCase {
                // TC3: verbose side names are rejected
                input: "Buy",
                expected: Err(TradeParseError::InvalidSide("Buy".to_string())),
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = Side::from_indicator(test.input);
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_trade_id_is_stable_across_redelivery() {
        let hash = "0xdeadbeefcafebabe0000";
        assert_eq!(TradeId::derive(42, hash), TradeId::derive(42, hash));
        assert_eq!(TradeId::derive(42, hash).0, "42-0xdeadbeef");
        assert_ne!(TradeId::derive(42, hash), TradeId::derive(43, hash));
    }

    #[test]
    fn test_trade_id_short_hash() {
        assert_eq!(TradeId::derive(7, "0xab").0, "7-0xab");
        assert_eq!(TradeId::derive(7, "").0, "7-");
    }

    #[test]
    fn test_raw_trade_event_de() {
        let input = r#"
            {
                "coin": "BTC",
                "side": "B",
                "px": "50000",
                "sz": "2",
                "time": 1000,
                "hash": "0xdead",
                "tid": 1,
                "users": ["0xAAA", "0xBBB"]
            }
        "#;

        let actual = serde_json::from_str::<RawTradeEvent>(input).unwrap();
        assert_eq!(actual.coin, "BTC");
        assert_eq!(actual.maker(), "0xAAA");
        assert_eq!(actual.taker(), "0xBBB");
        assert_eq!(actual.tid, 1);
    }

    #[test]
    fn test_datetime_utc_from_epoch_ms() {
        assert_eq!(datetime_utc_from_epoch_ms(1000).timestamp_millis(), 1000);
        assert_eq!(datetime_utc_from_epoch_ms(u64::MAX), DateTime::UNIX_EPOCH);
    }
}
