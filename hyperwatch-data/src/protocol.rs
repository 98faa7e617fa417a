//! Wire frames exchanged with the exchange WebSocket.
//!
//! See docs: <https://hyperliquid.gitbook.io/hyperliquid-docs/for-developers/api/websocket>

use crate::{error::FrameError, trade::RawTradeEvent};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use smol_str::SmolStr;
use tracing::warn;

/// Inbound channel carrying public trades.
pub const CHANNEL_TRADES: &str = "trades";

/// Inbound channel acknowledging a `subscribe` request.
pub const CHANNEL_SUBSCRIPTION_RESPONSE: &str = "subscriptionResponse";

/// Inbound channel answering an application-level `ping`.
pub const CHANNEL_PONG: &str = "pong";

/// Inbound channel reporting a rejected request, e.g. an invalid subscription.
pub const CHANNEL_ERROR: &str = "error";

/// Outbound control frame.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum ControlFrame {
    Subscribe { subscription: Subscription },
    Ping,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Subscription {
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coin: Option<SmolStr>,
}

impl ControlFrame {
    /// Subscribe to the trades channel, optionally restricted to one coin.
    pub fn subscribe_trades(coin: Option<SmolStr>) -> Self {
        Self::Subscribe {
            subscription: Subscription {
                kind: CHANNEL_TRADES,
                coin,
            },
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Generic inbound envelope: every frame carries a `channel` discriminator.
#[derive(Debug, Deserialize)]
struct Envelope {
    channel: String,
    #[serde(default)]
    data: Value,
}

/// Decoded inbound frame.
#[derive(Debug)]
pub enum InboundFrame {
    Trades(Vec<RawTradeEvent>),
    SubscriptionAck,
    Pong,
    /// Server-side rejection, carrying the server's message.
    Error(String),
    Ignored(String),
}

impl InboundFrame {
    /// Decode a text frame.
    ///
    /// Trade payloads may be a single object or an array. A malformed element inside an
    /// otherwise valid array is logged and skipped, keeping the rest of the batch.
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let Envelope { channel, data } = serde_json::from_str::<Envelope>(text)?;

        match channel.as_str() {
            CHANNEL_TRADES => {
                let elements = match data {
                    Value::Array(elements) => elements,
                    single @ Value::Object(_) => vec![single],
                    other => {
                        return Err(FrameError::Shape {
                            channel,
                            reason: format!("expected object or array, got {other}"),
                        });
                    }
                };

                let trades = elements
                    .into_iter()
                    .filter_map(|element| match serde_json::from_value::<RawTradeEvent>(element) {
                        Ok(trade) => Some(trade),
                        Err(error) => {
                            warn!(%error, "skipping malformed trade element");
                            None
                        }
                    })
                    .collect();

                Ok(Self::Trades(trades))
            }
            CHANNEL_SUBSCRIPTION_RESPONSE => Ok(Self::SubscriptionAck),
            CHANNEL_PONG => Ok(Self::Pong),
            CHANNEL_ERROR => Ok(Self::Error(match data {
                Value::String(message) => message,
                other => other.to_string(),
            })),
            _ => Ok(Self::Ignored(channel)),
        }
    }
}
