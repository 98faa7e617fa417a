//! WebSocket stream connector for the exchange trades feed
//!
//! Owns a single connection task with subscription, application-level heartbeat, read
//! timeout and linear-backoff reconnection. Connection status and the last error are
//! published through the shared [`StateHandle`].

use crate::{
    config::ConnectorConfig,
    error::FeedError,
    protocol::{ControlFrame, InboundFrame},
    state::{ConnectionStatus, StateHandle},
    trade::RawTradeEvent,
};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::{
    sync::oneshot,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        Message,
        protocol::{CloseFrame, frame::coding::CloseCode},
    },
};
use tracing::{debug, error, info, warn};

pub mod timeout;

use timeout::TimeoutStream;

/// Grace period `stop` gives the connection task to send its close frame.
const STOP_GRACE: Duration = Duration::from_secs(1);

/// Longest payload excerpt included in malformed frame logs.
const LOG_PAYLOAD_CHARS: usize = 200;

/// Linear reconnect backoff with a cap on consecutive failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    base_delay: Duration,
    max_attempts: u32,
    attempts: u32,
}

impl ReconnectPolicy {
    pub fn new(base_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_attempts,
            attempts: 0,
        }
    }

    /// Consecutive failures recorded since the last successful connect.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Record a failure and return the delay before the next attempt.
    ///
    /// Attempt `n` waits `n × base_delay`. Returns `None` once `max_attempts` is exceeded.
    pub fn next_delay(&mut self) -> Option<Duration> {
        self.attempts = self.attempts.saturating_add(1);
        (self.attempts <= self.max_attempts).then(|| self.base_delay.saturating_mul(self.attempts))
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}

impl From<&ConnectorConfig> for ReconnectPolicy {
    fn from(config: &ConnectorConfig) -> Self {
        Self::new(config.reconnect_base_delay, config.max_reconnect_attempts)
    }
}

#[derive(Debug)]
struct ConnectorTask {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Streaming connection to the exchange trades channel.
#[derive(Debug)]
pub struct StreamConnector {
    config: ConnectorConfig,
    state: StateHandle,
    task: Option<ConnectorTask>,
}

impl StreamConnector {
    pub fn new(config: ConnectorConfig, state: StateHandle) -> Self {
        Self {
            config,
            state,
            task: None,
        }
    }

    pub fn config(&self) -> &ConnectorConfig {
        &self.config
    }

    /// Whether a connection task is alive. A task that reached the terminal error state or
    /// saw a normal server close is no longer running.
    pub fn is_running(&self) -> bool {
        self.task
            .as_ref()
            .is_some_and(|task| !task.handle.is_finished())
    }

    /// Open the connection, invoking `on_trade` for every trade event received.
    ///
    /// Idempotent while a connection task is running. Must be called from within a tokio
    /// runtime.
    pub fn start<F>(&mut self, on_trade: F)
    where
        F: FnMut(RawTradeEvent) + Send + 'static,
    {
        if self.is_running() {
            debug!(url = %self.config.url, "stream connector already running");
            return;
        }

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        self.state.set_error(None);
        self.state.set_status(ConnectionStatus::Connecting);

        let handle = tokio::spawn(run_connection_loop(
            self.config.clone(),
            self.state.clone(),
            on_trade,
            shutdown_rx,
        ));

        self.task = Some(ConnectorTask {
            shutdown: shutdown_tx,
            handle,
        });
    }

    /// Close the connection with a normal closure code and cancel any pending reconnect.
    ///
    /// Always leaves the connector `Disconnected` with its attempt counter reset.
    pub async fn stop(&mut self) {
        if let Some(ConnectorTask { shutdown, mut handle }) = self.task.take() {
            let _ = shutdown.send(());
            if tokio::time::timeout(STOP_GRACE, &mut handle).await.is_err() {
                warn!(url = %self.config.url, "connection task did not stop in time, aborting");
                handle.abort();
            }
        }
        self.state.set_status(ConnectionStatus::Disconnected);
    }
}

impl Drop for StreamConnector {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.handle.abort();
        }
    }
}

/// How a single connection session ended.
#[derive(Debug)]
enum SessionEnd {
    Shutdown,
    ServerClosed,
    Abnormal(FeedError),
}

/// Connection loop with auto-reconnect.
async fn run_connection_loop<F>(
    config: ConnectorConfig,
    state: StateHandle,
    mut on_trade: F,
    mut shutdown: oneshot::Receiver<()>,
) where
    F: FnMut(RawTradeEvent) + Send + 'static,
{
    info!(url = %config.url, coins = ?config.coins, "starting stream connector");
    let mut policy = ReconnectPolicy::from(&config);

    loop {
        state.set_status(ConnectionStatus::Connecting);

        let connected = tokio::select! {
            biased;
            _ = &mut shutdown => {
                state.set_status(ConnectionStatus::Disconnected);
                return;
            }
            connected = tokio::time::timeout(config.read_timeout, connect_async(config.url.as_str())) => connected,
        };

        let end = match connected {
            Ok(Ok((websocket, _))) => {
                info!(url = %config.url, "connected to exchange WebSocket");
                policy.reset();
                run_session(websocket, &config, &state, &mut on_trade, &mut shutdown).await
            }
            Ok(Err(error)) => SessionEnd::Abnormal(FeedError::Connect {
                url: config.url.clone(),
                reason: error.to_string(),
            }),
            Err(_) => SessionEnd::Abnormal(FeedError::Connect {
                url: config.url.clone(),
                reason: format!(
                    "handshake did not complete within {} ms",
                    config.read_timeout.as_millis()
                ),
            }),
        };

        let error = match end {
            SessionEnd::Shutdown => {
                info!(url = %config.url, "stream connector stopped");
                state.set_status(ConnectionStatus::Disconnected);
                return;
            }
            SessionEnd::ServerClosed => {
                info!(url = %config.url, "server closed the connection normally");
                state.set_status(ConnectionStatus::Disconnected);
                return;
            }
            SessionEnd::Abnormal(error) => error,
        };

        let Some(delay) = policy.next_delay() else {
            let terminal = FeedError::ReconnectExhausted {
                attempts: config.max_reconnect_attempts,
            };
            error!(url = %config.url, last_error = %error, %terminal, "giving up on stream connector");
            state.set_error(Some(terminal.to_string()));
            state.set_status(ConnectionStatus::Error);
            return;
        };

        warn!(
            url = %config.url,
            %error,
            attempt = policy.attempts(),
            max_attempts = config.max_reconnect_attempts,
            delay_ms = delay.as_millis() as u64,
            "connection lost, scheduling reconnect"
        );
        state.set_error(Some(error.to_string()));
        state.set_status(ConnectionStatus::Connecting);

        tokio::select! {
            biased;
            _ = &mut shutdown => {
                state.set_status(ConnectionStatus::Disconnected);
                return;
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

/// Drive one established connection until it closes, fails or is shut down.
async fn run_session<S, F>(
    websocket: tokio_tungstenite::WebSocketStream<S>,
    config: &ConnectorConfig,
    state: &StateHandle,
    on_trade: &mut F,
    shutdown: &mut oneshot::Receiver<()>,
) -> SessionEnd
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
    F: FnMut(RawTradeEvent),
{
    let (mut write, read) = websocket.split();
    let mut read = TimeoutStream::new(read, config.read_timeout);

    for frame in subscription_frames(config) {
        if let Err(error) = write.send(Message::text(frame.to_json())).await {
            return SessionEnd::Abnormal(error.into());
        }
    }

    state.set_error(None);
    state.set_status(ConnectionStatus::Connected);

    // Heartbeat only ticks while connected, first ping one full interval after subscribe
    let mut heartbeat = tokio::time::interval_at(
        Instant::now() + config.heartbeat_interval,
        config.heartbeat_interval,
    );
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = &mut *shutdown => {
                let close = CloseFrame {
                    code: CloseCode::Normal,
                    reason: "client stop".into(),
                };
                if let Err(error) = write.send(Message::Close(Some(close))).await {
                    debug!(%error, "failed to send close frame");
                }
                return SessionEnd::Shutdown;
            }
            _ = heartbeat.tick() => {
                if let Err(error) = write.send(Message::text(ControlFrame::Ping.to_json())).await {
                    return SessionEnd::Abnormal(error.into());
                }
                debug!("heartbeat sent");
            }
            message = read.next() => match message {
                Some(Ok(Message::Text(text))) => handle_text(text.as_str(), state, on_trade),
                Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                    Ok(text) => handle_text(text, state, on_trade),
                    Err(error) => warn!(%error, len = bytes.len(), "skipping non UTF-8 binary frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    return match frame {
                        Some(frame) if frame.code == CloseCode::Normal => SessionEnd::ServerClosed,
                        frame => SessionEnd::Abnormal(FeedError::Socket(format!(
                            "connection closed by server: {frame:?}"
                        ))),
                    };
                }
                Some(Ok(_)) => {}
                Some(Err(error)) => return SessionEnd::Abnormal(error.into()),
                None if read.has_timed_out() => {
                    return SessionEnd::Abnormal(FeedError::ReadTimeout(config.read_timeout));
                }
                None => {
                    return SessionEnd::Abnormal(FeedError::Socket(
                        "stream ended without close frame".to_string(),
                    ));
                }
            }
        }
    }
}

/// One subscribe frame per configured coin, or a single unfiltered subscription.
fn subscription_frames(config: &ConnectorConfig) -> Vec<ControlFrame> {
    if config.coins.is_empty() {
        vec![ControlFrame::subscribe_trades(None)]
    } else {
        config
            .coins
            .iter()
            .cloned()
            .map(|coin| ControlFrame::subscribe_trades(Some(coin)))
            .collect()
    }
}

fn handle_text<F>(text: &str, state: &StateHandle, on_trade: &mut F)
where
    F: FnMut(RawTradeEvent),
{
    match InboundFrame::parse(text) {
        Ok(InboundFrame::Trades(trades)) => {
            for trade in trades {
                on_trade(trade);
            }
        }
        Ok(InboundFrame::SubscriptionAck) => debug!("subscription acknowledged"),
        Ok(InboundFrame::Pong) => debug!("heartbeat acknowledged"),
        Ok(InboundFrame::Error(message)) => {
            warn!(%message, "server rejected request");
            state.set_error(Some(FeedError::Socket(format!("server error: {message}")).to_string()));
        }
        Ok(InboundFrame::Ignored(channel)) => debug!(%channel, "ignoring frame"),
        Err(error) => warn!(%error, payload = excerpt(text), "skipping malformed frame"),
    }
}

fn excerpt(text: &str) -> &str {
    text.char_indices()
        .nth(LOG_PAYLOAD_CHARS)
        .map_or(text, |(end, _)| &text[..end])
}
