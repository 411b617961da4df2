//! Websocket relay client: connect/reconnect with backoff, framed send/recv.
//!
//! Grounded on `cdk-http-client`'s `ws::native` module for the
//! tokio-tungstenite split-sink/stream idiom; the reconnect/backoff and
//! NIP-01 frame shapes are new to this crate.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use futures::{SinkExt, StreamExt};
use rand::Rng;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::event::NostrEvent;

/// Minimum reconnect/resubscribe backoff.
const BACKOFF_MIN: Duration = Duration::from_secs(1);
/// Maximum reconnect/resubscribe backoff.
const BACKOFF_MAX: Duration = Duration::from_secs(120);

const SUB_ID_PREFIX: &str = "nwcd";

static SUB_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A fresh, process-unique subscription id: a fixed prefix, a monotonically
/// increasing counter, padded to 64 characters with alphanumeric noise.
pub fn next_sub_id() -> String {
    let n = SUB_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut id = format!("{SUB_ID_PREFIX}{n}");
    let mut rng = rand::rng();
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    while id.len() < 64 {
        id.push(ALPHABET[rng.random_range(0..ALPHABET.len())] as char);
    }
    id.truncate(64);
    id
}

/// A frame received from the relay.
#[derive(Debug, Clone)]
pub enum InboundFrame {
    /// `["EVENT", sub_id, event]`
    Event { sub_id: String, event: NostrEvent },
    /// `["EOSE", sub_id]`
    Eose { sub_id: String },
    /// `["CLOSED", sub_id, reason?]`; an empty reason means "closed without
    /// explanation".
    Closed { sub_id: String, reason: Option<String> },
    /// `["NOTICE", message]`
    Notice { message: String },
    /// `["OK", event_id, accepted, message]`
    Ok { event_id: String, accepted: bool, message: String },
}

/// A frame this client sends to the relay.
#[derive(Debug, Clone)]
pub enum OutboundFrame {
    /// `["REQ", sub_id, filter]`
    Req { sub_id: String, filter: Value },
    /// `["EVENT", event]`
    Event { event: NostrEvent },
    /// `["CLOSE", sub_id]`
    Close { sub_id: String },
}

impl OutboundFrame {
    fn to_message(&self) -> Result<Message, serde_json::Error> {
        let value = match self {
            OutboundFrame::Req { sub_id, filter } => {
                Value::Array(vec![Value::from("REQ"), Value::from(sub_id.as_str()), filter.clone()])
            }
            OutboundFrame::Event { event } => {
                Value::Array(vec![Value::from("EVENT"), serde_json::to_value(event)?])
            }
            OutboundFrame::Close { sub_id } => {
                Value::Array(vec![Value::from("CLOSE"), Value::from(sub_id.as_str())])
            }
        };
        Ok(Message::Text(value.to_string().into()))
    }
}

fn parse_inbound(text: &str) -> Option<InboundFrame> {
    let value: Value = serde_json::from_str(text).ok()?;
    let arr = value.as_array()?;
    let tag = arr.first()?.as_str()?;
    match tag {
        "EVENT" if arr.len() >= 3 => {
            let sub_id = arr[1].as_str()?.to_string();
            let event = serde_json::from_value(arr[2].clone()).ok()?;
            Some(InboundFrame::Event { sub_id, event })
        }
        "EOSE" if arr.len() >= 2 => Some(InboundFrame::Eose {
            sub_id: arr[1].as_str()?.to_string(),
        }),
        "CLOSED" if arr.len() >= 2 => Some(InboundFrame::Closed {
            sub_id: arr[1].as_str()?.to_string(),
            reason: arr.get(2).and_then(|v| v.as_str()).filter(|s| !s.is_empty()).map(str::to_string),
        }),
        "NOTICE" if arr.len() >= 2 => Some(InboundFrame::Notice {
            message: arr[1].as_str()?.to_string(),
        }),
        "OK" if arr.len() >= 3 => Some(InboundFrame::Ok {
            event_id: arr[1].as_str()?.to_string(),
            accepted: arr[2].as_bool().unwrap_or(false),
            message: arr.get(3).and_then(|v| v.as_str()).unwrap_or_default().to_string(),
        }),
        other => {
            debug!(frame_type = other, "discarding unknown relay frame type");
            None
        }
    }
}

/// Per-action exponential backoff, doubling from [`BACKOFF_MIN`] up to
/// [`BACKOFF_MAX`], reset whenever the previous attempt lasted longer than
/// [`BACKOFF_MAX`]. Used for the connect loop below and, by
/// [`crate::service`], for resubscribe-after-`CLOSED` throttling — each is
/// its own action unit with its own instance.
pub(crate) struct Backoff {
    current: Duration,
}

impl Backoff {
    pub(crate) fn new() -> Self {
        Self { current: Duration::ZERO }
    }

    pub(crate) async fn wait(&mut self) {
        self.current = if self.current.is_zero() {
            BACKOFF_MIN
        } else {
            (self.current * 2).min(BACKOFF_MAX)
        };
        tokio::time::sleep(self.current).await;
    }

    pub(crate) fn observe_attempt_duration(&mut self, elapsed: Duration) {
        if elapsed > BACKOFF_MAX {
            self.current = Duration::ZERO;
        }
    }
}

/// The live connection's reported lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No live connection.
    Disconnected,
    /// A connection attempt is in flight.
    Connecting,
    /// Connected; frames flow.
    Connected,
}

/// A handle to a running relay client task.
#[derive(Clone)]
pub struct RelayClient {
    outbound: mpsc::Sender<OutboundFrame>,
    state: watch::Receiver<ConnectionState>,
}

impl RelayClient {
    /// Spawn the connection task for `url`. Returns a handle and the inbound
    /// frame stream; the caller drives dispatch from the latter.
    pub fn spawn(url: url::Url, shutdown: CancellationToken) -> (Self, mpsc::Receiver<InboundFrame>) {
        let (outbound_tx, outbound_rx) = mpsc::channel(256);
        let (inbound_tx, inbound_rx) = mpsc::channel(256);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

        tokio::spawn(run(url, outbound_rx, inbound_tx, state_tx, shutdown));

        (
            Self {
                outbound: outbound_tx,
                state: state_rx,
            },
            inbound_rx,
        )
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Send a frame once connected. Blocks until the client is connected and
    /// the channel accepts the frame; fails cleanly if the client has shut
    /// down.
    pub async fn send(&self, frame: OutboundFrame) -> Result<(), crate::error::Error> {
        self.outbound
            .send(frame)
            .await
            .map_err(|_| crate::error::Error::ShuttingDown)
    }
}

async fn run(
    url: url::Url,
    mut outbound_rx: mpsc::Receiver<OutboundFrame>,
    inbound_tx: mpsc::Sender<InboundFrame>,
    state_tx: watch::Sender<ConnectionState>,
    shutdown: CancellationToken,
) {
    let mut backoff = Backoff::new();

    'reconnect: loop {
        if shutdown.is_cancelled() {
            return;
        }
        let _ = state_tx.send(ConnectionState::Connecting);

        let request = match url.as_str().into_client_request() {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "invalid relay url");
                return;
            }
        };

        let attempt_start = Instant::now();
        let stream = tokio::select! {
            result = tokio_tungstenite::connect_async(request) => result,
            _ = shutdown.cancelled() => return,
        };

        let ws_stream = match stream {
            Ok((stream, _)) => stream,
            Err(e) => {
                warn!(error = %e, "relay connect failed, backing off");
                let _ = state_tx.send(ConnectionState::Disconnected);
                backoff.observe_attempt_duration(attempt_start.elapsed());
                backoff.wait().await;
                continue 'reconnect;
            }
        };

        info!(%url, "connected to relay");
        let _ = state_tx.send(ConnectionState::Connected);
        let (mut write, mut read) = ws_stream.split();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    return;
                }
                outbound = outbound_rx.recv() => {
                    let Some(frame) = outbound else { return };
                    match frame.to_message() {
                        Ok(message) => {
                            if let Err(e) = write.send(message).await {
                                warn!(error = %e, "relay send failed");
                                break;
                            }
                        }
                        Err(e) => warn!(error = %e, "failed to serialize outbound frame"),
                    }
                }
                incoming = read.next() => {
                    match incoming {
                        Some(Ok(Message::Text(text))) => {
                            if let Some(frame) = parse_inbound(&text) {
                                if inbound_tx.send(frame).await.is_err() {
                                    return;
                                }
                            } else {
                                debug!("discarding unparseable relay frame");
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            info!("relay closed connection");
                            break;
                        }
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => {
                            warn!(error = %e, "relay read error");
                            break;
                        }
                    }
                }
            }
        }

        let _ = state_tx.send(ConnectionState::Disconnected);
        backoff.observe_attempt_duration(attempt_start.elapsed());
        backoff.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sub_ids_are_unique_and_64_chars() {
        let a = next_sub_id();
        let b = next_sub_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.starts_with(SUB_ID_PREFIX));
    }

    #[test]
    fn parses_eose_and_closed_frames() {
        let eose = parse_inbound(r#"["EOSE", "sub1"]"#).unwrap();
        assert!(matches!(eose, InboundFrame::Eose { sub_id } if sub_id == "sub1"));

        let closed = parse_inbound(r#"["CLOSED", "sub1", ""]"#).unwrap();
        assert!(matches!(closed, InboundFrame::Closed { reason: None, .. }));

        let closed_with_reason = parse_inbound(r#"["CLOSED", "sub1", "rate-limited"]"#).unwrap();
        assert!(matches!(
            closed_with_reason,
            InboundFrame::Closed { reason: Some(r), .. } if r == "rate-limited"
        ));
    }

    #[test]
    fn unknown_frame_type_is_discarded() {
        assert!(parse_inbound(r#"["AUTH", "challenge"]"#).is_none());
    }
}
