// Live service status over the appliance's socket.io push channel.

use super::model::{StatusBatch, StatusDescriptor};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{Connector, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

pub const STATUS_EVENT: &str = "services:get_services";

/// Engine.io's default until the handshake says otherwise.
const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(25);

type Socket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

#[derive(Debug, thiserror::Error)]
pub enum PushError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("tls setup failed: {0}")]
    Tls(#[from] native_tls::Error),

    #[error("connect timed out after {0:?}")]
    Timeout(Duration),

    #[error("malformed frame: {0}")]
    Frame(String),

    #[error("malformed payload: {0}")]
    Payload(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct PushConfig {
    pub url: String,
    pub namespace: String,
    pub connect_timeout: Duration,
    pub insecure_tls: bool,
}

/// A decoded socket.io text frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Open { ping_interval: Option<Duration> },
    Ping,
    Pong,
    Connected { namespace: String },
    Event {
        namespace: String,
        name: String,
        payload: Value,
    },
    Other,
}

impl Frame {
    /// The status batch carried by this frame, if it is one for `namespace`.
    pub fn into_status_batch(self, namespace: &str) -> Result<Option<StatusBatch>, PushError> {
        match self {
            Frame::Event {
                namespace: ns,
                name,
                payload,
            } if ns == namespace && name == STATUS_EVENT => decode_batch(payload).map(Some),
            _ => Ok(None),
        }
    }
}

/// Decodes an engine.io v3 / socket.io v2 text frame.
pub fn decode_frame(text: &str) -> Result<Frame, PushError> {
    let mut chars = text.chars();
    match chars.next() {
        Some('0') => Ok(decode_open(chars.as_str())),
        Some('2') => Ok(Frame::Ping),
        Some('3') => Ok(Frame::Pong),
        Some('4') => decode_packet(chars.as_str()),
        Some(_) => Ok(Frame::Other),
        None => Err(PushError::Frame("empty frame".into())),
    }
}

/// Decodes entry by entry; an unreadable entry is skipped like an unknown name.
fn decode_batch(payload: Value) -> Result<StatusBatch, PushError> {
    let Value::Object(entries) = payload else {
        return Err(PushError::Frame(format!("status payload {}", payload)));
    };

    let mut batch = StatusBatch::with_capacity(entries.len());
    for (name, entry) in entries {
        match serde_json::from_value::<StatusDescriptor>(entry) {
            Ok(descriptor) => {
                batch.insert(name, descriptor);
            }
            Err(e) => tracing::debug!(service = %name, error = %e, "skipping status entry"),
        }
    }
    Ok(batch)
}

fn decode_open(handshake: &str) -> Frame {
    let ping_interval = serde_json::from_str::<Value>(handshake)
        .ok()
        .and_then(|v| v.get("pingInterval").and_then(Value::as_u64))
        .filter(|&ms| ms > 0)
        .map(Duration::from_millis);
    Frame::Open { ping_interval }
}

fn decode_packet(packet: &str) -> Result<Frame, PushError> {
    let mut chars = packet.chars();
    let kind = chars.next();
    let rest = chars.as_str();

    let (namespace, rest) = match rest.strip_prefix('/') {
        Some(_) => match rest.split_once(',') {
            Some((ns, body)) => (ns, body),
            None => (rest, ""),
        },
        None => ("/", rest),
    };

    match kind {
        Some('0') => Ok(Frame::Connected {
            namespace: namespace.to_string(),
        }),
        Some('2') => {
            // Optional ack id before the JSON array.
            let body = rest.trim_start_matches(|c: char| c.is_ascii_digit());
            let mut args: Vec<Value> = serde_json::from_str(body)?;
            if args.is_empty() {
                return Err(PushError::Frame("event without a name".into()));
            }
            let name = match args.remove(0) {
                Value::String(name) => name,
                other => return Err(PushError::Frame(format!("event name {}", other))),
            };
            let payload = if args.is_empty() {
                Value::Null
            } else {
                args.remove(0)
            };
            Ok(Frame::Event {
                namespace: namespace.to_string(),
                name,
                payload,
            })
        }
        _ => Ok(Frame::Other),
    }
}

/// Owned handle to a live status subscription.
pub struct Subscription {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Stops the feed and waits for the socket to close.
    pub async fn close(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "push task ended abnormally");
            }
        }
        tracing::info!("push subscription closed");
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Starts the push feed in the background and forwards status batches to `tx`.
///
/// Returns at once; connecting happens inside the task so the caller's event
/// loop is never blocked by an unreachable appliance. `tx` is dropped when the
/// feed ends.
pub fn subscribe(config: &PushConfig, tx: mpsc::Sender<StatusBatch>) -> Subscription {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let config = config.clone();

    let task = tokio::spawn(async move {
        let socket = tokio::select! {
            () = token.cancelled() => return,
            socket = connect(&config) => socket,
        };
        match socket {
            Ok(socket) => stream_statuses(socket, &config.namespace, tx, token).await,
            Err(e) => tracing::warn!(error = %e, "live status unavailable"),
        }
    });

    Subscription {
        cancel,
        task: Some(task),
    }
}

async fn connect(config: &PushConfig) -> Result<Socket, PushError> {
    tracing::info!(url = %config.url, namespace = %config.namespace, "connecting push channel");

    let connector = if config.insecure_tls {
        let tls = native_tls::TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .build()?;
        Some(Connector::NativeTls(tls))
    } else {
        None
    };

    let handshake =
        tokio_tungstenite::connect_async_tls_with_config(config.url.as_str(), None, false, connector);
    let (mut socket, _response) = tokio::time::timeout(config.connect_timeout, handshake)
        .await
        .map_err(|_| PushError::Timeout(config.connect_timeout))??;

    if config.namespace != "/" {
        socket.send(text(&format!("40{},", config.namespace))).await?;
    }
    Ok(socket)
}

fn ping_timer(period: Duration) -> Interval {
    let mut timer = tokio::time::interval_at(Instant::now() + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    timer
}

fn text(body: &str) -> Message {
    Message::Text(body.to_string().into())
}

/// Engine.io v3: the client pings every `pingInterval`, the server answers.
async fn stream_statuses(
    socket: Socket,
    namespace: &str,
    tx: mpsc::Sender<StatusBatch>,
    token: CancellationToken,
) {
    let (mut write, mut read) = socket.split();
    let mut ping = ping_timer(DEFAULT_PING_INTERVAL);

    loop {
        let message = tokio::select! {
            () = token.cancelled() => {
                let _ = write.send(Message::Close(None)).await;
                break;
            }
            _ = ping.tick() => {
                if let Err(e) = write.send(text("2")).await {
                    tracing::warn!(error = %e, "failed to send ping");
                    break;
                }
                continue;
            }
            message = read.next() => message,
        };

        let body = match message {
            Some(Ok(Message::Text(body))) => body,
            Some(Ok(Message::Close(_))) | None => {
                tracing::warn!("push channel closed by server");
                break;
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                tracing::warn!(error = %e, "push channel error");
                break;
            }
        };

        let frame = match decode_frame(body.as_str()) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!(error = %e, "skipping push frame");
                continue;
            }
        };

        match frame {
            Frame::Open {
                ping_interval: Some(period),
            } => {
                tracing::debug!(ping_ms = period.as_millis(), "push handshake");
                ping = ping_timer(period);
            }
            // Engine.io v4 servers ping instead.
            Frame::Ping => {
                if let Err(e) = write.send(text("3")).await {
                    tracing::warn!(error = %e, "failed to answer ping");
                    break;
                }
            }
            frame => match frame.into_status_batch(namespace) {
                Ok(Some(batch)) => {
                    if tx.send(batch).await.is_err() {
                        break;
                    }
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(error = %e, "skipping status payload"),
            },
        }
    }
}
