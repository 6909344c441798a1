//! Duplex stream session: connect, authenticate, subscribe, dispatch.
//!
//! One reader task drains the socket; one writer task serializes everything
//! sent (subscribe/unsubscribe frames, pings) through a single `mpsc` channel —
//! exactly one reader, with writes serialized through a single sender. Parsed
//! events fan out over a bounded [`tokio::sync::broadcast`] channel; a
//! subscriber that falls behind observes [`broadcast::error::RecvError::Lagged`]
//! rather than stalling the reader.

use crate::error::{AdapterError, ErrorKind};
use chrono::Utc;
use futures::future::BoxFuture;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use hmac::{Hmac, Mac};
use indexmap::IndexMap;
use sha2::Sha256;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Mutex};
use tracing::{debug, info, warn};
use xchange_integration::protocol::websocket::{self, WebSocket, WsMessage};
use xchange_integration::reconnect::{
    Connect, ReconnectConfig, ReconnectController, ReconnectEvent, ReplaySubscriptions,
};
use xchange_integration::SocketError;
use xchange_schema::{StreamEvent, Subscription};

/// Liveness tuning: ping every 30s, force-close after 60s idle.
pub const PING_INTERVAL: Duration = Duration::from_secs(30);
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(60);
/// Auth handshake expiry horizon: long enough it cannot expire mid-handshake.
pub const AUTH_EXPIRY_HORIZON: Duration = Duration::from_secs(5 * 60);

/// Bound on the fan-out event channel. A subscriber lagging behind this many
/// events is bumped to `Lagged` rather than blocking the reader.
const EVENT_BUFFER: usize = 1024;

/// Outcome of parsing one raw frame.
pub enum ParsedFrame {
    /// A normalized domain event to fan out to subscribers.
    Event(StreamEvent),
    /// Several normalized events from one frame (e.g. an account-update frame
    /// carrying both balance and position deltas).
    Events(Vec<StreamEvent>),
    /// The venue confirmed a subscription request.
    SubscribeAck(Subscription),
    /// Heartbeat ack / connection notice — consumed silently.
    Ignored,
}

/// Per-venue encoding/decoding hooks the session calls into. Adapters
/// implement this to describe their wire format; the session owns the
/// transport mechanics (connect, ping, idle detection, replay bookkeeping).
pub trait SessionAdapter: Send + Sync + 'static {
    fn encode_subscribe(&self, sub: &Subscription) -> String;
    fn encode_unsubscribe(&self, sub: &Subscription) -> String;
    fn encode_auth(&self, api_key: &str, secret: &str, expiry_ms: i64) -> String;
    fn parse(&self, raw: &str) -> Result<ParsedFrame, AdapterError>;
}

/// Stream session configuration.
#[derive(Debug, Clone)]
pub struct StreamSessionConfig {
    pub url: String,
    pub is_private: bool,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
}

enum WriterCommand {
    Text(String),
    Ping,
    Close,
}

type SplitSocket = (SplitSink<WebSocket, WsMessage>, SplitStream<WebSocket>);

/// A connected stream session. Clone-cheap: every clone shares the same
/// writer slot, subscription table, and event bus.
///
/// `writer_tx` sits behind a plain (non-async) mutex rather than the
/// tokio one used elsewhere in this module: the reconnect loop swaps in a
/// fresh sender after every reconnect, and [`close`](Self::close) needs to
/// reach it from a sync context.
#[derive(Clone)]
pub struct StreamSessionHandle {
    writer_tx: Arc<std::sync::Mutex<mpsc::UnboundedSender<WriterCommand>>>,
    event_tx: broadcast::Sender<StreamEvent>,
    subscriptions: Arc<Mutex<IndexMap<String, Subscription>>>,
    closing: Arc<std::sync::atomic::AtomicBool>,
}

impl std::fmt::Debug for StreamSessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSessionHandle").finish_non_exhaustive()
    }
}

/// Drives the connect → (authenticate) → reader/writer/ping loop for one
/// session. Returned by [`StreamSession::connect`].
pub struct StreamSession;

impl StreamSession {
    /// Connects, authenticates (if `cfg.is_private`), and spawns the reader,
    /// writer, and ping/idle-detection tasks. Returns a handle usable from any
    /// task; the session runs until [`StreamSessionHandle::close`] is called,
    /// reconnecting on its own (re-authenticating and replaying every active
    /// subscription) whenever the socket drops or goes idle.
    pub async fn connect(
        cfg: StreamSessionConfig,
        adapter: Arc<dyn SessionAdapter>,
    ) -> Result<StreamSessionHandle, AdapterError> {
        let (sink, stream) = connect_and_auth(&cfg, adapter.as_ref())
            .await
            .map_err(AdapterError::from)?;

        let (writer_tx, writer_rx) = mpsc::unbounded_channel();
        let writer_tx = Arc::new(std::sync::Mutex::new(writer_tx));
        let (event_tx, _rx) = broadcast::channel(EVENT_BUFFER);
        let subscriptions = Arc::new(Mutex::new(IndexMap::new()));
        let closing = Arc::new(std::sync::atomic::AtomicBool::new(false));

        spawn_writer(sink, writer_rx);
        spawn_pinger(writer_tx.clone(), closing.clone());
        spawn_reader(
            stream,
            cfg.clone(),
            adapter,
            event_tx.clone(),
            subscriptions.clone(),
            writer_tx.clone(),
            closing.clone(),
        );

        info!(private = cfg.is_private, "stream session connected");
        let _ = event_tx.send(StreamEvent::Connected);

        Ok(StreamSessionHandle {
            writer_tx,
            event_tx,
            subscriptions,
            closing,
        })
    }
}

/// Connects the socket and, for a private session, sends the auth frame
/// before handing back the split sink/stream — shared by the initial
/// connect and every reconnect attempt.
async fn connect_and_auth(
    cfg: &StreamSessionConfig,
    adapter: &dyn SessionAdapter,
) -> Result<SplitSocket, SocketError> {
    let socket = websocket::connect(&cfg.url).await?;
    let (mut sink, stream) = socket.split();

    if cfg.is_private {
        let api_key = cfg
            .api_key
            .as_deref()
            .ok_or_else(|| SocketError::ConnectFailed("missing api_key for private session".into()))?;
        let secret = cfg
            .api_secret
            .as_deref()
            .ok_or_else(|| SocketError::ConnectFailed("missing api_secret for private session".into()))?;
        let expiry_ms = Utc::now().timestamp_millis() + AUTH_EXPIRY_HORIZON.as_millis() as i64;
        let auth_frame = adapter.encode_auth(api_key, secret, expiry_ms);
        sink.send(WsMessage::Text(auth_frame.into()))
            .await
            .map_err(|e| SocketError::SendFailed(e.to_string()))?;
    }

    Ok((sink, stream))
}

/// [`Connect`] impl driving reconnects: re-runs the same connect-and-auth
/// handshake used for the initial connection.
struct SessionConnector {
    cfg: StreamSessionConfig,
    adapter: Arc<dyn SessionAdapter>,
}

impl Connect<SplitSocket> for SessionConnector {
    fn connect<'a>(&'a self) -> BoxFuture<'a, Result<SplitSocket, SocketError>> {
        Box::pin(connect_and_auth(&self.cfg, self.adapter.as_ref()))
    }
}

/// [`ReplaySubscriptions`] impl: re-sends every currently active subscription
/// directly over the freshly connected sink, exactly once, before the
/// reconnected session is handed back to the reader loop.
struct SessionReplay {
    adapter: Arc<dyn SessionAdapter>,
    subscriptions: Arc<Mutex<IndexMap<String, Subscription>>>,
}

impl ReplaySubscriptions<SplitSocket> for SessionReplay {
    fn replay<'a>(&'a self, session: &'a mut SplitSocket) -> BoxFuture<'a, Result<(), SocketError>> {
        Box::pin(async move {
            let (sink, _stream) = session;
            let subs: Vec<Subscription> = self.subscriptions.lock().await.values().cloned().collect();
            for sub in subs {
                let frame = self.adapter.encode_subscribe(&sub);
                sink.send(WsMessage::Text(frame.into()))
                    .await
                    .map_err(|e| SocketError::SendFailed(e.to_string()))?;
            }
            Ok(())
        })
    }
}

impl StreamSessionHandle {
    fn send_writer_command(&self, cmd: WriterCommand) -> Result<(), AdapterError> {
        self.writer_tx
            .lock()
            .expect("writer slot mutex poisoned")
            .send(cmd)
            .map_err(|_| AdapterError::new(ErrorKind::WebsocketError, "writer closed"))
    }

    /// Requests a subscription. The venue's ack arrives asynchronously via the
    /// event stream (`StreamEvent::Subscribed`); on ack the session records the
    /// subscription by its uniqueness key so a reconnect can replay it.
    pub async fn subscribe(&self, sub: Subscription, adapter: &dyn SessionAdapter) -> Result<(), AdapterError> {
        let frame = adapter.encode_subscribe(&sub);
        self.send_writer_command(WriterCommand::Text(frame))
    }

    pub async fn unsubscribe(&self, sub: &Subscription, adapter: &dyn SessionAdapter) -> Result<(), AdapterError> {
        let frame = adapter.encode_unsubscribe(sub);
        self.subscriptions.lock().await.shift_remove(&sub.unique_key());
        self.send_writer_command(WriterCommand::Text(frame))
    }

    /// A new receiver on the fan-out event bus. Each receiver gets its own
    /// bounded lag window (`EVENT_BUFFER`); falling behind that many events
    /// yields `Lagged` rather than stalling the reader.
    pub fn events(&self) -> broadcast::Receiver<StreamEvent> {
        self.event_tx.subscribe()
    }

    /// Every subscription successfully acknowledged so far, in ack order.
    pub async fn active_subscriptions(&self) -> Vec<Subscription> {
        self.subscriptions.lock().await.values().cloned().collect()
    }

    /// Closes the session for good: cancels the reader, writer, and pending
    /// pings, and suppresses the automatic reconnect that would otherwise
    /// follow the resulting disconnect.
    pub fn close(&self) {
        self.closing.store(true, std::sync::atomic::Ordering::SeqCst);
        let _ = self.send_writer_command(WriterCommand::Close);
    }
}

fn spawn_writer(
    mut sink: SplitSink<WebSocket, WsMessage>,
    mut rx: mpsc::UnboundedReceiver<WriterCommand>,
) {
    tokio::spawn(async move {
        while let Some(cmd) = rx.recv().await {
            let result = match cmd {
                WriterCommand::Text(text) => sink.send(WsMessage::Text(text.into())).await,
                WriterCommand::Ping => sink.send(WsMessage::Ping(Vec::new().into())).await,
                WriterCommand::Close => {
                    let _ = sink.send(WsMessage::Close(None)).await;
                    break;
                }
            };
            if let Err(e) = result {
                warn!(error = %e, "stream session writer failed, stopping");
                break;
            }
        }
    });
}

fn spawn_pinger(
    writer_tx: Arc<std::sync::Mutex<mpsc::UnboundedSender<WriterCommand>>>,
    closing: Arc<std::sync::atomic::AtomicBool>,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PING_INTERVAL);
        loop {
            ticker.tick().await;
            if closing.load(std::sync::atomic::Ordering::SeqCst) {
                break;
            }
            // The sender may momentarily point at an old, already-closed
            // writer mid-reconnect; a dropped ping there is harmless, the
            // next tick picks up whichever sender is current.
            let sender = writer_tx.lock().expect("writer slot mutex poisoned").clone();
            let _ = sender.send(WriterCommand::Ping);
        }
    });
}

/// Drains frames off `stream` until the socket errs, is closed by the peer,
/// or goes idle past [`IDLE_TIMEOUT`]. On any of those, unless the session
/// was closed deliberately, drives a [`ReconnectController`] that
/// reconnects, re-authenticates, and replays every active subscription
/// before the loop resumes reading from the new socket.
#[allow(clippy::too_many_arguments)]
fn spawn_reader(
    mut stream: SplitStream<WebSocket>,
    cfg: StreamSessionConfig,
    adapter: Arc<dyn SessionAdapter>,
    event_tx: broadcast::Sender<StreamEvent>,
    subscriptions: Arc<Mutex<IndexMap<String, Subscription>>>,
    writer_tx: Arc<std::sync::Mutex<mpsc::UnboundedSender<WriterCommand>>>,
    closing: Arc<std::sync::atomic::AtomicBool>,
) {
    tokio::spawn(async move {
        'session: loop {
            loop {
                let frame = match tokio::time::timeout(IDLE_TIMEOUT, stream.next()).await {
                    Ok(Some(Ok(frame))) => frame,
                    Ok(Some(Err(e))) => {
                        warn!(error = %e, "stream session read error");
                        break;
                    }
                    Ok(None) => {
                        debug!("stream session closed by peer");
                        break;
                    }
                    Err(_elapsed) => {
                        warn!("stream session idle for {IDLE_TIMEOUT:?}, forcing close");
                        let sender = writer_tx.lock().expect("writer slot mutex poisoned").clone();
                        let _ = sender.send(WriterCommand::Close);
                        break;
                    }
                };

                let WsMessage::Text(text) = frame else {
                    continue;
                };

                match adapter.parse(text.as_str()) {
                    Ok(ParsedFrame::Event(event)) => {
                        let _ = event_tx.send(event);
                    }
                    Ok(ParsedFrame::Events(events)) => {
                        for event in events {
                            let _ = event_tx.send(event);
                        }
                    }
                    Ok(ParsedFrame::SubscribeAck(sub)) => {
                        subscriptions
                            .lock()
                            .await
                            .insert(sub.unique_key(), sub.clone());
                        let _ = event_tx.send(StreamEvent::Subscribed(sub));
                    }
                    Ok(ParsedFrame::Ignored) => {}
                    Err(err) => {
                        warn!(error = %err, "failed to parse frame, surfacing via error event without terminating session");
                        let _ = event_tx.send(StreamEvent::Error {
                            message: err.to_string(),
                        });
                    }
                }
            }

            let _ = event_tx.send(StreamEvent::Disconnected);

            if closing.load(std::sync::atomic::Ordering::SeqCst) {
                break 'session;
            }

            let controller = ReconnectController::new(
                ReconnectConfig::default(),
                SessionConnector {
                    cfg: cfg.clone(),
                    adapter: adapter.clone(),
                },
                SessionReplay {
                    adapter: adapter.clone(),
                    subscriptions: subscriptions.clone(),
                },
            );
            let reconnected = controller
                .run(|event| match event {
                    ReconnectEvent::Reconnecting { attempt } => {
                        warn!(attempt, "stream session reconnecting")
                    }
                    ReconnectEvent::Reconnected => info!("stream session reconnected"),
                    ReconnectEvent::Terminal => {
                        warn!("stream session reconnect attempts exhausted, giving up")
                    }
                })
                .await;

            match reconnected {
                Ok((sink, new_stream)) => {
                    let (new_writer_tx, writer_rx) = mpsc::unbounded_channel();
                    spawn_writer(sink, writer_rx);
                    *writer_tx.lock().expect("writer slot mutex poisoned") = new_writer_tx;
                    stream = new_stream;
                    let _ = event_tx.send(StreamEvent::Connected);
                }
                Err(_) => {
                    closing.store(true, std::sync::atomic::Ordering::SeqCst);
                    break 'session;
                }
            }
        }
    });
}

/// HMAC-SHA256 signature over `payload`, used by every venue's auth
/// handshake and order-signing seam.
pub fn hmac_sha256_hex(secret: &str, payload: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(payload.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}
