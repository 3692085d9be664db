use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};
use uuid::Uuid;

use opgate_protocol::{
    events, methods, unix_ms, AuthParams, ClientInfo, ConnectParams, Frame, HelloOk,
    CLOSE_CODE_ORIGIN_REJECTED, HELLO_OK_KIND,
};

use crate::error::ClientError;
use crate::state::ConnectionState;

const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_millis(1500);

/// Server-pushed event as delivered to subscribers.
#[derive(Debug, Clone)]
pub struct GatewayEvent {
    pub event: String,
    pub payload: Option<Value>,
    pub seq: Option<u64>,
    pub state_version: Option<u64>,
}

/// Options for one connect attempt.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub token: Option<String>,
    pub password: Option<String>,
    /// Origin header to present; omitted entirely when `None`.
    pub origin: Option<String>,
    /// How long to wait for the server's challenge before sending the
    /// connect request anyway.
    pub handshake_timeout: Duration,
    pub client: ClientInfo,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            token: None,
            password: None,
            origin: None,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            client: ClientInfo {
                id: "opgate-client".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                platform: std::env::consts::OS.to_string(),
                mode: "operator".to_string(),
            },
        }
    }
}

type PendingMap = HashMap<String, oneshot::Sender<Result<Value, ClientError>>>;
type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct ConnHandle {
    writer: mpsc::UnboundedSender<WsMessage>,
    read_task: JoinHandle<()>,
    write_task: JoinHandle<()>,
}

struct Shared {
    state: Mutex<ConnectionState>,
    state_tx: broadcast::Sender<ConnectionState>,
    event_tx: broadcast::Sender<GatewayEvent>,
    chat_tx: broadcast::Sender<GatewayEvent>,
    pending: Mutex<PendingMap>,
    conn: Mutex<Option<ConnHandle>>,
}

/// Handle to one gateway connection. Cheap to clone; all clones share
/// the same connection, correlator, and subscriber channels.
#[derive(Clone)]
pub struct GatewayClient {
    shared: Arc<Shared>,
}

impl Default for GatewayClient {
    fn default() -> Self {
        Self::new()
    }
}

impl GatewayClient {
    pub fn new() -> Self {
        let (state_tx, _) = broadcast::channel(64);
        let (event_tx, _) = broadcast::channel(256);
        let (chat_tx, _) = broadcast::channel(256);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(ConnectionState::Disconnected { reason: None }),
                state_tx,
                event_tx,
                chat_tx,
                pending: Mutex::new(PendingMap::new()),
                conn: Mutex::new(None),
            }),
        }
    }

    pub async fn state(&self) -> ConnectionState {
        self.shared.state.lock().await.clone()
    }

    /// State transitions, in order. Subscribe before calling
    /// [`connect`](Self::connect) to observe the whole handshake.
    pub fn subscribe_state(&self) -> broadcast::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    /// All server-pushed events.
    pub fn subscribe_events(&self) -> broadcast::Receiver<GatewayEvent> {
        self.shared.event_tx.subscribe()
    }

    /// Only events in the `chat.` namespace.
    pub fn subscribe_chat(&self) -> broadcast::Receiver<GatewayEvent> {
        self.shared.chat_tx.subscribe()
    }

    /// Dial the gateway and run the handshake: wait for the server's
    /// `connect.challenge` (or the deadline), then issue exactly one
    /// `connect` request and validate the hello payload.
    pub async fn connect(
        &self,
        url: &str,
        options: ConnectOptions,
    ) -> Result<HelloOk, ClientError> {
        self.disconnect().await;
        set_state(&self.shared, ConnectionState::Connecting).await;

        let mut request = normalize_url(url)
            .into_client_request()
            .map_err(|err| ClientError::Transport(err.to_string()))?;
        if let Some(origin) = &options.origin {
            let value = HeaderValue::from_str(origin)
                .map_err(|err| ClientError::Transport(format!("invalid origin: {err}")))?;
            request.headers_mut().insert("Origin", value);
        }

        let (stream, _) = match connect_async(request).await {
            Ok(ok) => ok,
            Err(err) => {
                let error = err.to_string();
                self.fail(error.clone()).await;
                return Err(ClientError::Transport(error));
            }
        };
        let (mut sink, stream) = stream.split();

        let (writer, mut write_rx) = mpsc::unbounded_channel::<WsMessage>();
        let write_task = tokio::spawn(async move {
            while let Some(message) = write_rx.recv().await {
                if sink.send(message).await.is_err() {
                    break;
                }
            }
        });

        let challenge = Arc::new(Notify::new());
        let read_task = tokio::spawn(read_loop(self.shared.clone(), stream, challenge.clone()));

        *self.shared.conn.lock().await = Some(ConnHandle {
            writer,
            read_task,
            write_task,
        });

        // Notify keeps a permit, so a challenge that raced ahead of
        // this select is not lost.
        tokio::select! {
            _ = challenge.notified() => {}
            _ = tokio::time::sleep(options.handshake_timeout) => {
                debug!("no challenge before deadline, sending connect anyway");
            }
        }

        let auth = if options.token.is_some() || options.password.is_some() {
            Some(AuthParams {
                token: options.token.clone(),
                password: options.password.clone(),
            })
        } else {
            None
        };
        let params = ConnectParams {
            client: options.client.clone(),
            auth,
            ..ConnectParams::default()
        };
        let params = serde_json::to_value(params)
            .map_err(|err| ClientError::Handshake(err.to_string()))?;

        let payload = match self.request(methods::CONNECT, Some(params)).await {
            Ok(payload) => payload,
            Err(err) => {
                self.fail(err.to_string()).await;
                self.teardown().await;
                return Err(err);
            }
        };
        let hello: HelloOk = match serde_json::from_value(payload) {
            Ok(hello) => hello,
            Err(err) => {
                let error = format!("unexpected connect payload: {err}");
                self.fail(error.clone()).await;
                self.teardown().await;
                return Err(ClientError::Handshake(error));
            }
        };
        if hello.kind != HELLO_OK_KIND {
            let error = format!("unexpected connect payload type: {}", hello.kind);
            self.fail(error.clone()).await;
            self.teardown().await;
            return Err(ClientError::Handshake(error));
        }

        set_state(&self.shared, ConnectionState::Connected).await;
        Ok(hello)
    }

    /// Send one request and wait for its response. Responses are
    /// matched by id, so callers may overlap requests freely.
    pub async fn request(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<Value, ClientError> {
        {
            let state = self.shared.state.lock().await;
            if matches!(
                *state,
                ConnectionState::Disconnected { .. } | ConnectionState::Failed { .. }
            ) {
                return Err(ClientError::NotConnected);
            }
        }
        let writer = {
            let conn = self.shared.conn.lock().await;
            match conn.as_ref() {
                Some(handle) => handle.writer.clone(),
                None => return Err(ClientError::NotConnected),
            }
        };

        let id = mint_request_id();
        let (tx, rx) = oneshot::channel();
        // Registered before the frame leaves, so a fast response
        // always finds its slot.
        self.shared.pending.lock().await.insert(id.clone(), tx);

        let frame = Frame::request(id.clone(), method, params);
        let text = match frame.encode() {
            Ok(text) => text,
            Err(err) => {
                self.shared.pending.lock().await.remove(&id);
                return Err(ClientError::Transport(err.to_string()));
            }
        };
        if writer.send(WsMessage::text(text)).is_err() {
            self.shared.pending.lock().await.remove(&id);
            return Err(ClientError::ConnectionClosed);
        }

        rx.await.map_err(|_| ClientError::ConnectionClosed)?
    }

    /// Drop the connection, rejecting every in-flight request. A no-op
    /// when already disconnected.
    pub async fn disconnect(&self) {
        if self.teardown().await {
            fail_pending(&self.shared, ClientError::ConnectionClosed).await;
            set_state(&self.shared, ConnectionState::Disconnected { reason: None }).await;
        }
    }

    async fn teardown(&self) -> bool {
        let handle = self.shared.conn.lock().await.take();
        match handle {
            Some(handle) => {
                handle.read_task.abort();
                handle.write_task.abort();
                true
            }
            None => false,
        }
    }

    async fn fail(&self, error: String) {
        fail_state(&self.shared, error).await;
    }
}

async fn read_loop(shared: Arc<Shared>, mut stream: SplitStream<WsStream>, challenge: Arc<Notify>) {
    let mut refusal = None;
    let mut fault = None;
    while let Some(message) = stream.next().await {
        match message {
            Ok(WsMessage::Text(text)) => handle_frame(&shared, &challenge, text.as_str()).await,
            Ok(WsMessage::Close(frame)) => {
                if let Some(frame) = frame {
                    if u16::from(frame.code) == CLOSE_CODE_ORIGIN_REJECTED {
                        refusal = Some(format!("connection refused: {}", frame.reason));
                    }
                }
                break;
            }
            Ok(_) => {}
            Err(err) => {
                warn!(error = %err, "websocket read failed");
                fault = Some(format!("transport error: {err}"));
                break;
            }
        }
    }
    fail_pending(&shared, ClientError::ConnectionClosed).await;
    match fault {
        Some(error) => fail_state(&shared, error).await,
        None => finish_disconnected(&shared, refusal).await,
    }
}

async fn handle_frame(shared: &Arc<Shared>, challenge: &Notify, text: &str) {
    let Some(frame) = Frame::decode(text) else {
        debug!("dropping undecodable frame");
        return;
    };
    match frame {
        Frame::Event {
            event,
            payload,
            seq,
            state_version,
        } => {
            if event == events::CONNECT_CHALLENGE {
                let mut state = shared.state.lock().await;
                if *state == ConnectionState::Connecting {
                    *state = ConnectionState::Challenged;
                    let _ = shared.state_tx.send(state.clone());
                }
                challenge.notify_one();
            }
            let event = GatewayEvent {
                event,
                payload,
                seq,
                state_version,
            };
            if event.event.starts_with(events::CHAT_PREFIX) {
                let _ = shared.chat_tx.send(event.clone());
            }
            let _ = shared.event_tx.send(event);
        }
        Frame::Response {
            id,
            ok,
            payload,
            error,
        } => {
            let sender = shared.pending.lock().await.remove(&id);
            match sender {
                Some(sender) => {
                    let result = if ok {
                        Ok(payload.unwrap_or(Value::Null))
                    } else {
                        Err(ClientError::Request(
                            error.unwrap_or_else(|| "Request failed".to_string()),
                        ))
                    };
                    let _ = sender.send(result);
                }
                None => debug!(%id, "response for unknown request id"),
            }
        }
        Frame::Request { method, .. } => {
            debug!(%method, "dropping request frame from server");
        }
    }
}

async fn fail_pending(shared: &Arc<Shared>, error: ClientError) {
    let drained: Vec<_> = shared.pending.lock().await.drain().collect();
    for (_, sender) in drained {
        let _ = sender.send(Err(error.clone()));
    }
}

/// Record a failure verdict. The first verdict wins: an existing
/// `Failed` or a refused-connection reason is never overwritten.
async fn fail_state(shared: &Arc<Shared>, error: String) {
    let mut state = shared.state.lock().await;
    if matches!(
        *state,
        ConnectionState::Failed { .. } | ConnectionState::Disconnected { reason: Some(_) }
    ) {
        return;
    }
    *state = ConnectionState::Failed { error };
    let _ = shared.state_tx.send(state.clone());
}

async fn set_state(shared: &Arc<Shared>, next: ConnectionState) {
    let mut state = shared.state.lock().await;
    if *state == next {
        return;
    }
    *state = next.clone();
    let _ = shared.state_tx.send(next);
}

/// Transition to `Disconnected` when the read loop ends, keeping a
/// `Failed` verdict already recorded by the handshake.
async fn finish_disconnected(shared: &Arc<Shared>, reason: Option<String>) {
    let mut state = shared.state.lock().await;
    if matches!(*state, ConnectionState::Failed { .. }) {
        return;
    }
    *state = ConnectionState::Disconnected { reason };
    let _ = shared.state_tx.send(state.clone());
}

/// Accepts http(s) URLs and bare host:port for convenience; the wire
/// always speaks ws(s).
fn normalize_url(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else if let Some(rest) = url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if url.starts_with("ws://") || url.starts_with("wss://") {
        url.to_string()
    } else {
        format!("ws://{url}")
    }
}

fn mint_request_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("req_{}_{}", unix_ms(), &suffix[..8])
}
