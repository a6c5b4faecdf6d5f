use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use reqwest::Url;
use serde_json::Value;
use time::OffsetDateTime;
use tokio::{
    net::TcpStream,
    sync::{Mutex, mpsc},
    task::JoinHandle,
    time::timeout,
};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;

use crate::socketio::{
    broker::AckBroker,
    error::{
        ClientError, closed, connect_rejected, handshake_failure, invalid_url, not_connected,
        timeout_error, transport_failure,
    },
    events::{ClientEvent, EventSink, InboundEvent},
    packet::{
        DEFAULT_NAMESPACE, EnginePacket, OpenHandshake, SocketPacket, encode_engine_packet,
        encode_message, parse_engine_packet, parse_socket_packet,
    },
};

const DISCONNECT_GRACE: Duration = Duration::from_millis(500);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectOptions {
    pub base_url: String,
    pub socketio_path: String,
    pub namespace: String,
    pub auth: Option<Value>,
    pub connect_timeout: Duration,
    pub ack_timeout: Duration,
}

impl ConnectOptions {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            socketio_path: "/socket.io/".to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            auth: None,
            connect_timeout: Duration::from_secs(10),
            ack_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub websocket_url: String,
    pub engine_sid: String,
    pub socket_sid: Option<String>,
    pub upgrades: Vec<String>,
    pub ping_interval: Duration,
    pub ping_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome {
    Acknowledged(Vec<Value>),
    NoAcknowledgement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineTransport {
    WebSocket,
    Polling,
}

impl EngineTransport {
    fn query_value(self) -> &'static str {
        match self {
            EngineTransport::WebSocket => "websocket",
            EngineTransport::Polling => "polling",
        }
    }
}

/// Builds the Engine.IO endpoint for `base_url`, keeping any path prefix the
/// base URL carries (reverse proxies often mount the service below `/`).
pub fn engine_endpoint(
    base_url: &str,
    socketio_path: &str,
    transport: EngineTransport,
) -> Result<Url, ClientError> {
    let mut url = Url::parse(base_url)
        .map_err(|err| invalid_url(format!("invalid base url '{base_url}': {err}")))?;
    let secure = match url.scheme() {
        "http" | "ws" => false,
        "https" | "wss" => true,
        other => {
            return Err(invalid_url(format!(
                "unsupported url scheme '{other}' in '{base_url}'; expected http or https"
            )));
        }
    };

    let scheme = match (transport, secure) {
        (EngineTransport::WebSocket, false) => "ws",
        (EngineTransport::WebSocket, true) => "wss",
        (EngineTransport::Polling, false) => "http",
        (EngineTransport::Polling, true) => "https",
    };
    url.set_scheme(scheme)
        .map_err(|()| invalid_url(format!("cannot switch '{base_url}' to {scheme}")))?;

    let prefix = url.path().trim_end_matches('/').to_string();
    let endpoint = socketio_path.trim_matches('/');
    if endpoint.is_empty() {
        url.set_path(&format!("{prefix}/"));
    } else {
        url.set_path(&format!("{prefix}/{endpoint}/"));
    }
    url.set_query(Some(&format!("EIO=4&transport={}", transport.query_value())));
    url.set_fragment(None);
    Ok(url)
}

struct ConnectionShared {
    connected: AtomicBool,
    closed: CancellationToken,
    broker: AckBroker,
    sink: Arc<dyn EventSink>,
}

impl ConnectionShared {
    fn mark_disconnected(&self, reason: &str) {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return;
        }

        self.closed.cancel();
        let dropped_waiters = self.broker.close();
        tracing::info!(
            target: "socketio",
            reason = %reason,
            dropped_waiters,
            "disconnected"
        );
        self.sink.on_event(&ClientEvent::Disconnected {
            reason: reason.to_string(),
        });
    }
}

struct ClientTasks {
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

/// A Socket.IO client bound to one namespace over the WebSocket transport.
///
/// Every server-pushed event is forwarded to the [`EventSink`] given at
/// connect time, from the reader task, in arrival order.
pub struct SocketClient {
    namespace: String,
    session: SessionInfo,
    ack_timeout: Duration,
    outbound: mpsc::UnboundedSender<Message>,
    shared: Arc<ConnectionShared>,
    tasks: Mutex<Option<ClientTasks>>,
}

impl SocketClient {
    pub async fn connect(
        options: &ConnectOptions,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self, ClientError> {
        let url = engine_endpoint(
            &options.base_url,
            &options.socketio_path,
            EngineTransport::WebSocket,
        )?;
        tracing::info!(
            target: "socketio",
            url = %url,
            namespace = %options.namespace,
            "websocket_connecting"
        );

        let mut stream = match timeout(options.connect_timeout, connect_async(url.as_str())).await
        {
            Ok(Ok((stream, _response))) => stream,
            Ok(Err(err)) => {
                return Err(transport_failure(format!(
                    "websocket connection to {url} failed: {err}"
                )));
            }
            Err(_) => {
                return Err(timeout_error(format!(
                    "websocket connection to {url} timed out after {}ms",
                    options.connect_timeout.as_millis()
                )));
            }
        };

        let handshake = timeout(options.connect_timeout, read_open_packet(&mut stream))
            .await
            .map_err(|_| timeout_error("timed out waiting for the engine.io open packet"))??;

        let connect = SocketPacket::Connect {
            namespace: options.namespace.clone(),
            data: options.auth.clone(),
        };
        send_frame(&mut stream, encode_message(&connect)?).await?;

        let socket_sid = timeout(
            options.connect_timeout,
            await_namespace_connect(&mut stream, &options.namespace),
        )
        .await
        .map_err(|_| {
            timeout_error(format!(
                "timed out waiting for namespace '{}' to connect",
                options.namespace
            ))
        })??;

        let session = SessionInfo {
            websocket_url: url.to_string(),
            engine_sid: handshake.sid.clone(),
            socket_sid: socket_sid.clone(),
            upgrades: handshake.upgrades.clone(),
            ping_interval: Duration::from_millis(handshake.ping_interval),
            ping_timeout: Duration::from_millis(handshake.ping_timeout),
        };
        tracing::info!(
            target: "socketio",
            engine_sid = %session.engine_sid,
            socket_sid = ?session.socket_sid,
            ping_interval_ms = handshake.ping_interval,
            ping_timeout_ms = handshake.ping_timeout,
            "namespace_connected"
        );

        let shared = Arc::new(ConnectionShared {
            connected: AtomicBool::new(true),
            closed: CancellationToken::new(),
            broker: AckBroker::new(),
            sink,
        });
        shared
            .sink
            .on_event(&ClientEvent::Connected { sid: socket_sid });

        let heartbeat_deadline = session.ping_interval + session.ping_timeout;
        let (ws_tx, ws_rx) = stream.split();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let writer = tokio::spawn(write_loop(ws_tx, outbound_rx));
        let reader = tokio::spawn(read_loop(
            ws_rx,
            FrameRouter {
                namespace: options.namespace.clone(),
                outbound: outbound_tx.clone(),
                shared: Arc::clone(&shared),
            },
            heartbeat_deadline,
        ));

        Ok(Self {
            namespace: options.namespace.clone(),
            session,
            ack_timeout: options.ack_timeout,
            outbound: outbound_tx,
            shared,
            tasks: Mutex::new(Some(ClientTasks { reader, writer })),
        })
    }

    pub fn session(&self) -> &SessionInfo {
        &self.session
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    /// Resolves once the session has ended, whichever side ended it.
    pub async fn closed(&self) {
        self.shared.closed.cancelled().await;
    }

    pub fn emit(&self, event: &str, args: Vec<Value>) -> Result<(), ClientError> {
        self.send_packet(&SocketPacket::Event {
            namespace: self.namespace.clone(),
            id: None,
            name: event.to_string(),
            args,
        })?;
        tracing::debug!(target: "socketio", event = %event, "event_emitted");
        Ok(())
    }

    pub async fn call(&self, event: &str, args: Vec<Value>) -> Result<Vec<Value>, ClientError> {
        match self.call_within(event, args, self.ack_timeout).await? {
            CallOutcome::Acknowledged(args) => Ok(args),
            CallOutcome::NoAcknowledgement => Err(timeout_error(format!(
                "no acknowledgement for '{event}' within {}ms",
                self.ack_timeout.as_millis()
            ))),
        }
    }

    /// Sends `event` asking for an acknowledgement and waits at most `window`.
    /// Silence is reported as [`CallOutcome::NoAcknowledgement`], not as an error.
    pub async fn call_within(
        &self,
        event: &str,
        args: Vec<Value>,
        window: Duration,
    ) -> Result<CallOutcome, ClientError> {
        if !self.is_connected() {
            return Err(not_connected(format!(
                "cannot call '{event}': client is disconnected"
            )));
        }

        let (ack_id, response_rx) = self.shared.broker.register()?;
        let packet = SocketPacket::Event {
            namespace: self.namespace.clone(),
            id: Some(ack_id),
            name: event.to_string(),
            args,
        };
        if let Err(err) = self.send_packet(&packet) {
            self.shared.broker.cancel(ack_id);
            return Err(err);
        }
        tracing::debug!(
            target: "socketio",
            event = %event,
            ack_id,
            window_ms = window.as_millis() as u64,
            "call_sent"
        );

        match timeout(window, response_rx).await {
            Ok(Ok(args)) => Ok(CallOutcome::Acknowledged(args)),
            Ok(Err(_)) => Err(closed(format!(
                "connection closed while waiting for the '{event}' acknowledgement"
            ))),
            Err(_) => {
                self.shared.broker.cancel(ack_id);
                tracing::debug!(
                    target: "socketio",
                    event = %event,
                    ack_id,
                    "call_unacknowledged"
                );
                Ok(CallOutcome::NoAcknowledgement)
            }
        }
    }

    /// Leaves the namespace and closes the WebSocket. Safe to call repeatedly.
    pub async fn disconnect(&self) {
        let Some(tasks) = self.tasks.lock().await.take() else {
            return;
        };

        if self.is_connected() {
            let leave = SocketPacket::Disconnect {
                namespace: self.namespace.clone(),
            };
            if let Ok(frame) = encode_message(&leave) {
                let _ = self.outbound.send(Message::Text(frame));
            }
        }
        let _ = self.outbound.send(Message::Close(None));
        self.shared.mark_disconnected("client disconnect");

        let ClientTasks { reader, writer } = tasks;
        if timeout(DISCONNECT_GRACE, writer).await.is_err() {
            tracing::warn!(target: "socketio", "websocket_writer_shutdown_timed_out");
        }
        reader.abort();
        let _ = reader.await;
    }

    fn send_packet(&self, packet: &SocketPacket) -> Result<(), ClientError> {
        if !self.is_connected() {
            return Err(not_connected("client is disconnected"));
        }
        let frame = encode_message(packet)?;
        self.outbound
            .send(Message::Text(frame))
            .map_err(|_| not_connected("websocket writer has stopped"))
    }
}

impl Drop for SocketClient {
    fn drop(&mut self) {
        if let Some(tasks) = self.tasks.get_mut().take() {
            tasks.reader.abort();
            tasks.writer.abort();
        }
    }
}

async fn send_frame(stream: &mut WsStream, frame: String) -> Result<(), ClientError> {
    stream
        .send(Message::Text(frame))
        .await
        .map_err(|err| transport_failure(format!("websocket write failed: {err}")))
}

async fn next_text_frame(stream: &mut WsStream) -> Result<String, ClientError> {
    loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => return Ok(text),
            Some(Ok(Message::Close(_))) | None => {
                return Err(closed("websocket closed during the handshake"));
            }
            Some(Ok(_)) => continue,
            Some(Err(err)) => {
                return Err(transport_failure(format!("websocket read failed: {err}")));
            }
        }
    }
}

async fn read_open_packet(stream: &mut WsStream) -> Result<OpenHandshake, ClientError> {
    loop {
        let frame = next_text_frame(stream).await?;
        match parse_engine_packet(&frame)? {
            EnginePacket::Open(handshake) => return Ok(handshake),
            EnginePacket::Noop => continue,
            other => {
                return Err(handshake_failure(format!(
                    "expected engine.io open packet, got {other:?}"
                )));
            }
        }
    }
}

async fn await_namespace_connect(
    stream: &mut WsStream,
    namespace: &str,
) -> Result<Option<String>, ClientError> {
    loop {
        let frame = next_text_frame(stream).await?;
        match parse_engine_packet(&frame)? {
            EnginePacket::Ping(payload) => {
                send_frame(stream, encode_engine_packet(&EnginePacket::Pong(payload))?).await?;
            }
            EnginePacket::Close => {
                return Err(closed("server closed the engine.io session during connect"));
            }
            EnginePacket::Message(payload) => match parse_socket_packet(&payload)? {
                SocketPacket::Connect {
                    namespace: connected,
                    data,
                } if connected == namespace => {
                    let sid = data
                        .as_ref()
                        .and_then(|data| data.get("sid"))
                        .and_then(Value::as_str)
                        .map(str::to_string);
                    return Ok(sid);
                }
                SocketPacket::ConnectError {
                    namespace: rejected,
                    data,
                } if rejected == namespace => {
                    return Err(connect_rejected(format!(
                        "server refused namespace '{namespace}': {}",
                        describe_connect_error(&data)
                    )));
                }
                other => {
                    tracing::debug!(
                        target: "socketio",
                        packet = ?other,
                        "packet_before_connect_ignored"
                    );
                }
            },
            EnginePacket::Open(_)
            | EnginePacket::Pong(_)
            | EnginePacket::Upgrade
            | EnginePacket::Noop => {}
        }
    }
}

fn describe_connect_error(data: &Value) -> String {
    data.get("message")
        .and_then(Value::as_str)
        .or_else(|| data.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| data.to_string())
}

enum FrameFlow {
    Continue,
    Stop(String),
}

struct FrameRouter {
    namespace: String,
    outbound: mpsc::UnboundedSender<Message>,
    shared: Arc<ConnectionShared>,
}

impl FrameRouter {
    fn route(&self, frame: &str) -> FrameFlow {
        let packet = match parse_engine_packet(frame) {
            Ok(packet) => packet,
            Err(err) => {
                tracing::warn!(target: "socketio", error = %err, "invalid_engine_frame");
                return FrameFlow::Continue;
            }
        };

        match packet {
            EnginePacket::Ping(payload) => {
                self.send_engine(&EnginePacket::Pong(payload));
                FrameFlow::Continue
            }
            EnginePacket::Close => FrameFlow::Stop("server closed the engine.io session".into()),
            EnginePacket::Message(payload) => self.route_socket_packet(&payload),
            EnginePacket::Open(_)
            | EnginePacket::Pong(_)
            | EnginePacket::Upgrade
            | EnginePacket::Noop => FrameFlow::Continue,
        }
    }

    fn route_socket_packet(&self, payload: &str) -> FrameFlow {
        let packet = match parse_socket_packet(payload) {
            Ok(packet) => packet,
            Err(err) => {
                tracing::warn!(target: "socketio", error = %err, "invalid_socket_packet");
                return FrameFlow::Continue;
            }
        };
        if packet.namespace() != self.namespace {
            tracing::debug!(
                target: "socketio",
                namespace = %packet.namespace(),
                "foreign_namespace_packet_ignored"
            );
            return FrameFlow::Continue;
        }

        match packet {
            SocketPacket::Event {
                namespace,
                id,
                name,
                args,
            } => {
                tracing::debug!(
                    target: "socketio",
                    event = %name,
                    arg_count = args.len(),
                    ack_requested = id.is_some(),
                    "event_received"
                );
                self.shared.sink.on_event(&ClientEvent::Event(InboundEvent {
                    namespace: namespace.clone(),
                    name,
                    args,
                    received_at: OffsetDateTime::now_utc(),
                }));
                if let Some(ack_id) = id {
                    self.send_socket(&SocketPacket::Ack {
                        namespace,
                        id: ack_id,
                        args: Vec::new(),
                    });
                }
                FrameFlow::Continue
            }
            SocketPacket::Ack { id, args, .. } => {
                if !self.shared.broker.resolve(id, args) {
                    tracing::debug!(target: "socketio", ack_id = id, "late_ack_ignored");
                }
                FrameFlow::Continue
            }
            SocketPacket::Disconnect { .. } => {
                FrameFlow::Stop("server disconnected the namespace".into())
            }
            SocketPacket::ConnectError { data, .. } => FrameFlow::Stop(format!(
                "server reported a connect error: {}",
                describe_connect_error(&data)
            )),
            SocketPacket::Connect { .. } => FrameFlow::Continue,
        }
    }

    fn send_engine(&self, packet: &EnginePacket) {
        match encode_engine_packet(packet) {
            Ok(frame) => {
                let _ = self.outbound.send(Message::Text(frame));
            }
            Err(err) => tracing::warn!(target: "socketio", error = %err, "engine_encode_failed"),
        }
    }

    fn send_socket(&self, packet: &SocketPacket) {
        match encode_message(packet) {
            Ok(frame) => {
                let _ = self.outbound.send(Message::Text(frame));
            }
            Err(err) => tracing::warn!(target: "socketio", error = %err, "socket_encode_failed"),
        }
    }
}

async fn read_loop(
    mut ws_rx: SplitStream<WsStream>,
    router: FrameRouter,
    heartbeat_deadline: Duration,
) {
    let reason = loop {
        let frame = match timeout(heartbeat_deadline, ws_rx.next()).await {
            Err(_) => {
                break format!(
                    "no heartbeat within {}ms",
                    heartbeat_deadline.as_millis()
                );
            }
            Ok(None) => break "transport closed".to_string(),
            Ok(Some(Err(err))) => break format!("transport error: {err}"),
            Ok(Some(Ok(frame))) => frame,
        };

        let text = match frame {
            Message::Text(text) => text,
            Message::Close(_) => break "websocket closed by server".to_string(),
            Message::Binary(bytes) => {
                tracing::warn!(target: "socketio", bytes = bytes.len(), "binary_frame_ignored");
                continue;
            }
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
        };

        if let FrameFlow::Stop(reason) = router.route(&text) {
            break reason;
        }
    };

    router.shared.mark_disconnected(&reason);
}

async fn write_loop(
    mut ws_tx: SplitSink<WsStream, Message>,
    mut outbound: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(message) = outbound.recv().await {
        let closing = matches!(message, Message::Close(_));
        if let Err(err) = ws_tx.send(message).await {
            tracing::debug!(target: "socketio", error = %err, "websocket_write_failed");
            break;
        }
        if closing {
            break;
        }
    }
    let _ = ws_tx.close().await;
}
