//! WebSocket hub: handshake, connection registry, rooms, and broadcast
//! fanout. The per-connection read/write loop is driven by [`serve`],
//! spawned once per upgraded request; mutation of the id->connection and
//! room indices is serialized through the hub's own lock, while each
//! connection's send queue is owned by the connection task itself so a
//! slow reader can't stall the hub.

pub mod frame;

use crate::config::HubConfig;
use base64::{engine::general_purpose::STANDARD, Engine};
use frame::{close_code, Frame, Opcode};
use parking_lot::Mutex;
use sha1::{Digest, Sha1};
use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    sync::mpsc,
};

const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Computes the `Sec-WebSocket-Accept` value for a given `Sec-WebSocket-Key`.
pub fn accept_key(client_key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(client_key.as_bytes());
    hasher.update(WEBSOCKET_GUID.as_bytes());
    STANDARD.encode(hasher.finalize())
}

/// Validates the handshake request headers per RFC 6455 §4.2.1, returning
/// the client's key on success.
pub fn validate_handshake<'a>(
    upgrade: Option<&'a [u8]>,
    connection: Option<&'a [u8]>,
    key: Option<&'a [u8]>,
    origin: Option<&'a [u8]>,
    allowed_origins: &[String],
) -> Result<&'a str, HandshakeError> {
    let upgrade = upgrade.ok_or(HandshakeError::MissingUpgrade)?;
    if !upgrade.eq_ignore_ascii_case(b"websocket") {
        return Err(HandshakeError::MissingUpgrade);
    }
    let connection = connection.ok_or(HandshakeError::MissingConnection)?;
    if !String::from_utf8_lossy(connection)
        .split(',')
        .any(|tok| tok.trim().eq_ignore_ascii_case("upgrade"))
    {
        return Err(HandshakeError::MissingConnection);
    }
    let key = key.ok_or(HandshakeError::MissingKey)?;
    let key = std::str::from_utf8(key).map_err(|_| HandshakeError::MissingKey)?;
    if key.is_empty() {
        return Err(HandshakeError::MissingKey);
    }
    if !allowed_origins.is_empty() {
        let origin = origin
            .and_then(|o| std::str::from_utf8(o).ok())
            .ok_or(HandshakeError::OriginRejected)?;
        if !allowed_origins.iter().any(|a| a == origin) {
            return Err(HandshakeError::OriginRejected);
        }
    }
    Ok(key)
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HandshakeError {
    #[error("missing or invalid Upgrade header")]
    MissingUpgrade,
    #[error("missing or invalid Connection header")]
    MissingConnection,
    #[error("missing Sec-WebSocket-Key")]
    MissingKey,
    #[error("origin not in the allowed list")]
    OriginRejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Connecting,
    Open,
    Closing,
    Closed,
}

pub type ConnectionId = u64;

#[derive(Debug, Clone)]
pub enum Message {
    Text(String),
    Binary(Vec<u8>),
}

impl Message {
    fn into_frame(self) -> Frame {
        match self {
            Self::Text(s) => frame::text(s),
            Self::Binary(b) => frame::binary(b),
        }
    }
}

/// A connection's outbound half: a bounded queue drained by that
/// connection's own write task. Full queues trip the configured
/// backpressure policy rather than blocking the hub.
struct ConnectionHandle {
    sender: mpsc::Sender<Frame>,
    state: Mutex<ConnState>,
}

pub struct Hub {
    config: HubConfig,
    next_id: AtomicU64,
    connections: Mutex<HashMap<ConnectionId, ConnectionHandle>>,
    rooms: Mutex<HashMap<String, HashSet<ConnectionId>>>,
}

impl Hub {
    pub fn new(config: HubConfig) -> Self {
        Self {
            config,
            next_id: AtomicU64::new(1),
            connections: Mutex::new(HashMap::new()),
            rooms: Mutex::new(HashMap::new()),
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.lock().len()
    }

    /// Registers a new connection and returns its id plus the receiving
    /// half of its send queue, which the caller's write loop drains.
    pub fn register(&self) -> (ConnectionId, mpsc::Receiver<Frame>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(self.config.send_queue_capacity);
        self.connections.lock().insert(
            id,
            ConnectionHandle {
                sender,
                state: Mutex::new(ConnState::Open),
            },
        );
        (id, receiver)
    }

    pub fn state(&self, id: ConnectionId) -> Option<ConnState> {
        self.connections.lock().get(&id).map(|h| *h.state.lock())
    }

    /// Transitions a connection's state machine. Accepts a transition that
    /// doesn't match the current state by simply overwriting it — the
    /// accept/send/receive call sites are themselves the source of truth
    /// for which transitions are legal, this just records the result.
    pub fn set_state(&self, id: ConnectionId, state: ConnState) {
        if let Some(handle) = self.connections.lock().get(&id) {
            *handle.state.lock() = state;
        }
    }

    pub fn unregister(&self, id: ConnectionId) {
        self.connections.lock().remove(&id);
        let mut rooms = self.rooms.lock();
        rooms.retain(|_, members| {
            members.remove(&id);
            !members.is_empty()
        });
    }

    pub fn join_room(&self, room: &str, id: ConnectionId) {
        self.rooms.lock().entry(room.to_string()).or_default().insert(id);
    }

    pub fn leave_room(&self, room: &str, id: ConnectionId) {
        let mut rooms = self.rooms.lock();
        if let Some(members) = rooms.get_mut(room) {
            members.remove(&id);
            if members.is_empty() {
                rooms.remove(room);
            }
        }
    }

    /// Sends `message` to one connection. Returns `false` if the send
    /// queue is full (the caller should close the connection per the
    /// configured backpressure policy) or the connection no longer exists.
    pub fn send(&self, id: ConnectionId, message: Message) -> bool {
        let sender = { self.connections.lock().get(&id).map(|h| h.sender.clone()) };
        match sender {
            Some(sender) => sender.try_send(message.into_frame()).is_ok(),
            None => false,
        }
    }

    pub fn broadcast(&self, message: &Message) {
        self.broadcast_except(None, message, 0);
    }

    pub fn broadcast_to_room(&self, room: &str, message: &Message) {
        self.broadcast_to_room_except(room, message, 0);
    }

    pub fn broadcast_to_room_except(&self, room: &str, message: &Message, exclude_id: ConnectionId) {
        let targets: Vec<ConnectionId> = {
            let rooms = self.rooms.lock();
            rooms.get(room).map(|m| m.iter().copied().collect()).unwrap_or_default()
        };
        for id in targets {
            if id != exclude_id {
                self.send(id, message.clone());
            }
        }
    }

    /// `room = None` broadcasts to every open connection except
    /// `exclude_id`; this is the broadcast-exclude signature standardized
    /// for this crate (a bare `exclude_id` of `0` — never allocated by
    /// `register`, which starts at 1 — means "exclude nothing").
    pub fn broadcast_except(&self, room: Option<&str>, message: &Message, exclude_id: ConnectionId) {
        match room {
            Some(room) => self.broadcast_to_room_except(room, message, exclude_id),
            None => {
                let targets: Vec<ConnectionId> = self.connections.lock().keys().copied().collect();
                for id in targets {
                    if id != exclude_id {
                        self.send(id, message.clone());
                    }
                }
            }
        }
    }

    pub fn ping_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.config.ping_interval_ms)
    }

    pub fn pong_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.config.pong_timeout_ms)
    }

    pub fn max_message_size(&self) -> usize {
        self.config.max_message_size
    }
}

/// Drives a single upgraded connection until it closes: reads frames off
/// `stream` into a growable buffer, answers pings, forwards text/binary
/// frames to `on_message`, and writes whatever the hub queues for this
/// connection via its send queue. Runs until a close frame is read/sent or
/// the socket errors.
pub async fn serve(
    mut stream: TcpStream,
    hub: Arc<Hub>,
    id: ConnectionId,
    mut outbox: mpsc::Receiver<Frame>,
    mut on_message: impl FnMut(Message),
) {
    let max_message_size = hub.max_message_size();
    let mut ping_ticker = tokio::time::interval(hub.ping_interval());
    let mut read_buf: Vec<u8> = Vec::with_capacity(4096);
    let mut last_pong = tokio::time::Instant::now();

    let mut chunk = [0u8; 4096];
    loop {
        tokio::select! {
            result = stream.read(&mut chunk) => {
                match result {
                    Ok(0) => break,
                    Ok(n) => read_buf.extend_from_slice(&chunk[..n]),
                    Err(_) => break,
                }
                loop {
                    match frame::decode(&read_buf, max_message_size) {
                        Ok(Some((frame, consumed))) => {
                            read_buf.drain(..consumed);
                            if !handle_inbound(&mut stream, &hub, id, frame, &mut last_pong, &mut on_message).await {
                                hub.unregister(id);
                                return;
                            }
                        }
                        Ok(None) => break,
                        Err(_) => {
                            let _ = stream.write_all(&frame::encode(&frame::close(close_code::PROTOCOL_ERROR, ""))).await;
                            hub.unregister(id);
                            return;
                        }
                    }
                }
            }
            queued = outbox.recv() => {
                match queued {
                    Some(frame) => {
                        if stream.write_all(&frame::encode(&frame)).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            _ = ping_ticker.tick() => {
                if last_pong.elapsed() > hub.pong_timeout() {
                    let _ = stream.write_all(&frame::encode(&frame::close(close_code::INTERNAL_ERROR, "pong timeout"))).await;
                    break;
                }
                let _ = stream.write_all(&frame::encode(&frame::ping(Vec::new()))).await;
            }
        }
    }
    hub.unregister(id);
}

/// Handles one decoded inbound frame. Returns `false` when the connection
/// should close (a close frame was received, or the echo of our own close
/// reply failed).
async fn handle_inbound(
    stream: &mut TcpStream,
    hub: &Hub,
    id: ConnectionId,
    frame: Frame,
    last_pong: &mut tokio::time::Instant,
    on_message: &mut impl FnMut(Message),
) -> bool {
    match frame.opcode {
        Opcode::Text => {
            if let Ok(text) = String::from_utf8(frame.payload) {
                on_message(Message::Text(text));
            }
            true
        }
        Opcode::Binary => {
            on_message(Message::Binary(frame.payload));
            true
        }
        Opcode::Ping => stream.write_all(&frame::encode(&frame::pong(frame.payload))).await.is_ok(),
        Opcode::Pong => {
            *last_pong = tokio::time::Instant::now();
            true
        }
        Opcode::Close => {
            hub.set_state(id, ConnState::Closing);
            let _ = stream.write_all(&frame::encode(&frame::close(close_code::NORMAL, ""))).await;
            false
        }
        Opcode::Continuation => true,
    }
}

/// Picks the close code a backpressured connection should report: too-big
/// if the overflowing message itself exceeds the configured max, internal
/// error otherwise (queue saturated by a slow reader, not an oversized
/// message).
pub fn backpressure_close_code(message: &Message, max_message_size: usize) -> u16 {
    let len = match message {
        Message::Text(s) => s.len(),
        Message::Binary(b) => b.len(),
    };
    if len > max_message_size {
        close_code::MESSAGE_TOO_BIG
    } else {
        close_code::INTERNAL_ERROR
    }
}

pub use frame::close_code as CloseCode;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_key_matches_the_rfc_example() {
        // RFC 6455 §1.3 worked example.
        assert_eq!(accept_key("dGhlIHNhbXBsZSBub25jZQ=="), "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
    }

    #[test]
    fn handshake_requires_upgrade_and_key() {
        assert_eq!(
            validate_handshake(None, Some(b"Upgrade"), Some(b"key"), None, &[]),
            Err(HandshakeError::MissingUpgrade)
        );
        assert_eq!(
            validate_handshake(Some(b"websocket"), Some(b"Upgrade"), None, None, &[]),
            Err(HandshakeError::MissingKey)
        );
        assert!(validate_handshake(Some(b"websocket"), Some(b"Upgrade"), Some(b"abc"), None, &[]).is_ok());
    }

    #[test]
    fn disallowed_origin_is_rejected() {
        let allowed = vec!["https://example.com".to_string()];
        let result = validate_handshake(
            Some(b"websocket"),
            Some(b"Upgrade"),
            Some(b"abc"),
            Some(b"https://evil.com"),
            &allowed,
        );
        assert_eq!(result, Err(HandshakeError::OriginRejected));
    }

    #[test]
    fn new_connections_start_open_and_can_transition_to_closing() {
        let hub = Hub::new(HubConfig::default());
        let (id, _rx) = hub.register();
        assert_eq!(hub.state(id), Some(ConnState::Open));
        hub.set_state(id, ConnState::Closing);
        assert_eq!(hub.state(id), Some(ConnState::Closing));
    }

    #[test]
    fn room_membership_is_cleared_on_unregister() {
        let hub = Hub::new(HubConfig::default());
        let (id, _rx) = hub.register();
        hub.join_room("lobby", id);
        assert_eq!(hub.connection_count(), 1);
        hub.unregister(id);
        assert_eq!(hub.connection_count(), 0);
        hub.join_room("lobby", id); // re-join after unregister still works structurally
        hub.leave_room("lobby", id);
    }

    #[tokio::test]
    async fn broadcast_except_skips_the_excluded_connection() {
        let hub = Hub::new(HubConfig::default());
        let (a, mut rx_a) = hub.register();
        let (_b, mut rx_b) = hub.register();

        hub.broadcast_except(None, &Message::Text("hi".to_string()), a);

        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_ok());
    }

    #[test]
    fn backpressure_close_code_distinguishes_oversized_from_saturated() {
        let big = Message::Binary(vec![0u8; 100]);
        assert_eq!(backpressure_close_code(&big, 10), close_code::MESSAGE_TOO_BIG);
        assert_eq!(backpressure_close_code(&big, 1000), close_code::INTERNAL_ERROR);
    }

    fn masked_text_frame(payload: &str) -> Vec<u8> {
        let key = [9, 8, 7, 6];
        let masked: Vec<u8> = payload.bytes().enumerate().map(|(i, b)| b ^ key[i % 4]).collect();
        let mut buf = vec![0x81, 0x80 | payload.len() as u8];
        buf.extend_from_slice(&key);
        buf.extend_from_slice(&masked);
        buf
    }

    fn masked_close_frame() -> Vec<u8> {
        let payload = close_code::NORMAL.to_be_bytes();
        let key = [1, 1, 1, 1];
        let masked: Vec<u8> = payload.iter().enumerate().map(|(i, b)| b ^ key[i % 4]).collect();
        let mut buf = vec![0x88, 0x80 | payload.len() as u8];
        buf.extend_from_slice(&key);
        buf.extend_from_slice(&masked);
        buf
    }

    #[tokio::test]
    async fn serve_forwards_text_messages_and_closes_on_client_close() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hub = Arc::new(Hub::new(HubConfig::default()));
        let (id, outbox) = hub.register();
        let hub_for_server = hub.clone();

        let received: Arc<Mutex<Vec<Message>>> = Arc::new(Mutex::new(Vec::new()));
        let received_in_task = received.clone();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            serve(stream, hub_for_server, id, outbox, move |msg| {
                received_in_task.lock().push(msg);
            })
            .await;
        });

        let mut client = tokio::net::TcpStream::connect(addr).await.unwrap();
        client.write_all(&masked_text_frame("hi")).await.unwrap();
        client.write_all(&masked_close_frame()).await.unwrap();

        let mut reply = [0u8; 64];
        let n = client.read(&mut reply).await.unwrap();
        assert!(n > 0, "expected a close frame reply");

        server.await.unwrap();
        assert_eq!(received.lock().len(), 1);
        assert!(matches!(received.lock()[0], Message::Text(ref s) if s == "hi"));
        assert_eq!(hub.connection_count(), 0);
    }
}
