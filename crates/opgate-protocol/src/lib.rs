//! Wire protocol shared by the opgate client and server.
//!
//! Every message on the wire is a single JSON text frame: a request,
//! a response correlated to a request by id, or a server-pushed
//! event. Frames that do not decode into one of those shapes are
//! dropped by both sides rather than failing the connection, so the
//! protocol stays tolerant of fields added by newer peers.

mod connect;
mod frame;
pub mod methods;

pub use connect::{
    AuthParams, ChallengePayload, ClientInfo, ConnectParams, HelloAuth, HelloOk, HelloPolicy,
    HELLO_OK_KIND, OPERATOR_SCOPES, PROTOCOL_VERSION, PROTOCOL_VERSION_MIN,
};
pub use frame::Frame;

/// Event names pushed by the server outside the request/response flow.
pub mod events {
    /// Handshake challenge, emitted once right after a connection is accepted.
    pub const CONNECT_CHALLENGE: &str = "connect.challenge";

    /// Events in this namespace are additionally routed to the chat observer.
    pub const CHAT_PREFIX: &str = "chat.";
}

/// WebSocket close code sent when a connection's origin is not allowed.
pub const CLOSE_CODE_ORIGIN_REJECTED: u16 = 1008;

/// Current time as Unix epoch milliseconds.
pub fn unix_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
