use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum ClientError {
    /// No live connection to send on.
    #[error("not connected")]
    NotConnected,

    /// The connection went away while a request was in flight.
    #[error("connection closed")]
    ConnectionClosed,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("handshake failed: {0}")]
    Handshake(String),

    /// The server answered the request with `ok: false`; the message
    /// is the server's error string verbatim.
    #[error("{0}")]
    Request(String),
}
