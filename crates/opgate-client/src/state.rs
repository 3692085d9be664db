/// Connection lifecycle as observed through [`subscribe_state`].
///
/// A successful connect walks `Connecting` -> `Challenged` ->
/// `Connected`. A server that never sends the challenge skips the
/// `Challenged` step. `Failed` is terminal for that attempt; a new
/// `connect` call starts over from `Connecting`.
///
/// [`subscribe_state`]: crate::GatewayClient::subscribe_state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected { reason: Option<String> },
    Connecting,
    Challenged,
    Connected,
    Failed { error: String },
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}
