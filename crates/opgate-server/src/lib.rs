//! Gateway daemon: accepts operator WebSocket connections, enforces
//! the origin allow-list and the connect handshake, and dispatches
//! decoded requests to registered method handlers.

pub mod config;
pub mod dispatch;
pub mod handlers;
pub mod server;
pub mod store;
mod ws;

pub use config::GatewayConfig;
pub use dispatch::{ConnContext, MethodError, MethodRegistry};
pub use server::Gateway;
pub use store::ConfigStore;
