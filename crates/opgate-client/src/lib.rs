//! Client engine for the opgate gateway protocol.
//!
//! [`GatewayClient`] owns one WebSocket connection at a time, runs the
//! challenge/connect handshake, correlates responses to in-flight
//! requests by id, and fans server-pushed events out to any number of
//! subscribers.

mod client;
mod error;
mod methods;
mod state;

pub use client::{ConnectOptions, GatewayClient, GatewayEvent};
pub use error::ClientError;
pub use state::ConnectionState;
