use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tracing::info;

use crate::config::GatewayConfig;
use crate::dispatch::MethodRegistry;
use crate::ws::ws_handler;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) config: Arc<GatewayConfig>,
    pub(crate) registry: Arc<MethodRegistry>,
}

/// A bound gateway, ready to serve. Binding and serving are split so
/// callers (and tests) can bind port 0 and read the assigned address
/// before accepting traffic.
pub struct Gateway {
    addr: SocketAddr,
    listener: TcpListener,
    app: Router,
}

impl Gateway {
    pub async fn bind(config: Arc<GatewayConfig>, registry: MethodRegistry) -> anyhow::Result<Self> {
        let state = AppState {
            config: config.clone(),
            registry: Arc::new(registry),
        };
        let app = Router::new()
            .route("/", get(ws_handler))
            .route("/ws", get(ws_handler))
            .with_state(state);

        let listen = config.listen_addr()?;
        let listener = TcpListener::bind(listen)
            .await
            .with_context(|| format!("failed to bind {listen}"))?;
        let addr = listener.local_addr().context("failed to read bound address")?;

        Ok(Self { addr, listener, app })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn serve(self) -> anyhow::Result<()> {
        info!(addr = %self.addr, "gateway listening");
        axum::serve(self.listener, self.app)
            .await
            .context("gateway server failed")
    }
}
