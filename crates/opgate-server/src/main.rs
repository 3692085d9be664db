use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use opgate_server::handlers::default_registry;
use opgate_server::{ConfigStore, Gateway, GatewayConfig};

/// Operator gateway daemon.
#[derive(Parser, Debug)]
#[command(name = "opgate", version, about)]
struct Args {
    /// Port to listen on.
    #[arg(long)]
    port: Option<u16>,

    /// Address to bind.
    #[arg(long)]
    bind: Option<String>,

    /// Handshake token clients must present.
    #[arg(long)]
    token: Option<String>,

    /// Allowed browser origin; repeat for multiple.
    #[arg(long = "allow-origin")]
    allow_origin: Vec<String>,

    /// Path of the user-config JSON document.
    #[arg(long)]
    config_path: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("opgate=info".parse()?))
        .init();

    let args = Args::parse();

    // CLI flags override the OPGATE_* environment.
    let mut config = GatewayConfig::from_env();
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(bind) = args.bind {
        config.bind = bind;
    }
    if let Some(token) = args.token {
        config.token = Some(token);
    }
    if !args.allow_origin.is_empty() {
        config.allowed_origins = args.allow_origin;
    }
    if let Some(path) = args.config_path {
        config.config_path = path;
    }
    let config = Arc::new(config);

    info!(
        config_path = %config.config_path.display(),
        token = if config.token.is_some() { "set" } else { "none" },
        origins = ?config.allowed_origins,
        "starting gateway"
    );

    let store = Arc::new(ConfigStore::new(&config.config_path));
    store.reload().await;

    let registry = default_registry(config.clone(), store);
    let gateway = Gateway::bind(config, registry).await?;
    gateway.serve().await
}
