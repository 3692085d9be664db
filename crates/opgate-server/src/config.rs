use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use tracing::warn;

pub const DEFAULT_PORT: u16 = 18789;
pub const DEFAULT_BIND: &str = "0.0.0.0";

/// Gateway process configuration: listen endpoint, optional bearer
/// credential, origin allow-list, and the path of the user-config
/// JSON document served by the `config.*` methods.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub bind: String,
    pub port: u16,
    pub token: Option<String>,
    pub allowed_origins: Vec<String>,
    pub config_path: PathBuf,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            port: DEFAULT_PORT,
            token: None,
            allowed_origins: default_origins(),
            config_path: default_config_path(),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from process environment variables.
    pub fn from_env() -> Self {
        Self::from_env_vars(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_env_vars(get: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(raw) = get("OPGATE_PORT") {
            match raw.parse() {
                Ok(port) => config.port = port,
                Err(_) => warn!(value = %raw, "ignoring invalid OPGATE_PORT"),
            }
        }
        if let Some(bind) = get("OPGATE_BIND") {
            config.bind = bind;
        }
        if let Some(token) = get("OPGATE_TOKEN") {
            if !token.is_empty() {
                config.token = Some(token);
            }
        }
        if let Some(raw) = get("OPGATE_ALLOWED_ORIGINS") {
            let origins: Vec<String> = raw
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect();
            if !origins.is_empty() {
                config.allowed_origins = origins;
            }
        }
        if let Some(path) = get("OPGATE_CONFIG_PATH") {
            config.config_path = PathBuf::from(path);
        }

        config
    }

    pub fn listen_addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.bind, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.bind, self.port))
    }
}

fn default_origins() -> Vec<String> {
    vec![
        "http://localhost:5173".to_string(),
        "http://127.0.0.1:5173".to_string(),
    ]
}

fn default_config_path() -> PathBuf {
    let relative = PathBuf::from(".opgate").join("config.json");
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(relative),
        Err(_) => relative,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_when_env_is_empty() {
        let config = GatewayConfig::from_env_vars(|_| None);
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.bind, DEFAULT_BIND);
        assert!(config.token.is_none());
        assert_eq!(config.allowed_origins.len(), 2);
    }

    #[test]
    fn env_overrides_apply() {
        let vars = env(&[
            ("OPGATE_PORT", "9000"),
            ("OPGATE_BIND", "127.0.0.1"),
            ("OPGATE_TOKEN", "secret"),
            ("OPGATE_ALLOWED_ORIGINS", "http://a.example, http://b.example"),
            ("OPGATE_CONFIG_PATH", "/tmp/opgate.json"),
        ]);
        let config = GatewayConfig::from_env_vars(|key| vars.get(key).cloned());
        assert_eq!(config.port, 9000);
        assert_eq!(config.bind, "127.0.0.1");
        assert_eq!(config.token.as_deref(), Some("secret"));
        assert_eq!(
            config.allowed_origins,
            vec!["http://a.example", "http://b.example"]
        );
        assert_eq!(config.config_path, PathBuf::from("/tmp/opgate.json"));
    }

    #[test]
    fn invalid_port_keeps_default() {
        let vars = env(&[("OPGATE_PORT", "not-a-port")]);
        let config = GatewayConfig::from_env_vars(|key| vars.get(key).cloned());
        assert_eq!(config.port, DEFAULT_PORT);
    }

    #[test]
    fn listen_addr_parses() {
        let config = GatewayConfig {
            bind: "127.0.0.1".to_string(),
            port: 0,
            ..GatewayConfig::default()
        };
        assert!(config.listen_addr().is_ok());
    }
}
