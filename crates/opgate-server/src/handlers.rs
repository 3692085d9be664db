//! Built-in method handlers.
//!
//! `connect`, `health`, `status`, and the `config.*` family are real;
//! the rest of the operator method surface is stubbed with fixed
//! payloads because the business logic behind those methods lives in
//! the agent process, not in the gateway.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::info;

use opgate_protocol::methods::ConfigSetParams;
use opgate_protocol::{
    methods, unix_ms, ConnectParams, HelloAuth, HelloOk, HelloPolicy, HELLO_OK_KIND,
    OPERATOR_SCOPES, PROTOCOL_VERSION, PROTOCOL_VERSION_MIN,
};

use crate::config::GatewayConfig;
use crate::dispatch::{MethodError, MethodRegistry, MethodResult};
use crate::store::ConfigStore;

/// Build the registry with the full method surface the gateway serves.
pub fn default_registry(config: Arc<GatewayConfig>, store: Arc<ConfigStore>) -> MethodRegistry {
    let mut registry = MethodRegistry::new();

    {
        let config = config.clone();
        registry.register_fn(methods::CONNECT, move |params, _ctx| {
            let config = config.clone();
            async move { handle_connect(&config, params) }
        });
    }

    registry.register_fn(methods::HEALTH, |_params, _ctx| async move {
        Ok(Some(json!({"ok": true, "ts": unix_ms()})))
    });

    registry.register_fn(methods::STATUS, |_params, _ctx| async move {
        Ok(Some(json!({
            "version": env!("CARGO_PKG_VERSION"),
            "name": "opgate",
        })))
    });

    {
        let store = store.clone();
        registry.register_fn(methods::CONFIG_GET, move |_params, _ctx| {
            let store = store.clone();
            async move { Ok(Some(store.snapshot().await)) }
        });
    }

    registry.register_stub(methods::CONFIG_SCHEMA, Some(Value::Null));

    {
        let store = store.clone();
        registry.register_fn(methods::CONFIG_SET, move |params, _ctx| {
            let store = store.clone();
            async move { handle_config_set(&store, params).await }
        });
    }

    {
        let store = store.clone();
        registry.register_fn(methods::CONFIG_APPLY, move |_params, _ctx| {
            let store = store.clone();
            async move {
                store.reload().await;
                info!("user config reloaded from disk");
                Ok(None)
            }
        });
    }

    registry.register_stub(methods::CHAT_HISTORY, Some(json!({"messages": []})));
    registry.register_stub(
        methods::CHAT_SEND,
        Some(json!({"runId": "stub", "status": "ok"})),
    );
    registry.register_stub(methods::CHAT_ABORT, None);
    registry.register_stub(methods::SESSIONS_LIST, Some(json!({"sessions": []})));
    registry.register_stub(methods::CHANNELS_STATUS, Some(json!({"channels": {}})));
    registry.register_stub(methods::CRON_LIST, Some(json!({"jobs": []})));
    registry.register_stub(methods::CRON_ADD, None);
    registry.register_stub(methods::CRON_RUN, None);
    registry.register_stub(methods::CRON_PATCH, None);
    registry.register_stub(methods::CRON_DELETE, None);
    registry.register_stub(methods::CRON_HISTORY, None);
    registry.register_stub(methods::SKILLS_STATUS, None);
    registry.register_stub(methods::SKILLS_LIST, Some(json!({"skills": []})));
    registry.register_stub(methods::SKILLS_PATCH, None);
    registry.register_stub(methods::SKILLS_INSTALL, None);
    registry.register_stub(methods::NODE_LIST, Some(json!({"nodes": []})));
    registry.register_stub(methods::SYSTEM_PRESENCE, None);
    registry.register_stub(methods::MODELS_LIST, Some(json!({"models": []})));
    registry.register_stub(methods::LOGS_TAIL, Some(json!({"lines": []})));
    registry.register_stub(methods::UPDATE_RUN, None);
    registry.register_stub(methods::EXEC_APPROVAL_RESOLVE, None);

    registry
}

/// Validate the handshake credential and negotiate a protocol version.
///
/// No configured token admits any caller. With a token configured,
/// either credential field must match it exactly. The granted version
/// is `min(PROTOCOL_VERSION, maxProtocol)` and must fall inside the
/// caller's requested bounds.
fn handle_connect(config: &GatewayConfig, params: Option<Value>) -> MethodResult {
    let params: ConnectParams = match params {
        Some(value) => serde_json::from_value(value)
            .map_err(|err| MethodError::new(format!("invalid connect params: {err}")))?,
        None => ConnectParams::default(),
    };

    if let Some(expected) = config.token.as_deref().filter(|t| !t.is_empty()) {
        let provided = params
            .auth
            .as_ref()
            .and_then(|auth| auth.token.as_deref().or(auth.password.as_deref()));
        if provided != Some(expected) {
            return Err(MethodError::new("Invalid token"));
        }
    }

    if params.min_protocol > params.max_protocol {
        return Err(MethodError::new(format!(
            "invalid protocol bounds: min {} > max {}",
            params.min_protocol, params.max_protocol
        )));
    }
    if params.max_protocol < PROTOCOL_VERSION_MIN {
        return Err(MethodError::new(format!(
            "unsupported protocol range: this gateway speaks {PROTOCOL_VERSION_MIN}..={PROTOCOL_VERSION}"
        )));
    }
    let granted = PROTOCOL_VERSION.min(params.max_protocol);
    if granted < params.min_protocol {
        return Err(MethodError::new(format!(
            "unsupported protocol range: this gateway speaks {PROTOCOL_VERSION_MIN}..={PROTOCOL_VERSION}"
        )));
    }

    let hello = HelloOk {
        kind: HELLO_OK_KIND.to_string(),
        protocol: granted,
        policy: Some(HelloPolicy {
            tick_interval_ms: Some(5000),
        }),
        auth: Some(HelloAuth {
            device_token: None,
            role: Some("operator".to_string()),
            scopes: Some(OPERATOR_SCOPES.iter().map(|s| s.to_string()).collect()),
        }),
    };
    let payload = serde_json::to_value(hello)
        .map_err(|err| MethodError::new(format!("failed to encode hello: {err}")))?;
    Ok(Some(payload))
}

/// Replace the user-config document wholesale. The config must be a
/// JSON object; nothing else about its shape is validated.
async fn handle_config_set(store: &ConfigStore, params: Option<Value>) -> MethodResult {
    let params: ConfigSetParams = match params {
        Some(value) => serde_json::from_value(value)
            .map_err(|_| MethodError::new("Missing config"))?,
        None => return Err(MethodError::new("Missing config")),
    };

    let doc = match params.config {
        Value::Object(map) => map,
        _ => return Err(MethodError::new("Config must be an object")),
    };

    store
        .replace(doc)
        .await
        .map_err(|err| MethodError::new(err.to_string()))?;
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use opgate_protocol::AuthParams;

    fn config_with_token(token: Option<&str>) -> GatewayConfig {
        GatewayConfig {
            token: token.map(|t| t.to_string()),
            ..GatewayConfig::default()
        }
    }

    fn connect_value(auth: Option<AuthParams>, min: u32, max: u32) -> Value {
        serde_json::to_value(ConnectParams {
            min_protocol: min,
            max_protocol: max,
            auth,
            ..ConnectParams::default()
        })
        .unwrap()
    }

    #[test]
    fn connect_without_token_configured_admits_anyone() {
        let config = config_with_token(None);
        let payload = handle_connect(&config, None).unwrap().unwrap();
        assert_eq!(payload["type"], "hello-ok");
        assert_eq!(payload["protocol"], PROTOCOL_VERSION);
        assert_eq!(payload["policy"]["tickIntervalMs"], 5000);
    }

    #[test]
    fn connect_with_wrong_token_fails() {
        let config = config_with_token(Some("abc"));
        let params = connect_value(
            Some(AuthParams {
                token: Some("wrong".to_string()),
                password: None,
            }),
            PROTOCOL_VERSION,
            PROTOCOL_VERSION,
        );
        let err = handle_connect(&config, Some(params)).unwrap_err();
        assert_eq!(err.to_string(), "Invalid token");
    }

    #[test]
    fn connect_accepts_token_in_password_field() {
        let config = config_with_token(Some("abc"));
        let params = connect_value(
            Some(AuthParams {
                token: None,
                password: Some("abc".to_string()),
            }),
            PROTOCOL_VERSION,
            PROTOCOL_VERSION,
        );
        let payload = handle_connect(&config, Some(params)).unwrap().unwrap();
        assert_eq!(payload["type"], "hello-ok");
    }

    #[test]
    fn connect_with_missing_auth_fails_when_token_configured() {
        let config = config_with_token(Some("abc"));
        let params = connect_value(None, PROTOCOL_VERSION, PROTOCOL_VERSION);
        let err = handle_connect(&config, Some(params)).unwrap_err();
        assert_eq!(err.to_string(), "Invalid token");
    }

    #[test]
    fn connect_rejects_max_protocol_below_supported_minimum() {
        let config = config_with_token(None);
        let params = connect_value(None, 1, 1);
        let err = handle_connect(&config, Some(params)).unwrap_err();
        assert!(err.to_string().contains("unsupported protocol range"));
    }

    #[test]
    fn connect_rejects_min_protocol_above_granted_version() {
        let config = config_with_token(None);
        let params = connect_value(None, PROTOCOL_VERSION + 1, PROTOCOL_VERSION + 2);
        let err = handle_connect(&config, Some(params)).unwrap_err();
        assert!(err.to_string().contains("unsupported protocol range"));
    }

    #[test]
    fn connect_grants_callers_requested_maximum_when_older() {
        let config = config_with_token(None);
        let params = connect_value(None, PROTOCOL_VERSION_MIN, PROTOCOL_VERSION_MIN);
        let payload = handle_connect(&config, Some(params)).unwrap().unwrap();
        assert_eq!(payload["protocol"], PROTOCOL_VERSION_MIN);
    }

    #[tokio::test]
    async fn config_set_requires_an_object() {
        let store = ConfigStore::in_memory();

        let err = handle_config_set(&store, None).await.unwrap_err();
        assert_eq!(err.to_string(), "Missing config");

        let err = handle_config_set(&store, Some(json!({"config": [1, 2]})))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Config must be an object");
    }

    #[tokio::test]
    async fn config_set_then_get_roundtrips() {
        let store = Arc::new(ConfigStore::in_memory());
        handle_config_set(&store, Some(json!({"config": {"agent": {"x": 1}}})))
            .await
            .unwrap();
        assert_eq!(store.snapshot().await, json!({"agent": {"x": 1}}));
    }

    #[tokio::test]
    async fn default_registry_covers_the_method_surface() {
        let config = Arc::new(GatewayConfig::default());
        let store = Arc::new(ConfigStore::in_memory());
        let registry = default_registry(config, store);

        for method in [
            methods::CONNECT,
            methods::HEALTH,
            methods::STATUS,
            methods::CONFIG_GET,
            methods::CONFIG_SCHEMA,
            methods::CONFIG_SET,
            methods::CONFIG_APPLY,
            methods::CHAT_HISTORY,
            methods::CHAT_SEND,
            methods::CHAT_ABORT,
            methods::SESSIONS_LIST,
            methods::CHANNELS_STATUS,
            methods::CRON_LIST,
            methods::CRON_ADD,
            methods::CRON_RUN,
            methods::CRON_PATCH,
            methods::CRON_DELETE,
            methods::CRON_HISTORY,
            methods::SKILLS_STATUS,
            methods::SKILLS_LIST,
            methods::SKILLS_PATCH,
            methods::SKILLS_INSTALL,
            methods::NODE_LIST,
            methods::SYSTEM_PRESENCE,
            methods::MODELS_LIST,
            methods::LOGS_TAIL,
            methods::UPDATE_RUN,
            methods::EXEC_APPROVAL_RESOLVE,
        ] {
            assert!(registry.get(method).is_some(), "missing handler: {method}");
        }
    }
}
