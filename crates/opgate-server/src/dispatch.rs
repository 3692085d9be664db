use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::Value;
use thiserror::Error;

/// Per-connection context handed to method handlers. The identity is
/// minted at accept time and scopes handler state only; authorization
/// beyond the handshake never keys off it.
#[derive(Debug, Clone)]
pub struct ConnContext {
    pub conn_id: Arc<str>,
}

/// Failure signaled by a method handler; its message travels back to
/// the caller in the `error` field of the response.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct MethodError {
    message: String,
}

impl MethodError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

pub type MethodResult = Result<Option<Value>, MethodError>;

/// A gateway method. Handlers receive the raw request params and the
/// connection context, and run concurrently with other requests on
/// the same and other connections.
pub trait MethodHandler: Send + Sync {
    fn call(&self, params: Option<Value>, ctx: ConnContext) -> BoxFuture<'static, MethodResult>;
}

struct FnHandler<F>(F);

impl<F, Fut> MethodHandler for FnHandler<F>
where
    F: Fn(Option<Value>, ConnContext) -> Fut + Send + Sync,
    Fut: Future<Output = MethodResult> + Send + 'static,
{
    fn call(&self, params: Option<Value>, ctx: ConnContext) -> BoxFuture<'static, MethodResult> {
        Box::pin((self.0)(params, ctx))
    }
}

/// Lookup table from exact method name to handler.
#[derive(Default)]
pub struct MethodRegistry {
    handlers: HashMap<String, Arc<dyn MethodHandler>>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, method: impl Into<String>, handler: Arc<dyn MethodHandler>) {
        self.handlers.insert(method.into(), handler);
    }

    pub fn register_fn<F, Fut>(&mut self, method: impl Into<String>, handler: F)
    where
        F: Fn(Option<Value>, ConnContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = MethodResult> + Send + 'static,
    {
        self.register(method, Arc::new(FnHandler(handler)));
    }

    /// Handler that always succeeds with a fixed payload, for methods
    /// whose business logic lives outside the gateway.
    pub fn register_stub(&mut self, method: impl Into<String>, payload: Option<Value>) {
        self.register_fn(method, move |_params, _ctx| {
            let payload = payload.clone();
            async move { Ok(payload) }
        });
    }

    pub fn get(&self, method: &str) -> Option<Arc<dyn MethodHandler>> {
        self.handlers.get(method).cloned()
    }

    pub fn methods(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(|k| k.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> ConnContext {
        ConnContext {
            conn_id: Arc::from("conn_test"),
        }
    }

    #[tokio::test]
    async fn registered_handler_receives_params_and_context() {
        let mut registry = MethodRegistry::new();
        registry.register_fn("echo", |params, ctx| async move {
            Ok(Some(json!({
                "params": params,
                "conn": ctx.conn_id.as_ref(),
            })))
        });

        let handler = registry.get("echo").expect("handler registered");
        let payload = handler
            .call(Some(json!({"x": 1})), ctx())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(payload["params"]["x"], 1);
        assert_eq!(payload["conn"], "conn_test");
    }

    #[tokio::test]
    async fn stub_handler_returns_fixed_payload() {
        let mut registry = MethodRegistry::new();
        registry.register_stub("sessions.list", Some(json!({"sessions": []})));
        registry.register_stub("chat.abort", None);

        let listed = registry
            .get("sessions.list")
            .unwrap()
            .call(None, ctx())
            .await
            .unwrap();
        assert_eq!(listed, Some(json!({"sessions": []})));

        let aborted = registry
            .get("chat.abort")
            .unwrap()
            .call(None, ctx())
            .await
            .unwrap();
        assert!(aborted.is_none());
    }

    #[test]
    fn lookup_is_exact_match() {
        let mut registry = MethodRegistry::new();
        registry.register_stub("config.get", None);
        assert!(registry.get("config.get").is_some());
        assert!(registry.get("config").is_none());
        assert!(registry.get("config.get.extra").is_none());
    }

    #[tokio::test]
    async fn handler_error_carries_message() {
        let mut registry = MethodRegistry::new();
        registry.register_fn("boom", |_params, _ctx| async move {
            Err(MethodError::new("it broke"))
        });

        let err = registry
            .get("boom")
            .unwrap()
            .call(None, ctx())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "it broke");
    }
}
