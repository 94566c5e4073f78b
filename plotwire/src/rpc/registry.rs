//! Handler registry and dispatch.
//!
//! The registry is read-mostly: every request takes a read lock just long
//! enough to clone the handler out, so a handler never runs while the lock is
//! held and may itself register more handlers.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;

use super::error::HandlerError;
use crate::bridge::protocol::{RemoteErrorKind, RpcRequest, RpcResponse};
use crate::bridge::value::Value;

/// Per-request context handed to handlers.
pub struct CallContext<'a> {
    pub registry: &'a HandlerRegistry,
}

/// A remote procedure.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn call(&self, args: Vec<Value>, ctx: &CallContext<'_>) -> Result<Value, HandlerError>;
}

/// Adapts a plain synchronous closure into a [`Handler`].
pub struct FnHandler<F>(F);

pub fn handler_fn<F>(f: F) -> FnHandler<F>
where
    F: Fn(Vec<Value>) -> Result<Value, HandlerError> + Send + Sync + 'static,
{
    FnHandler(f)
}

#[async_trait]
impl<F> Handler for FnHandler<F>
where
    F: Fn(Vec<Value>) -> Result<Value, HandlerError> + Send + Sync + 'static,
{
    async fn call(&self, args: Vec<Value>, _ctx: &CallContext<'_>) -> Result<Value, HandlerError> {
        (self.0)(args)
    }
}

/// Name to handler mapping owned by one server.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn Handler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `name`, replacing any previous entry.
    pub fn add(&self, name: impl Into<String>, handler: impl Handler + 'static) {
        self.add_arc(name, Arc::new(handler));
    }

    pub fn add_arc(&self, name: impl Into<String>, handler: Arc<dyn Handler>) {
        let name = name.into();
        let replaced = self
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.clone(), handler)
            .is_some();
        tracing::debug!(handler = %name, replaced, "Registered handler");
    }

    /// Install several handlers under a single write lock.
    pub fn extend(&self, entries: impl IntoIterator<Item = (String, Arc<dyn Handler>)>) {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        for (name, handler) in entries {
            tracing::debug!(handler = %name, "Registered handler");
            handlers.insert(name, handler);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Handler>> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Run the handler named by `request` and wrap the outcome.
    pub async fn dispatch(&self, request: RpcRequest) -> RpcResponse {
        let RpcRequest { id, method, args } = request;

        let Some(handler) = self.get(&method) else {
            tracing::warn!(%method, "Call to unknown handler");
            return RpcResponse::error(
                id,
                RemoteErrorKind::MethodNotFound,
                format!("no handler named '{method}'"),
            );
        };

        let ctx = CallContext { registry: self };
        let start = std::time::Instant::now();
        let outcome = handler.call(args, &ctx).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(result) => {
                tracing::debug!(%method, elapsed_ms, "Handler completed");
                RpcResponse::ok(id, result)
            }
            Err(e) => {
                tracing::warn!(%method, elapsed_ms, error = %e, "Handler failed");
                RpcResponse::error(id, e.kind(), e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::protocol::RequestId;

    fn request(method: &str, args: Vec<Value>) -> RpcRequest {
        RpcRequest {
            id: RequestId::new(),
            method: method.to_string(),
            args,
        }
    }

    fn echo() -> FnHandler<impl Fn(Vec<Value>) -> Result<Value, HandlerError>> {
        handler_fn(|args| Ok(Value::List(args)))
    }

    #[tokio::test]
    async fn dispatch_runs_registered_handler() {
        let registry = HandlerRegistry::new();
        registry.add("echo", echo());

        let resp = registry
            .dispatch(request("echo", vec![Value::from(1), Value::from("a")]))
            .await;
        match resp {
            RpcResponse::Ok { result, .. } => {
                assert_eq!(result, Value::from(vec![Value::from(1), Value::from("a")]));
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[tokio::test]
    async fn dispatch_unknown_method_is_error() {
        let registry = HandlerRegistry::new();
        let req = request("missing", vec![]);
        let id = req.id;
        match registry.dispatch(req).await {
            RpcResponse::Error { id: got, error } => {
                assert_eq!(got, id);
                assert_eq!(error.kind, RemoteErrorKind::MethodNotFound);
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[tokio::test]
    async fn handler_error_kind_is_reported() {
        let registry = HandlerRegistry::new();
        registry.add(
            "strict",
            handler_fn(|_| Err(HandlerError::invalid_args("expected 1 argument"))),
        );
        match registry.dispatch(request("strict", vec![])).await {
            RpcResponse::Error { error, .. } => {
                assert_eq!(error.kind, RemoteErrorKind::InvalidArgs);
                assert_eq!(error.message, "expected 1 argument");
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }

    struct Registrar;

    #[async_trait]
    impl Handler for Registrar {
        async fn call(&self, _args: Vec<Value>, ctx: &CallContext<'_>) -> Result<Value, HandlerError> {
            ctx.registry.add("late", handler_fn(|_| Ok(Value::Bool(true))));
            Ok(Value::Null)
        }
    }

    #[tokio::test]
    async fn handler_can_register_handlers() {
        let registry = HandlerRegistry::new();
        registry.add("register", Registrar);
        assert!(!registry.contains("late"));

        registry.dispatch(request("register", vec![])).await;
        assert!(registry.contains("late"));
        assert_eq!(registry.names(), vec!["late", "register"]);
    }

    #[test]
    fn add_replaces_existing_entry() {
        let registry = HandlerRegistry::new();
        registry.add("x", echo());
        registry.add("x", echo());
        assert_eq!(registry.names(), vec!["x"]);
    }
}
