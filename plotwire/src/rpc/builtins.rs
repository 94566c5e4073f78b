//! Handlers every server carries, and the procedures deployed with it.

use std::sync::Arc;

use super::error::HandlerError;
use super::registration::{
    ADD_HANDLERS, AddHandlers, ParamSpec, ParamType, Procedure, ProcedureCatalog,
    RegistrationGate,
};
use super::registry::{CallContext, Handler, HandlerRegistry, handler_fn};
use crate::bridge::value::{Value, ValueMap};
use crate::version::VersionInfo;

/// Liveness probe polled by clients while a server starts up.
pub const IS_ACTIVE: &str = "isActive";
pub const VERSION: &str = "version";
pub const LIST_HANDLERS: &str = "listHandlers";

/// Install the built-in handlers on `registry`.
pub fn install(registry: &HandlerRegistry, catalog: Arc<ProcedureCatalog>, gate: RegistrationGate) {
    // Clients pass a placeholder argument; it is ignored.
    registry.add(IS_ACTIVE, handler_fn(|_| Ok(Value::Bool(true))));
    registry.add(
        VERSION,
        handler_fn(|_| Ok(VersionInfo::new().to_value())),
    );

    registry.add(LIST_HANDLERS, ListHandlers);

    if !gate.is_enabled() {
        tracing::info!("Runtime handler registration disabled (no registration token configured)");
    }
    registry.add(
        ADD_HANDLERS,
        AddHandlers::new(catalog, gate)
            .reserve(IS_ACTIVE)
            .reserve(VERSION)
            .reserve(LIST_HANDLERS),
    );
}

struct ListHandlers;

#[async_trait::async_trait]
impl Handler for ListHandlers {
    async fn call(&self, _args: Vec<Value>, ctx: &CallContext<'_>) -> Result<Value, HandlerError> {
        Ok(Value::from(ctx.registry.names()))
    }
}

/// Procedures compiled into the stock server binary.
pub fn default_catalog() -> ProcedureCatalog {
    ProcedureCatalog::new()
        .with(
            "plotwire.echo",
            Procedure::new(
                vec![ParamSpec::new("value", ParamType::Any)],
                handler_fn(|mut args| Ok(args.pop().unwrap_or_default())),
            ),
        )
        .with(
            "plotwire.array_info",
            Procedure::new(
                vec![ParamSpec::new("data", ParamType::Array)],
                handler_fn(|args| {
                    let Some(ds) = args.first().and_then(Value::as_array) else {
                        return Ok(Value::Null);
                    };
                    let mut info = ValueMap::new();
                    info.insert(
                        "dtype".into(),
                        Value::from(format!("{:?}", ds.dtype()).to_lowercase()),
                    );
                    info.insert(
                        "shape".into(),
                        Value::from(ds.shape().iter().map(|&d| d as i64).collect::<Vec<_>>()),
                    );
                    info.insert("size".into(), Value::from(ds.size() as i64));
                    Ok(Value::Map(info))
                }),
            ),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::dataset::Dataset;
    use crate::bridge::protocol::{RequestId, RpcRequest, RpcResponse};
    use crate::rpc::registration::HandlerDescriptor;

    async fn call(registry: &HandlerRegistry, method: &str, args: Vec<Value>) -> Value {
        match registry
            .dispatch(RpcRequest {
                id: RequestId::new(),
                method: method.to_string(),
                args,
            })
            .await
        {
            RpcResponse::Ok { result, .. } => result,
            RpcResponse::Error { error, .. } => panic!("{method} failed: {error}"),
        }
    }

    fn installed(token: Option<&str>) -> HandlerRegistry {
        let registry = HandlerRegistry::new();
        let gate = token.map_or_else(RegistrationGate::disabled, RegistrationGate::with_token);
        install(&registry, Arc::new(default_catalog()), gate);
        registry
    }

    #[tokio::test]
    async fn is_active_answers_true() {
        let registry = installed(None);
        assert_eq!(
            call(&registry, IS_ACTIVE, vec![Value::from("unused")]).await,
            Value::Bool(true)
        );
    }

    #[tokio::test]
    async fn list_handlers_includes_builtins() {
        let registry = installed(None);
        let names = call(&registry, LIST_HANDLERS, vec![]).await;
        assert_eq!(
            names,
            Value::from(vec![ADD_HANDLERS, IS_ACTIVE, LIST_HANDLERS, VERSION])
        );
    }

    #[tokio::test]
    async fn array_info_reports_shape() {
        let registry = installed(Some("t"));
        let descriptor = HandlerDescriptor::new(
            "info",
            "plotwire.array_info",
            vec![ParamSpec::new("data", ParamType::Array)],
        );
        call(
            &registry,
            ADD_HANDLERS,
            vec![Value::from("t"), Value::from(vec![descriptor.to_value()])],
        )
        .await;

        let info = call(&registry, "info", vec![Value::from(Dataset::arange(5))]).await;
        let info = info.as_map().unwrap();
        assert_eq!(info["dtype"], Value::from("int32"));
        assert_eq!(info["shape"], Value::from(vec![5i64]));
        assert_eq!(info["size"], Value::Int(5));
    }
}
