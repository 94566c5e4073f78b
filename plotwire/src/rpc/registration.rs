//! Runtime handler registration.
//!
//! A running server can gain new remote procedures without a restart, but only
//! procedures that were compiled into the server and listed in its
//! [`ProcedureCatalog`]. A caller registers a *descriptor*: the public name to
//! expose, a typed parameter schema, and a reference to a catalog procedure.
//! The call must present the registration token configured at startup; with
//! no token configured, registration is switched off entirely. Caller-supplied
//! code is never executed.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::error::{HandlerError, RegistrationError};
use super::registry::{CallContext, Handler};
use crate::bridge::value::{Value, ValueMap};

/// Name of the built-in registration handler.
pub const ADD_HANDLERS: &str = "addHandlers";

/// Declared type of a handler parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamType {
    Any,
    Bool,
    Int,
    Float,
    String,
    Binary,
    List,
    Map,
    Array,
}

impl ParamType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::String => "string",
            Self::Binary => "binary",
            Self::List => "list",
            Self::Map => "map",
            Self::Array => "array",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "any" => Self::Any,
            "bool" => Self::Bool,
            "int" => Self::Int,
            "float" => Self::Float,
            "string" => Self::String,
            "binary" => Self::Binary,
            "list" => Self::List,
            "map" => Self::Map,
            "array" => Self::Array,
            _ => return None,
        })
    }

    /// Whether `value` may be passed for a parameter of this type.
    ///
    /// An untagged null fits any parameter. A typed null fits only a parameter
    /// whose declared type matches its tag, which is how callers pick between
    /// overloads that differ in one parameter's type.
    pub fn accepts(self, value: &Value) -> bool {
        match (self, value) {
            (Self::Any, _) | (_, Value::Null) => true,
            (ty, Value::TypedNull(tn)) => tn.declared_type == ty.as_str(),
            (Self::Bool, Value::Bool(_))
            | (Self::Int, Value::Int(_))
            | (Self::Float, Value::Float(_) | Value::Int(_))
            | (Self::String, Value::String(_))
            | (Self::Binary, Value::Binary(_))
            | (Self::List, Value::List(_))
            | (Self::Map, Value::Map(_))
            | (Self::Array, Value::Array(_)) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: String,
    pub ty: ParamType,
}

impl ParamSpec {
    pub fn new(name: impl Into<String>, ty: ParamType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// Request to expose a deployed procedure under a public name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerDescriptor {
    pub name: String,
    pub params: Vec<ParamSpec>,
    pub procedure: String,
}

impl HandlerDescriptor {
    pub fn new(name: impl Into<String>, procedure: impl Into<String>, params: Vec<ParamSpec>) -> Self {
        Self {
            name: name.into(),
            params,
            procedure: procedure.into(),
        }
    }

    pub fn to_value(&self) -> Value {
        let mut map = ValueMap::new();
        map.insert("name".into(), Value::from(self.name.as_str()));
        map.insert(
            "params".into(),
            Value::List(
                self.params
                    .iter()
                    .map(|p| {
                        let mut m = ValueMap::new();
                        m.insert("name".into(), Value::from(p.name.as_str()));
                        m.insert("type".into(), Value::from(p.ty.as_str()));
                        Value::Map(m)
                    })
                    .collect(),
            ),
        );
        map.insert("procedure".into(), Value::from(self.procedure.as_str()));
        Value::Map(map)
    }

    pub fn from_value(value: &Value) -> Result<Self, RegistrationError> {
        let map = value
            .as_map()
            .ok_or_else(|| malformed(format!("expected a map, got {}", value.kind())))?;
        let name = string_field(map, "name")?;
        let procedure = string_field(map, "procedure")?;
        let params = match map.get("params") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::List(items)) => items
                .iter()
                .map(|item| {
                    let m = item
                        .as_map()
                        .ok_or_else(|| malformed(format!("parameter of '{name}' is not a map")))?;
                    let ty_name = string_field(m, "type")?;
                    let ty = ParamType::parse(&ty_name)
                        .ok_or_else(|| malformed(format!("unknown parameter type '{ty_name}'")))?;
                    Ok(ParamSpec::new(string_field(m, "name")?, ty))
                })
                .collect::<Result<_, RegistrationError>>()?,
            Some(other) => return Err(malformed(format!("params must be a list, got {}", other.kind()))),
        };
        Ok(Self {
            name,
            params,
            procedure,
        })
    }
}

fn malformed(msg: impl Into<String>) -> RegistrationError {
    RegistrationError::Malformed(msg.into())
}

fn string_field(map: &ValueMap, key: &str) -> Result<String, RegistrationError> {
    match map.get(key) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        _ => Err(malformed(format!("missing string field '{key}'"))),
    }
}

/// A procedure compiled into the server, with the parameters it expects.
#[derive(Clone)]
pub struct Procedure {
    params: Vec<ParamSpec>,
    handler: Arc<dyn Handler>,
}

impl Procedure {
    pub fn new(params: Vec<ParamSpec>, handler: impl Handler + 'static) -> Self {
        Self {
            params,
            handler: Arc::new(handler),
        }
    }

    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }
}

/// Procedures deployed with the server. Fixed once serving starts.
#[derive(Clone, Default)]
pub struct ProcedureCatalog {
    procedures: HashMap<String, Procedure>,
}

impl ProcedureCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, reference: impl Into<String>, procedure: Procedure) -> Self {
        self.procedures.insert(reference.into(), procedure);
        self
    }

    pub fn get(&self, reference: &str) -> Option<&Procedure> {
        self.procedures.get(reference)
    }

    pub fn len(&self) -> usize {
        self.procedures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.procedures.is_empty()
    }
}

/// Capability check for registration calls.
///
/// Only the SHA-256 digest of the token is kept and compared.
#[derive(Clone, Default)]
pub struct RegistrationGate {
    token_digest: Option<[u8; 32]>,
}

impl RegistrationGate {
    /// Gate that refuses every registration.
    pub fn disabled() -> Self {
        Self { token_digest: None }
    }

    pub fn with_token(token: &str) -> Self {
        Self {
            token_digest: Some(digest(token)),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.token_digest.is_some()
    }

    pub fn check(&self, presented: &str) -> Result<(), RegistrationError> {
        let Some(expected) = self.token_digest else {
            return Err(RegistrationError::Disabled);
        };
        let got = digest(presented);
        let diff = expected
            .iter()
            .zip(got.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b));
        if diff == 0 {
            Ok(())
        } else {
            Err(RegistrationError::BadToken)
        }
    }
}

fn digest(token: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().into()
}

/// Wraps a catalog procedure with argument count and type checks.
struct CheckedHandler {
    name: String,
    params: Vec<ParamSpec>,
    inner: Arc<dyn Handler>,
}

#[async_trait]
impl Handler for CheckedHandler {
    async fn call(&self, args: Vec<Value>, ctx: &CallContext<'_>) -> Result<Value, HandlerError> {
        if args.len() != self.params.len() {
            return Err(HandlerError::invalid_args(format!(
                "{} expects {} arguments, got {}",
                self.name,
                self.params.len(),
                args.len()
            )));
        }
        for (param, arg) in self.params.iter().zip(&args) {
            if !param.ty.accepts(arg) {
                return Err(HandlerError::invalid_args(format!(
                    "{}: parameter '{}' expects {}, got {}",
                    self.name,
                    param.name,
                    param.ty.as_str(),
                    arg.kind()
                )));
            }
        }
        self.inner.call(args, ctx).await
    }
}

/// The `addHandlers(token, descriptors)` built-in.
///
/// Every descriptor in a call is validated before any is installed, so a
/// rejected batch leaves the registry untouched.
pub struct AddHandlers {
    catalog: Arc<ProcedureCatalog>,
    gate: RegistrationGate,
    reserved: Vec<String>,
}

impl AddHandlers {
    pub fn new(catalog: Arc<ProcedureCatalog>, gate: RegistrationGate) -> Self {
        Self {
            catalog,
            gate,
            reserved: vec![ADD_HANDLERS.to_string()],
        }
    }

    /// Names callers may never replace through registration.
    pub fn reserve(mut self, name: impl Into<String>) -> Self {
        self.reserved.push(name.into());
        self
    }

    fn prepare(&self, descriptor: &HandlerDescriptor) -> Result<Arc<dyn Handler>, RegistrationError> {
        if self.reserved.iter().any(|r| r == &descriptor.name) {
            return Err(RegistrationError::Reserved(descriptor.name.clone()));
        }
        let procedure = self
            .catalog
            .get(&descriptor.procedure)
            .ok_or_else(|| RegistrationError::UnknownProcedure(descriptor.procedure.clone()))?;
        if procedure.params != descriptor.params {
            return Err(RegistrationError::SchemaMismatch {
                name: descriptor.name.clone(),
                procedure: descriptor.procedure.clone(),
            });
        }
        Ok(Arc::new(CheckedHandler {
            name: descriptor.name.clone(),
            params: descriptor.params.clone(),
            inner: Arc::clone(&procedure.handler),
        }))
    }
}

#[async_trait]
impl Handler for AddHandlers {
    async fn call(&self, args: Vec<Value>, ctx: &CallContext<'_>) -> Result<Value, HandlerError> {
        let [token, descriptors]: [Value; 2] = args
            .try_into()
            .map_err(|args: Vec<Value>| {
                HandlerError::invalid_args(format!(
                    "{ADD_HANDLERS} expects (token, descriptors), got {} arguments",
                    args.len()
                ))
            })?;
        let token = token
            .as_str()
            .ok_or_else(|| HandlerError::invalid_args("registration token must be a string"))?;
        self.gate.check(token)?;

        let descriptors = descriptors
            .as_list()
            .ok_or_else(|| HandlerError::invalid_args("descriptors must be a list"))?
            .iter()
            .map(HandlerDescriptor::from_value)
            .collect::<Result<Vec<_>, _>>()?;

        let mut prepared = Vec::with_capacity(descriptors.len());
        for descriptor in &descriptors {
            prepared.push((descriptor.name.clone(), self.prepare(descriptor)?));
        }

        let names: Vec<Value> = prepared
            .iter()
            .map(|(name, _)| Value::from(name.as_str()))
            .collect();
        tracing::info!(count = prepared.len(), "Installing runtime handlers");
        ctx.registry.extend(prepared);
        Ok(Value::List(names))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::protocol::{RemoteErrorKind, RequestId, RpcRequest, RpcResponse};
    use crate::bridge::value::TypedNull;
    use crate::rpc::registry::{HandlerRegistry, handler_fn};

    const TOKEN: &str = "s3cret";

    fn catalog() -> Arc<ProcedureCatalog> {
        Arc::new(ProcedureCatalog::new().with(
            "math.double",
            Procedure::new(
                vec![ParamSpec::new("x", ParamType::Int)],
                handler_fn(|args| match args.first() {
                    Some(Value::Int(i)) => Ok(Value::Int(i * 2)),
                    _ => Ok(Value::Null),
                }),
            ),
        ))
    }

    fn registry(gate: RegistrationGate) -> HandlerRegistry {
        let registry = HandlerRegistry::new();
        registry.add(ADD_HANDLERS, AddHandlers::new(catalog(), gate));
        registry
    }

    fn double_descriptor(name: &str) -> Value {
        HandlerDescriptor::new(name, "math.double", vec![ParamSpec::new("x", ParamType::Int)]).to_value()
    }

    async fn call(registry: &HandlerRegistry, method: &str, args: Vec<Value>) -> RpcResponse {
        registry
            .dispatch(RpcRequest {
                id: RequestId::new(),
                method: method.to_string(),
                args,
            })
            .await
    }

    fn error_kind(resp: RpcResponse) -> RemoteErrorKind {
        match resp {
            RpcResponse::Error { error, .. } => error.kind,
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn valid_token_installs_callable_handler() {
        let registry = registry(RegistrationGate::with_token(TOKEN));
        let resp = call(
            &registry,
            ADD_HANDLERS,
            vec![Value::from(TOKEN), Value::from(vec![double_descriptor("double")])],
        )
        .await;
        assert!(matches!(resp, RpcResponse::Ok { .. }));

        match call(&registry, "double", vec![Value::from(21)]).await {
            RpcResponse::Ok { result, .. } => assert_eq!(result, Value::Int(42)),
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[tokio::test]
    async fn wrong_token_installs_nothing() {
        let registry = registry(RegistrationGate::with_token(TOKEN));
        let resp = call(
            &registry,
            ADD_HANDLERS,
            vec![Value::from("guess"), Value::from(vec![double_descriptor("double")])],
        )
        .await;
        assert_eq!(error_kind(resp), RemoteErrorKind::Registration);
        assert!(!registry.contains("double"));
    }

    #[tokio::test]
    async fn disabled_gate_rejects_everything() {
        let registry = registry(RegistrationGate::disabled());
        let resp = call(
            &registry,
            ADD_HANDLERS,
            vec![Value::from(""), Value::from(vec![double_descriptor("double")])],
        )
        .await;
        assert_eq!(error_kind(resp), RemoteErrorKind::Registration);
    }

    #[tokio::test]
    async fn batch_with_unknown_procedure_is_atomic() {
        let registry = registry(RegistrationGate::with_token(TOKEN));
        let bogus = HandlerDescriptor::new("shell", "os.system", vec![]).to_value();
        let resp = call(
            &registry,
            ADD_HANDLERS,
            vec![
                Value::from(TOKEN),
                Value::from(vec![double_descriptor("double"), bogus]),
            ],
        )
        .await;
        assert_eq!(error_kind(resp), RemoteErrorKind::Registration);
        assert!(!registry.contains("double"));
        assert!(!registry.contains("shell"));
    }

    #[tokio::test]
    async fn schema_mismatch_is_rejected() {
        let registry = registry(RegistrationGate::with_token(TOKEN));
        let wrong = HandlerDescriptor::new(
            "double",
            "math.double",
            vec![ParamSpec::new("x", ParamType::String)],
        )
        .to_value();
        let resp = call(
            &registry,
            ADD_HANDLERS,
            vec![Value::from(TOKEN), Value::from(vec![wrong])],
        )
        .await;
        assert_eq!(error_kind(resp), RemoteErrorKind::Registration);
    }

    #[tokio::test]
    async fn cannot_replace_add_handlers() {
        let registry = registry(RegistrationGate::with_token(TOKEN));
        let resp = call(
            &registry,
            ADD_HANDLERS,
            vec![Value::from(TOKEN), Value::from(vec![double_descriptor(ADD_HANDLERS)])],
        )
        .await;
        assert_eq!(error_kind(resp), RemoteErrorKind::Registration);
    }

    #[tokio::test]
    async fn registered_handler_checks_arguments() {
        let registry = registry(RegistrationGate::with_token(TOKEN));
        call(
            &registry,
            ADD_HANDLERS,
            vec![Value::from(TOKEN), Value::from(vec![double_descriptor("double")])],
        )
        .await;

        let resp = call(&registry, "double", vec![Value::from("21")]).await;
        assert_eq!(error_kind(resp), RemoteErrorKind::InvalidArgs);

        let resp = call(&registry, "double", vec![]).await;
        assert_eq!(error_kind(resp), RemoteErrorKind::InvalidArgs);

        let resp = call(&registry, "double", vec![Value::from(TypedNull::new("float"))]).await;
        assert_eq!(error_kind(resp), RemoteErrorKind::InvalidArgs);

        let resp = call(&registry, "double", vec![Value::from(TypedNull::new("int"))]).await;
        assert!(matches!(resp, RpcResponse::Ok { result: Value::Null, .. }));
    }

    #[test]
    fn descriptor_parsing_reports_missing_fields() {
        let mut map = ValueMap::new();
        map.insert("name".into(), Value::from("x"));
        let err = HandlerDescriptor::from_value(&Value::Map(map)).unwrap_err();
        assert_eq!(
            err,
            RegistrationError::Malformed("missing string field 'procedure'".to_string())
        );
    }

    #[test]
    fn descriptor_value_roundtrips() {
        let d = HandlerDescriptor::new(
            "info",
            "plotwire.array_info",
            vec![ParamSpec::new("data", ParamType::Array)],
        );
        assert_eq!(HandlerDescriptor::from_value(&d.to_value()).unwrap(), d);
    }

    #[test]
    fn param_type_acceptance() {
        assert!(ParamType::Float.accepts(&Value::Int(1)));
        assert!(!ParamType::Int.accepts(&Value::Float(1.0)));
        assert!(ParamType::String.accepts(&Value::Null));
        assert!(ParamType::Any.accepts(&Value::from(TypedNull::new("x"))));
    }
}
