//! Remote procedure calls over TCP.

pub mod builtins;
pub mod client;
pub mod error;
pub mod registration;
pub mod registry;
pub mod server;
pub mod service;

pub use client::RpcClient;
pub use error::{HandlerError, RegistrationError, RpcError};
pub use registration::{
    HandlerDescriptor, ParamSpec, ParamType, Procedure, ProcedureCatalog, RegistrationGate,
};
pub use registry::{CallContext, Handler, HandlerRegistry, handler_fn};
pub use server::{RpcServer, ServerConfig, ShutdownHandle};
pub use service::{RpcService, ServiceError};
