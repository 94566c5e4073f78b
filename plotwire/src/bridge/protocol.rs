//! Wire protocol types for client-server RPC.
//!
//! One request frame per call, answered by exactly one response frame with
//! the same id. Arguments are positional.

use serde::{Deserialize, Serialize};

use super::value::Value;

/// Correlates a response with the request that produced it.
///
/// UUID v4 so ids from reconnecting clients never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(uuid::Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Client to server: invoke `method` with positional `args`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub id: RequestId,
    pub method: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

/// Server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RpcResponse {
    Ok { id: RequestId, result: Value },
    Error { id: RequestId, error: RemoteError },
}

impl RpcResponse {
    pub fn ok(id: RequestId, result: Value) -> Self {
        Self::Ok { id, result }
    }

    pub fn error(id: RequestId, kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self::Error {
            id,
            error: RemoteError {
                kind,
                message: message.into(),
            },
        }
    }

    pub fn id(&self) -> RequestId {
        match self {
            Self::Ok { id, .. } | Self::Error { id, .. } => *id,
        }
    }
}

/// Failure reported by the remote side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteError {
    pub kind: RemoteErrorKind,
    pub message: String,
}

impl std::fmt::Display for RemoteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteErrorKind {
    /// No handler registered under the requested name.
    MethodNotFound,
    /// Wrong argument count or type for the handler.
    InvalidArgs,
    /// The handler ran and failed.
    HandlerFailed,
    /// Runtime handler registration was rejected.
    Registration,
    /// A staged array could not be read back.
    Staging,
}

impl RemoteErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MethodNotFound => "method not found",
            Self::InvalidArgs => "invalid arguments",
            Self::HandlerFailed => "handler failed",
            Self::Registration => "registration rejected",
            Self::Staging => "staging failed",
        }
    }
}
