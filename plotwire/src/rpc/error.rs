use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::bridge::protocol::{RemoteError, RemoteErrorKind, RequestId};
use crate::bridge::staging::StagingError;

/// Client-side failure of a remote call. Terminal: nothing is retried.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("transport error: {0}")]
    Io(#[from] io::Error),

    #[error("connection closed before a response arrived")]
    Closed,

    #[error("remote call '{method}' failed: {error}")]
    Remote { method: String, error: RemoteError },

    #[error("response {got} does not answer request {expected}")]
    IdMismatch { expected: RequestId, got: RequestId },

    #[error(transparent)]
    Staging(#[from] StagingError),

    #[error("no active server at {addr} after {waited:?}")]
    Timeout { addr: String, waited: Duration },
}

impl RpcError {
    /// Kind of the remote failure, if the server answered with one.
    pub fn remote_kind(&self) -> Option<RemoteErrorKind> {
        match self {
            Self::Remote { error, .. } => Some(error.kind),
            _ => None,
        }
    }
}

/// Failure raised by a handler while serving a request.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("{0}")]
    InvalidArgs(String),

    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    Registration(#[from] RegistrationError),

    #[error(transparent)]
    Staging(#[from] StagingError),
}

impl HandlerError {
    pub fn invalid_args(message: impl Into<String>) -> Self {
        Self::InvalidArgs(message.into())
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    pub fn kind(&self) -> RemoteErrorKind {
        match self {
            Self::InvalidArgs(_) => RemoteErrorKind::InvalidArgs,
            Self::Failed(_) => RemoteErrorKind::HandlerFailed,
            Self::Registration(_) => RemoteErrorKind::Registration,
            Self::Staging(_) => RemoteErrorKind::Staging,
        }
    }
}

/// Rejected runtime handler registration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    #[error("runtime handler registration is disabled on this server")]
    Disabled,

    #[error("registration token rejected")]
    BadToken,

    #[error("malformed handler descriptor: {0}")]
    Malformed(String),

    #[error("procedure '{0}' is not deployed on this server")]
    UnknownProcedure(String),

    #[error("descriptor for '{name}' does not match the parameters of procedure '{procedure}'")]
    SchemaMismatch { name: String, procedure: String },

    #[error("handler name '{0}' is reserved")]
    Reserved(String),
}
