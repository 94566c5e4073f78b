use thiserror::Error;

use crate::bridge::staging::StagingError;
use crate::rpc::error::RpcError;

/// Failure of a plotting operation.
///
/// Validation errors are raised before any remote call is issued.
#[derive(Debug, Error)]
pub enum PlotError {
    #[error("length of y ({got}) does not match the length of x ({expected})")]
    ShapeMismatch { expected: usize, got: usize },

    #[error("number of x datasets ({x}) should equal number of y datasets ({y})")]
    CountMismatch { x: usize, y: usize },

    #[error("unsupported type: {0}")]
    UnsupportedType(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error(transparent)]
    Staging(#[from] StagingError),
}

impl PlotError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub fn unsupported_type(message: impl Into<String>) -> Self {
        Self::UnsupportedType(message.into())
    }
}
