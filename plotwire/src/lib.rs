//! plotwire: plot dispatch and RPC plumbing for a remote visualization renderer.

pub mod bridge;
pub mod config;
pub mod plot;
pub mod rpc;
mod version;

pub use bridge::dataset::{ArrayData, DType, Dataset};
pub use bridge::value::{Binary, TypedNull, Value, ValueMap};
pub use config::Settings;
pub use plot::{LinePlot, PlotDispatcher, PlotError, Series, SeriesArg};
pub use rpc::{RpcClient, RpcError, RpcServer, RpcService, ServerConfig};
pub use version::{PLOTWIRE_VERSION, PROTOCOL_VERSION, VersionInfo};
