//! Plotting front end: request normalization and per-view axis state.

pub mod axes;
pub mod bean;
pub mod dispatcher;
pub mod error;
pub mod renderer;
pub mod series;
pub mod session;

pub use axes::{AxisChange, AxisRegistry, AxisSide, AxisSpec, Direction, Placement};
pub use bean::{Bean, RoiKind};
pub use dispatcher::{
    ExportFormat, ImageOrder, ImageScan, LinePlot, PlotDispatcher, PlotMode, PointCoords,
    PointSize,
};
pub use error::PlotError;
pub use renderer::{RemoteCall, RemoteRenderer};
pub use series::{Series, SeriesArg};
pub use session::{PlotSession, PlotView};
