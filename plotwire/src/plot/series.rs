use crate::bridge::dataset::Dataset;

use super::axes::AxisSpec;

/// One dataset, optionally pinned to a named axis.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub data: Dataset,
    pub axis: Option<AxisSpec>,
}

impl Series {
    pub fn new(data: Dataset) -> Self {
        Self { data, axis: None }
    }

    pub fn on_axis(data: Dataset, axis: AxisSpec) -> Self {
        Self {
            data,
            axis: Some(axis),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl From<Dataset> for Series {
    fn from(data: Dataset) -> Self {
        Self::new(data)
    }
}

/// The x or y argument of a line plot: a single series or several.
#[derive(Debug, Clone, PartialEq)]
pub enum SeriesArg {
    One(Series),
    Many(Vec<Series>),
}

impl SeriesArg {
    pub fn into_vec(self) -> Vec<Series> {
        match self {
            Self::One(series) => vec![series],
            Self::Many(series) => series,
        }
    }
}

impl From<Series> for SeriesArg {
    fn from(series: Series) -> Self {
        Self::One(series)
    }
}

impl From<Dataset> for SeriesArg {
    fn from(data: Dataset) -> Self {
        Self::One(Series::new(data))
    }
}

impl From<Vec<Series>> for SeriesArg {
    fn from(series: Vec<Series>) -> Self {
        Self::Many(series)
    }
}

impl From<Vec<Dataset>> for SeriesArg {
    fn from(data: Vec<Dataset>) -> Self {
        Self::Many(data.into_iter().map(Series::new).collect())
    }
}
