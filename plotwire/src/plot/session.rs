//! Local mirror of the renderer's view state.

use std::collections::HashMap;

use super::axes::{AxisRegistry, Direction};
use crate::config::DEFAULT_VIEW;

/// Axis state of one named view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlotView {
    pub x: AxisRegistry,
    pub y: AxisRegistry,
}

impl Default for PlotView {
    fn default() -> Self {
        Self {
            x: AxisRegistry::new(Direction::X),
            y: AxisRegistry::new(Direction::Y),
        }
    }
}

impl PlotView {
    pub fn axes_mut(&mut self, direction: Direction) -> &mut AxisRegistry {
        match direction {
            Direction::X => &mut self.x,
            Direction::Y => &mut self.y,
        }
    }

    pub fn clear(&mut self) {
        self.x.clear();
        self.y.clear();
    }
}

/// Views are created on first reference and live as long as the session.
#[derive(Debug, Clone)]
pub struct PlotSession {
    default_view: String,
    views: HashMap<String, PlotView>,
}

impl Default for PlotSession {
    fn default() -> Self {
        Self::new(DEFAULT_VIEW)
    }
}

impl PlotSession {
    pub fn new(default_view: impl Into<String>) -> Self {
        Self {
            default_view: default_view.into(),
            views: HashMap::new(),
        }
    }

    pub fn default_view(&self) -> &str {
        &self.default_view
    }

    pub fn set_default_view(&mut self, name: impl Into<String>) {
        self.default_view = name.into();
    }

    /// The named view, or the default one.
    pub fn view_name(&self, view: Option<&str>) -> String {
        view.unwrap_or(&self.default_view).to_string()
    }

    pub fn view(&self, name: &str) -> Option<&PlotView> {
        self.views.get(name)
    }

    pub fn view_mut(&mut self, name: &str) -> &mut PlotView {
        self.views.entry(name.to_string()).or_default()
    }

    pub fn clear_view(&mut self, name: &str) {
        if let Some(view) = self.views.get_mut(name) {
            view.clear();
        }
    }
}
