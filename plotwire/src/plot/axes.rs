//! Per-view axis naming.
//!
//! Each view keeps one ordered list of axis names per direction. Element 0 is
//! the active axis; a fresh view holds only the default name. Custom axis
//! names are resolved batch by batch: the first unknown name in a batch may
//! take over the untouched default axis, the rest are created alongside it.

use std::fmt;

use crate::config::{DEFAULT_X_AXIS, DEFAULT_Y_AXIS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    X,
    Y,
}

impl Direction {
    pub fn default_axis_name(self) -> &'static str {
        match self {
            Self::X => DEFAULT_X_AXIS,
            Self::Y => DEFAULT_Y_AXIS,
        }
    }

    /// Renderer edge for an axis on `side` in this direction.
    pub fn placement(self, side: AxisSide) -> Placement {
        match (self, side) {
            (Self::X, AxisSide::Default | AxisSide::Primary) => Placement::Bottom,
            (Self::X, AxisSide::Secondary) => Placement::Top,
            (Self::Y, AxisSide::Default | AxisSide::Primary) => Placement::Left,
            (Self::Y, AxisSide::Secondary) => Placement::Right,
        }
    }
}

/// Which side of the plot a custom axis sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AxisSide {
    #[default]
    Default,
    /// Bottom for x, left for y.
    Primary,
    /// Top for x, right for y.
    Secondary,
}

impl AxisSide {
    /// Parse the edge names users write: `bottom`/`left` or `top`/`right`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "default" => Some(Self::Default),
            "bottom" | "left" | "primary" => Some(Self::Primary),
            "top" | "right" | "secondary" => Some(Self::Secondary),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Placement {
    Bottom,
    Top,
    Left,
    Right,
}

impl Placement {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bottom => "bottom",
            Self::Top => "top",
            Self::Left => "left",
            Self::Right => "right",
        }
    }
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named axis request attached to a series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AxisSpec {
    pub name: String,
    pub side: AxisSide,
}

impl AxisSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            side: AxisSide::Default,
        }
    }

    pub fn on(name: impl Into<String>, side: AxisSide) -> Self {
        Self {
            name: name.into(),
            side,
        }
    }
}

/// A change to the remote view implied by resolving a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AxisChange {
    /// The active axis took a new name.
    Rename { name: String },
    /// A new axis was added at `placement`.
    Create { name: String, placement: Placement },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AxisRegistry {
    direction: Direction,
    axes: Vec<String>,
}

impl AxisRegistry {
    pub fn new(direction: Direction) -> Self {
        Self {
            direction,
            axes: vec![direction.default_axis_name().to_string()],
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn names(&self) -> &[String] {
        &self.axes
    }

    /// Name of the active axis (element 0).
    pub fn active(&self) -> &str {
        &self.axes[0]
    }

    pub fn len(&self) -> usize {
        self.axes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.axes.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.axes.iter().any(|a| a == name)
    }

    /// True while the registry holds only the untouched default axis.
    pub fn is_pristine(&self) -> bool {
        self.axes.len() == 1 && self.axes[0] == self.direction.default_axis_name()
    }

    /// Resolve one requested axis name.
    ///
    /// Known names resolve to themselves. Otherwise the active axis is renamed
    /// when `rename_pending` is set (which clears it), or a new axis is
    /// appended.
    pub fn resolve(
        &mut self,
        spec: &AxisSpec,
        rename_pending: &mut bool,
    ) -> (String, Option<AxisChange>) {
        if self.contains(&spec.name) {
            return (spec.name.clone(), None);
        }
        let name = spec.name.clone();
        if *rename_pending {
            *rename_pending = false;
            self.axes[0] = name.clone();
            (name.clone(), Some(AxisChange::Rename { name }))
        } else {
            self.axes.push(name.clone());
            let placement = self.direction.placement(spec.side);
            (name.clone(), Some(AxisChange::Create { name, placement }))
        }
    }

    /// Resolve the axis requests of one batch of series, in order.
    ///
    /// `None` entries are plain series on the active axis. The default axis is
    /// renamed only if no series in the batch uses it and no custom axis has
    /// been introduced yet.
    pub fn resolve_batch(&mut self, specs: &[Option<&AxisSpec>]) -> (Vec<String>, Vec<AxisChange>) {
        let default_name = self.direction.default_axis_name();
        let default_users = specs
            .iter()
            .filter(|spec| spec.is_none_or(|s| s.name == default_name))
            .count();
        let mut rename_pending = default_users == 0 && self.is_pristine();

        let mut names = Vec::with_capacity(specs.len());
        let mut changes = Vec::new();
        for spec in specs {
            match spec {
                Some(spec) => {
                    let (name, change) = self.resolve(spec, &mut rename_pending);
                    names.push(name);
                    changes.extend(change);
                }
                None => names.push(self.active().to_string()),
            }
        }
        (names, changes)
    }

    /// Back to the single default axis.
    pub fn clear(&mut self) {
        self.axes.clear();
        self.axes.push(self.direction.default_axis_name().to_string());
    }
}
