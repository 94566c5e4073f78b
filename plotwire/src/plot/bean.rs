//! GUI beans: the renderer's view state as an ordered key/value map.
//!
//! Regions of interest are opaque to this crate. They travel as maps carrying
//! a `kind` and a `name`; nothing else about their geometry is inspected.

use indexmap::IndexMap;

use super::error::PlotError;
use crate::bridge::value::{Value, ValueMap};

pub const ROI: &str = "roi";
pub const ROI_LIST: &str = "roilist";
pub const FILE_SELECT: &str = "fileselect";

/// Key under which an ROI map names its kind.
pub const ROI_KIND_KEY: &str = "kind";
pub const ROI_NAME_KEY: &str = "name";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoiKind {
    Point,
    Line,
    Rectangle,
    Sector,
    Ellipse,
    Circle,
}

impl RoiKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Point => "point",
            Self::Line => "line",
            Self::Rectangle => "rectangle",
            Self::Sector => "sector",
            Self::Ellipse => "ellipse",
            Self::Circle => "circle",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "point" => Some(Self::Point),
            "line" => Some(Self::Line),
            "rectangle" => Some(Self::Rectangle),
            "sector" => Some(Self::Sector),
            "ellipse" => Some(Self::Ellipse),
            "circle" => Some(Self::Circle),
            _ => None,
        }
    }

    /// Kind of an ROI value, if it is a map with a recognised `kind`.
    pub fn of(roi: &Value) -> Option<Self> {
        roi.as_map()?.get(ROI_KIND_KEY)?.as_str().and_then(Self::parse)
    }

    fn matches(filter: Option<Self>, roi: &Value) -> bool {
        filter.is_none_or(|kind| Self::of(roi) == Some(kind))
    }
}

/// Build an ROI value of `kind` named `name` with extra geometry fields.
pub fn roi(kind: RoiKind, name: &str, fields: ValueMap) -> Value {
    let mut map = ValueMap::new();
    map.insert(ROI_KIND_KEY.into(), Value::from(kind.as_str()));
    map.insert(ROI_NAME_KEY.into(), Value::from(name));
    map.extend(fields);
    Value::Map(map)
}

fn roi_name(roi: &Value) -> String {
    roi.as_map()
        .and_then(|m| m.get(ROI_NAME_KEY))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bean(ValueMap);

impl Bean {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interpret a renderer reply. Null means the view has no bean.
    pub fn from_value(value: Value) -> Result<Option<Self>, PlotError> {
        match value {
            Value::Null | Value::TypedNull(_) => Ok(None),
            Value::Map(map) => Ok(Some(Self(map))),
            other => Err(PlotError::unsupported_type(format!(
                "expected a bean map, got {}",
                other.kind()
            ))),
        }
    }

    pub fn into_value(self) -> Value {
        Value::Map(self.0)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn as_map(&self) -> &ValueMap {
        &self.0
    }

    /// The single ROI, optionally only if it is of `kind`.
    pub fn roi(&self, kind: Option<RoiKind>) -> Option<&Value> {
        let roi = self.0.get(ROI).filter(|r| !r.is_null())?;
        RoiKind::matches(kind, roi).then_some(roi)
    }

    pub fn set_roi(&mut self, roi: Value) {
        self.0.insert(ROI.into(), roi);
    }

    /// Null out the ROI, optionally only if it is of `kind`.
    pub fn del_roi(&mut self, kind: Option<RoiKind>) {
        if let Some(roi) = self.0.get_mut(ROI)
            && RoiKind::matches(kind, roi)
        {
            *roi = Value::Null;
        }
    }

    /// ROIs from the list, keyed by name, optionally only those of `kind`.
    ///
    /// `None` when the bean holds no list or the list is empty. A lone ROI
    /// stored in place of a list is treated as a list of one.
    pub fn rois(&self, kind: Option<RoiKind>) -> Option<IndexMap<String, Value>> {
        let stored = self.0.get(ROI_LIST)?;
        let rois: Vec<&Value> = match stored {
            Value::Null | Value::TypedNull(_) => return None,
            Value::List(items) => items.iter().collect(),
            single => vec![single],
        };
        if rois.is_empty() {
            return None;
        }
        Some(
            rois.into_iter()
                .filter(|r| RoiKind::matches(kind, r))
                .map(|r| (roi_name(r), r.clone()))
                .collect(),
        )
    }

    /// Store `rois`, keeping only those of the first item's kind.
    pub fn set_rois(&mut self, rois: Vec<Value>) -> Result<(), PlotError> {
        let kept = match rois.first() {
            None => rois,
            Some(first) => {
                let kind = RoiKind::of(first).ok_or_else(|| {
                    PlotError::unsupported_type("type of first item not supported")
                })?;
                rois.into_iter()
                    .filter(|r| RoiKind::of(r) == Some(kind))
                    .collect()
            }
        };
        self.0.insert(ROI_LIST.into(), Value::List(kept));
        Ok(())
    }

    /// Null out the ROI list, optionally only if it holds ROIs of `kind`.
    pub fn del_rois(&mut self, kind: Option<RoiKind>) {
        let Some(list) = self.0.get_mut(ROI_LIST) else {
            return;
        };
        let matches = match (&*list, kind) {
            (_, None) => true,
            (Value::List(items), Some(_)) => items
                .first()
                .is_some_and(|r| RoiKind::matches(kind, r)),
            (single, Some(_)) => RoiKind::matches(kind, single),
        };
        if matches {
            *list = Value::Null;
        }
    }

    /// Selected file names, sorted. `None` when nothing was selected.
    pub fn files(&self) -> Option<Vec<String>> {
        let selected = self.0.get(FILE_SELECT)?.as_list()?;
        let mut files: Vec<String> = selected
            .iter()
            .filter_map(|f| f.as_str().map(str::to_string))
            .collect();
        files.sort();
        Some(files)
    }
}

impl From<ValueMap> for Bean {
    fn from(map: ValueMap) -> Self {
        Self(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(name: &str) -> Value {
        roi(RoiKind::Line, name, ValueMap::new())
    }

    fn rect(name: &str) -> Value {
        roi(RoiKind::Rectangle, name, ValueMap::new())
    }

    #[test]
    fn from_value_accepts_map_and_null() {
        assert_eq!(Bean::from_value(Value::Null).unwrap(), None);
        let bean = Bean::from_value(Value::Map(ValueMap::new())).unwrap();
        assert_eq!(bean, Some(Bean::new()));
        assert!(matches!(
            Bean::from_value(Value::from(3)),
            Err(PlotError::UnsupportedType(_))
        ));
    }

    #[test]
    fn roi_filtered_by_kind() {
        let mut bean = Bean::new();
        assert!(bean.roi(None).is_none());

        bean.set_roi(line("l1"));
        assert_eq!(bean.roi(None), Some(&line("l1")));
        assert_eq!(bean.roi(Some(RoiKind::Line)), Some(&line("l1")));
        assert!(bean.roi(Some(RoiKind::Sector)).is_none());
    }

    #[test]
    fn del_roi_respects_kind() {
        let mut bean = Bean::new();
        bean.set_roi(line("l1"));
        bean.del_roi(Some(RoiKind::Circle));
        assert!(bean.roi(None).is_some());
        bean.del_roi(Some(RoiKind::Line));
        assert!(bean.roi(None).is_none());
        assert!(bean.contains_key(ROI));
    }

    #[test]
    fn set_rois_keeps_first_kind_only() {
        let mut bean = Bean::new();
        bean.set_rois(vec![line("a"), rect("b"), line("c")]).unwrap();

        let rois = bean.rois(None).unwrap();
        assert_eq!(rois.keys().collect::<Vec<_>>(), ["a", "c"]);
    }

    #[test]
    fn set_rois_rejects_unknown_first_kind() {
        let mut bean = Bean::new();
        let err = bean
            .set_rois(vec![Value::from("not an roi"), line("a")])
            .unwrap_err();
        assert!(matches!(err, PlotError::UnsupportedType(_)));
        assert!(!bean.contains_key(ROI_LIST));
    }

    #[test]
    fn rois_treat_empty_as_none() {
        let mut bean = Bean::new();
        assert!(bean.rois(None).is_none());
        bean.set_rois(vec![]).unwrap();
        assert!(bean.rois(None).is_none());
    }

    #[test]
    fn rois_filter_by_kind() {
        let mut bean = Bean::new();
        bean.insert(ROI_LIST, vec![line("a"), rect("b")]);
        let rects = bean.rois(Some(RoiKind::Rectangle)).unwrap();
        assert_eq!(rects.len(), 1);
        assert_eq!(rects["b"], rect("b"));
    }

    #[test]
    fn del_rois_checks_first_item_kind() {
        let mut bean = Bean::new();
        bean.set_rois(vec![line("a")]).unwrap();
        bean.del_rois(Some(RoiKind::Point));
        assert!(bean.rois(None).is_some());
        bean.del_rois(Some(RoiKind::Line));
        assert!(bean.rois(None).is_none());
    }

    #[test]
    fn files_are_sorted() {
        let mut bean = Bean::new();
        assert!(bean.files().is_none());
        bean.insert(FILE_SELECT, vec!["b.tif", "a.tif"]);
        assert_eq!(bean.files().unwrap(), ["a.tif", "b.tif"]);
    }
}
