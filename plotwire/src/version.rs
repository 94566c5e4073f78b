//! Version information for plotwire.

use crate::bridge::value::{Value, ValueMap};

/// Plotwire version from Cargo.toml
pub const PLOTWIRE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Wire protocol revision. Bumped on incompatible frame or value changes.
pub const PROTOCOL_VERSION: u32 = 1;

/// Version information reported by the `version` built-in.
#[derive(Debug, Clone, serde::Serialize)]
pub struct VersionInfo {
    pub plotwire: &'static str,
    pub protocol: u32,
    /// Renderer build, when the embedding application knows it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub renderer: Option<String>,
}

impl Default for VersionInfo {
    fn default() -> Self {
        Self {
            plotwire: PLOTWIRE_VERSION,
            protocol: PROTOCOL_VERSION,
            renderer: None,
        }
    }
}

impl VersionInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_renderer(mut self, version: String) -> Self {
        self.renderer = Some(version);
        self
    }

    pub fn to_value(&self) -> Value {
        let mut map = ValueMap::new();
        map.insert("plotwire".into(), Value::from(self.plotwire));
        map.insert("protocol".into(), Value::Int(i64::from(self.protocol)));
        if let Some(renderer) = &self.renderer {
            map.insert("renderer".into(), Value::from(renderer.as_str()));
        }
        Value::Map(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_info_has_crate_version() {
        let info = VersionInfo::new();
        assert_eq!(info.plotwire, PLOTWIRE_VERSION);
        assert_eq!(info.protocol, PROTOCOL_VERSION);
        assert!(info.renderer.is_none());
    }

    #[test]
    fn version_info_serializes_minimal() {
        let info = VersionInfo {
            plotwire: "0.1.0",
            protocol: 1,
            renderer: None,
        };
        insta::assert_json_snapshot!(info, @r#"
        {
          "plotwire": "0.1.0",
          "protocol": 1
        }
        "#);
    }

    #[test]
    fn version_value_includes_renderer_when_set() {
        let value = VersionInfo::new()
            .with_renderer("2.3".to_string())
            .to_value();
        let map = value.as_map().unwrap();
        assert_eq!(map["renderer"], Value::from("2.3"));
        assert_eq!(map["protocol"], Value::Int(1));
    }
}
