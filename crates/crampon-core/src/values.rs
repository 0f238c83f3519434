//! Values handling with deep merge support
//!
//! A `Values` tree is always rooted at a scope key: `global` for the
//! global scope, or a module's mangled name (see [`crate::names`]) for a
//! module scope. The merge and extraction helpers here preserve that
//! invariant for the manager.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::path::Path;

use crate::error::{CoreError, Result};

/// Top-level key owned by global hooks.
pub const GLOBAL_VALUES_KEY: &str = "global";

/// Values container with deep merge capability
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Values(pub JsonValue);

impl Values {
    /// Create empty values
    pub fn new() -> Self {
        Self(JsonValue::Object(serde_json::Map::new()))
    }

    /// Create values containing a single empty mapping under `scope_key`
    pub fn with_scope_key(scope_key: &str) -> Self {
        let mut map = serde_json::Map::new();
        map.insert(
            scope_key.to_string(),
            JsonValue::Object(serde_json::Map::new()),
        );
        Self(JsonValue::Object(map))
    }

    /// Load values from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse values from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let value: JsonValue = serde_yaml::from_str(yaml)?;
        match value {
            JsonValue::Null => Ok(Self::new()),
            v => Ok(Self(v)),
        }
    }

    /// Parse values from JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        let value: JsonValue = serde_json::from_str(json)?;
        Ok(Self(value))
    }

    /// Deep merge another Values into this one
    ///
    /// Rules:
    /// - Scalars: overlay replaces base
    /// - Objects: recursive merge
    /// - Arrays: overlay replaces base (not appended)
    pub fn merge(&mut self, overlay: &Values) {
        deep_merge(&mut self.0, &overlay.0);
    }

    /// Merge multiple values in order, later ones winning
    pub fn merge_all<I>(values: I) -> Self
    where
        I: IntoIterator<Item = Values>,
    {
        let mut result = Values::new();
        for v in values {
            result.merge(&v);
        }
        result
    }

    /// Get a value by dotted path (e.g., "global.replicas")
    pub fn get(&self, path: &str) -> Option<&JsonValue> {
        let parts: Vec<&str> = path.split('.').collect();
        get_nested(&self.0, &parts)
    }

    /// Get the inner JSON value
    pub fn inner(&self) -> &JsonValue {
        &self.0
    }

    /// Check if values are empty
    pub fn is_empty(&self) -> bool {
        match &self.0 {
            JsonValue::Object(map) => map.is_empty(),
            JsonValue::Null => true,
            _ => false,
        }
    }

    /// Extract the subtree under `scope_key`, rewrapped under that key.
    ///
    /// An absent key yields an empty mapping; a present non-mapping value
    /// is an error. This is the post-patch invariant check: whatever a
    /// hook did, its scope key must still hold a mapping.
    pub fn extract_scope(&self, scope_key: &str) -> Result<Values> {
        let mut result = Values::with_scope_key(scope_key);
        if let Some(raw) = self.0.get(scope_key) {
            if !raw.is_object() {
                return Err(CoreError::NotAMapping {
                    key: scope_key.to_string(),
                });
            }
            if let JsonValue::Object(map) = &mut result.0 {
                map.insert(scope_key.to_string(), raw.clone());
            }
        }
        Ok(result)
    }

    /// Serialize to JSON. Keys come out sorted: the underlying map is
    /// ordered, so the dump is canonical.
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.0)?)
    }

    /// Serialize to pretty JSON (for files hooks read)
    pub fn to_json_string_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.0)?)
    }

    /// Serialize to YAML
    pub fn to_yaml_string(&self) -> Result<String> {
        Ok(serde_yaml::to_string(&self.0)?)
    }
}

/// Deep merge two JSON values
fn deep_merge(base: &mut JsonValue, overlay: &JsonValue) {
    match (base, overlay) {
        (JsonValue::Object(base_map), JsonValue::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => {
                        base_map.insert(key.clone(), overlay_value.clone());
                    }
                }
            }
        }
        (base, overlay) => {
            *base = overlay.clone();
        }
    }
}

/// Get a nested value by path
fn get_nested<'a>(value: &'a JsonValue, path: &[&str]) -> Option<&'a JsonValue> {
    if path.is_empty() {
        return Some(value);
    }

    let key = path[0];
    let remaining = &path[1..];

    match value {
        JsonValue::Object(map) => map.get(key).and_then(|v| get_nested(v, remaining)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deep_merge() {
        let mut base = Values::from_yaml(
            r#"
global:
  replicas: 1
  image:
    repository: nginx
    tag: "1.0"
"#,
        )
        .unwrap();

        let overlay = Values::from_yaml(
            r#"
global:
  replicas: 3
  image:
    tag: "2.0"
    pullPolicy: Always
"#,
        )
        .unwrap();

        base.merge(&overlay);

        assert_eq!(base.get("global.image.repository").unwrap(), "nginx");
        assert_eq!(base.get("global.image.tag").unwrap(), "2.0");
        assert_eq!(base.get("global.image.pullPolicy").unwrap(), "Always");
        assert_eq!(base.get("global.replicas").unwrap(), 3);
    }

    #[test]
    fn test_merge_replaces_arrays() {
        let mut base = Values::from_json(r#"{"global":{"hosts":["a","b"]}}"#).unwrap();
        let overlay = Values::from_json(r#"{"global":{"hosts":["c"]}}"#).unwrap();

        base.merge(&overlay);

        assert_eq!(
            base.get("global.hosts").unwrap(),
            &serde_json::json!(["c"])
        );
    }

    #[test]
    fn test_merge_all_later_wins() {
        let merged = Values::merge_all(vec![
            Values::with_scope_key("global"),
            Values::from_json(r#"{"global":{"a":1,"b":1}}"#).unwrap(),
            Values::from_json(r#"{"global":{"b":2}}"#).unwrap(),
        ]);

        assert_eq!(merged.get("global.a").unwrap(), 1);
        assert_eq!(merged.get("global.b").unwrap(), 2);
    }

    #[test]
    fn test_with_scope_key() {
        let values = Values::with_scope_key("fooBar");
        assert!(values.get("fooBar").unwrap().is_object());
        assert!(!values.is_empty());
    }

    #[test]
    fn test_empty_yaml_is_empty_mapping() {
        let values = Values::from_yaml("").unwrap();
        assert!(values.is_empty());
        assert!(values.inner().is_object());
    }

    #[test]
    fn test_extract_scope_present() {
        let values = Values::from_json(r#"{"global":{"x":1},"other":true}"#).unwrap();
        let scoped = values.extract_scope("global").unwrap();

        assert_eq!(scoped.get("global.x").unwrap(), 1);
        assert!(scoped.get("other").is_none());
    }

    #[test]
    fn test_extract_scope_absent_yields_empty_mapping() {
        let values = Values::new();
        let scoped = values.extract_scope("global").unwrap();
        assert!(scoped.get("global").unwrap().is_object());
    }

    #[test]
    fn test_extract_scope_non_mapping_fails() {
        let values = Values::from_json(r#"{"global":42}"#).unwrap();
        let result = values.extract_scope("global");
        assert!(matches!(result, Err(CoreError::NotAMapping { .. })));
    }

    #[test]
    fn test_canonical_json_dump_sorted_keys() {
        let values = Values::from_json(r#"{"zeta":1,"alpha":2}"#).unwrap();
        assert_eq!(values.to_json_string().unwrap(), r#"{"alpha":2,"zeta":1}"#);
    }
}
