//! The JSON-Patch subset hooks use to mutate values
//!
//! Hooks emit patch files containing RFC 6902 operations, either as a
//! JSON array or as one operation object per line. Only `add`, `remove`,
//! `test`, `move` and `copy` are applied; `replace` parses but is
//! rejected during scope validation, and scope validation also pins the
//! first path segment to the hook's scope key.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::path::Path;

use crate::error::{CoreError, Result};
use crate::values::Values;

/// A single patch operation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOp {
    Add,
    Remove,
    Test,
    Move,
    Copy,
    Replace,
}

impl fmt::Display for PatchOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PatchOp::Add => "add",
            PatchOp::Remove => "remove",
            PatchOp::Test => "test",
            PatchOp::Move => "move",
            PatchOp::Copy => "copy",
            PatchOp::Replace => "replace",
        };
        write!(f, "{}", s)
    }
}

/// One `(op, path, value)` triple as emitted by a hook
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchOperation {
    pub op: PatchOp,
    pub path: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<JsonValue>,

    /// Source path for `move` and `copy`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
}

impl fmt::Display for PatchOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(s) => write!(f, "{}", s),
            Err(_) => write!(f, "{{op:{}, path:{}}}", self.op, self.path),
        }
    }
}

/// An ordered sequence of patch operations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValuesPatch {
    pub operations: Vec<PatchOperation>,
}

impl ValuesPatch {
    /// Parse a patch from text: a JSON array of operations, or one
    /// operation object per line. Blank input yields `None`.
    pub fn from_str_opt(content: &str) -> Result<Option<ValuesPatch>> {
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }

        if trimmed.starts_with('[') {
            let operations: Vec<PatchOperation> =
                serde_json::from_str(trimmed).map_err(|e| CoreError::PatchParse {
                    message: e.to_string(),
                })?;
            return Ok(Some(ValuesPatch { operations }));
        }

        let mut operations = Vec::new();
        for line in trimmed.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let op: PatchOperation =
                serde_json::from_str(line).map_err(|e| CoreError::PatchParse {
                    message: format!("line '{}': {}", line, e),
                })?;
            operations.push(op);
        }
        Ok(Some(ValuesPatch { operations }))
    }

    /// Read a patch file. A missing or empty file is "no patch".
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Option<ValuesPatch>> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_str_opt(&content)
    }

    /// Validate every operation against a scope key.
    ///
    /// Fails on any `replace` operation, and on any path whose first
    /// segment differs from `scope_key` (the empty root path is allowed).
    pub fn validate_scope(&self, scope_key: &str) -> Result<()> {
        for op in &self.operations {
            if op.op == PatchOp::Replace {
                return Err(CoreError::UnsupportedOp {
                    op: op.op.to_string(),
                    operation: op.to_string(),
                });
            }

            let segments = parse_pointer(&op.path)?;
            if let Some(first) = segments.first() {
                if first != scope_key {
                    return Err(CoreError::ScopeViolation {
                        segment: first.clone(),
                        scope_key: scope_key.to_string(),
                        operation: op.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

/// Apply a patch to values, returning the new tree and whether it
/// structurally differs from the input.
///
/// Operations apply in sequence; the first failure aborts with an error
/// and the caller discards the intermediate tree, which gives
/// transactional semantics at the invocation boundary.
pub fn apply_patch(values: &Values, patch: &ValuesPatch) -> Result<(Values, bool)> {
    let mut doc = values.0.clone();
    for op in &patch.operations {
        apply_operation(&mut doc, op)?;
    }
    let changed = doc != values.0;
    Ok((Values(doc), changed))
}

fn apply_operation(doc: &mut JsonValue, op: &PatchOperation) -> Result<()> {
    match op.op {
        PatchOp::Add => {
            let value = op.value.clone().ok_or_else(|| CoreError::PatchParse {
                message: format!("add operation without value: '{}'", op),
            })?;
            add_at(doc, &op.path, value)
        }
        PatchOp::Remove => {
            remove_at(doc, &op.path)?;
            Ok(())
        }
        PatchOp::Test => {
            let expected = op.value.clone().unwrap_or(JsonValue::Null);
            let actual = resolve(doc, &op.path)?;
            if *actual != expected {
                return Err(CoreError::TestFailed {
                    path: op.path.clone(),
                });
            }
            Ok(())
        }
        PatchOp::Move => {
            let from = op.from.as_deref().ok_or_else(|| CoreError::PatchParse {
                message: format!("move operation without from: '{}'", op),
            })?;
            let value = remove_at(doc, from)?;
            add_at(doc, &op.path, value)
        }
        PatchOp::Copy => {
            let from = op.from.as_deref().ok_or_else(|| CoreError::PatchParse {
                message: format!("copy operation without from: '{}'", op),
            })?;
            let value = resolve(doc, from)?.clone();
            add_at(doc, &op.path, value)
        }
        PatchOp::Replace => Err(CoreError::UnsupportedOp {
            op: op.op.to_string(),
            operation: op.to_string(),
        }),
    }
}

/// Split a JSON pointer into unescaped segments. `""` is the root.
fn parse_pointer(path: &str) -> Result<Vec<String>> {
    if path.is_empty() {
        return Ok(Vec::new());
    }
    if !path.starts_with('/') {
        return Err(CoreError::InvalidPath {
            path: path.to_string(),
            message: "pointer must start with '/'".to_string(),
        });
    }
    Ok(path[1..]
        .split('/')
        .map(|s| s.replace("~1", "/").replace("~0", "~"))
        .collect())
}

fn resolve<'a>(doc: &'a JsonValue, path: &str) -> Result<&'a JsonValue> {
    let segments = parse_pointer(path)?;
    let mut current = doc;
    for seg in &segments {
        current = match current {
            JsonValue::Object(map) => map.get(seg).ok_or_else(|| CoreError::InvalidPath {
                path: path.to_string(),
                message: format!("key '{}' not found", seg),
            })?,
            JsonValue::Array(arr) => {
                let idx = parse_index(seg, path)?;
                arr.get(idx).ok_or_else(|| CoreError::InvalidPath {
                    path: path.to_string(),
                    message: format!("index {} out of bounds", idx),
                })?
            }
            _ => {
                return Err(CoreError::InvalidPath {
                    path: path.to_string(),
                    message: format!("cannot descend into non-container at '{}'", seg),
                });
            }
        };
    }
    Ok(current)
}

/// Resolve the parent container of `path` mutably, returning it with the
/// final segment. Root paths have no parent.
fn resolve_parent<'a>(
    doc: &'a mut JsonValue,
    path: &str,
) -> Result<(&'a mut JsonValue, String)> {
    let mut segments = parse_pointer(path)?;
    let last = segments.pop().ok_or_else(|| CoreError::InvalidPath {
        path: path.to_string(),
        message: "the root has no parent".to_string(),
    })?;

    let mut current = doc;
    for seg in &segments {
        current = match current {
            JsonValue::Object(map) => map.get_mut(seg).ok_or_else(|| CoreError::InvalidPath {
                path: path.to_string(),
                message: format!("key '{}' not found", seg),
            })?,
            JsonValue::Array(arr) => {
                let idx = parse_index(seg, path)?;
                let len = arr.len();
                arr.get_mut(idx).ok_or_else(|| CoreError::InvalidPath {
                    path: path.to_string(),
                    message: format!("index {} out of bounds (len {})", idx, len),
                })?
            }
            _ => {
                return Err(CoreError::InvalidPath {
                    path: path.to_string(),
                    message: format!("cannot descend into non-container at '{}'", seg),
                });
            }
        };
    }
    Ok((current, last))
}

fn add_at(doc: &mut JsonValue, path: &str, value: JsonValue) -> Result<()> {
    if path.is_empty() {
        *doc = value;
        return Ok(());
    }
    let (parent, last) = resolve_parent(doc, path)?;
    match parent {
        JsonValue::Object(map) => {
            map.insert(last, value);
            Ok(())
        }
        JsonValue::Array(arr) => {
            if last == "-" {
                arr.push(value);
            } else {
                let idx = parse_index(&last, path)?;
                if idx > arr.len() {
                    return Err(CoreError::InvalidPath {
                        path: path.to_string(),
                        message: format!("index {} out of bounds (len {})", idx, arr.len()),
                    });
                }
                arr.insert(idx, value);
            }
            Ok(())
        }
        _ => Err(CoreError::InvalidPath {
            path: path.to_string(),
            message: "parent is not a container".to_string(),
        }),
    }
}

fn remove_at(doc: &mut JsonValue, path: &str) -> Result<JsonValue> {
    let (parent, last) = resolve_parent(doc, path)?;
    match parent {
        JsonValue::Object(map) => map.remove(&last).ok_or_else(|| CoreError::InvalidPath {
            path: path.to_string(),
            message: format!("key '{}' not found", last),
        }),
        JsonValue::Array(arr) => {
            let idx = parse_index(&last, path)?;
            if idx >= arr.len() {
                return Err(CoreError::InvalidPath {
                    path: path.to_string(),
                    message: format!("index {} out of bounds (len {})", idx, arr.len()),
                });
            }
            Ok(arr.remove(idx))
        }
        _ => Err(CoreError::InvalidPath {
            path: path.to_string(),
            message: "parent is not a container".to_string(),
        }),
    }
}

fn parse_index(seg: &str, path: &str) -> Result<usize> {
    seg.parse::<usize>().map_err(|_| CoreError::InvalidPath {
        path: path.to_string(),
        message: format!("'{}' is not an array index", seg),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(json: &str) -> Values {
        Values::from_json(json).unwrap()
    }

    fn patch(json: &str) -> ValuesPatch {
        ValuesPatch::from_str_opt(json).unwrap().unwrap()
    }

    #[test]
    fn test_parse_array_form() {
        let p = patch(r#"[{"op":"add","path":"/global/x","value":1}]"#);
        assert_eq!(p.operations.len(), 1);
        assert_eq!(p.operations[0].op, PatchOp::Add);
    }

    #[test]
    fn test_parse_line_form() {
        let p = patch(
            "{\"op\":\"add\",\"path\":\"/global/x\",\"value\":1}\n{\"op\":\"remove\",\"path\":\"/global/y\"}\n",
        );
        assert_eq!(p.operations.len(), 2);
        assert_eq!(p.operations[1].op, PatchOp::Remove);
    }

    #[test]
    fn test_parse_empty_is_none() {
        assert!(ValuesPatch::from_str_opt("").unwrap().is_none());
        assert!(ValuesPatch::from_str_opt("  \n ").unwrap().is_none());
    }

    #[test]
    fn test_parse_garbage_fails() {
        let result = ValuesPatch::from_str_opt("not json");
        assert!(matches!(result, Err(CoreError::PatchParse { .. })));
    }

    #[test]
    fn test_missing_file_is_none() {
        let p = ValuesPatch::from_file("/nonexistent/patch.json-patch").unwrap();
        assert!(p.is_none());
    }

    #[test]
    fn test_apply_add() {
        let v = values(r#"{"global":{}}"#);
        let p = patch(r#"[{"op":"add","path":"/global/x","value":1}]"#);

        let (new, changed) = apply_patch(&v, &p).unwrap();
        assert!(changed);
        assert_eq!(new.get("global.x").unwrap(), 1);
    }

    #[test]
    fn test_apply_add_missing_parent_fails() {
        let v = values(r#"{"global":{}}"#);
        let p = patch(r#"[{"op":"add","path":"/global/a/b","value":1}]"#);

        assert!(apply_patch(&v, &p).is_err());
    }

    #[test]
    fn test_apply_remove() {
        let v = values(r#"{"global":{"x":1,"y":2}}"#);
        let p = patch(r#"[{"op":"remove","path":"/global/x"}]"#);

        let (new, changed) = apply_patch(&v, &p).unwrap();
        assert!(changed);
        assert!(new.get("global.x").is_none());
        assert_eq!(new.get("global.y").unwrap(), 2);
    }

    #[test]
    fn test_apply_remove_missing_fails() {
        let v = values(r#"{"global":{}}"#);
        let p = patch(r#"[{"op":"remove","path":"/global/x"}]"#);
        assert!(apply_patch(&v, &p).is_err());
    }

    #[test]
    fn test_apply_test_match_and_mismatch() {
        let v = values(r#"{"global":{"x":1}}"#);

        let ok = patch(r#"[{"op":"test","path":"/global/x","value":1}]"#);
        let (_, changed) = apply_patch(&v, &ok).unwrap();
        assert!(!changed);

        let bad = patch(r#"[{"op":"test","path":"/global/x","value":2}]"#);
        assert!(matches!(
            apply_patch(&v, &bad),
            Err(CoreError::TestFailed { .. })
        ));
    }

    #[test]
    fn test_apply_move() {
        let v = values(r#"{"global":{"a":1}}"#);
        let p = patch(r#"[{"op":"move","from":"/global/a","path":"/global/b"}]"#);

        let (new, changed) = apply_patch(&v, &p).unwrap();
        assert!(changed);
        assert!(new.get("global.a").is_none());
        assert_eq!(new.get("global.b").unwrap(), 1);
    }

    #[test]
    fn test_apply_copy() {
        let v = values(r#"{"global":{"a":1}}"#);
        let p = patch(r#"[{"op":"copy","from":"/global/a","path":"/global/b"}]"#);

        let (new, changed) = apply_patch(&v, &p).unwrap();
        assert!(changed);
        assert_eq!(new.get("global.a").unwrap(), 1);
        assert_eq!(new.get("global.b").unwrap(), 1);
    }

    #[test]
    fn test_apply_replace_rejected() {
        let v = values(r#"{"global":{"x":1}}"#);
        let p = patch(r#"[{"op":"replace","path":"/global/x","value":2}]"#);
        assert!(matches!(
            apply_patch(&v, &p),
            Err(CoreError::UnsupportedOp { .. })
        ));
    }

    #[test]
    fn test_apply_array_ops() {
        let v = values(r#"{"global":{"list":[1,2]}}"#);
        let p = patch(
            r#"[{"op":"add","path":"/global/list/-","value":3},{"op":"remove","path":"/global/list/0"}]"#,
        );

        let (new, changed) = apply_patch(&v, &p).unwrap();
        assert!(changed);
        assert_eq!(new.get("global.list").unwrap(), &serde_json::json!([2, 3]));
    }

    #[test]
    fn test_apply_absorbed_is_unchanged() {
        let v = values(r#"{"global":{"x":1}}"#);
        let p = patch(r#"[{"op":"add","path":"/global/x","value":1}]"#);

        let (_, changed) = apply_patch(&v, &p).unwrap();
        assert!(!changed);
    }

    #[test]
    fn test_validate_scope_accepts_own_key() {
        let p = patch(r#"[{"op":"add","path":"/global/x","value":1}]"#);
        assert!(p.validate_scope("global").is_ok());
    }

    #[test]
    fn test_validate_scope_rejects_foreign_key() {
        let p = patch(r#"[{"op":"add","path":"/bar/x","value":1}]"#);
        let err = p.validate_scope("foo").unwrap_err();
        assert!(matches!(err, CoreError::ScopeViolation { .. }));
    }

    #[test]
    fn test_validate_scope_rejects_replace() {
        let p = patch(r#"[{"op":"replace","path":"/global/x","value":1}]"#);
        assert!(matches!(
            p.validate_scope("global"),
            Err(CoreError::UnsupportedOp { .. })
        ));
    }

    #[test]
    fn test_pointer_unescaping() {
        let v = values(r#"{"global":{"a/b":1}}"#);
        let p = patch(r#"[{"op":"test","path":"/global/a~1b","value":1}]"#);
        assert!(apply_patch(&v, &p).is_ok());
    }
}
