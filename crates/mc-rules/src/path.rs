//! JSON-pointer-like projection paths.
//!
//! A path is `/`-separated segments: a key, an array index, or `*` which
//! expands over every element of an array. `""` and `"/"` select the
//! document root. Missing keys and nulls resolve to nothing (the caller
//! skips silently); structural misuse, like descending into a scalar or a
//! wildcard over a non-array, is a type error.

use serde_json::Value;

use crate::error::RuleError;

#[derive(Debug, Clone, PartialEq, Eq)]
enum PathSegment {
    Key(String),
    Index(usize),
    Wildcard,
}

/// A parsed projection path.
#[derive(Debug, Clone)]
pub struct ProjectionPath {
    source: String,
    segments: Vec<PathSegment>,
}

/// Array indices bound while expanding wildcards, in path order.
pub type Bindings = Vec<usize>;

impl ProjectionPath {
    pub fn parse(path: &str) -> Result<Self, RuleError> {
        if path.is_empty() || path == "/" {
            return Ok(Self { source: path.to_string(), segments: Vec::new() });
        }
        let Some(rest) = path.strip_prefix('/') else {
            return Err(RuleError::BadPath {
                path: path.to_string(),
                message: "must start with '/'".to_string(),
            });
        };
        let mut segments = Vec::new();
        for raw in rest.split('/') {
            if raw.is_empty() {
                return Err(RuleError::BadPath {
                    path: path.to_string(),
                    message: "empty segment".to_string(),
                });
            }
            let segment = if raw == "*" {
                PathSegment::Wildcard
            } else if raw.chars().all(|c| c.is_ascii_digit()) {
                PathSegment::Index(raw.parse().map_err(|_| RuleError::BadPath {
                    path: path.to_string(),
                    message: format!("index {raw} out of range"),
                })?)
            } else {
                PathSegment::Key(raw.to_string())
            };
            segments.push(segment);
        }
        Ok(Self { source: path.to_string(), segments })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn has_wildcard(&self) -> bool {
        self.segments.iter().any(|s| matches!(s, PathSegment::Wildcard))
    }

    /// Evaluate against a document, expanding wildcards over array
    /// indices in order. Each result carries the indices its wildcards
    /// bound.
    pub fn evaluate<'a>(&self, root: &'a Value) -> Result<Vec<(Bindings, &'a Value)>, RuleError> {
        self.evaluate_bound(root, &[])
    }

    /// Evaluate with the first wildcards pinned to `bound` indices, so a
    /// secondary projection (edge properties, URN params) can follow the
    /// same array element selected by the primary projection.
    pub fn evaluate_bound<'a>(
        &self,
        root: &'a Value,
        bound: &[usize],
    ) -> Result<Vec<(Bindings, &'a Value)>, RuleError> {
        let mut results = Vec::new();
        self.walk(root, 0, bound, Vec::new(), &mut results)?;
        Ok(results)
    }

    /// Evaluate expecting at most one result under the given bindings.
    pub fn evaluate_single<'a>(
        &self,
        root: &'a Value,
        bound: &[usize],
    ) -> Result<Option<&'a Value>, RuleError> {
        Ok(self.evaluate_bound(root, bound)?.into_iter().map(|(_, v)| v).next())
    }

    fn walk<'a>(
        &self,
        value: &'a Value,
        segment_index: usize,
        bound: &[usize],
        bindings: Bindings,
        results: &mut Vec<(Bindings, &'a Value)>,
    ) -> Result<(), RuleError> {
        if value.is_null() {
            return Ok(());
        }
        let Some(segment) = self.segments.get(segment_index) else {
            results.push((bindings, value));
            return Ok(());
        };
        match segment {
            PathSegment::Key(key) => match value {
                Value::Object(map) => match map.get(key) {
                    Some(next) => self.walk(next, segment_index + 1, bound, bindings, results),
                    None => Ok(()),
                },
                other => Err(self.type_error("object", other)),
            },
            PathSegment::Index(index) => match value {
                Value::Array(items) => match items.get(*index) {
                    Some(next) => self.walk(next, segment_index + 1, bound, bindings, results),
                    None => Ok(()),
                },
                other => Err(self.type_error("array", other)),
            },
            PathSegment::Wildcard => match value {
                Value::Array(items) => {
                    let wildcard_position = bindings.len();
                    if let Some(&pinned) = bound.get(wildcard_position) {
                        if let Some(next) = items.get(pinned) {
                            let mut bindings = bindings;
                            bindings.push(pinned);
                            self.walk(next, segment_index + 1, bound, bindings, results)?;
                        }
                        Ok(())
                    } else {
                        for (index, next) in items.iter().enumerate() {
                            let mut bindings = bindings.clone();
                            bindings.push(index);
                            self.walk(next, segment_index + 1, bound, bindings, results)?;
                        }
                        Ok(())
                    }
                }
                other => Err(self.type_error("array", other)),
            },
        }
    }

    fn type_error(&self, expected: &'static str, found: &Value) -> RuleError {
        RuleError::TypeError {
            path: self.source.clone(),
            expected,
            found: json_type_name(found).to_string(),
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_root_path_selects_document() {
        let path = ProjectionPath::parse("").unwrap();
        let doc = json!({"a": 1});
        let results = path.evaluate(&doc).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].1, &doc);
    }

    #[test]
    fn test_key_navigation() {
        let path = ProjectionPath::parse("/a/b").unwrap();
        let doc = json!({"a": {"b": "found"}});
        let results = path.evaluate(&doc).unwrap();
        assert_eq!(results, vec![(vec![], &json!("found"))]);
    }

    #[test]
    fn test_missing_key_resolves_to_nothing() {
        let path = ProjectionPath::parse("/a/missing").unwrap();
        let doc = json!({"a": {"b": 1}});
        assert!(path.evaluate(&doc).unwrap().is_empty());
    }

    #[test]
    fn test_null_resolves_to_nothing() {
        let path = ProjectionPath::parse("/a/b").unwrap();
        let doc = json!({"a": null});
        assert!(path.evaluate(&doc).unwrap().is_empty());
    }

    #[test]
    fn test_wildcard_expands_in_order() {
        let path = ProjectionPath::parse("/owners/*/owner").unwrap();
        let doc = json!({"owners": [
            {"owner": "urn:li:corpuser:alice"},
            {"owner": "urn:li:corpuser:bob"}
        ]});
        let results = path.evaluate(&doc).unwrap();
        assert_eq!(
            results,
            vec![
                (vec![0], &json!("urn:li:corpuser:alice")),
                (vec![1], &json!("urn:li:corpuser:bob")),
            ]
        );
    }

    #[test]
    fn test_bound_wildcard_follows_one_element() {
        let path = ProjectionPath::parse("/owners/*/type").unwrap();
        let doc = json!({"owners": [{"type": "DATA_OWNER"}, {"type": "STEWARD"}]});
        let results = path.evaluate_bound(&doc, &[1]).unwrap();
        assert_eq!(results, vec![(vec![1], &json!("STEWARD"))]);
    }

    #[test]
    fn test_numeric_index() {
        let path = ProjectionPath::parse("/items/1").unwrap();
        let doc = json!({"items": ["a", "b"]});
        let results = path.evaluate(&doc).unwrap();
        assert_eq!(results[0].1, &json!("b"));
    }

    #[test]
    fn test_descending_into_scalar_is_type_error() {
        let path = ProjectionPath::parse("/a/b").unwrap();
        let doc = json!({"a": "scalar"});
        let err = path.evaluate(&doc).unwrap_err();
        assert!(matches!(err, RuleError::TypeError { .. }));
    }

    #[test]
    fn test_wildcard_over_object_is_type_error() {
        let path = ProjectionPath::parse("/a/*").unwrap();
        let doc = json!({"a": {"b": 1}});
        let err = path.evaluate(&doc).unwrap_err();
        assert!(matches!(err, RuleError::TypeError { .. }));
    }

    #[test]
    fn test_bad_paths_rejected() {
        assert!(ProjectionPath::parse("owners").is_err());
        assert!(ProjectionPath::parse("//x").is_err());
    }
}
