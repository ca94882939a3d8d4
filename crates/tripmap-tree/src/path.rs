//! Dotted paths and navigation over nested payload trees

use crate::value::{is_truthy, type_name};
use crate::{PathError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use tracing::trace;

/// Separator between path segments.
pub const SEPARATOR: char = '.';

/// A sequence of keys joined by `.`; the empty path denotes the current value.
///
/// Numeric segments index into arrays when reading (`legs.0.carrier`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct DottedPath {
    segments: Vec<String>,
}

impl DottedPath {
    /// Parse a dotted path; the empty string yields the empty path.
    pub fn parse(raw: &str) -> Self {
        if raw.is_empty() {
            return Self::default();
        }
        Self {
            segments: raw.split(SEPARATOR).map(str::to_string).collect(),
        }
    }

    /// All segments in order.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// The first segment, if any.
    #[must_use]
    pub fn first(&self) -> Option<&str> {
        self.segments.first().map(String::as_str)
    }

    /// The path without its first segment.
    #[must_use]
    pub fn rest(&self) -> Self {
        Self {
            segments: self.segments.iter().skip(1).cloned().collect(),
        }
    }

    /// Number of segments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// True for the path that denotes the current value.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

impl fmt::Display for DottedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join(&SEPARATOR.to_string()))
    }
}

impl From<String> for DottedPath {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<&str> for DottedPath {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

impl From<DottedPath> for String {
    fn from(path: DottedPath) -> Self {
        path.to_string()
    }
}

/// Resolve `path` inside `source`.
///
/// # Errors
///
/// Returns [`PathError::MissingField`] when a key or index is absent and
/// [`PathError::StructuralMismatch`] when an intermediate value cannot be
/// indexed by the next segment (a scalar, `null`, or an array addressed
/// with a non-numeric key).
pub fn read<'a>(source: &'a Value, path: &DottedPath) -> Result<&'a Value> {
    let mut current = source;
    for segment in path.segments() {
        current = step(current, segment, path)?;
    }
    trace!(path = %path, "resolved path");
    Ok(current)
}

fn step<'a>(node: &'a Value, segment: &str, path: &DottedPath) -> Result<&'a Value> {
    match node {
        Value::Object(map) => map
            .get(segment)
            .ok_or_else(|| PathError::missing(path.to_string(), segment)),
        Value::Array(items) => match segment.parse::<usize>() {
            Ok(index) => items
                .get(index)
                .ok_or_else(|| PathError::missing(path.to_string(), segment)),
            Err(_) => Err(PathError::mismatch(path.to_string(), segment, "array")),
        },
        other => Err(PathError::mismatch(
            path.to_string(),
            segment,
            type_name(other),
        )),
    }
}

/// Write `value` at `path` inside `destination`.
///
/// Missing or falsy intermediate nodes are replaced by empty objects. The
/// empty path replaces `destination` itself. Arrays are only ever written
/// whole.
///
/// # Errors
///
/// Returns [`PathError::StructuralMismatch`] when `destination` or an
/// existing truthy intermediate node is not an object. Nothing is written
/// in that case.
pub fn write(destination: &mut Value, value: Value, path: &DottedPath) -> Result<()> {
    let Some((last, parents)) = path.segments().split_last() else {
        *destination = value;
        return Ok(());
    };

    let mut current = destination;
    for segment in parents {
        let map = as_object_mut(current, segment, path)?;
        let slot = map.entry(segment.clone()).or_insert(Value::Null);
        if !is_truthy(slot) {
            *slot = Value::Object(Map::new());
        }
        current = slot;
    }

    as_object_mut(current, last, path)?.insert(last.clone(), value);
    Ok(())
}

fn as_object_mut<'a>(
    node: &'a mut Value,
    segment: &str,
    path: &DottedPath,
) -> Result<&'a mut Map<String, Value>> {
    match node {
        Value::Object(map) => Ok(map),
        other => Err(PathError::mismatch(
            path.to_string(),
            segment,
            type_name(other),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_splits_on_dots() {
        let path = DottedPath::parse("booking.passenger.name");
        assert_eq!(path.segments(), ["booking", "passenger", "name"]);
        assert_eq!(path.first(), Some("booking"));
        assert_eq!(path.rest().to_string(), "passenger.name");
        assert_eq!(path.len(), 3);
    }

    #[test]
    fn test_parse_empty_is_current_value() {
        let path = DottedPath::parse("");
        assert!(path.is_empty());
        assert_eq!(path.first(), None);
        assert_eq!(path.to_string(), "");
    }

    #[test]
    fn test_read_empty_path_returns_source() {
        let source = json!({"a": 1});
        assert_eq!(read(&source, &DottedPath::default()).unwrap(), &source);
    }

    #[test]
    fn test_read_nested_key() {
        let source = json!({"fare": {"total": {"amount": 120}}});
        let value = read(&source, &"fare.total.amount".into()).unwrap();
        assert_eq!(value, &json!(120));
    }

    #[test]
    fn test_read_array_index() {
        let source = json!({"legs": [{"carrier": "LH"}, {"carrier": "AF"}]});
        let value = read(&source, &"legs.1.carrier".into()).unwrap();
        assert_eq!(value, &json!("AF"));
    }

    #[test]
    fn test_read_missing_key() {
        let source = json!({"fare": {}});
        let err = read(&source, &"fare.total".into()).unwrap_err();
        assert_eq!(err, PathError::missing("fare.total", "total"));
        assert!(err.is_missing());
    }

    #[test]
    fn test_read_index_out_of_range_is_missing() {
        let source = json!({"legs": []});
        let err = read(&source, &"legs.0".into()).unwrap_err();
        assert!(err.is_missing());
    }

    #[test]
    fn test_read_through_null_is_mismatch() {
        let source = json!({"fare": null});
        let err = read(&source, &"fare.total".into()).unwrap_err();
        assert_eq!(err, PathError::mismatch("fare.total", "total", "null"));
    }

    #[test]
    fn test_read_array_with_key_is_mismatch() {
        let source = json!({"legs": [{"carrier": "LH"}]});
        let err = read(&source, &"legs.carrier".into()).unwrap_err();
        assert!(!err.is_missing());
        assert_eq!(err.path(), "legs.carrier");
    }

    #[test]
    fn test_write_single_segment() {
        let mut out = json!({});
        write(&mut out, json!("LH"), &"carrier".into()).unwrap();
        assert_eq!(out, json!({"carrier": "LH"}));
    }

    #[test]
    fn test_write_creates_intermediate_objects() {
        let mut out = json!({"price": {"currency": "EUR"}});
        write(&mut out, json!(99), &"price.total.amount".into()).unwrap();
        assert_eq!(
            out,
            json!({"price": {"currency": "EUR", "total": {"amount": 99}}})
        );
    }

    #[test]
    fn test_write_replaces_falsy_intermediate() {
        let mut out = json!({"price": null, "tax": ""});
        write(&mut out, json!(1), &"price.amount".into()).unwrap();
        write(&mut out, json!(2), &"tax.amount".into()).unwrap();
        assert_eq!(out, json!({"price": {"amount": 1}, "tax": {"amount": 2}}));
    }

    #[test]
    fn test_write_through_truthy_scalar_fails_untouched() {
        let mut out = json!({"price": "free"});
        let err = write(&mut out, json!(1), &"price.amount".into()).unwrap_err();
        assert!(!err.is_missing());
        assert_eq!(out, json!({"price": "free"}));
    }

    #[test]
    fn test_write_empty_path_replaces_destination() {
        let mut out = json!({"old": true});
        write(&mut out, json!([1, 2]), &DottedPath::default()).unwrap();
        assert_eq!(out, json!([1, 2]));
    }

    #[test]
    fn test_serde_as_plain_string() {
        let path: DottedPath = serde_json::from_value(json!("a.b")).unwrap();
        assert_eq!(path.segments(), ["a", "b"]);
        assert_eq!(serde_json::to_value(&path).unwrap(), json!("a.b"));
    }
}
