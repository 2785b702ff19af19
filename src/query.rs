use crate::keys::{canonical_locations, LocKey};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// An in-memory item query: field equality predicates plus an optional
/// result limit.
///
/// Filter paths use dots to descend into nested payload fields. Values are
/// compared after normalization, so a filter value of `2` matches a payload
/// field holding `2.0`, and equivalent date renderings match each other.
///
/// # Examples
///
/// ```
/// use locus_cache::query::ItemQuery;
/// use serde_json::json;
///
/// let query = ItemQuery::new()
///     .with_filter("status", json!("open"))
///     .with_filter("owner.id", json!(7))
///     .with_limit(10);
///
/// assert!(query.matches(&json!({
///     "status": "open",
///     "owner": { "id": "7" },
/// })));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemQuery {
    pub filters: BTreeMap<String, Value>,
    pub limit: Option<usize>,
}

impl ItemQuery {
    /// An empty query matching every item.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an equality predicate on the given dot-separated field path.
    pub fn with_filter(mut self, path: impl Into<String>, value: Value) -> Self {
        self.filters.insert(path.into(), value);
        self
    }

    /// Caps the number of returned items.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Evaluates the predicates against the JSON rendering of an item.
    pub fn matches(&self, item: &Value) -> bool {
        self.filters.iter().all(|(path, expected)| {
            lookup_path(item, path)
                .map(|found| normalize_value(found) == normalize_value(expected))
                .unwrap_or(false)
        })
    }

    /// The normalized JSON shape of this query, used for fingerprinting.
    pub fn shape(&self) -> Value {
        let mut obj = Map::new();
        obj.insert(
            "filters".to_string(),
            Value::Object(self.filters.iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
        );
        if let Some(limit) = self.limit {
            obj.insert("limit".to_string(), Value::from(limit as u64));
        }
        Value::Object(obj)
    }
}

fn lookup_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}

/// Recursively normalizes a JSON value into the canonical shape the query
/// fingerprint is computed over.
///
/// Normalization rules:
///
/// * object keys are sorted (rebuilt in ascending order)
/// * strings that parse as RFC 3339 timestamps are canonicalized to UTC
///   ISO-8601 with millisecond precision
/// * strings that parse as integers coerce to numbers, mirroring key id
///   normalization
/// * floats with an integral value collapse to integers
/// * arrays keep their order, elements are normalized in place
///
/// Logically-equivalent inputs normalize to identical values; structurally
/// different inputs stay different.
///
/// # Examples
///
/// ```
/// use locus_cache::query::normalize_value;
/// use serde_json::json;
///
/// assert_eq!(normalize_value(&json!(2.0)), json!(2));
/// assert_eq!(normalize_value(&json!("2")), json!(2));
/// assert_eq!(
///     normalize_value(&json!({"b": 1, "a": 2})),
///     normalize_value(&json!({"a": 2, "b": 1})),
/// );
/// ```
pub fn normalize_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted: BTreeMap<String, Value> = BTreeMap::new();
            for (k, v) in map {
                sorted.insert(k.clone(), normalize_value(v));
            }
            Value::Object(sorted.into_iter().collect())
        }
        Value::Array(items) => Value::Array(items.iter().map(normalize_value).collect()),
        Value::String(s) => {
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                Value::String(
                    dt.with_timezone(&Utc)
                        .to_rfc3339_opts(SecondsFormat::Millis, true),
                )
            } else if let Ok(n) = s.parse::<i64>() {
                Value::from(n)
            } else {
                Value::String(s.clone())
            }
        }
        Value::Number(n) => {
            if let Some(f) = n.as_f64() {
                if n.as_i64().is_none() && n.as_u64().is_none() && f.fract() == 0.0 {
                    if f >= i64::MIN as f64 && f <= i64::MAX as f64 {
                        return Value::from(f as i64);
                    }
                }
            }
            Value::Number(n.clone())
        }
        other => other.clone(),
    }
}

/// Computes the stable fingerprint of a parameterized query.
///
/// The fingerprint is derived from the operation name, the primary kind, the
/// normalized query shape, and the canonical location chain. Two
/// logically-equivalent queries (same predicates in any key order, same
/// dates in any equivalent rendering) produce the same fingerprint.
///
/// # Examples
///
/// ```
/// use locus_cache::query::query_hash;
/// use serde_json::json;
///
/// let a = query_hash("find", "task", &json!({"a": 1, "b": 2}), &[]);
/// let b = query_hash("find", "task", &json!({"b": 2, "a": 1}), &[]);
/// assert_eq!(a, b);
///
/// let c = query_hash("find", "task", &json!({"a": 1}), &[]);
/// assert_ne!(a, c);
/// ```
pub fn query_hash(operation: &str, pk_type: &str, shape: &Value, locations: &[LocKey]) -> String {
    let normalized = normalize_value(shape);
    let body = serde_json::to_string(&normalized).unwrap_or_default();
    format!(
        "{}:{}:{}:[{}]",
        operation,
        pk_type,
        body,
        canonical_locations(locations)
    )
}

/// Fingerprint shape for a named finder invocation.
pub fn finder_shape(finder: &str, params: &Value) -> Value {
    let mut obj = Map::new();
    obj.insert("finder".to_string(), Value::String(finder.to_string()));
    obj.insert("params".to_string(), params.clone());
    Value::Object(obj)
}
