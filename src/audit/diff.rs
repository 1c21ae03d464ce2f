//! Before/after snapshot diffing over dotted paths.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

/// Minimal delta between two snapshots.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditDiff {
    /// Sorted, deduplicated dotted paths whose values differ
    pub changed_paths: Vec<String>,
    pub old_values: Value,
    pub new_values: Value,
}

impl AuditDiff {
    pub fn is_empty(&self) -> bool {
        self.changed_paths.is_empty()
    }
}

/// Flatten a snapshot into `dotted.path → leaf` pairs.
///
/// Arrays and empty objects are leaves. RFC 3339 strings are normalized to
/// UTC with millisecond precision so equal instants compare equal. A
/// non-object root is treated as an empty snapshot.
pub fn flatten(value: &Value) -> BTreeMap<String, Value> {
    let mut out = BTreeMap::new();
    if let Value::Object(map) = value {
        for (key, child) in map {
            flatten_into(key.clone(), child, &mut out);
        }
    }
    out
}

fn flatten_into(path: String, value: &Value, out: &mut BTreeMap<String, Value>) {
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (key, child) in map {
                flatten_into(format!("{}.{}", path, key), child, out);
            }
        }
        other => {
            out.insert(path, normalize(other));
        }
    }
}

fn normalize(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(normalize_timestamp(s)),
        Value::Array(items) => Value::Array(items.iter().map(normalize).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), normalize(v)))
                .collect::<Map<String, Value>>(),
        ),
        other => other.clone(),
    }
}

fn normalize_timestamp(s: &str) -> String {
    match DateTime::parse_from_rfc3339(s) {
        Ok(ts) => ts
            .with_timezone(&Utc)
            .to_rfc3339_opts(SecondsFormat::Millis, true),
        Err(_) => s.to_string(),
    }
}

/// Compare two snapshots. Absent values are treated as `null`.
pub fn compute_audit_diff(before: &Value, after: &Value) -> AuditDiff {
    let old_flat = flatten(before);
    let new_flat = flatten(after);

    let paths: BTreeSet<&String> = old_flat.keys().chain(new_flat.keys()).collect();

    let mut changed_paths = Vec::new();
    let mut old_values = Value::Object(Map::new());
    let mut new_values = Value::Object(Map::new());

    for path in paths {
        let old = old_flat.get(path).unwrap_or(&Value::Null);
        let new = new_flat.get(path).unwrap_or(&Value::Null);
        if old == new {
            continue;
        }
        set_path(&mut old_values, path, old.clone());
        set_path(&mut new_values, path, new.clone());
        changed_paths.push(path.clone());
    }

    AuditDiff {
        changed_paths,
        old_values,
        new_values,
    }
}

/// Write `value` at `path`, creating intermediate objects. An intermediate
/// `null` is replaced by an object; any other scalar wins and the write is
/// dropped (the path existed as a leaf on this side).
fn set_path(root: &mut Value, path: &str, value: Value) {
    let mut segments = path.split('.').peekable();
    let mut current = root;

    while let Some(segment) = segments.next() {
        if current.is_null() {
            *current = Value::Object(Map::new());
        }
        let Value::Object(map) = current else {
            return;
        };
        if segments.peek().is_none() {
            map.insert(segment.to_string(), value);
            return;
        }
        current = map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
}
