//! Fallback-chain field access over untyped records
//!
//! Every chain is a slice of key paths tried in order; a dotted path (`metadata.client`)
//! walks into nested objects. Keeping the slice next to the field keeps the precedence
//! visible where the field is built.

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use serde_json::{Map, Value};

use crate::sanitize::sanitize_string;

pub type Record = Map<String, Value>;

static EMPTY_RECORD: Lazy<Record> = Lazy::new(Map::new);

/// Object view of a raw entity; anything else reads as an empty record.
pub fn record_of(value: &Value) -> &Record {
    value.as_object().unwrap_or(&EMPTY_RECORD)
}

pub fn lookup<'a>(record: &'a Record, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = record.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// First non-blank value along the chain.
pub fn first_value<'a>(record: &'a Record, chain: &[&str]) -> Option<&'a Value> {
    chain
        .iter()
        .filter_map(|path| lookup(record, path))
        .find(|value| !is_blank(value))
}

/// First chain entry that sanitizes to a non-empty string.
pub fn first_string(record: &Record, chain: &[&str]) -> Option<String> {
    chain
        .iter()
        .filter_map(|path| lookup(record, path))
        .find_map(sanitize_string)
}

/// Strings from an array (or a comma-separated string), trimmed and deduplicated in order.
pub fn string_list(value: Option<&Value>) -> Vec<String> {
    let raw: Vec<String> = match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::Object(map) => ["label", "name", "title"]
                    .iter()
                    .find_map(|key| map.get(*key).and_then(sanitize_string)),
                other => sanitize_string(other),
            })
            .collect(),
        Some(Value::String(s)) => s
            .split(',')
            .map(|part| part.trim().to_string())
            .filter(|part| !part.is_empty())
            .collect(),
        _ => Vec::new(),
    };

    let mut seen = Vec::with_capacity(raw.len());
    for item in raw {
        if !seen.contains(&item) {
            seen.push(item);
        }
    }
    seen
}

/// Non-negative integer from a number or numeric string.
pub fn parse_count(value: Option<&Value>) -> Option<u32> {
    match value? {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0 && f.fract() == 0.0).map(|f| f as u64))
            .and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse::<u32>().ok(),
        _ => None,
    }
}

fn prune_value(value: &Value) -> Option<Value> {
    match value {
        Value::Object(map) => {
            let pruned = prune_object(map);
            if pruned.is_empty() {
                None
            } else {
                Some(Value::Object(pruned.into_iter().collect()))
            }
        }
        Value::String(s) if s.trim().is_empty() => None,
        other if is_blank(other) => None,
        other => Some(other.clone()),
    }
}

fn prune_object(map: &Record) -> IndexMap<String, Value> {
    map.iter()
        .filter_map(|(key, value)| {
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            prune_value(value).map(|value| (key.to_string(), value))
        })
        .collect()
}

/// Free-form metadata with empty keys and empty values removed, order preserved.
pub fn prune_metadata(value: Option<&Value>) -> IndexMap<String, Value> {
    match value {
        Some(Value::Object(map)) => prune_object(map),
        _ => IndexMap::new(),
    }
}
