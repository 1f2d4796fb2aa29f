//! Stable identity selection across candidate fields

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use uuid::Uuid;

static UUID_SHAPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-[1-5][0-9a-f]{3}-[89ab][0-9a-f]{3}-[0-9a-f]{12}$")
        .expect("uuid pattern")
});

/// Canonical v1-v5 UUID check on the hyphenated form.
pub fn is_uuid(value: &str) -> bool {
    UUID_SHAPE.is_match(value.trim())
}

/// First candidate with a canonical UUID shape, in candidate order.
pub fn resolve_identity(candidates: &[&Value]) -> Option<Uuid> {
    candidates
        .iter()
        .filter_map(|candidate| candidate.as_str())
        .map(str::trim)
        .find(|candidate| is_uuid(candidate))
        .and_then(|candidate| Uuid::parse_str(candidate).ok())
}

/// The record's own non-UUID `id`, kept only when no UUID was resolved.
pub fn resolve_legacy_id(record: &Map<String, Value>, resolved: Option<&Uuid>) -> Option<String> {
    if resolved.is_some() {
        return None;
    }
    let raw = match record.get("id")? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    if raw.is_empty() || is_uuid(&raw) {
        None
    } else {
        Some(raw)
    }
}
