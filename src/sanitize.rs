//! Primitive field sanitizers
//!
//! Every function here is total: arbitrary input goes in, a safe value (or `None`) comes out.
//! Callers decide the default when a sanitizer reports absence.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

pub const DEFAULT_COLOR: &str = "#6366f1";

static HEX_COLOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#?([0-9a-fA-F]{6})$").expect("hex color pattern"));
static SLUG_INVALID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-zA-Z0-9._-]+").expect("slug pattern"));
static REPEATED_UNDERSCORE: Lazy<Regex> = Lazy::new(|| Regex::new(r"_+").expect("underscore"));
static EXTENSION_INVALID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-zA-Z0-9.]+").expect("extension pattern"));

/// Trimmed, non-empty string form of a JSON scalar.
pub fn sanitize_string(value: &Value) -> Option<String> {
    let raw = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    if raw.is_empty() {
        None
    } else {
        Some(raw)
    }
}

pub fn sanitize_color(value: &Value, fallback: &str) -> String {
    value
        .as_str()
        .and_then(|s| HEX_COLOR.captures(s.trim()))
        .map(|caps| format!("#{}", &caps[1]))
        .unwrap_or_else(|| fallback.to_string())
}

fn slugify(raw: &str) -> String {
    let stripped: String = raw.nfd().filter(|c| !is_combining_mark(*c)).collect();
    let replaced = SLUG_INVALID.replace_all(&stripped, "_");
    let collapsed = REPEATED_UNDERSCORE.replace_all(&replaced, "_");
    collapsed.trim_matches('_').to_ascii_lowercase()
}

/// URL-safe slug. Idempotent, and never empty when `fallback` is non-empty.
pub fn sanitize_slug(value: &str, fallback: &str) -> String {
    let slug = slugify(value);
    if !slug.is_empty() {
        return slug;
    }
    let fallback_slug = slugify(fallback);
    if !fallback_slug.is_empty() {
        fallback_slug
    } else if fallback.trim().is_empty() {
        String::new()
    } else {
        "item".to_string()
    }
}

/// Slug rules on the base name; the extension keeps only `[a-zA-Z0-9.]`.
pub fn sanitize_storage_file_name(value: &str, fallback: &str) -> String {
    let trimmed = value.trim();
    let (base, extension) = match trimmed.rfind('.') {
        Some(pos) if pos > 0 => (&trimmed[..pos], &trimmed[pos + 1..]),
        _ => (trimmed, ""),
    };
    let base = sanitize_slug(base, fallback);
    let extension = EXTENSION_INVALID
        .replace_all(extension, "")
        .trim_matches('.')
        .to_ascii_lowercase();
    if extension.is_empty() {
        base
    } else {
        format!("{}.{}", base, extension)
    }
}

/// A parsed timestamp in both representations the store and embedded JSON use.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Timestamp {
    pub iso: Option<String>,
    pub ms: Option<i64>,
}

impl Timestamp {
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self {
            iso: Some(dt.to_rfc3339_opts(SecondsFormat::Millis, true)),
            ms: Some(dt.timestamp_millis()),
        }
    }

    pub fn from_millis(ms: i64) -> Self {
        match Utc.timestamp_millis_opt(ms).single() {
            Some(dt) => Self::from_datetime(dt),
            None => Self::default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ms.is_none()
    }
}

fn parse_datetime_str(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Epoch milliseconds, numeric strings or ISO-ish strings. Never fails.
pub fn parse_timestamp(value: &Value) -> Timestamp {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
            .map(Timestamp::from_millis)
            .unwrap_or_default(),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Timestamp::default();
            }
            if let Ok(ms) = trimmed.parse::<i64>() {
                return Timestamp::from_millis(ms);
            }
            parse_datetime_str(trimmed)
                .map(Timestamp::from_datetime)
                .unwrap_or_default()
        }
        _ => Timestamp::default(),
    }
}

pub fn parse_boolean_like(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_f64() {
            Some(f) if f == 1.0 => Some(true),
            Some(f) if f == 0.0 => Some(false),
            _ => None,
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Some(true),
            "false" | "no" | "off" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn string_is_trimmed_and_empty_is_absent() {
        assert_eq!(sanitize_string(&json!("  hello ")), Some("hello".to_string()));
        assert_eq!(sanitize_string(&json!("   ")), None);
        assert_eq!(sanitize_string(&json!(null)), None);
        assert_eq!(sanitize_string(&json!(42)), Some("42".to_string()));
        assert_eq!(sanitize_string(&json!(["a"])), None);
    }

    #[test]
    fn color_accepts_bare_hex_and_falls_back() {
        assert_eq!(sanitize_color(&json!("#A1b2C3"), DEFAULT_COLOR), "#A1b2C3");
        assert_eq!(sanitize_color(&json!("a1b2c3"), DEFAULT_COLOR), "#a1b2c3");
        assert_eq!(sanitize_color(&json!("#abc"), DEFAULT_COLOR), DEFAULT_COLOR);
        assert_eq!(sanitize_color(&json!("red"), "#000000"), "#000000");
        assert_eq!(sanitize_color(&json!(123456), DEFAULT_COLOR), DEFAULT_COLOR);
    }

    #[test]
    fn slug_strips_accents_and_collapses_separators() {
        assert_eq!(sanitize_slug("Équipe Été  2024!!", "x"), "equipe_ete_2024");
        assert_eq!(sanitize_slug("__Hello///World__", "x"), "hello_world");
        assert_eq!(sanitize_slug("keep.dots-and-dashes", "x"), "keep.dots-and-dashes");
        assert_eq!(sanitize_slug("!!!", "Fallback Name"), "fallback_name");
        assert_eq!(sanitize_slug("", "???"), "item");
        assert_eq!(sanitize_slug("", ""), "");
    }

    #[test]
    fn slug_is_idempotent() {
        let samples = [
            "Ça va? Très bien",
            "  multiple   spaces ",
            "MiXeD_Case-123",
            "émoji 🚀 test",
            "a__b__c",
            "日本語",
            "._leading",
        ];
        for sample in samples {
            let once = sanitize_slug(sample, "fallback");
            assert_eq!(sanitize_slug(&once, "fallback"), once, "sample {:?}", sample);
        }
    }

    #[test]
    fn storage_file_name_sanitizes_base_and_extension() {
        assert_eq!(sanitize_storage_file_name("Mon Logo (v2).PNG", "logo"), "mon_logo_v2.png");
        assert_eq!(sanitize_storage_file_name("report", "logo"), "report");
        assert_eq!(sanitize_storage_file_name(".png", "logo"), ".png");
        assert_eq!(sanitize_storage_file_name("???.jp g", "logo"), "logo.jpg");
    }

    #[test]
    fn timestamp_accepts_common_shapes() {
        let from_ms = parse_timestamp(&json!(1717200000000i64));
        assert_eq!(from_ms.iso.as_deref(), Some("2024-06-01T00:00:00.000Z"));

        let from_date = parse_timestamp(&json!("2024-06-01"));
        assert_eq!(from_date.ms, Some(1717200000000));

        let from_rfc = parse_timestamp(&json!("2024-06-01T02:00:00+02:00"));
        assert_eq!(from_rfc.ms, Some(1717200000000));

        let from_naive = parse_timestamp(&json!("2024-06-01 00:00:00"));
        assert_eq!(from_naive.ms, Some(1717200000000));

        let from_numeric_string = parse_timestamp(&json!("1717200000000"));
        assert_eq!(from_numeric_string.ms, Some(1717200000000));
    }

    #[test]
    fn timestamp_failure_is_empty() {
        assert!(parse_timestamp(&json!("not a date")).is_empty());
        assert!(parse_timestamp(&json!(null)).is_empty());
        assert!(parse_timestamp(&json!({"a": 1})).is_empty());
        assert_eq!(parse_timestamp(&json!("")), Timestamp::default());
    }

    #[test]
    fn boolean_like_tokens() {
        assert_eq!(parse_boolean_like(&json!(true)), Some(true));
        assert_eq!(parse_boolean_like(&json!(0)), Some(false));
        assert_eq!(parse_boolean_like(&json!(" YES ")), Some(true));
        assert_eq!(parse_boolean_like(&json!("off")), Some(false));
        assert_eq!(parse_boolean_like(&json!("maybe")), None);
        assert_eq!(parse_boolean_like(&json!(2)), None);
        assert_eq!(parse_boolean_like(&json!(null)), None);
    }
}
