// Utility helpers for walking release JSON, parsing timestamps and basic
// formatting.
//
// This module centralizes all the "dirty" optional-field handling so the
// mappers can read a path in one expression and declare a single default.
use crate::types::MISSING;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use num_format::{Locale, ToFormattedString};
use serde_json::Value;

/// A possibly-absent position inside a release.
///
/// Each step (`get`, `at`, `first`, `last`) yields another `Node`; stepping
/// through something that is missing or of the wrong shape simply stays
/// missing, so a long path never needs null-guarding at the call site.
#[derive(Debug, Clone, Copy)]
pub struct Node<'a>(Option<&'a Value>);

impl<'a> Node<'a> {
    pub fn new(value: &'a Value) -> Self {
        Node(Some(value))
    }

    pub fn get(self, key: &str) -> Node<'a> {
        Node(self.0.and_then(|v| v.as_object()).and_then(|o| o.get(key)))
    }

    pub fn at(self, index: usize) -> Node<'a> {
        Node(self.0.and_then(Value::as_array).and_then(|a| a.get(index)))
    }

    pub fn first(self) -> Node<'a> {
        self.at(0)
    }

    pub fn last(self) -> Node<'a> {
        Node(self.0.and_then(Value::as_array).and_then(|a| a.last()))
    }

    /// Elements of an array node; nothing for any other shape.
    pub fn items(self) -> impl Iterator<Item = Node<'a>> {
        self.0
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .map(Node::new)
    }

    /// Array length, zero for anything that is not an array.
    pub fn len(self) -> usize {
        self.0.and_then(Value::as_array).map_or(0, Vec::len)
    }

    pub fn exists(self) -> bool {
        self.0.is_some()
    }

    pub fn value(self) -> Option<&'a Value> {
        self.0
    }

    pub fn as_str(self) -> Option<&'a str> {
        self.0.and_then(Value::as_str)
    }

    /// Loose truthiness: false for missing, null, `false`, zero, and empty
    /// strings, arrays or objects.
    pub fn is_truthy(self) -> bool {
        match self.0 {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
            Some(Value::String(s)) => !s.is_empty(),
            Some(Value::Array(a)) => !a.is_empty(),
            Some(Value::Object(o)) => !o.is_empty(),
        }
    }

    /// The value at this position (null included), or `default` when absent.
    pub fn or(self, default: impl Into<Value>) -> Value {
        self.0.cloned().unwrap_or_else(|| default.into())
    }

    pub fn or_missing(self) -> Value {
        self.or(MISSING)
    }
}

/// Parse an OCDS timestamp into UTC.
///
/// - RFC 3339 with offset or `Z` (`2020-01-01T00:00:00+00:00`).
/// - Compact offsets (`2020-01-01T00:00:00+0000`).
/// - Naive date-times and plain dates, read as UTC.
/// - Returns `None` for anything else, including blanks and the missing marker.
pub fn parse_timestamp_safe(s: Option<&str>) -> Option<DateTime<Utc>> {
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%z") {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Whole days from `start` to `end`, rounded down (negative when `end` is earlier).
pub fn whole_days_between(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    (end - start).num_seconds().div_euclid(86_400)
}

/// Checks a `%Y-%m-%dT%H:%M:%S` window bound as accepted by the release API.
pub fn is_window_timestamp(s: &str) -> bool {
    NaiveDateTime::parse_from_str(s.trim(), "%Y-%m-%dT%H:%M:%S").is_ok()
}

pub fn format_int<T>(n: T) -> String
where
    T: ToFormattedString,
{
    // Thin wrapper around `num-format` for counts in log and console
    // messages (e.g., `1,204 releases`).
    n.to_formatted_string(&Locale::en)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn node_walks_missing_paths_without_panicking() {
        let v = json!({"tender": {"lots": [{"id": "1"}], "title": null}});
        let root = Node::new(&v);
        assert_eq!(root.get("tender").get("lots").first().get("id").as_str(), Some("1"));
        assert!(!root.get("awards").first().get("value").exists());
        assert_eq!(root.get("tender").get("lots").at(3).or_missing(), json!("N/A"));
        // present-but-null is a value, not a missing field
        assert_eq!(root.get("tender").get("title").or_missing(), Value::Null);
        assert_eq!(root.get("tender").get("lots").len(), 1);
        assert_eq!(root.get("tender").get("title").len(), 0);
    }

    #[test]
    fn truthiness_follows_empty_containers() {
        let v = json!({"a": [], "b": {}, "c": "", "d": 0, "e": [1], "f": true});
        let root = Node::new(&v);
        for key in ["a", "b", "c", "d", "missing"] {
            assert!(!root.get(key).is_truthy(), "{key}");
        }
        assert!(root.get("e").is_truthy());
        assert!(root.get("f").is_truthy());
    }

    #[test]
    fn parses_offset_naive_and_date_only_timestamps() {
        let expected = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(parse_timestamp_safe(Some("2020-01-01T00:00:00+00:00")), Some(expected));
        assert_eq!(parse_timestamp_safe(Some("2020-01-01T00:00:00Z")), Some(expected));
        assert_eq!(parse_timestamp_safe(Some("2020-01-01T01:00:00+0100")), Some(expected));
        assert_eq!(parse_timestamp_safe(Some("2020-01-01T00:00:00")), Some(expected));
        assert_eq!(parse_timestamp_safe(Some("2020-01-01")), Some(expected));
        assert_eq!(parse_timestamp_safe(Some("N/A")), None);
        assert_eq!(parse_timestamp_safe(Some("  ")), None);
        assert_eq!(parse_timestamp_safe(None), None);
    }

    #[test]
    fn whole_days_round_down() {
        let a = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let b = Utc.with_ymd_and_hms(2020, 2, 15, 0, 0, 0).unwrap();
        assert_eq!(whole_days_between(a, b), 45);
        assert_eq!(whole_days_between(a, b - chrono::Duration::hours(1)), 44);
        assert_eq!(whole_days_between(b, a + chrono::Duration::hours(1)), -45);
    }

    #[test]
    fn window_timestamps_are_second_precision() {
        assert!(is_window_timestamp("2025-02-24T00:00:00"));
        assert!(!is_window_timestamp("2025-02-24"));
    }

    #[test]
    fn formats_counts_with_separators() {
        assert_eq!(format_int(1204), "1,204");
    }
}
