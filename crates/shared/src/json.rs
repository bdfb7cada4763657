//! Lookups over loosely-shaped backend JSON payloads.
//!
//! The notification backend does not agree with itself on field names
//! (`event_id` vs `eventId` vs `data.event_id`), so every read goes through
//! these helpers instead of a fixed struct.

use serde_json::Value;

/// Maximum nesting depth walked by [`collect_strings`].
const MAX_WALK_DEPTH: usize = 8;

/// Looks up a dotted path (`data.event_id`) inside a JSON value.
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(value, |current, segment| current.get(segment))
}

/// Returns the first non-null value found among `paths`, in order.
pub fn first_present<'a>(value: &'a Value, paths: &[&str]) -> Option<&'a Value> {
    paths
        .iter()
        .filter_map(|path| lookup(value, path))
        .find(|found| !found.is_null())
}

/// Interprets a JSON value as an identifier.
///
/// Integers (and integral floats) are rendered in decimal; strings are
/// trimmed and accepted when non-empty. Everything else is rejected.
pub fn value_as_id(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(i.to_string())
            } else if let Some(u) = n.as_u64() {
                Some(u.to_string())
            } else {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && f.is_finite())
                    .map(|f| format!("{}", f as i64))
            }
        }
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        _ => None,
    }
}

/// Returns the first identifier found among `paths`.
pub fn first_id(value: &Value, paths: &[&str]) -> Option<String> {
    paths
        .iter()
        .filter_map(|path| lookup(value, path))
        .find_map(value_as_id)
}

/// Returns the first non-blank string found among `paths`.
pub fn first_text(value: &Value, paths: &[&str]) -> Option<String> {
    paths
        .iter()
        .filter_map(|path| lookup(value, path))
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

/// Collects every string leaf of a JSON document, depth-first.
pub fn collect_strings<'a>(value: &'a Value, out: &mut Vec<&'a str>) {
    walk(value, out, 0);
}

fn walk<'a>(value: &'a Value, out: &mut Vec<&'a str>, depth: usize) {
    if depth > MAX_WALK_DEPTH {
        return;
    }
    match value {
        Value::String(s) => out.push(s),
        Value::Array(items) => items.iter().for_each(|item| walk(item, out, depth + 1)),
        Value::Object(map) => map.values().for_each(|item| walk(item, out, depth + 1)),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lookup_nested_path() {
        let payload = json!({"data": {"event_id": 5}});
        assert_eq!(lookup(&payload, "data.event_id"), Some(&json!(5)));
        assert_eq!(lookup(&payload, "data.missing"), None);
        assert_eq!(lookup(&payload, "event_id"), None);
    }

    #[test]
    fn test_first_present_skips_null() {
        let payload = json!({"event_id": null, "eventId": 9});
        assert_eq!(
            first_present(&payload, &["event_id", "eventId"]),
            Some(&json!(9))
        );
    }

    #[test]
    fn test_value_as_id() {
        assert_eq!(value_as_id(&json!(7)), Some("7".to_string()));
        assert_eq!(value_as_id(&json!(7.0)), Some("7".to_string()));
        assert_eq!(value_as_id(&json!(" 42 ")), Some("42".to_string()));
        assert_eq!(value_as_id(&json!("")), None);
        assert_eq!(value_as_id(&json!(7.5)), None);
        assert_eq!(value_as_id(&json!(true)), None);
        assert_eq!(value_as_id(&Value::Null), None);
    }

    #[test]
    fn test_first_id_falls_through_blank_values() {
        let payload = json!({"guest_id": "  ", "guestId": 3});
        assert_eq!(
            first_id(&payload, &["guest_id", "guestId"]),
            Some("3".to_string())
        );
    }

    #[test]
    fn test_first_text() {
        let payload = json!({"title": "", "subject": "Wedding"});
        assert_eq!(
            first_text(&payload, &["title", "subject"]),
            Some("Wedding".to_string())
        );
        assert_eq!(first_text(&payload, &["body"]), None);
    }

    #[test]
    fn test_collect_strings_walks_nested_values() {
        let payload = json!({
            "message": "hello",
            "data": {"links": ["https://a.test/?token=x", 3]},
        });
        let mut strings = Vec::new();
        collect_strings(&payload, &mut strings);
        assert!(strings.contains(&"hello"));
        assert!(strings.contains(&"https://a.test/?token=x"));
        assert_eq!(strings.len(), 2);
    }
}
