//! Dotted path lookups into JSON documents.
//!
//! Supported segments:
//! - `key` selects an object member (`\.` escapes a literal dot)
//! - `3` selects an array element
//! - `#` as the last segment yields the array length; anywhere else it
//!   evaluates the rest of the path on every element and collects the hits
//!
//! ```
//! use serde_json::json;
//! use spiders_core::jsonpath;
//!
//! let doc = json!({"items": [{"id": 1}, {"id": 2}]});
//! assert_eq!(jsonpath::get(&doc, "items.#.id"), Some(json!([1, 2])));
//! assert_eq!(jsonpath::get(&doc, "items.#"), Some(json!(2)));
//! assert_eq!(jsonpath::get(&doc, "items.1.id"), Some(json!(2)));
//! ```

use serde_json::Value;

/// Evaluate `path` against `value`. Missing components yield `None`.
///
/// The empty path selects `value` itself.
pub fn get(value: &Value, path: &str) -> Option<Value> {
    let segments = split(path);
    eval(value, &segments)
}

/// Render a value as text: strings unquoted, `null` as empty, anything
/// else as compact JSON.
pub fn to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// View a value as a list: arrays as-is, `null` as empty, scalars and
/// objects as a single element.
pub fn as_list(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

fn split(path: &str) -> Vec<String> {
    if path.is_empty() {
        return Vec::new();
    }

    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = path.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            '.' => segments.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    segments.push(current);
    segments
}

fn eval(value: &Value, segments: &[String]) -> Option<Value> {
    let Some((head, rest)) = segments.split_first() else {
        return Some(value.clone());
    };

    if head == "#" {
        let items = value.as_array()?;
        if rest.is_empty() {
            return Some(Value::from(items.len()));
        }
        let hits = items.iter().filter_map(|item| eval(item, rest)).collect();
        return Some(Value::Array(hits));
    }

    match value {
        Value::Object(map) => eval(map.get(head.as_str())?, rest),
        Value::Array(items) => {
            let index: usize = head.parse().ok()?;
            eval(items.get(index)?, rest)
        }
        _ => None,
    }
}
