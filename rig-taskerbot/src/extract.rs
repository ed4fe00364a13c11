//! Pulling structured data out of free-form model text

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

fn fenced_block() -> Option<&'static Regex> {
    static FENCE: OnceLock<Option<Regex>> = OnceLock::new();
    FENCE
        .get_or_init(|| Regex::new(r"(?s)```(?:json|JSON)?\s*(\{.*?\})\s*```").ok())
        .as_ref()
}

/// First JSON object found in `text`.
///
/// Tries, in order: a fenced ```` ```json ```` block, the whole trimmed text, and
/// the span between the first `{` and the last `}`.
pub(crate) fn json_object(text: &str) -> Option<Map<String, Value>> {
    let fenced = fenced_block()
        .and_then(|re| re.captures(text))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str());

    let trimmed = text.trim();
    let braced = match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => Some(&trimmed[start..=end]),
        _ => None,
    };

    [fenced, Some(trimmed), braced]
        .into_iter()
        .flatten()
        .find_map(|candidate| match serde_json::from_str::<Value>(candidate) {
            Ok(Value::Object(map)) => Some(map),
            _ => None,
        })
}

/// Value of the first `Key: value` line, case-insensitive on the key
pub(crate) fn labelled_line<'a>(text: &'a str, key: &str) -> Option<&'a str> {
    text.lines().find_map(|line| {
        let (label, value) = line.split_once(':')?;
        let label = label.trim().trim_start_matches(&['*', '#', '-'][..]).trim();
        label.eq_ignore_ascii_case(key).then(|| value.trim().trim_matches('*').trim())
    })
}
