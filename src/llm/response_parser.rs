//! Recovery of JSON payloads from free-form model output.
//!
//! Strategies, in order: fenced code block, outermost bracket span, then the
//! same two on a copy stripped of BOMs and control characters. Every candidate
//! gets a second chance after trailing-comma and single-quote repair. The first
//! candidate that parses to a list or mapping wins.

use crate::error::{preview, PipelineError};
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;
use tracing::{debug, warn};

const PREVIEW_CHARS: usize = 200;

fn fence_pattern() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| Regex::new(r"```[A-Za-z0-9_-]*[ \t]*\r?\n?([\s\S]*?)```").expect("static fence pattern"))
}

fn trailing_comma_pattern() -> &'static Regex {
    static TRAILING: OnceLock<Regex> = OnceLock::new();
    TRAILING.get_or_init(|| Regex::new(r",\s*([\]}])").expect("static comma pattern"))
}

fn single_quoted_key_pattern() -> &'static Regex {
    static KEY: OnceLock<Regex> = OnceLock::new();
    KEY.get_or_init(|| Regex::new(r"([{,]\s*)'([^'\\]*)'(\s*):").expect("static key pattern"))
}

fn single_quoted_value_pattern() -> &'static Regex {
    static VALUE: OnceLock<Regex> = OnceLock::new();
    VALUE.get_or_init(|| {
        Regex::new(r#"([:\[,]\s*)'([^'"\\]*)'(\s*[,}\]])"#).expect("static value pattern")
    })
}

/// Extract a JSON list or mapping from raw model text
pub fn extract_structured(raw: &str) -> Result<Value, PipelineError> {
    let no_data = || PipelineError::NoStructuredData {
        preview: preview(raw, PREVIEW_CHARS),
    };

    if raw.trim().is_empty() {
        return Err(no_data());
    }

    if let Some(value) = from_candidates(raw) {
        return Ok(value);
    }

    let cleaned = strip_invisible(raw);
    if cleaned != raw {
        debug!("Retrying JSON extraction after stripping control characters");
        if let Some(value) = from_candidates(&cleaned) {
            return Ok(value);
        }
    }

    warn!("No structured data in model response: {}", preview(raw, PREVIEW_CHARS));
    Err(no_data())
}

fn from_candidates(text: &str) -> Option<Value> {
    if let Some(caps) = fence_pattern().captures(text) {
        if let Some(value) = try_load(caps[1].trim()) {
            return Some(value);
        }
    }

    if let Some(span) = bracket_span(text) {
        if let Some(value) = try_load(span) {
            return Some(value);
        }
    }

    try_load(text.trim())
}

/// From the first `[`/`{` through the last `]`/`}`
fn bracket_span(text: &str) -> Option<&str> {
    let start = text.find(['[', '{'])?;
    let end = text.rfind([']', '}'])?;
    (end > start).then(|| &text[start..=end])
}

fn try_load(candidate: &str) -> Option<Value> {
    if candidate.is_empty() {
        return None;
    }

    if let Ok(value) = serde_json::from_str::<Value>(candidate) {
        if is_container(&value) {
            return Some(value);
        }
    }

    let repaired = repair_common_errors(candidate);
    serde_json::from_str::<Value>(&repaired)
        .ok()
        .filter(is_container)
}

fn is_container(value: &Value) -> bool {
    matches!(value, Value::Array(_) | Value::Object(_))
}

/// Drop trailing commas and turn simple single-quoted keys/strings into double-quoted ones
pub fn repair_common_errors(text: &str) -> String {
    let text = trailing_comma_pattern().replace_all(text, "$1");
    let text = single_quoted_key_pattern().replace_all(&text, "$1\"$2\"$3:");
    let mut text = text.into_owned();

    // Adjacent values share a delimiter, so one pass only converts every other one
    while single_quoted_value_pattern().is_match(&text) {
        text = single_quoted_value_pattern()
            .replace_all(&text, "$1\"$2\"$3")
            .into_owned();
    }
    text
}

/// Remove byte-order marks and ASCII control characters other than `\n`, `\r`, `\t`
pub fn strip_invisible(text: &str) -> String {
    text.chars()
        .filter(|&ch| ch != '\u{feff}')
        .filter(|&ch| !ch.is_ascii_control() || matches!(ch, '\n' | '\r' | '\t'))
        .collect::<String>()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fenced_block_with_trailing_comma() {
        let value = extract_structured("```json\n[{\"a\":1},]\n```").unwrap();
        assert_eq!(value, json!([{"a": 1}]));
    }

    #[test]
    fn test_fence_without_language_tag() {
        let value = extract_structured("Result:\n```\n{\"ok\": true}\n```\nDone").unwrap();
        assert_eq!(value, json!({"ok": true}));
    }

    #[test]
    fn test_chatty_prose_around_json() {
        let value =
            extract_structured("Sure! Here is the result: [{\"a\":1}] Hope that helps.").unwrap();
        assert_eq!(value, json!([{"a": 1}]));
    }

    #[test]
    fn test_single_quotes_are_repaired() {
        let value = extract_structured("[{'outline': 'Intro', 'start_time': '00:00:01,000'}]").unwrap();
        assert_eq!(value[0]["outline"], "Intro");
        assert_eq!(value[0]["start_time"], "00:00:01,000");
    }

    #[test]
    fn test_single_quoted_array_elements_are_all_repaired() {
        assert_eq!(extract_structured("['a', 'b', 'c']").unwrap(), json!(["a", "b", "c"]));

        let value = extract_structured("[{'title': 'x', 'tags': ['a', 'b']}]").unwrap();
        assert_eq!(value, json!([{"title": "x", "tags": ["a", "b"]}]));
    }

    #[test]
    fn test_control_characters_are_stripped() {
        let raw = "\u{feff}[{\"a\":\u{0007} 1}]";
        let value = extract_structured(raw).unwrap();
        assert_eq!(value, json!([{"a": 1}]));
    }

    #[test]
    fn test_scalars_do_not_count() {
        let err = extract_structured("42").unwrap_err();
        assert!(matches!(err, PipelineError::NoStructuredData { .. }));
    }

    #[test]
    fn test_failure_carries_truncated_preview() {
        let raw = format!("no json here {}", "x".repeat(500));
        match extract_structured(&raw).unwrap_err() {
            PipelineError::NoStructuredData { preview } => {
                assert!(preview.starts_with("no json here"));
                assert!(preview.chars().count() <= PREVIEW_CHARS + 3);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_response_is_an_error() {
        assert!(extract_structured("   \n").is_err());
    }

    #[test]
    fn test_broken_fence_falls_back_to_span() {
        let raw = "```json\nnot valid\n``` but later {\"k\": [1, 2,]}";
        // The span runs from the first bracket, which sits after the fence here
        let value = extract_structured(raw).unwrap();
        assert_eq!(value, json!({"k": [1, 2]}));
    }
}
