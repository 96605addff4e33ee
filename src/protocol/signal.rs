//! Completion-signal detection and answer extraction.
//!
//! Model output is free-form text. Everything the protocols need to read
//! out of it goes through the pure functions here: whether the remote
//! signalled completion, the answer it gave, the follow-up it asked for,
//! and whether a chunk worker found anything relevant.
//!
//! A JSON object (bare or inside a fenced block) is read first; plain-text
//! markers are the fallback.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::OnceLock;

/// Marker a chunk worker returns when its chunk has nothing for the task.
pub const NOT_RELEVANT_MARKER: &str = "NOT_RELEVANT";

/// What the remote's output says about the state of the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    /// The task is answered.
    Complete,
    /// More local work is requested.
    Continue,
    /// The available partial answers are not enough.
    Insufficient,
}

fn fenced_json() -> &'static Regex {
    static FENCED_JSON: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::expect_used)]
    FENCED_JSON.get_or_init(|| {
        Regex::new(r"(?s)```(?:json|JSON)?\s*(\{.*?\})\s*```").expect("valid regex")
    })
}

fn final_marker() -> &'static Regex {
    static FINAL_MARKER: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::expect_used)]
    FINAL_MARKER.get_or_init(|| Regex::new(r"(?i)final answer:").expect("valid regex"))
}

/// Finds the first JSON object in `text`.
fn json_object(text: &str) -> Option<Map<String, Value>> {
    let parse = |s: &str| match serde_json::from_str::<Value>(s) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    };

    if let Some(caps) = fenced_json().captures(text)
        && let Some(map) = caps.get(1).and_then(|m| parse(m.as_str()))
    {
        return Some(map);
    }

    let trimmed = text.trim();
    if let Some(map) = parse(trimmed) {
        return Some(map);
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end > start {
        parse(&trimmed[start..=end])
    } else {
        None
    }
}

fn signal_from_decision(decision: &str) -> Option<Signal> {
    match decision.trim().to_lowercase().replace([' ', '-'], "_").as_str() {
        "provide_final_answer" | "final_answer" | "final" | "complete" | "done" | "answer" => {
            Some(Signal::Complete)
        }
        "request_additional_info" | "request_more_info" | "continue" | "more" => {
            Some(Signal::Continue)
        }
        "insufficient_information" | "insufficient_info" | "insufficient" => {
            Some(Signal::Insufficient)
        }
        _ => None,
    }
}

fn field<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| map.get(*k)).filter(|v| !v.is_null())
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Classifies a remote output.
///
/// # Examples
///
/// ```
/// use minions_rs::protocol::{Signal, detect_signal};
///
/// let text = r#"{"decision": "provide_final_answer", "answer": "42"}"#;
/// assert_eq!(detect_signal(text), Signal::Complete);
/// assert_eq!(detect_signal("Can you check page 3?"), Signal::Continue);
/// ```
#[must_use]
pub fn detect_signal(text: &str) -> Signal {
    if let Some(map) = json_object(text)
        && let Some(signal) = map
            .get("decision")
            .and_then(Value::as_str)
            .and_then(signal_from_decision)
    {
        return signal;
    }

    let lower = text.to_lowercase();
    if lower.contains("insufficient information") || lower.contains("insufficient_information") {
        Signal::Insufficient
    } else if final_marker().is_match(text) || lower.contains("[final]") {
        Signal::Complete
    } else {
        Signal::Continue
    }
}

/// Extracts the answer from a remote output.
///
/// Reads the JSON `answer` field, then the text after a `final answer:`
/// marker, and otherwise returns the trimmed output. A JSON reply whose
/// answer is `null` yields an empty string.
#[must_use]
pub fn extract_answer(text: &str) -> String {
    if let Some(map) = json_object(text) {
        if let Some(answer) = field(&map, &["answer", "final_answer"]) {
            return value_text(answer);
        }
        if ["answer", "final_answer"].iter().any(|k| map.contains_key(*k)) {
            return String::new();
        }
    }

    if let Some(marker) = final_marker().find(text) {
        return text[marker.end()..].trim().to_string();
    }

    text.trim().to_string()
}

/// Extracts the follow-up request the remote sends back to the local worker.
#[must_use]
pub fn extract_follow_up(text: &str) -> String {
    if let Some(map) = json_object(text)
        && let Some(message) = field(&map, &["message", "question", "request"])
    {
        return value_text(message);
    }
    text.trim().to_string()
}

/// Reads a chunk worker's output.
///
/// Returns `None` when the worker reported nothing relevant: the
/// [`NOT_RELEVANT_MARKER`], an empty reply, `"relevant": false`, or an
/// empty `answer`.
#[must_use]
pub fn parse_partial(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Some(map) = json_object(trimmed) {
        if map.get("relevant").and_then(Value::as_bool) == Some(false) {
            return None;
        }
        if let Some(answer) = map.get("answer") {
            let answer = match answer {
                Value::Null => String::new(),
                other => value_text(other),
            };
            let answer = answer.trim();
            return if answer.is_empty() || is_not_relevant(answer) {
                None
            } else {
                Some(answer.to_string())
            };
        }
    }

    if is_not_relevant(trimmed) {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// True when the first line reads "not relevant", or the first token is the
/// marker itself (`NOT_RELEVANT: no dosage here`).
fn is_not_relevant(text: &str) -> bool {
    let first_line = text.trim_start().lines().next().unwrap_or_default();
    let squashed: String = first_line
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .take(16)
        .collect::<String>()
        .to_ascii_uppercase();
    if squashed == "NOTRELEVANT" {
        return true;
    }

    first_line
        .split_whitespace()
        .next()
        .map(|token| token.trim_matches(|c: char| c.is_ascii_punctuation() && c != '_'))
        .is_some_and(|token| token.eq_ignore_ascii_case(NOT_RELEVANT_MARKER))
}
