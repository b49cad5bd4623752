//! Sanitizing helpers for AI backend responses
//!
//! Models frequently wrap their JSON in markdown fences, sometimes with a
//! language tag and a trailing explanation. These helpers reduce a raw reply
//! to the JSON payload and parse it.

use std::sync::OnceLock;

use regex::Regex;
use serde::de::DeserializeOwned;

use crate::error::{Error, Result};

fn fence_regex() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| {
        // Opening marker, optional tag (a word on its own line, or "json" inline),
        // then everything up to the next marker or end of text
        Regex::new(r"(?s)```[ \t]*(?:[A-Za-z][\w+-]*[ \t]*\r?\n|json\b)?(.*?)(?:```|\z)")
            .expect("valid regex")
    })
}

/// Reduce a raw model reply to the text that should be JSON
///
/// Without a fence marker the trimmed input is returned unchanged. With one,
/// only the first fenced block is kept.
pub fn strip_fences(raw: &str) -> &str {
    let body = if raw.contains("```") {
        fence_regex()
            .captures(raw)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
            .unwrap_or(raw)
    } else {
        raw
    };

    body.trim().trim_end_matches('`').trim()
}

/// Sanitize and parse into an untyped JSON value
pub fn sanitize_value(raw: &str) -> Result<serde_json::Value> {
    sanitize_and_parse(raw)
}

/// Sanitize and parse into a typed record
pub fn sanitize_and_parse<T: DeserializeOwned>(raw: &str) -> Result<T> {
    let body = strip_fences(raw);
    serde_json::from_str(body).map_err(|e| {
        tracing::debug!(
            "Unparseable AI response ({} chars): {}",
            raw.len(),
            truncate_for_log(raw)
        );
        Error::MalformedResponse(e)
    })
}

fn truncate_for_log(s: &str) -> String {
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s.to_string()
    }
}
