//! Turning free-form backend text into a [`Payload`].
//!
//! Backends are asked for bare JSON but routinely wrap it in markdown
//! fences or prose. Parsing tries, in order: the trimmed text, the text
//! inside the first code fence, then each balanced `{...}` / `[...]` span
//! from left to right. The first candidate that reads as a payload wins.

use serde_json::Value;
use tracing::debug;

use super::Payload;
use super::error::PayloadParseError;
use crate::types::SelectedAction;

/// Parse backend output into a payload.
///
/// Accepts `{"actions": [...], "motivation": "..."}` or a bare array of
/// actions. Individual actions that do not decode are dropped and counted
/// in [`Payload::dropped`]; a non-empty list where nothing decodes is an
/// error.
pub fn parse_payload(text: &str) -> Result<Payload, PayloadParseError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(PayloadParseError::Empty);
    }
    if !trimmed.contains(['{', '[']) {
        return Err(PayloadParseError::NoJson);
    }

    let mut last_error = None;

    for candidate in [Some(trimmed), strip_code_fences(trimmed)].into_iter().flatten() {
        match parse_candidate(candidate) {
            Ok(payload) => return Ok(payload),
            Err(e) => last_error = Some(e),
        }
    }

    // Spans nested inside a value that parsed are not tried on their own.
    let mut from = 0;
    while let Some(offset) = trimmed[from..].find(['{', '[']) {
        let start = from + offset;
        let Some(span) = balanced_span(trimmed, start) else {
            from = start + 1;
            continue;
        };
        match serde_json::from_str::<Value>(span) {
            Ok(value) => {
                match interpret(value) {
                    Ok(payload) => return Ok(payload),
                    Err(e) => last_error = Some(e),
                }
                from = start + span.len();
            }
            Err(e) => {
                last_error = Some(PayloadParseError::Invalid(e.to_string()));
                from = start + 1;
            }
        }
    }

    Err(last_error.unwrap_or_else(|| PayloadParseError::Invalid("no parseable JSON".into())))
}

fn parse_candidate(candidate: &str) -> Result<Payload, PayloadParseError> {
    let value = serde_json::from_str::<Value>(candidate)
        .map_err(|e| PayloadParseError::Invalid(e.to_string()))?;
    interpret(value)
}

fn interpret(value: Value) -> Result<Payload, PayloadParseError> {
    let (items, motivation) = match value {
        Value::Array(items) => (items, None),
        Value::Object(mut map) => {
            let items = match map.remove("actions") {
                Some(Value::Array(items)) => items,
                Some(_) => {
                    return Err(PayloadParseError::Invalid(
                        "\"actions\" is not an array".into(),
                    ));
                }
                None => {
                    return Err(PayloadParseError::Invalid(
                        "missing \"actions\" field".into(),
                    ));
                }
            };
            let motivation = map
                .remove("motivation")
                .and_then(|m| m.as_str().map(str::trim).map(str::to_owned))
                .filter(|m| !m.is_empty());
            (items, motivation)
        }
        other => {
            return Err(PayloadParseError::Invalid(format!(
                "expected an object or array, got {}",
                json_kind(&other)
            )));
        }
    };

    let total = items.len();
    let actions: Vec<SelectedAction> = items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<SelectedAction>(item) {
            Ok(action) => Some(action),
            Err(e) => {
                debug!(error = %e, "dropping undecodable action");
                None
            }
        })
        .collect();

    if total > 0 && actions.is_empty() {
        return Err(PayloadParseError::Invalid(format!(
            "none of the {total} actions could be decoded"
        )));
    }

    Ok(Payload {
        dropped: total - actions.len(),
        actions,
        motivation,
    })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Content of the first fenced block, with any language tag removed.
fn strip_code_fences(s: &str) -> Option<&str> {
    let start = s.find("```")?;
    let after_open = &s[start + 3..];
    // Skip the info string (e.g. `json`) up to the end of the line.
    let body_start = after_open.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after_open[body_start..];
    let end = body.find("```")?;
    Some(body[..end].trim())
}

/// Balanced `{...}` or `[...]` span opening at `start`, ignoring brackets
/// in strings.
fn balanced_span(s: &str, start: usize) -> Option<&str> {
    let (open, close) = match s.as_bytes().get(start)? {
        b'{' => (b'{', b'}'),
        b'[' => (b'[', b']'),
        _ => return None,
    };

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in s.as_bytes().iter().enumerate().skip(start) {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            _ if b == open => depth += 1,
            _ if b == close => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}
