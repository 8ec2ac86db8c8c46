//! Model-reply parsing: raw completion text → [`PageStats`].
//!
//! The prompt asks for a bare JSON object, but models occasionally wrap it
//! in a ```` ```json ```` fence or add a sentence before it. Those wrappers
//! are stripped before parsing; anything else that is not valid JSON is
//! reported as [`PageError::UnparsableResponse`] and the page is skipped.
//!
//! A reply with a missing, `null` or empty `journalist_stats` is not an
//! error: it means the page carries no bylines and yields `Ok(None)`.

use crate::error::PageError;
use crate::output::PageStats;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static RE_OUTER_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[a-zA-Z]*\s*\n(.*?)\n?```$").unwrap());

/// Remove an outer Markdown code fence, if the whole reply is one.
pub fn strip_code_fence(input: &str) -> &str {
    let trimmed = input.trim();
    match RE_OUTER_FENCE.captures(trimmed) {
        Some(caps) => caps.get(1).map_or(trimmed, |m| m.as_str().trim()),
        None => trimmed,
    }
}

/// Narrow the reply to its outermost `{ … }` span.
///
/// Leaves the text untouched when no braces are found so the JSON error
/// message still points at the real content.
fn json_object_span(input: &str) -> &str {
    match (input.find('{'), input.rfind('}')) {
        (Some(start), Some(end)) if start < end => &input[start..=end],
        _ => input,
    }
}

/// Parse one page's model reply.
///
/// # Returns
/// - `Ok(Some(stats))` when at least one journalist was reported
/// - `Ok(None)` when the page has no journalists
/// - `Err(PageError::UnparsableResponse)` when the reply is not the expected JSON
pub fn parse_page_stats(page_num: usize, text: &str) -> Result<Option<PageStats>, PageError> {
    let unparsable = |detail: String| PageError::UnparsableResponse {
        page: page_num,
        detail,
        raw: text.to_string(),
    };

    let body = json_object_span(strip_code_fence(text));
    let value: Value = serde_json::from_str(body).map_err(|e| unparsable(e.to_string()))?;

    let Value::Object(ref map) = value else {
        return Err(unparsable(format!("expected a JSON object, got {}", kind(&value))));
    };

    match map.get("journalist_stats") {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Object(inner)) if inner.is_empty() => return Ok(None),
        Some(Value::Object(_)) => {}
        Some(other) => {
            return Err(unparsable(format!(
                "journalist_stats must be an object, got {}",
                kind(other)
            )))
        }
    }

    let stats: PageStats = serde_json::from_value(value).map_err(|e| unparsable(e.to_string()))?;
    Ok(Some(stats))
}

fn kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
