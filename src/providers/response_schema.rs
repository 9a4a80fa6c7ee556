//! Typed extraction of the structured payload embedded in a free-text answer.
//!
//! Inference providers wrap their JSON in code fences or surrounding prose.
//! [`parse_payload`] locates exactly one JSON value, deserializes it into a
//! schema type, and runs the schema's own validation. Anything that does not
//! fit is a [`ProviderError::Parse`]; nothing is guessed.

use serde::de::DeserializeOwned;

use crate::error::ProviderError;

/// Post-deserialization checks a schema enforces on itself.
pub trait ResponseSchema: DeserializeOwned {
    fn validate(&self) -> Result<(), String>;
}

/// Parses and validates the JSON payload embedded in `text`.
pub fn parse_payload<T: ResponseSchema>(
    provider: &'static str,
    text: &str,
) -> Result<T, ProviderError> {
    let payload = locate_json(text)
        .ok_or_else(|| ProviderError::parse(provider, "no JSON payload in response"))?;
    let parsed: T = serde_json::from_str(payload)
        .map_err(|error| ProviderError::parse(provider, format!("schema mismatch: {error}")))?;
    parsed
        .validate()
        .map_err(|reason| ProviderError::parse(provider, reason))?;
    Ok(parsed)
}

/// Finds the JSON value in a response: a fenced block if there is one,
/// otherwise the first balanced object or array.
pub fn locate_json(text: &str) -> Option<&str> {
    if let Some(fenced) = fenced_block(text) {
        return balanced_region(fenced);
    }
    balanced_region(text)
}

fn fenced_block(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after_fence = &text[open + 3..];
    // Skip the info string (e.g. `json`) up to the end of the fence line.
    let body_start = after_fence.find('\n').map_or(0, |newline| newline + 1);
    let body = &after_fence[body_start..];
    let close = body.find("```")?;
    Some(body[..close].trim())
}

fn balanced_region(text: &str) -> Option<&str> {
    let start = text.find(['{', '['])?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&text[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}
