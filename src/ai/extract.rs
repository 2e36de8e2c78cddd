//! JSON extraction from model output
//!
//! Models are asked for a single JSON object but routinely wrap it in
//! prose or code fences. Extraction scans for the first balanced `{...}`
//! span (string and escape aware) and parses that. The caller always
//! learns whether it got parsed content or a substituted fallback; no
//! control flow runs on panics or swallowed errors.

use serde::de::DeserializeOwned;

use crate::types::UltimaError;

/// Outcome of extracting structured content from model text
#[derive(Debug, Clone, PartialEq)]
pub enum Extracted<T> {
    /// The model's own output, parsed successfully
    Parsed(T),
    /// A substituted default; the model's output was unusable
    Fallback(T),
}

impl<T> Extracted<T> {
    pub fn value(&self) -> &T {
        match self {
            Extracted::Parsed(v) | Extracted::Fallback(v) => v,
        }
    }

    pub fn into_inner(self) -> T {
        match self {
            Extracted::Parsed(v) | Extracted::Fallback(v) => v,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Extracted::Fallback(_))
    }
}

/// Locate the first balanced top-level JSON object in free text
pub fn first_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Extract and parse the first JSON object, or fail
pub fn extract_json<T: DeserializeOwned>(text: &str) -> Result<T, UltimaError> {
    let span = first_json_object(text)
        .ok_or_else(|| UltimaError::Upstream("No JSON object in AI response".into()))?;

    serde_json::from_str(span)
        .map_err(|e| UltimaError::Upstream(format!("Malformed JSON in AI response: {}", e)))
}

/// Extract and parse, substituting `fallback` when the text is unusable
pub fn extract_json_or<T: DeserializeOwned>(text: &str, fallback: T) -> Extracted<T> {
    match extract_json(text) {
        Ok(value) => Extracted::Parsed(value),
        Err(_) => Extracted::Fallback(fallback),
    }
}
