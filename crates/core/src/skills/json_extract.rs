//! JSON extraction from free-form model output.

use serde::de::DeserializeOwned;

use crate::error::ParseError;

/// First balanced `{...}` substring of `text`.
///
/// Braces inside JSON string literals (including escaped quotes) do not
/// count towards the balance. A `{` that never closes is skipped and the
/// scan resumes at the next one.
pub fn extract_first_object(text: &str) -> Option<&str> {
    let mut from = 0;
    while let Some(found) = text[from..].find('{') {
        let start = from + found;
        if let Some(end) = balanced_end(&text[start..]) {
            return Some(&text[start..start + end]);
        }
        from = start + 1;
    }
    None
}

/// Byte length of the balanced object opening at the start of `text`
fn balanced_end(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text.char_indices() {
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
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(offset + 1);
                }
            }
            _ => {}
        }
    }
    None
}

/// Extract the first balanced object and deserialize it
pub fn parse_first_object<T: DeserializeOwned>(text: &str) -> Result<T, ParseError> {
    let object = extract_first_object(text).ok_or(ParseError::NoJsonObject)?;
    serde_json::from_str(object).map_err(|e| ParseError::InvalidJson(e.to_string()))
}
