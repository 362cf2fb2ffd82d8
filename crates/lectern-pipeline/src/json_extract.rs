//! Locating JSON inside free-form model output.

use serde::de::DeserializeOwned;

use crate::error::{PipelineError, PipelineResult};
use crate::sanitize::strip_code_fences;

/// Return the first balanced top-level `{...}` in `text`.
///
/// Braces inside string literals (including escaped quotes) are ignored.
/// If an opening brace never closes, scanning resumes at the next one.
pub fn extract_first_json_object(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let mut search_from = 0;

    while let Some(offset) = text[search_from..].find('{') {
        let start = search_from + offset;
        if let Some(end) = balanced_end(bytes, start) {
            return Some(&text[start..=end]);
        }
        search_from = start + 1;
    }
    None
}

fn balanced_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
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
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Strip fences, locate the first JSON object and deserialize it.
pub fn parse_first_json_object<T: DeserializeOwned>(text: &str) -> PipelineResult<T> {
    let unfenced = strip_code_fences(text);
    let object = extract_first_json_object(unfenced)
        .ok_or_else(|| PipelineError::malformed_response("no JSON object in response"))?;
    serde_json::from_str(object)
        .map_err(|e| PipelineError::malformed_response(format!("invalid JSON object: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_tolerates_surrounding_prose() {
        let text = "Sure! Here is the report:\n{\"score\": 80, \"nested\": {\"a\": [1, 2]}}\nHope this helps {really}.";
        assert_eq!(
            extract_first_json_object(text),
            Some("{\"score\": 80, \"nested\": {\"a\": [1, 2]}}")
        );
    }

    #[test]
    fn test_braces_inside_strings() {
        let text = r#"{"prompt": "use } and { freely", "q": "say \"}\""} trailing"#;
        assert_eq!(
            extract_first_json_object(text),
            Some(r#"{"prompt": "use } and { freely", "q": "say \"}\""}"#)
        );
    }

    #[test]
    fn test_unbalanced_and_missing() {
        assert_eq!(extract_first_json_object("no json here"), None);
        assert_eq!(extract_first_json_object("{\"open\": true"), None);
    }

    #[test]
    fn test_parse_first_json_object() {
        let v: Value = parse_first_json_object("```json\nNote: {\"a\": 1}\n```").unwrap();
        assert_eq!(v["a"], 1);

        let err = parse_first_json_object::<Value>("nothing").unwrap_err();
        assert!(matches!(err, PipelineError::MalformedResponse(_)));
    }
}
