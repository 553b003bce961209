//! Lenient parsing for JSON payloads coming back from LLM providers.
//!
//! Providers asked for `application/json` still occasionally wrap the payload
//! in markdown fences or prepend prose. The parser strips those shapes before
//! giving up.

use serde_json::Value as JsonValue;

/// Parse a JSON object or array out of raw model output. Returns `None` only
/// when no parseable JSON payload can be located.
pub fn parse_json_safely(raw: &str) -> Option<JsonValue> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    // Fast path: the payload is already clean JSON.
    if let Ok(value) = serde_json::from_str::<JsonValue>(trimmed) {
        return Some(value);
    }

    // Strip markdown fences (``` or ```json).
    let unfenced = strip_code_fences(trimmed);
    if let Ok(value) = serde_json::from_str::<JsonValue>(unfenced.trim()) {
        return Some(value);
    }

    // Last resort: widest substring between the first opening brace/bracket
    // and the matching last closer.
    for (open, close) in [('{', '}'), ('[', ']')] {
        if let (Some(start), Some(end)) = (trimmed.find(open), trimmed.rfind(close)) {
            if end > start {
                if let Ok(value) = serde_json::from_str::<JsonValue>(&trimmed[start..=end]) {
                    return Some(value);
                }
            }
        }
    }
    None
}

fn strip_code_fences(text: &str) -> &str {
    let mut out = text;
    if let Some(rest) = out.strip_prefix("```json") {
        out = rest;
    } else if let Some(rest) = out.strip_prefix("```") {
        out = rest;
    }
    if let Some(rest) = out.strip_suffix("```") {
        out = rest;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_clean_json() {
        assert_eq!(
            parse_json_safely(r#"{"relationships": []}"#),
            Some(json!({"relationships": []}))
        );
    }

    #[test]
    fn parses_fenced_json() {
        let raw = "```json\n{\"a\": 1}\n```";
        assert_eq!(parse_json_safely(raw), Some(json!({"a": 1})));
    }

    #[test]
    fn parses_json_with_prose_prefix() {
        let raw = "Here is the result:\n{\"coverages\": [{\"coverage_name\": \"Building\"}]}";
        let parsed = parse_json_safely(raw).unwrap();
        assert_eq!(parsed["coverages"][0]["coverage_name"], "Building");
    }

    #[test]
    fn rejects_non_json() {
        assert_eq!(parse_json_safely("no json here"), None);
        assert_eq!(parse_json_safely(""), None);
    }
}
