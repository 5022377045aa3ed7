//! Best-effort JSON recovery from model replies.
//!
//! Models asked for JSON still wrap it in prose, code fences, or emit
//! several objects in a row. The heuristics here run from strictest to
//! loosest and stop at the first one that parses.

use serde_json::Value;

/// Try to pull a JSON value out of a model reply.
///
/// Order: the whole reply, then the first fenced code block, then every
/// balanced `{...}` span in the text, then the widest `{...}` or `[...]`
/// slice. Returns `None` when nothing parses.
pub fn extract_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }

    if let Some(value) = fenced_block(trimmed) {
        return Some(value);
    }

    let candidates = balanced_objects(trimmed);
    match candidates.len() {
        0 => {}
        1 => return candidates.into_iter().next(),
        _ => return Some(Value::Array(candidates)),
    }

    widest_slice(trimmed)
}

/// Parse the contents of the first ``` fence, tolerating a `json` tag.
fn fenced_block(text: &str) -> Option<Value> {
    let start = text.find("```")?;
    let body = &text[start + 3..];
    let end = body.find("```")?;
    let mut inner = body[..end].trim();
    if let Some(rest) = inner.strip_prefix("json") {
        inner = rest.trim_start();
    }
    serde_json::from_str(inner).ok()
}

/// Collect every balanced top-level `{...}` span that parses as JSON.
///
/// A linear scan with a depth counter, skipping over string literals so
/// braces inside values do not confuse the match.
fn balanced_objects(text: &str) -> Vec<Value> {
    let bytes = text.as_bytes();
    let mut values = Vec::new();
    let mut start = None;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' if depth > 0 => in_string = true,
            b'{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            b'}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start.take() {
                        if let Ok(value) = serde_json::from_str::<Value>(&text[s..=i]) {
                            values.push(value);
                        }
                    }
                }
            }
            _ => {}
        }
    }
    values
}

/// Last resort: the widest `{...}` slice, then the widest `[...]` slice.
fn widest_slice(text: &str) -> Option<Value> {
    for (open, close) in [('{', '}'), ('[', ']')] {
        let start = text.find(open)?;
        if let Some(end) = text.rfind(close) {
            if end > start {
                if let Ok(value) = serde_json::from_str::<Value>(&text[start..=end]) {
                    return Some(value);
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_direct_parse() {
        let value = extract_json(r#"  {"name": "clip"}  "#).unwrap();
        assert_eq!(value, json!({"name": "clip"}));
    }

    #[test]
    fn test_fenced_with_tag() {
        let reply = "Here you go:\n```json\n{\"scenes\": [1, 2]}\n```\nEnjoy!";
        let value = extract_json(reply).unwrap();
        assert_eq!(value, json!({"scenes": [1, 2]}));
    }

    #[test]
    fn test_fenced_without_tag() {
        let reply = "```\n[\"a\", \"b\"]\n```";
        let value = extract_json(reply).unwrap();
        assert_eq!(value, json!(["a", "b"]));
    }

    #[test]
    fn test_single_object_in_prose() {
        let reply = "Sure! The result is {\"mood\": \"upbeat\"} as requested.";
        let value = extract_json(reply).unwrap();
        assert_eq!(value, json!({"mood": "upbeat"}));
    }

    #[test]
    fn test_nested_object_in_prose() {
        let reply = "Result: {\"outer\": {\"inner\": 1}} done";
        let value = extract_json(reply).unwrap();
        assert_eq!(value, json!({"outer": {"inner": 1}}));
    }

    #[test]
    fn test_multiple_objects_become_array() {
        let reply = "First {\"a\": 1} and second {\"b\": 2}.";
        let value = extract_json(reply).unwrap();
        assert_eq!(value, json!([{"a": 1}, {"b": 2}]));
    }

    #[test]
    fn test_braces_inside_strings_ignored() {
        let reply = "Take {\"text\": \"use { and } freely\"} here";
        let value = extract_json(reply).unwrap();
        assert_eq!(value, json!({"text": "use { and } freely"}));
    }

    #[test]
    fn test_widest_array_fallback() {
        let reply = "The list is [1, 2, 3] I think";
        let value = extract_json(reply).unwrap();
        assert_eq!(value, json!([1, 2, 3]));
    }

    #[test]
    fn test_garbage_returns_none() {
        assert!(extract_json("no structured data here").is_none());
        assert!(extract_json("{broken: json").is_none());
    }
}
