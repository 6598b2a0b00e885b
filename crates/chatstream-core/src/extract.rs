//! Provider-agnostic text extraction.
//!
//! Providers disagree on where generated text lives in a response. Each known
//! layout is a `Shape`: a pure matcher that either claims the value and
//! returns its text, or passes. Shapes are tried in order and the first claim
//! wins, so supporting a new provider means inserting one entry in `SHAPES`.
//!
//! The last entry walks every field of an unknown object. It never loses text
//! but can surface structural noise (ids, finish reasons), which
//! [`crate::sanitize`] strips on a best-effort basis.

use serde_json::Value;

/// Name reported by [`matched_shape`] when no known layout claims a value.
pub const FALLBACK_SHAPE: &str = "every field";

struct Shape {
    name: &'static str,
    extract: fn(&Value) -> Option<String>,
}

const SHAPES: &[Shape] = &[
    Shape {
        name: "scalar",
        extract: scalar,
    },
    Shape {
        name: "sequence",
        extract: sequence,
    },
    Shape {
        name: "text",
        extract: text_field,
    },
    Shape {
        name: "delta.content",
        extract: delta_content,
    },
    Shape {
        name: "choices",
        extract: choices,
    },
    Shape {
        name: "output.content",
        extract: output_content,
    },
    Shape {
        name: "candidates",
        extract: candidates,
    },
    Shape {
        name: "parts",
        extract: parts,
    },
    Shape {
        name: FALLBACK_SHAPE,
        extract: every_field,
    },
];

/// Returns the plain text carried by `value`.
///
/// Total and side-effect free: unknown shapes fall back to concatenating all
/// nested values, and `null` yields an empty string.
pub fn extract_text(value: &Value) -> String {
    SHAPES
        .iter()
        .find_map(|shape| (shape.extract)(value))
        .unwrap_or_default()
}

/// Name of the shape that claims `value`, for diagnostics.
pub fn matched_shape(value: &Value) -> Option<&'static str> {
    SHAPES
        .iter()
        .find(|shape| (shape.extract)(value).is_some())
        .map(|shape| shape.name)
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn sequence(value: &Value) -> Option<String> {
    value
        .as_array()
        .map(|items| items.iter().map(extract_text).collect())
}

fn text_field(value: &Value) -> Option<String> {
    value.get("text").and_then(Value::as_str).map(str::to_owned)
}

fn delta_content(value: &Value) -> Option<String> {
    value
        .pointer("/delta/content")
        .and_then(Value::as_str)
        .map(str::to_owned)
}

// Claims any `choices` array, even one whose first choice carries no text, so
// role-only and finish-reason chunks never reach the every-field fallback.
fn choices(value: &Value) -> Option<String> {
    let choices = value.get("choices")?.as_array()?;
    Some(choices.first().map(choice_text).unwrap_or_default())
}

fn choice_text(choice: &Value) -> String {
    if let Some(text) = choice
        .pointer("/delta/content")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
    {
        return text.to_owned();
    }
    if let Some(text) = choice
        .pointer("/message/content")
        .map(extract_text)
        .filter(|s| !s.is_empty())
    {
        return text;
    }
    choice
        .get("text")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .unwrap_or_default()
}

fn output_content(value: &Value) -> Option<String> {
    value.pointer("/output/content").map(extract_text)
}

fn candidates(value: &Value) -> Option<String> {
    let candidates = value.get("candidates")?.as_array()?;
    Some(candidates.iter().map(candidate_text).collect())
}

fn candidate_text(candidate: &Value) -> String {
    if let Some(parts) = candidate.pointer("/content/parts").and_then(Value::as_array) {
        return join_part_texts(parts);
    }
    candidate
        .pointer("/output/content")
        .map(extract_text)
        .unwrap_or_default()
}

fn parts(value: &Value) -> Option<String> {
    value
        .get("parts")
        .and_then(Value::as_array)
        .map(|parts| join_part_texts(parts))
}

fn join_part_texts(parts: &[Value]) -> String {
    parts
        .iter()
        .map(|part| part.get("text").and_then(Value::as_str).unwrap_or(""))
        .collect()
}

fn every_field(value: &Value) -> Option<String> {
    value
        .as_object()
        .map(|fields| fields.values().map(extract_text).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalars_are_stringified() {
        assert_eq!(extract_text(&json!("plain")), "plain");
        assert_eq!(extract_text(&json!(42)), "42");
        assert_eq!(extract_text(&json!(1.5)), "1.5");
        assert_eq!(extract_text(&json!(true)), "true");
        assert_eq!(extract_text(&Value::Null), "");
    }

    #[test]
    fn sequences_concatenate_without_separator() {
        assert_eq!(extract_text(&json!(["a", {"text": "b"}, 3, null])), "ab3");
    }

    #[test]
    fn openai_delta_chunk() {
        let value = json!({"choices":[{"index":0,"delta":{"content":"Hel"}}]});
        assert_eq!(extract_text(&value), "Hel");
    }

    #[test]
    fn openai_message_response() {
        let value = json!({
            "id": "chatcmpl-1",
            "choices":[{"message":{"role":"assistant","content":"Paris."},"finish_reason":"stop"}]
        });
        assert_eq!(extract_text(&value), "Paris.");
    }

    #[test]
    fn message_content_parts_are_extracted_recursively() {
        let value = json!({"choices":[{"message":{"content":[{"type":"text","text":"a"},{"type":"text","text":"b"}]}}]});
        assert_eq!(extract_text(&value), "ab");
    }

    #[test]
    fn legacy_completion_choice_text() {
        let value = json!({"choices":[{"text":"legacy","index":0}]});
        assert_eq!(extract_text(&value), "legacy");
    }

    #[test]
    fn role_only_and_finish_chunks_yield_nothing() {
        let role = json!({"id":"x","choices":[{"delta":{"role":"assistant"}}]});
        let finish = json!({"choices":[{"delta":{},"finish_reason":"stop"}]});
        assert_eq!(extract_text(&role), "");
        assert_eq!(extract_text(&finish), "");
        assert_eq!(extract_text(&json!({"choices":[]})), "");
    }

    #[test]
    fn only_first_choice_is_used() {
        let value = json!({"choices":[{"delta":{"content":"one"}},{"delta":{"content":"two"}}]});
        assert_eq!(extract_text(&value), "one");
    }

    #[test]
    fn gemini_candidates() {
        let value = json!({
            "candidates":[
                {"content":{"parts":[{"text":"Hello, "},{"inlineData":{}},{"text":"world"}]}},
                {"content":{"parts":[{"text":"!"}]}}
            ],
            "usageMetadata":{"totalTokenCount":12}
        });
        assert_eq!(extract_text(&value), "Hello, world!");
    }

    #[test]
    fn candidate_without_parts_uses_output_content() {
        let value = json!({"candidates":[{"output":{"content":"nested"}}]});
        assert_eq!(extract_text(&value), "nested");
    }

    #[test]
    fn output_content_recurses() {
        let value = json!({"output":{"content":[{"text":"x"},{"text":"y"}]}});
        assert_eq!(extract_text(&value), "xy");
    }

    #[test]
    fn bare_parts_array() {
        let value = json!({"parts":[{"text":"p1"},{"other":1},{"text":"p2"}]});
        assert_eq!(extract_text(&value), "p1p2");
    }

    #[test]
    fn text_field_wins_over_later_shapes() {
        let value = json!({"text":"direct","choices":[{"delta":{"content":"ignored"}}]});
        assert_eq!(extract_text(&value), "direct");
    }

    #[test]
    fn non_string_text_field_falls_through() {
        let value = json!({"text": {"value": "inner"}});
        assert_eq!(extract_text(&value), "inner");
    }

    #[test]
    fn delta_content_at_top_level() {
        assert_eq!(extract_text(&json!({"delta":{"content":"d"}})), "d");
    }

    #[test]
    fn matched_shape_reports_first_claim() {
        assert_eq!(matched_shape(&json!({"parts":[]})), Some("parts"));
        assert_eq!(matched_shape(&json!({"choices":[]})), Some("choices"));
        assert_eq!(matched_shape(&json!({"zzz":1})), Some(FALLBACK_SHAPE));
        assert_eq!(matched_shape(&Value::Null), None);
    }

    #[test]
    fn unknown_shape_concatenates_every_leaf_string() {
        let value = json!({"a":{"b":"foo","c":[{"d":"bar"}]},"e":"baz"});
        // serde_json maps iterate in key order
        assert_eq!(extract_text(&value), "foobarbaz");
    }
}
