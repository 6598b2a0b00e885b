//! Cleanup of provider-internal tokens that leak into extracted text.
//!
//! This is best-effort. When extraction falls back to walking every field of
//! an unknown response, ids and finish markers end up in the text; the rules
//! below remove the common ones but cannot guarantee zero noise.

use once_cell::sync::Lazy;
use regex::Regex;

static MODEL_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bmodel\S+").expect("model token pattern is valid"));
static TEXT_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\btext\d+\b").expect("text marker pattern is valid"));
static STOP_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bstop\b").expect("stop word pattern is valid"));
static OPAQUE_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z0-9_-]{16,}").expect("opaque id pattern is valid"));
static WHITESPACE_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s{2,}").expect("whitespace pattern is valid"));

/// Strips model identifiers, `TEXT<n>` markers, standalone `STOP`, and
/// 16+ character opaque ids, then collapses whitespace and trims.
///
/// Deterministic and idempotent: `sanitize(&sanitize(x)) == sanitize(x)`.
/// A removal can open a new word boundary for an earlier rule, so passes
/// repeat until the text is stable. Each pass either shortens the text or
/// leaves it unchanged.
pub fn sanitize(text: &str) -> String {
    let mut text = text.to_string();
    loop {
        let next = sanitize_pass(&text);
        if next == text {
            return next;
        }
        text = next;
    }
}

fn sanitize_pass(text: &str) -> String {
    let mut text = text.to_string();
    for pattern in [&*MODEL_TOKEN, &*TEXT_MARKER, &*STOP_WORD, &*OPAQUE_ID] {
        text = pattern.replace_all(&text, "").into_owned();
    }
    WHITESPACE_RUN.replace_all(&text, " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_model_token_and_stop() {
        assert_eq!(sanitize("model-abc123 hello STOP"), "hello");
    }

    #[test]
    fn strips_text_markers_case_insensitively() {
        assert_eq!(sanitize("TEXT1 answer text22"), "answer");
        assert_eq!(sanitize("context12 stays"), "context12 stays");
    }

    #[test]
    fn stop_only_as_whole_word() {
        assert_eq!(sanitize("stop. Nonstop stopped"), ". Nonstop stopped");
        assert_eq!(sanitize("Stop"), "");
    }

    #[test]
    fn strips_opaque_ids() {
        assert_eq!(sanitize("chatcmpl-9f8e7d6c5b4a3210 Paris"), "Paris");
        assert_eq!(sanitize("short_id_15char ok"), "short_id_15char ok");
    }

    #[test]
    fn collapses_whitespace_and_trims() {
        assert_eq!(sanitize("  a \n\n b\t\tc  "), "a b c");
        assert_eq!(sanitize("one\ntwo"), "one\ntwo");
    }

    #[test]
    fn plain_prose_is_untouched() {
        let text = "Paris is the capital of France.";
        assert_eq!(sanitize(text), text);
    }

    #[test]
    fn removal_that_exposes_a_stop_word_is_cleaned_in_one_call() {
        assert_eq!(sanitize("aaaaaaaaaaaaaaaa\u{17f}top"), "");
        assert_eq!(sanitize("x aaaaaaaaaaaaaaaa\u{17f}top y"), "x y");
    }

    #[test]
    fn sanitize_is_idempotent() {
        let inputs = [
            "",
            "   ",
            "model-abc123 hello STOP",
            "text12model1 rest",
            "aaaaaaaaaa-STOP-bbbbbbbb tail",
            "xxxxxxxxxxxxxxx-model1 y",
            "a  STOP  b   STOP c",
            "émodel1 éSTOP éaaaaaaaaaaaaaaaa-STOP",
            "TEXT1TEXT2 text3-text4",
            "model\tx modelfoo\nbar",
            "\u{00a0}\u{00a0}lead and trail\u{2003}\u{2003}",
            "{\"id\":\"resp_0123456789abcdef\",\"finish\":\"STOP\"}",
            "aaaaaaaaaaaaaaaa\u{17f}top",
            "x aaaaaaaaaaaaaaaa\u{17f}top y",
            "bbbbbbbbbbbbbbbbmodel\u{17f}x TEXT1",
        ];
        for input in inputs {
            let once = sanitize(input);
            assert_eq!(sanitize(&once), once, "input: {input:?}");
        }
    }
}
