//! Re-emits one upstream provider response as the canonical delta stream.
//!
//! Upstream bodies arrive either fully buffered (one JSON document, or a
//! sequence of them) or as a byte stream of newline-delimited JSON / SSE
//! lines. Every unit goes through `extract_text -> sanitize`; unparseable
//! units degrade to sanitized plain text instead of being dropped. The
//! output always ends with the `[DONE]` event unless the upstream read
//! itself fails.

use std::collections::VecDeque;
use std::pin::Pin;

use bytes::Bytes;
use chatstream_core::extract::{FALLBACK_SHAPE, matched_shape};
use chatstream_core::{CanonicalDelta, DONE_SENTINEL, LineBuffer, extract_text, sanitize};
use futures::StreamExt as _;
use futures::stream;
use tracing::{debug, error, trace};

/// How an upstream body is consumed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReframeMode {
    /// Buffer the body and decode it as JSON document(s).
    WholeDocument,
    /// Consume the body incrementally, one line at a time.
    Streamed,
}

impl ReframeMode {
    /// Whole-document mode only for un-chunked `application/json` bodies.
    pub fn detect(content_type: Option<&str>, chunked: bool) -> Self {
        let is_json = content_type
            .and_then(|value| value.split(';').next())
            .map(|mime| mime.trim().eq_ignore_ascii_case("application/json"))
            .unwrap_or(false);
        if is_json && !chunked {
            Self::WholeDocument
        } else {
            Self::Streamed
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WholeDocument => "whole_document",
            Self::Streamed => "streamed",
        }
    }
}

/// Deltas for a fully buffered body.
///
/// A top-level array contributes one delta per element. Values are decoded
/// in order until one fails to parse; everything from that point on is
/// treated as a single plain-text unit, so a body that is not JSON at all
/// becomes one text delta.
pub fn reframe_document(body: &[u8]) -> Vec<CanonicalDelta> {
    let mut values = serde_json::Deserializer::from_slice(body).into_iter::<serde_json::Value>();
    let mut deltas = Vec::new();
    loop {
        let start = values.byte_offset();
        match values.next() {
            Some(Ok(serde_json::Value::Array(items))) => {
                deltas.extend(items.iter().filter_map(delta_from_value));
            }
            Some(Ok(value)) => deltas.extend(delta_from_value(&value)),
            Some(Err(err)) => {
                let tail = &body[start..];
                debug!(event = "reframe.document_unparseable", domain = "reframe", error = %err, decoded = deltas.len() as u64, tail_bytes = tail.len() as u64);
                deltas.extend(delta_from_text(&String::from_utf8_lossy(tail)));
                break;
            }
            None => break,
        }
    }
    deltas
}

/// The complete canonical body for a buffered upstream response.
pub fn encode_document(body: &[u8]) -> String {
    let mut out: String = reframe_document(body)
        .iter()
        .map(CanonicalDelta::encode_event)
        .collect();
    out.push_str(&CanonicalDelta::done_event());
    out
}

/// Incremental line-based reframer.
#[derive(Debug, Default)]
pub struct LineReframer {
    lines: LineBuffer,
}

impl LineReframer {
    /// Deltas for every line completed by `chunk`, in arrival order.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<CanonicalDelta> {
        self.lines
            .push_chunk(chunk)
            .iter()
            .filter_map(|line| reframe_line(line))
            .collect()
    }

    /// Flushes a trailing fragment that never saw a newline.
    pub fn finish(&mut self) -> Option<CanonicalDelta> {
        self.lines
            .take_remainder()
            .and_then(|rest| reframe_line(&rest))
    }
}

fn reframe_line(line: &str) -> Option<CanonicalDelta> {
    let line = line.trim();
    if line.is_empty() || line.starts_with(':') {
        return None;
    }
    if ["event:", "id:", "retry:"]
        .iter()
        .any(|field| line.starts_with(field))
    {
        return None;
    }
    let payload = line
        .strip_prefix("data:")
        .map(str::trim_start)
        .unwrap_or(line);
    if payload.is_empty() || payload == DONE_SENTINEL {
        return None;
    }
    match serde_json::from_str::<serde_json::Value>(payload) {
        Ok(value) => delta_from_value(&value),
        Err(err) => {
            debug!(event = "reframe.line_unparseable", domain = "reframe", error = %err, line_len = payload.len() as u64);
            delta_from_text(payload)
        }
    }
}

fn delta_from_value(value: &serde_json::Value) -> Option<CanonicalDelta> {
    let shape = matched_shape(value).unwrap_or("none");
    let text = extract_text(value);
    if shape == FALLBACK_SHAPE {
        debug!(event = "reframe.unknown_shape", domain = "reframe", text_len = text.len() as u64);
    } else {
        trace!(event = "reframe.shape", domain = "reframe", shape);
    }
    delta_from_text(&text)
}

fn delta_from_text(text: &str) -> Option<CanonicalDelta> {
    let text = sanitize(text);
    (!text.is_empty()).then(|| CanonicalDelta::new(text))
}

type UpstreamBytes<E> = Pin<Box<dyn futures::Stream<Item = Result<Bytes, E>> + Send>>;

/// Canonical event stream for an incrementally read upstream body.
///
/// A read error ends the stream with that error and no `[DONE]`, so the
/// client sees a broken transfer rather than a clean but truncated answer.
pub fn reframe_stream<S, E>(
    upstream: S,
) -> impl futures::Stream<Item = Result<Bytes, std::io::Error>> + Send
where
    S: futures::Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    struct State<E> {
        upstream: UpstreamBytes<E>,
        reframer: LineReframer,
        pending: VecDeque<Bytes>,
        emitted: u64,
        done: bool,
    }

    stream::try_unfold(
        State {
            upstream: Box::pin(upstream),
            reframer: LineReframer::default(),
            pending: VecDeque::new(),
            emitted: 0,
            done: false,
        },
        |mut state| async move {
            loop {
                if let Some(event) = state.pending.pop_front() {
                    return Ok(Some((event, state)));
                }
                if state.done {
                    return Ok(None);
                }

                match state.upstream.next().await {
                    Some(Ok(chunk)) => {
                        for delta in state.reframer.push_chunk(&chunk) {
                            state.emitted += 1;
                            state.pending.push_back(Bytes::from(delta.encode_event()));
                        }
                    }
                    Some(Err(err)) => {
                        error!(event = "reframe.upstream_read_failed", domain = "reframe", error = %err, emitted = state.emitted);
                        return Err(std::io::Error::other(format!(
                            "upstream read failed: {err}"
                        )));
                    }
                    None => {
                        if let Some(delta) = state.reframer.finish() {
                            state.emitted += 1;
                            state.pending.push_back(Bytes::from(delta.encode_event()));
                        }
                        debug!(event = "reframe.stream_finished", domain = "reframe", emitted = state.emitted);
                        state.pending.push_back(Bytes::from(CanonicalDelta::done_event()));
                        state.done = true;
                    }
                }
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(deltas: &[CanonicalDelta]) -> Vec<&str> {
        deltas.iter().map(|d| d.delta_text.as_str()).collect()
    }

    async fn collect_body<S>(stream: S) -> (String, Option<std::io::Error>)
    where
        S: futures::Stream<Item = Result<Bytes, std::io::Error>>,
    {
        let mut stream = std::pin::pin!(stream);
        let mut body = String::new();
        while let Some(item) = stream.next().await {
            match item {
                Ok(bytes) => body.push_str(&String::from_utf8_lossy(&bytes)),
                Err(err) => return (body, Some(err)),
            }
        }
        (body, None)
    }

    #[test]
    fn detects_mode_from_content_type_and_chunking() {
        assert_eq!(
            ReframeMode::detect(Some("application/json; charset=utf-8"), false),
            ReframeMode::WholeDocument
        );
        assert_eq!(
            ReframeMode::detect(Some("application/json"), true),
            ReframeMode::Streamed
        );
        assert_eq!(
            ReframeMode::detect(Some("text/event-stream"), false),
            ReframeMode::Streamed
        );
        assert_eq!(ReframeMode::detect(None, false), ReframeMode::Streamed);
    }

    #[test]
    fn whole_document_emits_single_delta_then_done() {
        let body = serde_json::json!({
            "id": "chatcmpl-abc",
            "choices": [{"message": {"role": "assistant", "content": "Paris is the capital of France."}}]
        })
        .to_string();
        assert_eq!(
            encode_document(body.as_bytes()),
            "data: {\"choices\":[{\"delta\":{\"content\":\"Paris is the capital of France.\"}}]}\n\n\
             data: [DONE]\n\n"
        );
    }

    #[test]
    fn whole_document_array_yields_one_delta_per_element() {
        let body = r#"[{"candidates":[{"content":{"parts":[{"text":"a"}]}}]},{"candidates":[]},{"text":"b"}]"#;
        assert_eq!(texts(&reframe_document(body.as_bytes())), vec!["a", "b"]);
    }

    #[test]
    fn whole_document_sequence_of_values() {
        let body = "{\"text\":\"one\"}\n{\"text\":\"two\"}";
        assert_eq!(texts(&reframe_document(body.as_bytes())), vec!["one", "two"]);
    }

    #[test]
    fn non_json_document_degrades_to_text() {
        assert_eq!(
            texts(&reframe_document(b"plain answer STOP")),
            vec!["plain answer"]
        );
        assert_eq!(encode_document(b""), "data: [DONE]\n\n");
    }

    #[test]
    fn broken_trailing_value_keeps_decoded_values() {
        assert_eq!(
            texts(&reframe_document(b"{\"text\":\"one\"}\n{broken")),
            vec!["one", "{broken"]
        );
        assert_eq!(
            texts(&reframe_document(b"[{\"text\":\"a\"},{\"text\":\"b\"}] tail STOP")),
            vec!["a", "b", "tail"]
        );
    }

    #[test]
    fn lines_split_across_chunks_are_reassembled_in_order() {
        let mut reframer = LineReframer::default();
        assert!(reframer.push_chunk(b"{\"text\":\"He").is_empty());
        let first = reframer.push_chunk(b"llo\"}\n{\"text\":\"world\"}\n{\"te");
        assert_eq!(texts(&first), vec!["Hello", "world"]);
        assert!(reframer.push_chunk(b"xt\":\"!\"}").is_empty());
        let flushed = reframer.finish().expect("flushed fragment");
        assert_eq!(flushed.delta_text, "!");
        assert!(reframer.finish().is_none());
    }

    #[test]
    fn sse_lines_are_unwrapped_and_control_lines_skipped() {
        let mut reframer = LineReframer::default();
        let chunk = b": keep-alive\nevent: message\nid: 7\n\
            data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n\
            data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\n\
            data: [DONE]\n\n";
        assert_eq!(texts(&reframer.push_chunk(chunk)), vec!["Hi"]);
    }

    #[test]
    fn unparseable_line_is_kept_as_sanitized_text() {
        let mut reframer = LineReframer::default();
        let deltas = reframer.push_chunk(b"{\"text\":\"ok\"}\nnot json  at   all\n{broken\n");
        assert_eq!(texts(&deltas), vec!["ok", "not json at all", "{broken"]);
    }

    #[tokio::test]
    async fn stream_emits_deltas_flush_and_done() {
        let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(b"data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n")),
            Ok(Bytes::from_static(b"\ndata: {\"choices\":[{\"delta\":{\"con")),
            Ok(Bytes::from_static(b"tent\":\"lo\"}}]}")),
        ];
        let (body, err) = collect_body(reframe_stream(stream::iter(chunks))).await;
        assert!(err.is_none());
        assert_eq!(
            body,
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n\
             data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n\
             data: [DONE]\n\n"
        );
    }

    #[tokio::test]
    async fn upstream_read_error_ends_stream_without_done() {
        let chunks: Vec<Result<Bytes, String>> = vec![
            Ok(Bytes::from_static(b"{\"text\":\"partial\"}\n")),
            Err("connection reset".to_string()),
        ];
        let (body, err) = collect_body(reframe_stream(stream::iter(chunks))).await;
        assert_eq!(body, "data: {\"choices\":[{\"delta\":{\"content\":\"partial\"}}]}\n\n");
        let err = err.expect("read error surfaces");
        assert!(err.to_string().contains("connection reset"));
    }
}
