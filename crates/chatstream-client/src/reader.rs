//! Decoder for the canonical delta stream served by the gateway.
//!
//! Network reads do not line up with events: one read may carry half an
//! event, or several events plus the start of the next one. [`EventDecoder`]
//! keeps the unresolved suffix between reads and yields one delta per
//! complete event, in arrival order.

use std::collections::VecDeque;
use std::pin::Pin;

use bytes::Bytes;
use chatstream_core::{ChatError, DONE_SENTINEL, EventBuffer, extract_text};
use futures::StreamExt as _;
use futures::stream;
use tracing::debug;

/// Result of decoding one complete event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecodedEvent {
    Delta(String),
    Done,
}

/// Incremental decoder over blank-line delimited events.
#[derive(Debug, Default)]
pub struct EventDecoder {
    events: EventBuffer,
    finished: bool,
}

impl EventDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk and returns the deltas of every event it completed.
    ///
    /// Events are drained in order until `[DONE]` is seen; anything after
    /// the sentinel is ignored and the decoder reports itself finished.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<String> {
        if self.finished {
            return Vec::new();
        }
        let mut deltas = Vec::new();
        for event in self.events.push_chunk(chunk) {
            match decode_event(&event) {
                Some(DecodedEvent::Delta(text)) => deltas.push(text),
                Some(DecodedEvent::Done) => {
                    self.finished = true;
                    break;
                }
                None => {}
            }
        }
        deltas
    }

    /// Flushes a final event that never received its closing blank line.
    pub fn finish(&mut self) -> Option<String> {
        if self.finished {
            return None;
        }
        self.finished = true;
        let rest = self.events.take_remainder()?;
        if rest.trim().is_empty() || rest.trim() == DONE_SENTINEL {
            return None;
        }
        match decode_event(&rest) {
            Some(DecodedEvent::Delta(text)) => Some(text),
            _ => None,
        }
    }

    /// True once `[DONE]` was decoded or [`EventDecoder::finish`] was called.
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

/// Decodes one complete event. `None` means the event carries no text.
///
/// All `data:` lines are joined with `\n`; lines with other prefixes are
/// ignored. A payload that is not JSON is used as plain text.
pub fn decode_event(event: &str) -> Option<DecodedEvent> {
    let payload = event
        .lines()
        .map(str::trim)
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|rest| rest.strip_prefix(' ').unwrap_or(rest))
        .collect::<Vec<_>>()
        .join("\n");
    if payload.is_empty() {
        return None;
    }
    if payload == DONE_SENTINEL {
        return Some(DecodedEvent::Done);
    }

    let text = match serde_json::from_str::<serde_json::Value>(&payload) {
        Ok(value) => extract_text(&value).trim().to_string(),
        Err(err) => {
            debug!(event = "reader.payload_unparseable", domain = "reader", error = %err, payload_len = payload.len() as u64);
            payload
        }
    };
    (!text.is_empty()).then_some(DecodedEvent::Delta(text))
}

type SourceBytes<E> = Pin<Box<dyn futures::Stream<Item = Result<Bytes, E>> + Send>>;

/// Stream of deltas decoded from a byte source.
///
/// Ends after `[DONE]` without polling the source again, or when the source
/// ends. A source error is yielded once as [`ChatError::Transport`].
pub fn read_deltas<S, E>(source: S) -> impl futures::Stream<Item = Result<String, ChatError>> + Send
where
    S: futures::Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    struct State<E> {
        source: SourceBytes<E>,
        decoder: EventDecoder,
        pending: VecDeque<String>,
    }

    stream::try_unfold(
        State {
            source: Box::pin(source),
            decoder: EventDecoder::new(),
            pending: VecDeque::new(),
        },
        |mut state| async move {
            loop {
                if let Some(delta) = state.pending.pop_front() {
                    return Ok(Some((delta, state)));
                }
                if state.decoder.is_finished() {
                    return Ok(None);
                }
                match state.source.next().await {
                    Some(Ok(chunk)) => state.pending.extend(state.decoder.push_chunk(&chunk)),
                    Some(Err(err)) => {
                        return Err(ChatError::transport(format!("stream read failed: {err}")));
                    }
                    None => state.pending.extend(state.decoder.finish()),
                }
            }
        },
    )
}
