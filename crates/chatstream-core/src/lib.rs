//! Shared building blocks for the chat stream gateway and client.
//!
//! Both sides of the wire agree on one canonical event stream:
//!
//! ```text
//! data: {"choices":[{"delta":{"content":"Hel"}}]}
//!
//! data: {"choices":[{"delta":{"content":"lo"}}]}
//!
//! data: [DONE]
//!
//! ```
//!
//! The gateway turns arbitrary provider responses into that stream using
//! [`extract_text`] and [`sanitize`]; the client decodes it again with the
//! same framing helpers.
//!
//! ```
//! use chatstream_core::{CanonicalDelta, extract_text, sanitize};
//!
//! let value = serde_json::json!({"candidates":[{"content":{"parts":[{"text":"Hi STOP"}]}}]});
//! let text = sanitize(&extract_text(&value));
//! assert_eq!(text, "Hi");
//! assert_eq!(
//!     CanonicalDelta::new(text).encode_event(),
//!     "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\n"
//! );
//! ```

/// Error taxonomy shared by gateway and client.
pub mod errors;
/// Best-effort plain-text extraction from provider JSON shapes.
pub mod extract;
/// Byte buffers that resolve chunked input into events or lines.
pub mod framing;
/// Process-wide tracing setup.
pub mod observability;
/// Removal of provider-internal tokens from extracted text.
pub mod sanitize;
/// Wire contract between gateway and client.
pub mod wire;

pub use errors::{ChatError, PersistenceError};
pub use extract::extract_text;
pub use framing::{EventBuffer, LineBuffer};
pub use sanitize::sanitize;
pub use wire::{
    CanonicalDelta, ChatRequest, DONE_SENTINEL, ErrorBody, MessageRecord, Role, WireMessage,
};
