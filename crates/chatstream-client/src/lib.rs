//! Client side of the chat stream: decodes the gateway's canonical delta
//! stream and applies it to a live transcript.
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use chatstream_client::{
//!     ChatSession, HttpTransport, NoopMessageStore, NoopObserver, SendInput, SessionContext,
//! };
//!
//! # async fn run() -> Result<(), chatstream_core::ChatError> {
//! let transport = HttpTransport::new("http://127.0.0.1:8787", Duration::from_secs(10))?;
//! let mut session = ChatSession::new(
//!     SessionContext::fresh(None),
//!     Arc::new(transport),
//!     Arc::new(NoopMessageStore),
//!     Arc::new(NoopObserver),
//! );
//! let outcome = session.send(SendInput::text("What is the capital of France?")).await?;
//! println!("{}", outcome.content);
//! # Ok(())
//! # }
//! ```

pub mod attachment;
pub mod config;
pub mod reader;
pub mod session;
pub mod store;
pub mod terminal;
pub mod transcript;
pub mod transport;

pub use attachment::{AttachmentLimits, ImageAttachment, TabularAttachment};
pub use config::ClientConfig;
pub use reader::{DecodedEvent, EventDecoder, decode_event, read_deltas};
pub use session::{
    AbortHandle, ChatSession, NoopObserver, RoundOutcome, RoundState, SendInput, SessionContext,
    SessionObserver,
};
pub use store::{JsonlMessageStore, MessageStore, NoopMessageStore};
pub use terminal::TerminalObserver;
pub use transcript::{Message, MessageAttachments, TranscriptAccumulator};
pub use transport::{ByteStream, ChatTransport, HttpTransport};
