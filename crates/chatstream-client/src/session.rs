//! One conversation and the round trips made in it.
//!
//! A round moves `Idle -> Sending -> Streaming -> Completed | Failed -> Idle`.
//! Failed rounds never remove messages: the user turn and whatever the
//! assistant had produced so far stay in the transcript.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use chatstream_core::{ChatError, ChatRequest};
use futures::StreamExt as _;
use tokio::sync::watch;
use tracing::{Instrument as _, debug, info, info_span, warn};
use uuid::Uuid;

use crate::attachment::{
    AttachmentLimits, ImageAttachment, TabularAttachment, load_image, load_tabular_file,
    parse_tabular_url, remote_tabular,
};
use crate::reader::read_deltas;
use crate::store::MessageStore;
use crate::transcript::{Message, MessageAttachments, TranscriptAccumulator};
use crate::transport::ChatTransport;

/// Identity a session runs under, fixed for its lifetime.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionContext {
    pub conversation_id: String,
    pub user_id: Option<String>,
}

impl SessionContext {
    pub fn new(conversation_id: impl Into<String>, user_id: Option<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            user_id,
        }
    }

    /// Context for a brand-new conversation.
    pub fn fresh(user_id: Option<String>) -> Self {
        Self::new(Uuid::new_v4().to_string(), user_id)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoundState {
    Idle,
    Sending,
    Streaming,
    Completed,
    Failed,
}

impl RoundState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Sending => "sending",
            Self::Streaming => "streaming",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// Receives transcript snapshots and state transitions.
///
/// `transcript_updated` fires once per appended message and once per
/// applied delta, never batched.
pub trait SessionObserver: Send + Sync {
    fn transcript_updated(&self, _messages: &[Message]) {}

    fn state_changed(&self, _state: RoundState) {}
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopObserver;

impl SessionObserver for NoopObserver {}

/// Cancels the active round of the session it came from.
#[derive(Clone)]
pub struct AbortHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl AbortHandle {
    /// Requests cancellation. Has no effect while the session is idle.
    pub fn abort(&self) {
        let _ = self.tx.send(true);
    }
}

/// What the user submits for one round.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SendInput {
    pub text: String,
    pub image: Option<PathBuf>,
    pub tabular_file: Option<PathBuf>,
    pub tabular_url: Option<String>,
}

impl SendInput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn with_image(mut self, path: impl Into<PathBuf>) -> Self {
        self.image = Some(path.into());
        self
    }

    pub fn with_tabular_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.tabular_file = Some(path.into());
        self
    }

    pub fn with_tabular_url(mut self, url: impl Into<String>) -> Self {
        self.tabular_url = Some(url.into());
        self
    }

    /// True when no input channel carries anything.
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
            && self.image.is_none()
            && self.tabular_file.is_none()
            && self
                .tabular_url
                .as_deref()
                .is_none_or(|url| url.trim().is_empty())
    }
}

/// Result of a completed round.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoundOutcome {
    pub message_id: Uuid,
    pub content: String,
    pub deltas: usize,
}

struct ResolvedInput {
    text: String,
    image: Option<ImageAttachment>,
    tabular: Option<TabularAttachment>,
}

pub struct ChatSession {
    context: SessionContext,
    transport: Arc<dyn ChatTransport>,
    store: Arc<dyn MessageStore>,
    observer: Arc<dyn SessionObserver>,
    limits: AttachmentLimits,
    transcript: TranscriptAccumulator,
    state: RoundState,
    abort_tx: Arc<watch::Sender<bool>>,
}

impl ChatSession {
    pub fn new(
        context: SessionContext,
        transport: Arc<dyn ChatTransport>,
        store: Arc<dyn MessageStore>,
        observer: Arc<dyn SessionObserver>,
    ) -> Self {
        let (abort_tx, _) = watch::channel(false);
        Self {
            context,
            transport,
            store,
            observer,
            limits: AttachmentLimits::default(),
            transcript: TranscriptAccumulator::new(),
            state: RoundState::Idle,
            abort_tx: Arc::new(abort_tx),
        }
    }

    pub fn with_limits(mut self, limits: AttachmentLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Starts from an existing transcript, e.g. one restored from storage.
    pub fn with_transcript(mut self, transcript: TranscriptAccumulator) -> Self {
        self.transcript = transcript;
        self
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub fn messages(&self) -> &[Message] {
        self.transcript.messages()
    }

    pub fn state(&self) -> RoundState {
        self.state
    }

    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle {
            tx: self.abort_tx.clone(),
        }
    }

    /// Returns to `Idle` after a `send` future was dropped mid-round,
    /// freezing whatever the in-flight message had received.
    pub fn reset(&mut self) {
        if self.state == RoundState::Idle {
            return;
        }
        warn!(event = "session.round_abandoned", domain = "session", state = self.state.as_str());
        self.transcript.finish();
        self.set_state(RoundState::Idle);
    }

    /// Runs one round trip.
    ///
    /// Empty input is rejected before any state change. Attachment failures
    /// end the round before any message is appended or the chat endpoint is
    /// called.
    pub async fn send(&mut self, input: SendInput) -> Result<RoundOutcome, ChatError> {
        if self.state != RoundState::Idle {
            return Err(ChatError::Busy);
        }
        if input.is_empty() {
            return Err(ChatError::validation(
                "enter a message or attach an image or CSV file",
            ));
        }
        if input.tabular_file.is_some() && input.tabular_url.is_some() {
            return Err(ChatError::validation(
                "attach either a CSV file or a CSV URL, not both",
            ));
        }

        self.abort_tx.send_replace(false);
        let mut abort_rx = self.abort_tx.subscribe();
        let span = info_span!("round", conversation_id = %self.context.conversation_id);

        async {
            self.set_state(RoundState::Sending);
            let result = self.run_round(input, &mut abort_rx).await;
            match &result {
                Ok(outcome) => {
                    info!(event = "session.round_completed", domain = "session", deltas = outcome.deltas as u64, chars = outcome.content.len() as u64);
                    self.set_state(RoundState::Completed);
                }
                Err(ChatError::Cancelled) => {
                    info!(event = "session.round_cancelled", domain = "session");
                    self.transcript.finish();
                    self.set_state(RoundState::Failed);
                }
                Err(err) => {
                    warn!(event = "session.round_failed", domain = "session", error = %err);
                    self.transcript.finish();
                    self.set_state(RoundState::Failed);
                }
            }
            self.set_state(RoundState::Idle);
            result
        }
        .instrument(span)
        .await
    }

    async fn run_round(
        &mut self,
        input: SendInput,
        abort_rx: &mut watch::Receiver<bool>,
    ) -> Result<RoundOutcome, ChatError> {
        let resolved = until_aborted(abort_rx, self.resolve(input)).await??;

        let attachments = MessageAttachments {
            image_ref: resolved.image.as_ref().map(|i| i.data_url.clone()),
            tabular_ref: resolved.tabular.as_ref().and_then(|t| t.source_url.clone()),
            tabular_name: resolved.tabular.as_ref().map(|t| t.file_name.clone()),
        };
        let user_record = self
            .transcript
            .push_user(resolved.text, attachments)?
            .to_record(&self.context.conversation_id, self.context.user_id.as_deref());
        self.observer.transcript_updated(self.transcript.messages());
        self.persist(&user_record).await;

        let message_id = self.transcript.begin_assistant()?.id();
        self.observer.transcript_updated(self.transcript.messages());

        let request = ChatRequest {
            messages: self.transcript.wire_history(),
            image_data: resolved.image.map(|i| i.data_url),
            csv_data: resolved.tabular.map(|t| t.content),
        };
        let body = until_aborted(abort_rx, self.transport.open_stream(&request)).await??;
        self.set_state(RoundState::Streaming);

        let deltas = read_deltas(body);
        tokio::pin!(deltas);
        let mut applied = 0_usize;
        while let Some(delta) = until_aborted(abort_rx, deltas.next()).await? {
            let delta = delta?;
            self.transcript.apply_delta(&delta)?;
            applied += 1;
            self.observer.transcript_updated(self.transcript.messages());
        }

        let finished = self
            .transcript
            .finish()
            .ok_or_else(|| ChatError::Protocol("in-flight message vanished".into()))?;
        let outcome = RoundOutcome {
            message_id,
            content: finished.content().to_string(),
            deltas: applied,
        };
        if !outcome.content.is_empty() {
            let record =
                finished.to_record(&self.context.conversation_id, self.context.user_id.as_deref());
            self.persist(&record).await;
        }
        Ok(outcome)
    }

    async fn resolve(&self, input: SendInput) -> Result<ResolvedInput, ChatError> {
        let image = match input.image.as_deref() {
            Some(path) => Some(load_image(path, &self.limits).await?),
            None => None,
        };
        let tabular = match (input.tabular_file.as_deref(), input.tabular_url.as_deref()) {
            (Some(path), _) => Some(load_tabular_file(path, &self.limits).await?),
            (None, Some(raw)) if !raw.trim().is_empty() => {
                let url = parse_tabular_url(raw)?;
                let content = self.transport.fetch_text(&url).await?;
                Some(remote_tabular(&url, content, &self.limits)?)
            }
            _ => None,
        };
        Ok(ResolvedInput {
            text: input.text.trim().to_string(),
            image,
            tabular,
        })
    }

    async fn persist(&self, record: &chatstream_core::MessageRecord) {
        if let Err(err) = self.store.append(record).await {
            warn!(event = "session.persist_failed", domain = "session", role = %record.role, error = %err);
        }
    }

    fn set_state(&mut self, state: RoundState) {
        debug!(event = "session.state_changed", domain = "session", from = self.state.as_str(), to = state.as_str());
        self.state = state;
        self.observer.state_changed(state);
    }
}

/// Runs `fut` unless the abort flag flips first.
async fn until_aborted<F: Future>(
    abort_rx: &mut watch::Receiver<bool>,
    fut: F,
) -> Result<F::Output, ChatError> {
    tokio::pin!(fut);
    loop {
        tokio::select! {
            out = &mut fut => return Ok(out),
            changed = abort_rx.changed() => match changed {
                Ok(()) if *abort_rx.borrow() => return Err(ChatError::Cancelled),
                Ok(()) => {}
                Err(_) => return Ok(fut.await),
            },
        }
    }
}
