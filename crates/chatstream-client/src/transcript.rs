use chatstream_core::{ChatError, MessageRecord, Role, WireMessage};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Attachment references carried by a message. Set once at creation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MessageAttachments {
    pub image_ref: Option<String>,
    pub tabular_ref: Option<String>,
    pub tabular_name: Option<String>,
}

/// One turn of a conversation.
///
/// Only the content of the in-flight assistant message ever changes, and
/// only through [`TranscriptAccumulator`].
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    id: Uuid,
    role: Role,
    content: String,
    timestamp: DateTime<Utc>,
    attachments: MessageAttachments,
}

impl Message {
    fn new(role: Role, content: String, attachments: MessageAttachments) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content,
            timestamp: Utc::now(),
            attachments,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn attachments(&self) -> &MessageAttachments {
        &self.attachments
    }

    pub fn image_ref(&self) -> Option<&str> {
        self.attachments.image_ref.as_deref()
    }

    pub fn tabular_ref(&self) -> Option<&str> {
        self.attachments.tabular_ref.as_deref()
    }

    pub fn tabular_name(&self) -> Option<&str> {
        self.attachments.tabular_name.as_deref()
    }

    /// Persistence record for this message.
    pub fn to_record(&self, conversation_id: &str, user_id: Option<&str>) -> MessageRecord {
        MessageRecord {
            conversation_id: conversation_id.to_string(),
            user_id: user_id.map(str::to_string),
            role: self.role,
            content: self.content.clone(),
            image_ref: self.attachments.image_ref.clone(),
            tabular_ref: self.attachments.tabular_ref.clone(),
            tabular_file_name: self.attachments.tabular_name.clone(),
        }
    }
}

/// Ordered message list with at most one in-flight assistant message.
#[derive(Debug, Default)]
pub struct TranscriptAccumulator {
    messages: Vec<Message>,
    in_flight: Option<usize>,
}

impl TranscriptAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a transcript from previously persisted records.
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a MessageRecord>) -> Self {
        let messages = records
            .into_iter()
            .map(|record| {
                Message::new(
                    record.role,
                    record.content.clone(),
                    MessageAttachments {
                        image_ref: record.image_ref.clone(),
                        tabular_ref: record.tabular_ref.clone(),
                        tabular_name: record.tabular_file_name.clone(),
                    },
                )
            })
            .collect();
        Self {
            messages,
            in_flight: None,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn in_flight(&self) -> Option<&Message> {
        self.in_flight.map(|idx| &self.messages[idx])
    }

    pub fn push_user(
        &mut self,
        content: impl Into<String>,
        attachments: MessageAttachments,
    ) -> Result<&Message, ChatError> {
        self.ensure_idle()?;
        self.messages
            .push(Message::new(Role::User, content.into(), attachments));
        Ok(&self.messages[self.messages.len() - 1])
    }

    /// Appends the empty assistant message that receives the next deltas.
    pub fn begin_assistant(&mut self) -> Result<&Message, ChatError> {
        self.ensure_idle()?;
        self.messages.push(Message::new(
            Role::Assistant,
            String::new(),
            MessageAttachments::default(),
        ));
        let idx = self.messages.len() - 1;
        self.in_flight = Some(idx);
        Ok(&self.messages[idx])
    }

    pub fn apply_delta(&mut self, delta: &str) -> Result<(), ChatError> {
        let idx = self
            .in_flight
            .ok_or_else(|| ChatError::Protocol("delta received with no in-flight message".into()))?;
        self.messages[idx].content.push_str(delta);
        Ok(())
    }

    /// Freezes the in-flight message and returns it.
    pub fn finish(&mut self) -> Option<&Message> {
        let idx = self.in_flight.take()?;
        Some(&self.messages[idx])
    }

    /// Conversation history in wire form, excluding the in-flight message
    /// and assistant turns that never received text.
    pub fn wire_history(&self) -> Vec<WireMessage> {
        self.messages
            .iter()
            .enumerate()
            .filter(|(idx, _)| Some(*idx) != self.in_flight)
            .filter(|(_, m)| m.role == Role::User || !m.content.is_empty())
            .map(|(_, m)| WireMessage::new(m.role, m.content.clone()))
            .collect()
    }

    fn ensure_idle(&self) -> Result<(), ChatError> {
        if self.in_flight.is_some() {
            return Err(ChatError::Busy);
        }
        Ok(())
    }
}
