use std::fmt;

use serde::{Deserialize, Serialize};

/// Payload that marks the logical end of a canonical stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Author of a chat message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One normalized text fragment sent from gateway to client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CanonicalDelta {
    pub delta_text: String,
}

impl CanonicalDelta {
    pub fn new(delta_text: impl Into<String>) -> Self {
        Self {
            delta_text: delta_text.into(),
        }
    }

    /// JSON payload in the chat-completions chunk layout.
    pub fn payload(&self) -> serde_json::Value {
        serde_json::json!({ "choices": [{ "delta": { "content": self.delta_text } }] })
    }

    /// Full SSE event, including the closing blank line.
    pub fn encode_event(&self) -> String {
        format!("data: {}\n\n", self.payload())
    }

    /// Terminal SSE event carrying [`DONE_SENTINEL`].
    pub fn done_event() -> String {
        format!("data: {DONE_SENTINEL}\n\n")
    }
}

/// Message history entry in the inbound chat request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: Role,
    pub content: String,
}

impl WireMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Body of `POST /chat`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub messages: Vec<WireMessage>,
    /// Data URL, e.g. `data:image/png;base64,...`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_data: Option<String>,
    /// Raw CSV text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub csv_data: Option<String>,
}

/// JSON body of every gateway error response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Append-only record handed to the persistence collaborator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    pub conversation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tabular_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tabular_file_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_event_matches_wire_contract() {
        let event = CanonicalDelta::new("Hel\"lo\n").encode_event();
        assert_eq!(
            event,
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\\\"lo\\n\"}}]}\n\n"
        );
        assert_eq!(CanonicalDelta::done_event(), "data: [DONE]\n\n");
    }

    #[test]
    fn chat_request_uses_camel_case_optional_fields() {
        let body = serde_json::json!({
            "messages": [{"role": "user", "content": "hi"}],
            "imageData": "data:image/png;base64,AAAA",
        });
        let req: ChatRequest = serde_json::from_value(body).expect("request");
        assert_eq!(req.messages, vec![WireMessage::new(Role::User, "hi")]);
        assert_eq!(req.image_data.as_deref(), Some("data:image/png;base64,AAAA"));
        assert!(req.csv_data.is_none());

        let encoded = serde_json::to_value(&req).expect("encode");
        assert!(encoded.get("csvData").is_none());
    }

    #[test]
    fn message_record_omits_absent_attachments() {
        let record = MessageRecord {
            conversation_id: "c1".into(),
            user_id: None,
            role: Role::Assistant,
            content: "done".into(),
            image_ref: None,
            tabular_ref: None,
            tabular_file_name: Some("data.csv".into()),
        };
        let value = serde_json::to_value(&record).expect("encode");
        assert_eq!(
            value,
            serde_json::json!({
                "conversationId": "c1",
                "role": "assistant",
                "content": "done",
                "tabularFileName": "data.csv"
            })
        );
    }
}
