use std::time::Duration;

use chatstream_core::{ChatRequest, Role};
use tracing::{debug, warn};

use crate::error::GatewayError;
use crate::image_store::{ImageStore, offload_image};
use crate::reframe::ReframeMode;

/// Connection and prompt settings for the OpenAI-compatible provider.
#[derive(Clone, Debug)]
pub struct UpstreamConfig {
    /// Full chat-completions endpoint URL.
    pub url: String,
    /// Bearer token; omitted for keyless local providers.
    pub api_key: Option<String>,
    pub model: String,
    pub system_prompt: Option<String>,
    pub timeout: Duration,
}

impl UpstreamConfig {
    pub fn new(url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: None,
            model: model.into(),
            system_prompt: None,
            timeout: Duration::from_secs(120),
        }
    }
}

/// HTTP client for the generative-language provider.
pub struct UpstreamClient {
    client: reqwest::Client,
    config: UpstreamConfig,
}

impl UpstreamClient {
    pub fn new(config: UpstreamConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::Transport(format!("failed to build upstream client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Builds the provider body, offloading an inline image first when a
    /// store is configured.
    pub async fn prepare(
        &self,
        request: &ChatRequest,
        image_store: Option<&dyn ImageStore>,
    ) -> Result<serde_json::Value, GatewayError> {
        let image_url = match request.image_data.as_deref().filter(|s| !s.trim().is_empty()) {
            Some(data_url) => Some(offload_image(image_store, data_url).await),
            None => None,
        };
        build_provider_body(&self.config, request, image_url.as_deref())
    }

    /// Sends the provider request. Non-success statuses never produce a
    /// stream; they map straight to [`GatewayError::Upstream`].
    pub async fn send(&self, body: &serde_json::Value) -> Result<UpstreamResponse, GatewayError> {
        let mut http_req = self.client.post(&self.config.url).json(body);
        if let Some(key) = self.config.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
            http_req = http_req.bearer_auth(key);
        }
        debug!(event = "upstream.request_started", domain = "upstream", model = %self.config.model);

        let response = http_req.send().await.map_err(|e| {
            warn!(event = "upstream.request_failed", domain = "upstream", error = %e);
            GatewayError::Transport(e.to_string())
        })?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            warn!(event = "upstream.status_error", domain = "upstream", status = status.as_u16(), body = %body);
            return Err(GatewayError::from_upstream_status(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok());
        let chunked = response
            .headers()
            .get(reqwest::header::TRANSFER_ENCODING)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_ascii_lowercase().contains("chunked"))
            .unwrap_or(false);
        let mode = ReframeMode::detect(content_type, chunked);
        debug!(event = "upstream.response_started", domain = "upstream", mode = mode.as_str(), content_type = content_type.unwrap_or("none"));
        Ok(UpstreamResponse { mode, response })
    }
}

/// Successful provider response together with the mode used to read it.
pub struct UpstreamResponse {
    pub mode: ReframeMode,
    pub response: reqwest::Response,
}

/// OpenAI-compatible chat-completions request body.
///
/// Attachments are placed on the last user message as multi-part content:
/// the typed text, the CSV text, and the image URL, in that order.
pub fn build_provider_body(
    config: &UpstreamConfig,
    request: &ChatRequest,
    image_url: Option<&str>,
) -> Result<serde_json::Value, GatewayError> {
    let csv = request
        .csv_data
        .as_deref()
        .filter(|s| !s.trim().is_empty());
    if request.messages.is_empty() && image_url.is_none() && csv.is_none() {
        return Err(GatewayError::BadRequest(
            "chat request must contain at least one message".into(),
        ));
    }

    let mut messages = Vec::with_capacity(request.messages.len() + 2);
    if let Some(prompt) = config
        .system_prompt
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        messages.push(serde_json::json!({ "role": "system", "content": prompt }));
    }

    let last_user = request
        .messages
        .iter()
        .rposition(|m| m.role == Role::User);
    let has_attachments = image_url.is_some() || csv.is_some();
    for (idx, message) in request.messages.iter().enumerate() {
        if has_attachments && Some(idx) == last_user {
            messages.push(serde_json::json!({
                "role": "user",
                "content": attachment_parts(&message.content, csv, image_url),
            }));
        } else {
            messages.push(serde_json::json!({
                "role": message.role.as_str(),
                "content": message.content,
            }));
        }
    }
    if has_attachments && last_user.is_none() {
        messages.push(serde_json::json!({
            "role": "user",
            "content": attachment_parts("", csv, image_url),
        }));
    }

    Ok(serde_json::json!({
        "model": config.model,
        "messages": messages,
        "stream": true,
    }))
}

fn attachment_parts(text: &str, csv: Option<&str>, image_url: Option<&str>) -> serde_json::Value {
    let mut parts = Vec::new();
    if !text.trim().is_empty() {
        parts.push(serde_json::json!({ "type": "text", "text": text }));
    }
    if let Some(csv) = csv {
        parts.push(serde_json::json!({
            "type": "text",
            "text": format!("CSV data:\n{csv}"),
        }));
    }
    if let Some(url) = image_url {
        parts.push(serde_json::json!({ "type": "image_url", "image_url": { "url": url } }));
    }
    serde_json::Value::Array(parts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatstream_core::WireMessage;

    fn config() -> UpstreamConfig {
        let mut config = UpstreamConfig::new("http://upstream.test/v1/chat/completions", "m-1");
        config.system_prompt = Some("Be brief.".into());
        config
    }

    #[test]
    fn text_only_request_keeps_history_and_system_prompt() {
        let request = ChatRequest {
            messages: vec![
                WireMessage::new(Role::User, "hi"),
                WireMessage::new(Role::Assistant, "hello"),
                WireMessage::new(Role::User, "capital of France?"),
            ],
            ..Default::default()
        };
        let body = build_provider_body(&config(), &request, None).expect("body");
        assert_eq!(body["model"], "m-1");
        assert_eq!(body["stream"], true);
        let messages = body["messages"].as_array().expect("messages");
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0], serde_json::json!({"role":"system","content":"Be brief."}));
        assert_eq!(messages[3]["content"], "capital of France?");
    }

    #[test]
    fn attachments_go_on_last_user_message() {
        let request = ChatRequest {
            messages: vec![
                WireMessage::new(Role::User, "old"),
                WireMessage::new(Role::User, "describe"),
            ],
            image_data: Some("data:image/png;base64,AAAA".into()),
            csv_data: Some("a,b\n1,2".into()),
        };
        let body = build_provider_body(&config(), &request, Some("https://cdn.test/x.png"))
            .expect("body");
        let messages = body["messages"].as_array().expect("messages");
        assert_eq!(messages[1]["content"], "old");
        assert_eq!(
            messages[2]["content"],
            serde_json::json!([
                {"type":"text","text":"describe"},
                {"type":"text","text":"CSV data:\na,b\n1,2"},
                {"type":"image_url","image_url":{"url":"https://cdn.test/x.png"}}
            ])
        );
    }

    #[test]
    fn attachment_without_messages_creates_user_turn() {
        let request = ChatRequest {
            messages: Vec::new(),
            image_data: None,
            csv_data: Some("x\n1".into()),
        };
        let body = build_provider_body(&config(), &request, None).expect("body");
        let messages = body["messages"].as_array().expect("messages");
        assert_eq!(messages.len(), 2);
        assert_eq!(
            messages[1]["content"],
            serde_json::json!([{"type":"text","text":"CSV data:\nx\n1"}])
        );
    }

    #[test]
    fn empty_request_is_rejected() {
        let err = build_provider_body(&config(), &ChatRequest::default(), None).expect_err("empty");
        assert!(matches!(err, GatewayError::BadRequest(_)));
    }
}
