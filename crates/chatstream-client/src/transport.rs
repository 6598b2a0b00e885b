use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use chatstream_core::{ChatError, ChatRequest, ErrorBody};
use futures::{Stream, StreamExt as _};
use tracing::{debug, warn};

/// Raw response body of an accepted chat request.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, ChatError>> + Send>>;

/// Network seam used by [`crate::ChatSession`].
#[async_trait::async_trait]
pub trait ChatTransport: Send + Sync {
    /// Posts a chat request. Non-success responses never yield a stream.
    async fn open_stream(&self, request: &ChatRequest) -> Result<ByteStream, ChatError>;

    /// Downloads a remote tabular file as text.
    async fn fetch_text(&self, url: &reqwest::Url) -> Result<String, ChatError>;
}

/// [`ChatTransport`] over HTTP to a gateway's `POST /chat`.
pub struct HttpTransport {
    client: reqwest::Client,
    chat_url: reqwest::Url,
}

impl HttpTransport {
    /// `server_url` is the gateway base URL; `/chat` is appended.
    ///
    /// Only the connect phase is bounded by `connect_timeout`, since a
    /// streamed answer may legitimately take minutes.
    pub fn new(server_url: &str, connect_timeout: Duration) -> Result<Self, ChatError> {
        let base = reqwest::Url::parse(server_url)
            .map_err(|e| ChatError::Config(format!("invalid server url `{server_url}`: {e}")))?;
        let chat_url = reqwest::Url::parse(&format!(
            "{}/chat",
            base.as_str().trim_end_matches('/')
        ))
        .map_err(|e| ChatError::Config(e.to_string()))?;
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| ChatError::Config(format!("failed to build http client: {e}")))?;
        Ok(Self { client, chat_url })
    }

    pub fn chat_url(&self) -> &reqwest::Url {
        &self.chat_url
    }
}

#[async_trait::async_trait]
impl ChatTransport for HttpTransport {
    async fn open_stream(&self, request: &ChatRequest) -> Result<ByteStream, ChatError> {
        debug!(event = "transport.request_started", domain = "transport", url = %self.chat_url, messages = request.messages.len() as u64);
        let response = self
            .client
            .post(self.chat_url.clone())
            .json(request)
            .send()
            .await
            .map_err(|e| ChatError::transport(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&text)
                .map(|body| body.error)
                .ok()
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| format!("request failed with status {status}"));
            warn!(event = "transport.status_error", domain = "transport", status = status.as_u16(), message = %message);
            return Err(ChatError::upstream(status.as_u16(), message));
        }

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| ChatError::transport(e.to_string())));
        Ok(Box::pin(stream))
    }

    async fn fetch_text(&self, url: &reqwest::Url) -> Result<String, ChatError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| ChatError::transport(format!("failed to fetch {url}: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ChatError::upstream(
                status.as_u16(),
                format!("failed to fetch {url}: status {status}"),
            ));
        }
        response
            .text()
            .await
            .map_err(|e| ChatError::transport(format!("failed to read {url}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    use axum::Router;
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use chatstream_core::{Role, WireMessage};
    use futures::TryStreamExt as _;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve");
        });
        format!("http://{addr}")
    }

    fn request() -> ChatRequest {
        ChatRequest {
            messages: vec![WireMessage::new(Role::User, "hi")],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn streams_success_body() {
        let base = serve(Router::new().route(
            "/chat",
            post(|| async { "data: {\"text\":\"hey\"}\n\ndata: [DONE]\n\n" }),
        ))
        .await;
        let transport = HttpTransport::new(&base, Duration::from_secs(5)).expect("transport");
        let chunks: Vec<Bytes> = transport
            .open_stream(&request())
            .await
            .expect("stream")
            .try_collect()
            .await
            .expect("body");
        assert_eq!(chunks.concat(), b"data: {\"text\":\"hey\"}\n\ndata: [DONE]\n\n");
    }

    #[tokio::test]
    async fn error_body_becomes_upstream_error() {
        let base = serve(Router::new().route(
            "/chat",
            post(|| async {
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    axum::Json(ErrorBody {
                        error: "Rate limit exceeded. Please try again later.".into(),
                    }),
                )
            }),
        ))
        .await;
        let transport = HttpTransport::new(&base, Duration::from_secs(5)).expect("transport");
        let err = match transport.open_stream(&request()).await {
            Ok(_) => panic!("429 must not open a stream"),
            Err(err) => err,
        };
        assert_eq!(
            err,
            ChatError::upstream(429, "Rate limit exceeded. Please try again later.")
        );
    }

    #[tokio::test]
    async fn fetches_remote_text() {
        let base = serve(
            Router::new()
                .route("/q1.csv", get(|| async { "a,b\n1,2\n" }))
                .route("/missing.csv", get(|| async { StatusCode::NOT_FOUND })),
        )
        .await;
        let transport = HttpTransport::new(&base, Duration::from_secs(5)).expect("transport");
        let url = reqwest::Url::parse(&format!("{base}/q1.csv")).expect("url");
        assert_eq!(transport.fetch_text(&url).await.expect("text"), "a,b\n1,2\n");

        let missing = reqwest::Url::parse(&format!("{base}/missing.csv")).expect("url");
        let err = transport.fetch_text(&missing).await.unwrap_err();
        assert_eq!(err.status_code(), Some(404));
    }

    #[test]
    fn chat_url_is_derived_from_base() {
        let transport =
            HttpTransport::new("http://127.0.0.1:8787/", Duration::from_secs(1)).expect("transport");
        assert_eq!(transport.chat_url().as_str(), "http://127.0.0.1:8787/chat");
        assert!(matches!(
            HttpTransport::new("nope", Duration::from_secs(1)),
            Err(ChatError::Config(_))
        ));
    }
}
