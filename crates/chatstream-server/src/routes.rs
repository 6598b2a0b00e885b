use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use chatstream_core::ChatRequest;
use tracing::{Instrument as _, info, info_span};

use crate::error::GatewayError;
use crate::image_store::ImageStore;
use crate::reframe::{ReframeMode, encode_document, reframe_stream};
use crate::upstream::UpstreamClient;

/// Shared state for the gateway routes.
#[derive(Clone)]
pub struct AppState {
    pub upstream: Arc<UpstreamClient>,
    pub image_store: Option<Arc<dyn ImageStore>>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/chat", post(chat))
        .route("/health", get(health))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response, GatewayError> {
    let Json(request) = payload.map_err(|e| GatewayError::BadRequest(e.body_text()))?;
    let request_id = uuid::Uuid::new_v4();
    let span = info_span!("chat", %request_id);
    async move {
        info!(
            event = "chat.request_received",
            domain = "gateway",
            messages = request.messages.len() as u64,
            has_image = request.image_data.is_some(),
            has_csv = request.csv_data.is_some()
        );
        let body = state
            .upstream
            .prepare(&request, state.image_store.as_deref())
            .await?;
        let upstream = state.upstream.send(&body).await?;

        let body = match upstream.mode {
            ReframeMode::WholeDocument => {
                let bytes = upstream
                    .response
                    .bytes()
                    .await
                    .map_err(|e| GatewayError::Transport(e.to_string()))?;
                Body::from(encode_document(&bytes))
            }
            ReframeMode::Streamed => {
                Body::from_stream(reframe_stream(upstream.response.bytes_stream()))
            }
        };
        info!(event = "chat.stream_opened", domain = "gateway", mode = upstream.mode.as_str());

        Ok((
            [
                (header::CONTENT_TYPE, "text/event-stream"),
                (header::CACHE_CONTROL, "no-cache"),
            ],
            body,
        )
            .into_response())
    }
    .instrument(span)
    .await
}
