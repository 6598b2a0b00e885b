use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chatstream_core::ErrorBody;

pub const RATE_LIMIT_MESSAGE: &str = "Rate limit exceeded. Please try again later.";
pub const PAYMENT_REQUIRED_MESSAGE: &str = "Payment required. Please add credits to continue.";

/// Failures the gateway reports instead of opening a canonical stream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// The provider answered with a non-success status.
    #[error("upstream responded with status {status}: {message}")]
    Upstream { status: u16, message: String },
    /// The inbound chat request could not be used.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// The provider could not be reached or its body could not be read.
    #[error("upstream transport error: {0}")]
    Transport(String),
}

impl GatewayError {
    /// Maps a provider status to the message shown to the user.
    pub fn from_upstream_status(status: u16) -> Self {
        let message = match status {
            429 => RATE_LIMIT_MESSAGE.to_string(),
            402 => PAYMENT_REQUIRED_MESSAGE.to_string(),
            other => format!("AI gateway error: {other}"),
        };
        Self::Upstream { status, message }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Upstream { status: 429, .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Upstream { status: 402, .. } => StatusCode::PAYMENT_REQUIRED,
            Self::Upstream { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Transport(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Message placed in the `{ "error": ... }` body.
    pub fn client_message(&self) -> String {
        match self {
            Self::Upstream { message, .. } => message.clone(),
            Self::BadRequest(message) => message.clone(),
            Self::Transport(_) => "AI gateway unreachable".to_string(),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.client_message(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}
