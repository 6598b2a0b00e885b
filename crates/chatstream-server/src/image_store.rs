//! Best-effort offload of inline images to an object store.
//!
//! Forwarding a durable URL keeps provider requests small. Any failure falls
//! back to the original data URL; offloading never aborts a chat turn.

use std::time::Duration;

use base64::Engine as _;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ImageStoreError {
    #[error("invalid data url: {0}")]
    InvalidDataUrl(String),
    #[error("image upload failed: {0}")]
    Upload(String),
}

/// Object store that turns inline image payloads into durable URLs.
#[async_trait::async_trait]
pub trait ImageStore: Send + Sync {
    async fn store(&self, image: &DataUrl) -> Result<String, ImageStoreError>;
}

/// Decoded `data:<media-type>;base64,<payload>` URL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataUrl {
    pub media_type: String,
    pub bytes: Vec<u8>,
}

impl DataUrl {
    pub fn parse(raw: &str) -> Result<Self, ImageStoreError> {
        let rest = raw
            .strip_prefix("data:")
            .ok_or_else(|| ImageStoreError::InvalidDataUrl("missing data: scheme".into()))?;
        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| ImageStoreError::InvalidDataUrl("missing payload separator".into()))?;
        let media_type = header
            .strip_suffix(";base64")
            .ok_or_else(|| ImageStoreError::InvalidDataUrl("payload is not base64".into()))?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .map_err(|e| ImageStoreError::InvalidDataUrl(e.to_string()))?;
        Ok(Self {
            media_type: media_type.to_string(),
            bytes,
        })
    }

    /// File extension derived from the media subtype (`image/png` -> `png`).
    pub fn extension(&self) -> &str {
        self.media_type
            .split_once('/')
            .map(|(_, subtype)| subtype.split('+').next().unwrap_or(subtype))
            .filter(|ext| !ext.is_empty())
            .unwrap_or("bin")
    }
}

/// Uploads images with `PUT <base_url>/<uuid>.<ext>`.
pub struct HttpImageStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpImageStore {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ImageStoreError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ImageStoreError::Upload(format!("failed to build client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait::async_trait]
impl ImageStore for HttpImageStore {
    async fn store(&self, image: &DataUrl) -> Result<String, ImageStoreError> {
        let url = format!(
            "{}/{}.{}",
            self.base_url.trim_end_matches('/'),
            uuid::Uuid::new_v4(),
            image.extension()
        );
        let response = self
            .client
            .put(&url)
            .header(reqwest::header::CONTENT_TYPE, &image.media_type)
            .body(image.bytes.clone())
            .send()
            .await
            .map_err(|e| ImageStoreError::Upload(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ImageStoreError::Upload(format!("status={status}")));
        }
        Ok(url)
    }
}

/// Returns a durable URL for `data_url`, or `data_url` itself on any failure.
pub async fn offload_image(store: Option<&dyn ImageStore>, data_url: &str) -> String {
    let Some(store) = store else {
        return data_url.to_string();
    };
    let image = match DataUrl::parse(data_url) {
        Ok(image) => image,
        Err(err) => {
            warn!(event = "image.offload_skipped", domain = "image", error = %err);
            return data_url.to_string();
        }
    };
    match store.store(&image).await {
        Ok(url) => {
            debug!(event = "image.offloaded", domain = "image", media_type = %image.media_type, image_bytes = image.bytes.len() as u64);
            url
        }
        Err(err) => {
            warn!(event = "image.offload_failed", domain = "image", error = %err);
            data_url.to_string()
        }
    }
}
