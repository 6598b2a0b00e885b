//! Attachment checks and encoding done before a round starts.
//!
//! Every failure here is a [`ChatError::Validation`], raised before any
//! request reaches the gateway.

use std::path::Path;

use base64::Engine as _;
use chatstream_core::ChatError;

pub const DEFAULT_MAX_IMAGE_BYTES: u64 = 10 * 1024 * 1024;
pub const DEFAULT_MAX_TABULAR_BYTES: u64 = 20 * 1024 * 1024;
pub const DEFAULT_TABULAR_SUFFIX: &str = ".csv";

/// Size ceilings and naming rules for attachments.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttachmentLimits {
    pub max_image_bytes: u64,
    pub max_tabular_bytes: u64,
    pub tabular_suffix: String,
}

impl Default for AttachmentLimits {
    fn default() -> Self {
        Self {
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
            max_tabular_bytes: DEFAULT_MAX_TABULAR_BYTES,
            tabular_suffix: DEFAULT_TABULAR_SUFFIX.to_string(),
        }
    }
}

/// An image ready to be sent inline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageAttachment {
    pub file_name: String,
    pub media_type: String,
    /// `data:<media-type>;base64,<payload>`
    pub data_url: String,
}

/// Tabular text ready to be sent, from a local file or a remote URL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TabularAttachment {
    pub file_name: String,
    pub content: String,
    /// Source URL for remote files.
    pub source_url: Option<String>,
}

/// Image media type implied by a file extension.
pub fn image_media_type(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let media_type = match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "svg" => "image/svg+xml",
        _ => return None,
    };
    Some(media_type)
}

pub fn validate_image(media_type: &str, len: u64, limits: &AttachmentLimits) -> Result<(), ChatError> {
    if !media_type.starts_with("image/") {
        return Err(ChatError::validation(format!(
            "unsupported image type `{media_type}`"
        )));
    }
    if len > limits.max_image_bytes {
        return Err(ChatError::validation(format!(
            "image is {len} bytes, limit is {}",
            limits.max_image_bytes
        )));
    }
    Ok(())
}

pub fn validate_tabular(file_name: &str, len: u64, limits: &AttachmentLimits) -> Result<(), ChatError> {
    let suffix = limits.tabular_suffix.to_ascii_lowercase();
    if !file_name.to_ascii_lowercase().ends_with(&suffix) {
        return Err(ChatError::validation(format!(
            "`{file_name}` is not a {suffix} file"
        )));
    }
    if len > limits.max_tabular_bytes {
        return Err(ChatError::validation(format!(
            "`{file_name}` is {len} bytes, limit is {}",
            limits.max_tabular_bytes
        )));
    }
    Ok(())
}

pub async fn load_image(path: &Path, limits: &AttachmentLimits) -> Result<ImageAttachment, ChatError> {
    let file_name = file_name(path);
    let media_type = image_media_type(path).ok_or_else(|| {
        ChatError::validation(format!("`{file_name}` is not a supported image"))
    })?;
    let len = file_len(path).await?;
    validate_image(media_type, len, limits)?;
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| ChatError::validation(format!("cannot read `{}`: {e}", path.display())))?;
    let payload = base64::engine::general_purpose::STANDARD.encode(bytes);
    Ok(ImageAttachment {
        file_name,
        media_type: media_type.to_string(),
        data_url: format!("data:{media_type};base64,{payload}"),
    })
}

pub async fn load_tabular_file(
    path: &Path,
    limits: &AttachmentLimits,
) -> Result<TabularAttachment, ChatError> {
    let file_name = file_name(path);
    let len = file_len(path).await?;
    validate_tabular(&file_name, len, limits)?;
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ChatError::validation(format!("cannot read `{}`: {e}", path.display())))?;
    Ok(TabularAttachment {
        file_name,
        content,
        source_url: None,
    })
}

/// Parses a remote tabular URL. Only `http` and `https` are accepted.
pub fn parse_tabular_url(raw: &str) -> Result<reqwest::Url, ChatError> {
    let url = reqwest::Url::parse(raw.trim())
        .map_err(|e| ChatError::validation(format!("malformed URL `{raw}`: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ChatError::validation(format!(
            "unsupported URL scheme `{}`",
            url.scheme()
        )));
    }
    Ok(url)
}

/// File name shown for a remote tabular source.
pub fn remote_file_name(url: &reqwest::Url, limits: &AttachmentLimits) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("remote{}", limits.tabular_suffix))
}

/// Checks a downloaded tabular body against the size ceiling.
pub fn remote_tabular(
    url: &reqwest::Url,
    content: String,
    limits: &AttachmentLimits,
) -> Result<TabularAttachment, ChatError> {
    let len = content.len() as u64;
    if len > limits.max_tabular_bytes {
        return Err(ChatError::validation(format!(
            "remote file is {len} bytes, limit is {}",
            limits.max_tabular_bytes
        )));
    }
    Ok(TabularAttachment {
        file_name: remote_file_name(url, limits),
        content,
        source_url: Some(url.to_string()),
    })
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

async fn file_len(path: &Path) -> Result<u64, ChatError> {
    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|e| ChatError::validation(format!("cannot open `{}`: {e}", path.display())))?;
    if !meta.is_file() {
        return Err(ChatError::validation(format!(
            "`{}` is not a file",
            path.display()
        )));
    }
    Ok(meta.len())
}
