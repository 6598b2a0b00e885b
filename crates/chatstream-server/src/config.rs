use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chatstream_core::ChatError;
use clap::Parser;

use crate::image_store::{HttpImageStore, ImageStore};
use crate::upstream::UpstreamConfig;

/// Gateway settings, read from flags with environment fallbacks.
#[derive(Clone, Debug, Parser)]
#[command(name = "chatstream-server", version, about = "Canonical chat stream gateway")]
pub struct ServerConfig {
    /// Address the gateway listens on.
    #[arg(long, env = "CHATSTREAM_BIND", default_value = "127.0.0.1:8787")]
    pub bind: SocketAddr,

    /// OpenAI-compatible chat-completions endpoint.
    #[arg(long, env = "CHATSTREAM_UPSTREAM_URL")]
    pub upstream_url: String,

    #[arg(long, env = "CHATSTREAM_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    #[arg(long, env = "CHATSTREAM_MODEL")]
    pub model: String,

    #[arg(long, env = "CHATSTREAM_SYSTEM_PROMPT")]
    pub system_prompt: Option<String>,

    /// Upload endpoint for inline images. Images are forwarded inline when unset.
    #[arg(long, env = "CHATSTREAM_IMAGE_STORE_URL")]
    pub image_store_url: Option<String>,

    #[arg(long, env = "CHATSTREAM_TIMEOUT_SECS", default_value_t = 120)]
    pub timeout_secs: u64,
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), ChatError> {
        check_http_url("upstream url", &self.upstream_url)?;
        if let Some(url) = self.image_store_url.as_deref() {
            check_http_url("image store url", url)?;
        }
        if self.model.trim().is_empty() {
            return Err(ChatError::Config("model must not be empty".into()));
        }
        if self.timeout_secs == 0 {
            return Err(ChatError::Config("timeout must be at least one second".into()));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn upstream_config(&self) -> UpstreamConfig {
        UpstreamConfig {
            url: self.upstream_url.clone(),
            api_key: self.api_key.clone().filter(|k| !k.trim().is_empty()),
            model: self.model.clone(),
            system_prompt: self.system_prompt.clone(),
            timeout: self.timeout(),
        }
    }

    pub fn image_store(&self) -> Result<Option<Arc<dyn ImageStore>>, ChatError> {
        let Some(url) = self.image_store_url.as_deref() else {
            return Ok(None);
        };
        let store = HttpImageStore::new(url, self.timeout())
            .map_err(|e| ChatError::Config(e.to_string()))?;
        Ok(Some(Arc::new(store)))
    }
}

fn check_http_url(name: &str, raw: &str) -> Result<(), ChatError> {
    let url = reqwest::Url::parse(raw)
        .map_err(|e| ChatError::Config(format!("invalid {name} `{raw}`: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ChatError::Config(format!(
            "{name} must use http or https, got `{other}`"
        ))),
    }
}
