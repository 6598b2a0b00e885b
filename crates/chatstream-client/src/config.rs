use std::path::PathBuf;
use std::time::Duration;

use chatstream_core::ChatError;
use clap::Parser;

use crate::attachment::{AttachmentLimits, DEFAULT_MAX_IMAGE_BYTES, DEFAULT_MAX_TABULAR_BYTES};
use crate::session::{SendInput, SessionContext};

/// Command-line chat client for a chatstream gateway.
#[derive(Clone, Debug, Parser)]
#[command(name = "chatstream", version, about = "Chat with a chatstream gateway")]
pub struct ClientConfig {
    /// Gateway base URL; requests go to `<server-url>/chat`.
    #[arg(long, env = "CHATSTREAM_SERVER_URL", default_value = "http://127.0.0.1:8787")]
    pub server_url: String,

    /// Conversation to continue. A new id is generated when omitted.
    #[arg(long, env = "CHATSTREAM_CONVERSATION_ID")]
    pub conversation_id: Option<String>,

    #[arg(long, env = "CHATSTREAM_USER_ID")]
    pub user_id: Option<String>,

    /// JSON-lines file that receives every finished message.
    #[arg(long, env = "CHATSTREAM_HISTORY_FILE")]
    pub history_file: Option<PathBuf>,

    /// Image to attach to the prompt.
    #[arg(long)]
    pub image: Option<PathBuf>,

    /// CSV file to attach to the prompt.
    #[arg(long, conflicts_with = "csv_url")]
    pub csv: Option<PathBuf>,

    /// CSV file to download and attach to the prompt.
    #[arg(long)]
    pub csv_url: Option<String>,

    #[arg(long, env = "CHATSTREAM_CONNECT_TIMEOUT_SECS", default_value_t = 10)]
    pub connect_timeout_secs: u64,

    #[arg(long, env = "CHATSTREAM_MAX_IMAGE_BYTES", default_value_t = DEFAULT_MAX_IMAGE_BYTES)]
    pub max_image_bytes: u64,

    #[arg(long, env = "CHATSTREAM_MAX_CSV_BYTES", default_value_t = DEFAULT_MAX_TABULAR_BYTES)]
    pub max_csv_bytes: u64,

    /// Prompt for a single round. Without one (and without attachments),
    /// prompts are read line by line from stdin.
    #[arg(trailing_var_arg = true)]
    pub prompt: Vec<String>,
}

impl ClientConfig {
    pub fn validate(&self) -> Result<(), ChatError> {
        let url = reqwest::Url::parse(&self.server_url)
            .map_err(|e| ChatError::Config(format!("invalid server url `{}`: {e}", self.server_url)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ChatError::Config(format!(
                "server url must use http or https, got `{}`",
                url.scheme()
            )));
        }
        if self.connect_timeout_secs == 0 {
            return Err(ChatError::Config("connect timeout must be at least one second".into()));
        }
        if self
            .conversation_id
            .as_deref()
            .is_some_and(|id| id.trim().is_empty())
        {
            return Err(ChatError::Config("conversation id must not be blank".into()));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn session_context(&self) -> SessionContext {
        let user_id = self.user_id.clone().filter(|u| !u.trim().is_empty());
        match &self.conversation_id {
            Some(id) => SessionContext::new(id.trim(), user_id),
            None => SessionContext::fresh(user_id),
        }
    }

    pub fn limits(&self) -> AttachmentLimits {
        AttachmentLimits {
            max_image_bytes: self.max_image_bytes,
            max_tabular_bytes: self.max_csv_bytes,
            ..AttachmentLimits::default()
        }
    }

    /// Input for one-shot mode, or `None` for the interactive loop.
    pub fn one_shot_input(&self) -> Option<SendInput> {
        let input = SendInput {
            text: self.prompt.join(" "),
            image: self.image.clone(),
            tabular_file: self.csv.clone(),
            tabular_url: self.csv_url.clone(),
        };
        (!input.is_empty()).then_some(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> ClientConfig {
        let mut argv = vec!["chatstream"];
        argv.extend_from_slice(args);
        ClientConfig::try_parse_from(argv).expect("parse")
    }

    #[test]
    fn prompt_words_make_a_one_shot_round() {
        let config = parse(&["--conversation-id", "c-9", "what", "is", "2+2?"]);
        assert!(config.validate().is_ok());
        assert_eq!(
            config.one_shot_input(),
            Some(SendInput::text("what is 2+2?"))
        );
        assert_eq!(config.session_context().conversation_id, "c-9");
    }

    #[test]
    fn no_prompt_means_interactive() {
        let config = parse(&[]);
        assert_eq!(config.one_shot_input(), None);
        assert!(!config.session_context().conversation_id.is_empty());
        assert_eq!(config.limits(), AttachmentLimits::default());
    }

    #[test]
    fn attachment_alone_is_one_shot() {
        let config = parse(&["--csv-url", "https://data.test/q1.csv"]);
        let input = config.one_shot_input().expect("one shot");
        assert_eq!(input.tabular_url.as_deref(), Some("https://data.test/q1.csv"));
    }

    #[test]
    fn csv_and_csv_url_conflict() {
        let argv = ["chatstream", "--csv", "a.csv", "--csv-url", "https://data.test/b.csv"];
        assert!(ClientConfig::try_parse_from(argv).is_err());
    }

    #[test]
    fn rejects_bad_server_url() {
        let config = parse(&["--server-url", "localhost:8787"]);
        assert!(matches!(config.validate(), Err(ChatError::Config(_))));
    }
}
