//! Tracing setup shared by the gateway and client binaries.
//!
//! Each binary passes its own [`LogDefaults`]; the environment can override
//! the filter and redirect output to a JSON-lines file:
//!
//! - `CHATSTREAM_OBSERVABILITY_ENABLED`: `off`/`false`/`0` disables tracing.
//! - `CHATSTREAM_LOG_LEVEL`, then `RUST_LOG`: filter directives. Invalid
//!   directives are ignored and the next source is tried.
//! - `CHATSTREAM_JSON_LOG_PATH`: write JSON lines to this file.
//! - `CHATSTREAM_LOG_DIR`: write JSON lines to `<dir>/<app>.jsonl`, so both
//!   binaries can share one directory.
//!
//! Without a file, logs go to stderr so they never mix with streamed replies.

use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

static INIT: OnceCell<()> = OnceCell::new();

/// Per-binary logging defaults.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LogDefaults {
    /// Names the JSON log file under `CHATSTREAM_LOG_DIR`.
    pub app: &'static str,
    /// Filter used when neither `CHATSTREAM_LOG_LEVEL` nor `RUST_LOG` is usable.
    pub filter: &'static str,
}

impl LogDefaults {
    pub const GATEWAY: Self = Self {
        app: "chatstream-server",
        filter: "info,hyper=warn",
    };

    /// The client prints replies to the terminal, so only problems are
    /// logged by default.
    pub const CLIENT: Self = Self {
        app: "chatstream",
        filter: "warn,chatstream_client=info",
    };
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum LogSink {
    Disabled,
    Console,
    JsonFile(PathBuf),
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct LogPlan {
    filter: String,
    sink: LogSink,
}

fn parse_bool_env(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "enabled" => Some(true),
        "0" | "false" | "no" | "off" | "disabled" => Some(false),
        _ => None,
    }
}

fn resolve_filter(defaults: &LogDefaults, env: &impl Fn(&str) -> Option<String>) -> String {
    ["CHATSTREAM_LOG_LEVEL", "RUST_LOG"]
        .into_iter()
        .filter_map(|key| env(key))
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty() && EnvFilter::try_new(value).is_ok())
        .unwrap_or_else(|| defaults.filter.to_string())
}

fn resolve_sink(defaults: &LogDefaults, env: &impl Fn(&str) -> Option<String>) -> LogSink {
    let non_blank = |key: &str| env(key).filter(|v| !v.trim().is_empty());
    if let Some(path) = non_blank("CHATSTREAM_JSON_LOG_PATH") {
        return LogSink::JsonFile(PathBuf::from(path.trim()));
    }
    if let Some(dir) = non_blank("CHATSTREAM_LOG_DIR") {
        return LogSink::JsonFile(Path::new(dir.trim()).join(format!("{}.jsonl", defaults.app)));
    }
    LogSink::Console
}

fn plan(defaults: &LogDefaults, env: impl Fn(&str) -> Option<String>) -> LogPlan {
    let enabled = env("CHATSTREAM_OBSERVABILITY_ENABLED")
        .and_then(|value| parse_bool_env(&value))
        .unwrap_or(true);
    LogPlan {
        filter: resolve_filter(defaults, &env),
        sink: if enabled {
            resolve_sink(defaults, &env)
        } else {
            LogSink::Disabled
        },
    }
}

/// Initialize tracing once per process. Later calls are no-ops.
pub fn init_observability(defaults: LogDefaults) {
    INIT.get_or_init(|| {
        let plan = plan(&defaults, |key| std::env::var(key).ok());
        let env_filter = EnvFilter::new(&plan.filter);
        match plan.sink {
            LogSink::Disabled => {}
            LogSink::JsonFile(path) => {
                let dir = path
                    .parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .unwrap_or_else(|| Path::new("."));
                let _ = std::fs::create_dir_all(dir);
                let file_name = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(str::to_owned)
                    .unwrap_or_else(|| format!("{}.jsonl", defaults.app));
                let json_layer = tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_target(false)
                    .with_writer(tracing_appender::rolling::never(dir, file_name));
                let _ = tracing_subscriber::registry()
                    .with(env_filter)
                    .with(json_layer)
                    .try_init();
            }
            LogSink::Console => {
                let console_layer = tracing_subscriber::fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::io::stderr);
                let _ = tracing_subscriber::registry()
                    .with(env_filter)
                    .with(console_layer)
                    .try_init();
            }
        }
    });
}
