use std::path::{Path, PathBuf};

use chatstream_core::{MessageRecord, PersistenceError};
use tokio::io::AsyncWriteExt as _;
use tokio::sync::Mutex;

/// Append-only persistence collaborator for finished messages.
#[async_trait::async_trait]
pub trait MessageStore: Send + Sync {
    async fn append(&self, record: &MessageRecord) -> Result<(), PersistenceError>;
}

/// Discards every record.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopMessageStore;

#[async_trait::async_trait]
impl MessageStore for NoopMessageStore {
    async fn append(&self, _record: &MessageRecord) -> Result<(), PersistenceError> {
        Ok(())
    }
}

/// Stores records as JSON lines in a single file.
#[derive(Debug)]
pub struct JsonlMessageStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlMessageStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records of one conversation in insertion order. A missing file is an
    /// empty history; a malformed line is an error.
    pub async fn load(&self, conversation_id: &str) -> Result<Vec<MessageRecord>, PersistenceError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let mut records = Vec::new();
        for (idx, line) in raw.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let record: MessageRecord = serde_json::from_str(line).map_err(|e| {
                PersistenceError::new(format!("{}:{}: {e}", self.path.display(), idx + 1))
            })?;
            if record.conversation_id == conversation_id {
                records.push(record);
            }
        }
        Ok(records)
    }
}

#[async_trait::async_trait]
impl MessageStore for JsonlMessageStore {
    async fn append(&self, record: &MessageRecord) -> Result<(), PersistenceError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}
