use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use crate::error::{AbraError, Result};

/// One entry of the exchange transcript. Serialized with a snake_case `type`
/// tag next to the event fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TranscriptEvent {
    PromptSent {
        message: String,
        stream: bool,
        attempt: u32,
        conversation_id: Option<String>,
    },
    RetryScheduled {
        attempt: u32,
        max_retries: u32,
        delay_ms: u64,
    },
    ConversationUpdated {
        conversation_id: String,
        offline_threading_id: String,
    },
    ReplyCompleted {
        conversation_id: Option<String>,
        message: String,
        sources: usize,
        media: usize,
    },
    ExchangeFailed {
        error: String,
    },
}

impl TranscriptEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PromptSent { .. } => "prompt_sent",
            Self::RetryScheduled { .. } => "retry_scheduled",
            Self::ConversationUpdated { .. } => "conversation_updated",
            Self::ReplyCompleted { .. } => "reply_completed",
            Self::ExchangeFailed { .. } => "exchange_failed",
        }
    }
}

#[derive(Serialize)]
struct TranscriptLine<'a> {
    session_id: &'a str,
    ts: String,
    #[serde(flatten)]
    event: &'a TranscriptEvent,
}

/// Append-only JSONL log of exchanges, one compact object per line. Clones
/// share the file and serialize their writes.
#[derive(Debug, Clone)]
pub struct TranscriptWriter {
    inner: Arc<TranscriptInner>,
}

#[derive(Debug)]
struct TranscriptInner {
    path: PathBuf,
    session_id: String,
    lock: Mutex<()>,
}

impl TranscriptWriter {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(TranscriptInner {
                path: path.into(),
                session_id: session_id.into(),
                lock: Mutex::new(()),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    pub fn record(&self, event: &TranscriptEvent) -> Result<()> {
        let line = serde_json::to_string(&TranscriptLine {
            session_id: &self.inner.session_id,
            ts: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            event,
        })?;

        let _guard = self
            .inner
            .lock
            .lock()
            .map_err(|_| AbraError::Io(io::Error::other("transcript lock poisoned")))?;
        if let Some(parent) = self.inner.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.inner.path)?;
        writeln!(file, "{line}")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::DateTime;
    use serde_json::Value;

    use super::*;

    fn read_lines(path: &Path) -> anyhow::Result<Vec<Value>> {
        fs::read_to_string(path)?
            .lines()
            .map(|line| serde_json::from_str::<Value>(line).map_err(anyhow::Error::from))
            .collect()
    }

    #[test]
    fn record_writes_tagged_line() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("transcript.jsonl");
        let writer = TranscriptWriter::new(&path, "session-1");

        writer.record(&TranscriptEvent::PromptSent {
            message: "hello".to_string(),
            stream: false,
            attempt: 1,
            conversation_id: None,
        })?;

        let rows = read_lines(&path)?;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["type"], "prompt_sent");
        assert_eq!(rows[0]["session_id"], "session-1");
        assert_eq!(rows[0]["message"], "hello");
        assert!(rows[0]["conversation_id"].is_null());
        DateTime::parse_from_rfc3339(rows[0]["ts"].as_str().unwrap_or_default())?;
        Ok(())
    }

    #[test]
    fn record_appends_and_creates_parent_dirs() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("nested").join("dir").join("t.jsonl");
        let writer = TranscriptWriter::new(&path, "s");

        writer.record(&TranscriptEvent::ExchangeFailed {
            error: "boom".to_string(),
        })?;
        writer.clone().record(&TranscriptEvent::RetryScheduled {
            attempt: 2,
            max_retries: 3,
            delay_ms: 3000,
        })?;

        let rows = read_lines(&path)?;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1]["type"], "retry_scheduled");
        assert_eq!(rows[1]["delay_ms"], 3000);
        Ok(())
    }

    #[test]
    fn kind_matches_serialized_tag() -> anyhow::Result<()> {
        let event = TranscriptEvent::ConversationUpdated {
            conversation_id: "c".to_string(),
            offline_threading_id: "t".to_string(),
        };
        let value = serde_json::to_value(&event)?;
        assert_eq!(value["type"], event.kind());
        Ok(())
    }
}
