use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{FailureKind, LotsawaError};
use crate::generation::GenerationError;
use crate::state_machine::{Stage, WorkItem};

/// One line of a result log: the full work item plus how it ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRecord {
    #[serde(flatten)]
    pub item: WorkItem,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<FailureKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<Stage>,
    pub recorded_at: DateTime<Utc>,
}

impl OutputRecord {
    pub fn success(item: WorkItem) -> Self {
        Self {
            item,
            failure_kind: None,
            error: None,
            failed_stage: None,
            recorded_at: Utc::now(),
        }
    }

    pub fn failure(item: WorkItem, stage: Stage, error: &GenerationError) -> Self {
        Self {
            item,
            failure_kind: Some(error.kind()),
            error: Some(error.to_string()),
            failed_stage: Some(stage),
            recorded_at: Utc::now(),
        }
    }
}

/// Append-only destination for output records.
pub trait RecordSink {
    /// Durably append one record. A record is either fully written or not at all.
    fn append(&mut self, record: &OutputRecord) -> Result<(), LotsawaError>;

    /// Human-readable location for the run summary.
    fn location(&self) -> String;
}

/// JSON Lines file opened in append mode; one record per line.
pub struct JsonlSink {
    path: PathBuf,
    file: File,
}

impl JsonlSink {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LotsawaError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| LotsawaError::Sink {
                location: path.display().to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self { path, file })
    }

    /// Success and failure logs for an output prefix: `<prefix>.jsonl` and
    /// `<prefix>_fail.jsonl`.
    pub fn pair(prefix: &str) -> Result<(Self, Self), LotsawaError> {
        let successes = Self::open(format!("{prefix}.jsonl"))?;
        let failures = Self::open(format!("{prefix}_fail.jsonl"))?;
        Ok((successes, failures))
    }
}

impl RecordSink for JsonlSink {
    fn append(&mut self, record: &OutputRecord) -> Result<(), LotsawaError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        self.file
            .write_all(line.as_bytes())
            .and_then(|()| self.file.flush())
            .map_err(|e| LotsawaError::Sink {
                location: self.location(),
                reason: e.to_string(),
            })
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(test)]
impl RecordSink for Vec<OutputRecord> {
    fn append(&mut self, record: &OutputRecord) -> Result<(), LotsawaError> {
        self.push(record.clone());
        Ok(())
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}
