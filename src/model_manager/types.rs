//! Model Manager Types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Known model lineages. Inferred from artifact filenames when no
/// provenance is recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelFamily {
    Llama,
    Mistral,
    Qwen,
    Phi,
    Gemma,
    DeepSeek,
    Unknown,
}

impl ModelFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelFamily::Llama => "llama",
            ModelFamily::Mistral => "mistral",
            ModelFamily::Qwen => "qwen",
            ModelFamily::Phi => "phi",
            ModelFamily::Gemma => "gemma",
            ModelFamily::DeepSeek => "deepseek",
            ModelFamily::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Provenance record for one artifact in the models directory.
///
/// The filesystem is the source of truth for whether the artifact
/// exists; this record is the source of truth for where it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    /// Artifact filename, unique within the models directory
    pub filename: String,
    /// Model family this artifact belongs to
    pub format: ModelFamily,
    /// When the artifact was downloaded (approximate for files
    /// discovered by reconciliation)
    pub download_date: DateTime<Utc>,
    /// File size in bytes; None until observed, backfilled
    /// opportunistically
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

/// State of a download task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DownloadStatus {
    Idle,
    InProgress,
    Completed,
    Failed(String),
}

/// Download progress information delivered to the caller's callback.
/// Fractions are monotonically non-decreasing within one transfer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadProgress {
    pub filename: String,
    pub downloaded_bytes: u64,
    pub total_bytes: u64,
    /// Fraction complete in [0, 1]; stays 0.0 when the server reports
    /// no content length, jumping to 1.0 on completion
    pub fraction: f32,
    pub status: DownloadStatus,
}

/// The single in-flight transfer. Created on fetch, destroyed on
/// completion or failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadTask {
    pub filename: String,
    pub source_url: String,
    pub fraction: f32,
    pub status: DownloadStatus,
}

impl DownloadTask {
    pub fn new(filename: impl Into<String>, source_url: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            source_url: source_url.into(),
            fraction: 0.0,
            status: DownloadStatus::InProgress,
        }
    }
}

/// Information about a locally present artifact, merged from the disk
/// listing and the metadata store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalModelInfo {
    pub filename: String,
    pub format: ModelFamily,
    pub size_bytes: Option<u64>,
    pub download_date: Option<DateTime<Utc>>,
}
