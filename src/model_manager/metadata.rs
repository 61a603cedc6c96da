//! Artifact metadata persistence

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result as AnyResult};

use crate::provider::LlmError;

use super::types::ArtifactRecord;

/// Name of the persisted record file inside the models directory
pub const METADATA_FILE: &str = "models.json";

/// Durable mapping from artifact filename to its provenance record.
///
/// Loaded once at startup, persisted on every mutation. Persistence is
/// best-effort: a failed write is logged and the in-memory state kept,
/// so a usable artifact is never blocked by bookkeeping.
pub struct MetadataStore {
    path: PathBuf,
    records: HashMap<String, ArtifactRecord>,
}

impl MetadataStore {
    /// Load the store from its backing file, falling back to an empty
    /// mapping when the file is absent (first run) or unreadable
    /// (corruption).
    pub fn load(path: PathBuf) -> Self {
        let records = if path.exists() {
            match read_records(&path) {
                Ok(list) => list
                    .into_iter()
                    .map(|r| (r.filename.clone(), r))
                    .collect(),
                Err(e) => {
                    log::warn!(
                        "Failed to read model metadata from {}: {:#}",
                        path.display(),
                        e
                    );
                    HashMap::new()
                }
            }
        } else {
            HashMap::new()
        };

        Self { path, records }
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, filename: &str) -> Option<&ArtifactRecord> {
        self.records.get(filename)
    }

    pub fn records(&self) -> impl Iterator<Item = &ArtifactRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Insert or replace the record with the same filename
    pub fn upsert(&mut self, record: ArtifactRecord) {
        self.records.insert(record.filename.clone(), record);
        self.persist_best_effort();
    }

    pub fn remove(&mut self, filename: &str) {
        if self.records.remove(filename).is_some() {
            self.persist_best_effort();
        }
    }

    /// Persist the full record list. The write goes to a temp sibling
    /// first and is renamed into place, so a reader never observes a
    /// partially written file.
    pub fn save(&self) -> Result<(), LlmError> {
        let mut list: Vec<&ArtifactRecord> = self.records.values().collect();
        list.sort_by(|a, b| a.filename.cmp(&b.filename));

        let json = serde_json::to_string_pretty(&list)
            .map_err(|e| LlmError::Other(format!("Failed to serialize metadata: {}", e)))?;

        let temp_path = self.path.with_extension("json.tmp");
        std::fs::write(&temp_path, json)
            .map_err(|e| LlmError::Other(format!("Failed to write metadata: {}", e)))?;
        std::fs::rename(&temp_path, &self.path)
            .map_err(|e| LlmError::Other(format!("Failed to finalize metadata: {}", e)))?;

        Ok(())
    }

    fn persist_best_effort(&self) {
        if let Err(e) = self.save() {
            log::warn!("Failed to persist model metadata: {}", e);
        }
    }
}

fn read_records(path: &Path) -> AnyResult<Vec<ArtifactRecord>> {
    let data = std::fs::read_to_string(path).context("read metadata file")?;
    let records = serde_json::from_str(&data).context("parse metadata file")?;
    Ok(records)
}
