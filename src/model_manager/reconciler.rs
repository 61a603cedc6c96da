//! Startup reconciliation between the metadata store and the models
//! directory
//!
//! The directory can change out-of-band (files deleted, artifacts
//! dropped in by hand), so records are synthesized for untracked files
//! and pruned for vanished ones. Running twice in a row is a no-op.

use std::path::Path;

use chrono::Utc;

use super::metadata::MetadataStore;
use super::registry::infer_family;
use super::types::ArtifactRecord;

/// Artifact file extension recognized in the models directory
pub const ARTIFACT_EXT: &str = "gguf";

/// Reconcile the store against the files actually on disk
pub fn reconcile(models_dir: &Path, store: &mut MetadataStore) {
    let on_disk = list_artifacts(models_dir);

    for filename in &on_disk {
        if store.get(filename).is_some() {
            continue;
        }

        let path = models_dir.join(filename);
        let size_bytes = match std::fs::metadata(&path) {
            Ok(m) => Some(m.len()),
            Err(e) => {
                log::warn!("Failed to query size of {}: {}", path.display(), e);
                None
            }
        };

        let record = ArtifactRecord {
            filename: filename.clone(),
            format: infer_family(filename),
            // Provenance is approximate for pre-existing files
            download_date: Utc::now(),
            size_bytes,
        };

        log::info!(
            "Discovered untracked model {} (family: {})",
            filename,
            record.format
        );
        store.upsert(record);
    }

    let stale: Vec<String> = store
        .records()
        .filter(|r| !on_disk.contains(&r.filename))
        .map(|r| r.filename.clone())
        .collect();
    for filename in stale {
        log::info!("Pruning record for deleted model {}", filename);
        store.remove(&filename);
    }
}

/// List artifact filenames present in the models directory
pub fn list_artifacts(models_dir: &Path) -> Vec<String> {
    let mut files = Vec::new();

    if !models_dir.exists() {
        return files;
    }

    let entries = match std::fs::read_dir(models_dir) {
        Ok(entries) => entries,
        Err(e) => {
            log::warn!(
                "Failed to read models directory {}: {}",
                models_dir.display(),
                e
            );
            return files;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().map(|e| e == ARTIFACT_EXT).unwrap_or(false) {
            if let Some(name) = path.file_name() {
                files.push(name.to_string_lossy().to_string());
            }
        }
    }

    files.sort();
    files
}
