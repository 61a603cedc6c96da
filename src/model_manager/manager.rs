//! Model Manager - core struct tying together storage, metadata and
//! downloads

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, RwLock};

use crate::provider::LlmError;

use super::downloader::fetch_artifact;
use super::metadata::{MetadataStore, METADATA_FILE};
use super::reconciler::{list_artifacts, reconcile};
use super::registry::{infer_family, ModelCatalog};
use super::types::{
    ArtifactRecord, DownloadProgress, DownloadTask, LocalModelInfo, ModelFamily,
};

/// Manages GGUF model artifacts on disk and their provenance records
pub struct ModelManager {
    /// Directory where models are stored
    models_dir: PathBuf,
    store: RwLock<MetadataStore>,
    /// The single in-flight transfer; a second fetch is rejected
    active_download: Arc<Mutex<Option<DownloadTask>>>,
}

impl ModelManager {
    /// Create a new model manager rooted at the given data directory
    pub fn new(data_dir: PathBuf) -> Self {
        let models_dir = data_dir.join("models");

        // Ensure directory exists
        if !models_dir.exists() {
            std::fs::create_dir_all(&models_dir).ok();
        }

        let store = MetadataStore::load(models_dir.join(METADATA_FILE));

        Self {
            models_dir,
            store: RwLock::new(store),
            active_download: Arc::new(Mutex::new(None)),
        }
    }

    /// Default per-user data directory
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("local-chat")
    }

    /// Get the models directory path
    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    /// Reconcile stored records against the files on disk. Run once at
    /// startup, before anything relies on the records.
    pub async fn reconcile(&self) {
        let mut store = self.store.write().await;
        reconcile(&self.models_dir, &mut store);
    }

    /// Path an artifact with this filename lives at (or would live at)
    pub fn artifact_path(&self, filename: &str) -> PathBuf {
        self.models_dir.join(filename)
    }

    /// Check if an artifact is downloaded
    pub fn is_downloaded(&self, filename: &str) -> bool {
        self.artifact_path(filename).exists()
    }

    /// The provenance record for an artifact, if one is tracked
    pub async fn record(&self, filename: &str) -> Option<ArtifactRecord> {
        self.store.read().await.get(filename).cloned()
    }

    /// Detailed info about every artifact on disk, merged with its
    /// stored record where one exists
    pub async fn local_models(&self) -> Vec<LocalModelInfo> {
        let store = self.store.read().await;

        list_artifacts(&self.models_dir)
            .into_iter()
            .map(|filename| {
                let record = store.get(&filename);
                LocalModelInfo {
                    format: record
                        .map(|r| r.format)
                        .unwrap_or_else(|| infer_family(&filename)),
                    size_bytes: record.and_then(|r| r.size_bytes).or_else(|| {
                        std::fs::metadata(self.models_dir.join(&filename))
                            .ok()
                            .map(|m| m.len())
                    }),
                    download_date: record.map(|r| r.download_date),
                    filename,
                }
            })
            .collect()
    }

    /// Delete an artifact and its record
    pub async fn delete(&self, filename: &str) -> Result<(), LlmError> {
        let path = self.artifact_path(filename);
        if path.exists() {
            std::fs::remove_file(&path)
                .map_err(|e| LlmError::Other(format!("Failed to delete model: {}", e)))?;
        }
        self.store.write().await.remove(filename);
        Ok(())
    }

    /// The in-flight transfer, if any
    pub async fn current_download(&self) -> Option<DownloadTask> {
        self.active_download.lock().await.clone()
    }

    /// Fetch an artifact, recording provenance on success.
    ///
    /// Rejects a second fetch while one is in flight. When the file is
    /// already present the transfer is skipped and only missing size
    /// metadata is backfilled; otherwise a fresh record with the
    /// measured size replaces whatever was tracked before.
    pub async fn fetch<F>(
        &self,
        filename: &str,
        url: &str,
        on_progress: F,
    ) -> Result<PathBuf, LlmError>
    where
        F: Fn(DownloadProgress) + Send + Sync + 'static,
    {
        {
            let mut active = self.active_download.lock().await;
            if let Some(task) = active.as_ref() {
                return Err(LlmError::DownloadInProgress(task.filename.clone()));
            }
            *active = Some(DownloadTask::new(filename, url));
        }

        let already_present = self.is_downloaded(filename);

        // Mirror progress into the task so it stays observable while the
        // transfer runs.
        let task_slot = self.active_download.clone();
        let wrapped = move |progress: DownloadProgress| {
            if let Ok(mut slot) = task_slot.try_lock() {
                if let Some(task) = slot.as_mut() {
                    task.fraction = progress.fraction;
                    task.status = progress.status.clone();
                }
            }
            on_progress(progress);
        };

        let result = fetch_artifact(&self.models_dir, filename, url, wrapped).await;

        *self.active_download.lock().await = None;

        let path = result?;

        let size_bytes = match std::fs::metadata(&path) {
            Ok(m) => Some(m.len()),
            Err(e) => {
                log::warn!("Failed to query size of {}: {}", path.display(), e);
                None
            }
        };

        let mut store = self.store.write().await;
        if already_present {
            // Short-circuited: keep the existing provenance, backfill size.
            match store.get(filename).cloned() {
                Some(mut record) => {
                    if record.size_bytes.is_none() {
                        record.size_bytes = size_bytes;
                        store.upsert(record);
                    }
                }
                None => {
                    store.upsert(ArtifactRecord {
                        filename: filename.to_string(),
                        format: infer_family(filename),
                        download_date: Utc::now(),
                        size_bytes,
                    });
                }
            }
        } else {
            store.upsert(ArtifactRecord {
                filename: filename.to_string(),
                format: infer_family(filename),
                download_date: Utc::now(),
                size_bytes,
            });
        }

        Ok(path)
    }

    /// Candidate artifacts for a family from the given catalog, falling
    /// back to locally known artifacts of that family when the catalog
    /// is unreachable (offline mode)
    pub async fn resolve_candidates(
        &self,
        family: ModelFamily,
        catalog: &dyn ModelCatalog,
    ) -> Vec<String> {
        match catalog.candidates(family).await {
            Ok(list) => list,
            Err(e) => {
                log::warn!(
                    "Catalog lookup for {} failed ({}); falling back to local artifacts",
                    family,
                    e
                );
                let store = self.store.read().await;
                store
                    .records()
                    .filter(|r| r.format == family)
                    .map(|r| r.filename.clone())
                    .collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tempfile::TempDir;

    fn manager_in(dir: &TempDir) -> ModelManager {
        let _ = env_logger::builder().is_test(true).try_init();
        ModelManager::new(dir.path().to_path_buf())
    }

    struct OfflineCatalog;

    #[async_trait]
    impl ModelCatalog for OfflineCatalog {
        async fn candidates(&self, _family: ModelFamily) -> Result<Vec<String>, LlmError> {
            Err(LlmError::Other("registry unreachable".to_string()))
        }
    }

    #[tokio::test]
    async fn fetch_short_circuit_backfills_size() {
        let dir = TempDir::new().unwrap();
        let manager = manager_in(&dir);
        std::fs::write(manager.artifact_path("qwen-tiny.gguf"), vec![0u8; 500]).unwrap();

        let path = manager
            .fetch("qwen-tiny.gguf", "http://invalid.invalid/qwen-tiny.gguf", |_| {})
            .await
            .unwrap();
        assert!(path.exists());

        let record = manager.record("qwen-tiny.gguf").await.expect("record created");
        assert_eq!(record.size_bytes, Some(500));
        assert_eq!(record.format, ModelFamily::Qwen);
        assert!(manager.current_download().await.is_none());
    }

    #[tokio::test]
    async fn delete_removes_file_and_record() {
        let dir = TempDir::new().unwrap();
        let manager = manager_in(&dir);
        std::fs::write(manager.artifact_path("llama.gguf"), b"weights").unwrap();
        manager.reconcile().await;
        assert!(manager.record("llama.gguf").await.is_some());

        manager.delete("llama.gguf").await.unwrap();

        assert!(!manager.is_downloaded("llama.gguf"));
        assert!(manager.record("llama.gguf").await.is_none());
    }

    #[tokio::test]
    async fn reconcile_tracks_dropped_in_file() {
        let dir = TempDir::new().unwrap();
        let manager = manager_in(&dir);
        std::fs::write(manager.artifact_path("phi-mini.gguf"), vec![1u8; 64]).unwrap();

        manager.reconcile().await;

        let models = manager.local_models().await;
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].format, ModelFamily::Phi);
        assert_eq!(models[0].size_bytes, Some(64));
    }

    #[tokio::test]
    async fn offline_catalog_falls_back_to_local_records() {
        let dir = TempDir::new().unwrap();
        let manager = manager_in(&dir);
        std::fs::write(manager.artifact_path("qwen2.5-7b.gguf"), b"weights").unwrap();
        std::fs::write(manager.artifact_path("llama-3b.gguf"), b"weights").unwrap();
        manager.reconcile().await;

        let candidates = manager
            .resolve_candidates(ModelFamily::Qwen, &OfflineCatalog)
            .await;

        assert_eq!(candidates, vec!["qwen2.5-7b.gguf".to_string()]);
    }
}
