//! Model session lifecycle
//!
//! Owns the single live inference engine handle and the state machine
//! around it. The engine resource is exclusive (device/memory claim), so
//! loading a new model always tears the previous session down first.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::provider::{GenerationHandle, InferenceBackend, LlmError};

/// Observable phase of the inference session
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Unloaded,
    /// Potentially slow; callers gate interaction on this phase
    Loading,
    Ready,
    Failed(String),
}

struct SessionInner {
    state: SessionState,
    loaded_filename: Option<String>,
    handle: Option<Arc<dyn GenerationHandle>>,
}

/// Mediates load/unload transitions for the at-most-one loaded model
pub struct ModelSessionManager {
    backend: Arc<dyn InferenceBackend>,
    inner: RwLock<SessionInner>,
}

impl ModelSessionManager {
    pub fn new(backend: Arc<dyn InferenceBackend>) -> Self {
        Self {
            backend,
            inner: RwLock::new(SessionInner {
                state: SessionState::Unloaded,
                loaded_filename: None,
                handle: None,
            }),
        }
    }

    pub async fn state(&self) -> SessionState {
        self.inner.read().await.state.clone()
    }

    /// Filename of the currently loaded model, if any
    pub async fn loaded_model(&self) -> Option<String> {
        self.inner.read().await.loaded_filename.clone()
    }

    pub async fn is_ready(&self) -> bool {
        matches!(self.inner.read().await.state, SessionState::Ready)
    }

    /// Load a model artifact, tearing down any live session first.
    /// A failed load leaves the session in `Failed`; retrying is allowed.
    pub async fn load(&self, model_path: &Path) -> Result<(), LlmError> {
        let filename = model_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| {
                LlmError::InvalidRequest(format!("Not a model file: {}", model_path.display()))
            })?;

        if !model_path.exists() {
            return Err(LlmError::ModelNotFound(format!(
                "Model file not found: {}",
                model_path.display()
            )));
        }

        {
            let mut inner = self.inner.write().await;
            if let Some(previous) = inner.loaded_filename.take() {
                log::info!("Unloading {} before loading {}", previous, filename);
            }
            // Release the held handle before the new engine claims the
            // exclusive resource.
            inner.handle = None;
            inner.state = SessionState::Loading;
        }

        match self.backend.load(model_path).await {
            Ok(handle) => {
                let mut inner = self.inner.write().await;
                inner.handle = Some(Arc::from(handle));
                inner.loaded_filename = Some(filename.clone());
                inner.state = SessionState::Ready;
                log::info!("Model {} loaded", filename);
                Ok(())
            }
            Err(e) => {
                let mut inner = self.inner.write().await;
                inner.handle = None;
                inner.loaded_filename = None;
                inner.state = SessionState::Failed(e.to_string());
                log::warn!("Failed to load {}: {}", filename, e);
                Err(e)
            }
        }
    }

    /// Release the engine handle and return to `Unloaded`. Clearing
    /// conversation state is the caller's policy, not enforced here.
    pub async fn unload(&self) {
        let mut inner = self.inner.write().await;
        if let Some(name) = inner.loaded_filename.take() {
            log::info!("Model {} unloaded", name);
        }
        inner.handle = None;
        inner.state = SessionState::Unloaded;
    }

    /// The live generation handle; fails unless a model is Ready
    pub async fn generation_handle(&self) -> Result<Arc<dyn GenerationHandle>, LlmError> {
        let inner = self.inner.read().await;
        match (&inner.state, &inner.handle) {
            (SessionState::Ready, Some(handle)) => Ok(handle.clone()),
            _ => Err(LlmError::NotReady),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{
        CompletionRequest, CompletionResponse, StreamCallback,
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    /// Backend whose handles count how many are alive at once
    struct CountingBackend {
        live: Arc<AtomicUsize>,
        fail_remaining: AtomicUsize,
    }

    impl CountingBackend {
        fn new(live: Arc<AtomicUsize>) -> Self {
            Self {
                live,
                fail_remaining: AtomicUsize::new(0),
            }
        }

        fn failing_once(live: Arc<AtomicUsize>) -> Self {
            Self {
                live,
                fail_remaining: AtomicUsize::new(1),
            }
        }
    }

    struct CountingHandle {
        live: Arc<AtomicUsize>,
    }

    impl Drop for CountingHandle {
        fn drop(&mut self) {
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl GenerationHandle for CountingHandle {
        async fn complete_streaming(
            &self,
            _request: CompletionRequest,
            _callback: StreamCallback,
            _cancel_token: Option<CancellationToken>,
        ) -> Result<CompletionResponse, LlmError> {
            Err(LlmError::InferenceFailed("not under test".to_string()))
        }
    }

    #[async_trait]
    impl InferenceBackend for CountingBackend {
        async fn load(&self, _model_path: &Path) -> Result<Box<dyn GenerationHandle>, LlmError> {
            if self
                .fail_remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(LlmError::ModelLoadFailed("unsupported format".to_string()));
            }
            self.live.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(CountingHandle {
                live: self.live.clone(),
            }))
        }
    }

    fn model_file(dir: &TempDir, name: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, b"weights").unwrap();
        path
    }

    #[tokio::test]
    async fn at_most_one_handle_is_ever_live() {
        let dir = TempDir::new().unwrap();
        let live = Arc::new(AtomicUsize::new(0));
        let manager = ModelSessionManager::new(Arc::new(CountingBackend::new(live.clone())));

        manager.load(&model_file(&dir, "a.gguf")).await.unwrap();
        assert_eq!(live.load(Ordering::SeqCst), 1);
        assert_eq!(manager.loaded_model().await.as_deref(), Some("a.gguf"));

        manager.load(&model_file(&dir, "b.gguf")).await.unwrap();
        assert_eq!(live.load(Ordering::SeqCst), 1);
        assert_eq!(manager.loaded_model().await.as_deref(), Some("b.gguf"));

        manager.unload().await;
        assert_eq!(live.load(Ordering::SeqCst), 0);
        assert_eq!(manager.state().await, SessionState::Unloaded);
    }

    #[tokio::test]
    async fn failed_load_allows_retry() {
        let dir = TempDir::new().unwrap();
        let live = Arc::new(AtomicUsize::new(0));
        let path = model_file(&dir, "a.gguf");

        let manager =
            ModelSessionManager::new(Arc::new(CountingBackend::failing_once(live.clone())));
        let err = manager.load(&path).await.unwrap_err();
        assert!(matches!(err, LlmError::ModelLoadFailed(_)));
        assert!(matches!(manager.state().await, SessionState::Failed(_)));
        assert!(manager.generation_handle().await.is_err());

        // A later attempt from Failed is permitted.
        manager.load(&path).await.unwrap();
        assert!(manager.is_ready().await);
        assert_eq!(live.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_file_is_rejected_before_the_backend_runs() {
        let dir = TempDir::new().unwrap();
        let live = Arc::new(AtomicUsize::new(0));
        let manager = ModelSessionManager::new(Arc::new(CountingBackend::new(live.clone())));

        let err = manager.load(&dir.path().join("ghost.gguf")).await.unwrap_err();
        assert!(matches!(err, LlmError::ModelNotFound(_)));
        assert_eq!(live.load(Ordering::SeqCst), 0);
        assert_eq!(manager.state().await, SessionState::Unloaded);
    }
}
