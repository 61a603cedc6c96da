//! Inference engine boundary
//!
//! Defines the common types and traits at the seam between this crate and
//! the token-generation engine: message and request shapes, the error
//! taxonomy, and the backend/handle traits an engine implements.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tokio_util::sync::CancellationToken;

/// Error types for model and generation operations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum LlmError {
    /// Model not found or not downloaded
    ModelNotFound(String),
    /// Engine rejected the artifact (corrupt file, unsupported format,
    /// resource exhaustion)
    ModelLoadFailed(String),
    /// Artifact transfer failed
    DownloadFailed(String),
    /// A download is already in flight for the named artifact
    DownloadInProgress(String),
    /// A completion is already in flight on this session
    CompletionInProgress,
    /// Inference/completion failed
    InferenceFailed(String),
    /// No model is loaded
    NotReady,
    /// Invalid request parameters
    InvalidRequest(String),
    /// Generic error
    Other(String),
}

impl fmt::Display for LlmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmError::ModelNotFound(msg) => write!(f, "Model not found: {}", msg),
            LlmError::ModelLoadFailed(msg) => write!(f, "Failed to load model: {}", msg),
            LlmError::DownloadFailed(msg) => write!(f, "Download failed: {}", msg),
            LlmError::DownloadInProgress(name) => {
                write!(f, "A download is already in progress: {}", name)
            }
            LlmError::CompletionInProgress => write!(f, "A completion is already in progress"),
            LlmError::InferenceFailed(msg) => write!(f, "Inference failed: {}", msg),
            LlmError::NotReady => write!(f, "No model is loaded"),
            LlmError::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            LlmError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for LlmError {}

/// Role of a message in a conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// A message in a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Request for text completion/generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Conversation messages
    pub messages: Vec<Message>,
    /// Maximum tokens to generate (None = engine default)
    pub max_tokens: Option<u32>,
    /// Temperature for sampling
    pub temperature: Option<f32>,
    /// Top-p nucleus sampling
    pub top_p: Option<f32>,
    /// Stop sequences
    pub stop: Option<Vec<String>>,
    /// Whether to stream the response
    pub stream: bool,
}

impl Default for CompletionRequest {
    fn default() -> Self {
        Self {
            messages: Vec::new(),
            max_tokens: None,
            temperature: Some(0.7),
            top_p: None,
            stop: None,
            stream: false,
        }
    }
}

impl CompletionRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }
}

/// Final timing statistics reported by the engine for one generation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationTiming {
    /// Number of tokens generated
    pub generated_tokens: u32,
    /// Wall-clock generation time in milliseconds
    pub generation_time_ms: u64,
}

impl GenerationTiming {
    /// Derived throughput; zero when no time was recorded
    pub fn tokens_per_second(&self) -> f32 {
        if self.generation_time_ms == 0 {
            return 0.0;
        }
        self.generated_tokens as f32 / (self.generation_time_ms as f32 / 1000.0)
    }
}

/// Response from a completion request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// Generated text content, markers included
    pub content: String,
    /// Model that generated the response
    pub model: String,
    /// Finish reason (stop, length, cancelled)
    pub finish_reason: Option<String>,
    /// Timing statistics, when the engine reports them
    pub timing: Option<GenerationTiming>,
}

/// Callback for streaming responses, invoked once per token fragment
pub type StreamCallback = Box<dyn Fn(String) + Send + Sync>;

/// Factory side of the engine boundary: turns a model artifact on disk
/// into a live generation handle. The handle is an exclusive resource;
/// `ModelSessionManager` guarantees at most one is live at a time.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    async fn load(&self, model_path: &Path) -> Result<Box<dyn GenerationHandle>, LlmError>;
}

/// A loaded engine ready to generate.
///
/// Token fragments are delivered to the callback in arrival order; the
/// final response (with timing) is returned once the stream ends. The
/// cancellation token is a best-effort stop signal; an engine may emit
/// a few more fragments after it fires.
#[async_trait]
pub trait GenerationHandle: Send + Sync {
    async fn complete_streaming(
        &self,
        request: CompletionRequest,
        callback: StreamCallback,
        cancel_token: Option<CancellationToken>,
    ) -> Result<CompletionResponse, LlmError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_per_second_derivation() {
        let timing = GenerationTiming {
            generated_tokens: 42,
            generation_time_ms: 2000,
        };
        assert_eq!(timing.tokens_per_second(), 21.0);
    }

    #[test]
    fn tokens_per_second_zero_duration() {
        let timing = GenerationTiming {
            generated_tokens: 10,
            generation_time_ms: 0,
        };
        assert_eq!(timing.tokens_per_second(), 0.0);
    }
}
