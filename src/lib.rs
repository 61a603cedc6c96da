//! local-chat - chat with locally downloaded LLM artifacts
//!
//! Covers the full lifecycle: fetch a model file, track its provenance,
//! load it into the (single) inference engine, and stream a conversation
//! from it with reasoning spans separated from visible output.
//!
//! Module structure:
//! - provider: types and traits at the inference engine boundary
//! - model_manager: downloads, provenance metadata, reconciliation
//! - session: the at-most-one loaded engine handle
//! - chat: conversation log, stream parser, completion session

pub mod chat;
pub mod model_manager;
pub mod provider;
pub mod session;

pub use chat::{
    CompletionOptions, CompletionSession, ConversationLog, ConversationTurn, ThroughputSample,
    TokenStreamParser, TurnObserver, TurnSnapshot, CANCELLED_NOTICE,
};
pub use model_manager::{
    ArtifactRecord, CuratedCatalog, DownloadProgress, DownloadStatus, DownloadTask,
    LocalModelInfo, MetadataStore, ModelCatalog, ModelFamily, ModelManager,
};
pub use provider::{
    CompletionRequest, CompletionResponse, GenerationHandle, GenerationTiming, InferenceBackend,
    LlmError, Message, MessageRole, StreamCallback,
};
pub use session::{ModelSessionManager, SessionState};
