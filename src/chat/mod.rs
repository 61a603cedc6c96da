//! Chat conversations against the loaded model
//!
//! Module structure:
//! - conversation.rs: ConversationLog, turns, throughput samples
//! - parser.rs: incremental reasoning-span stream parser
//! - completion.rs: CompletionSession streaming orchestration

pub mod completion;
pub mod conversation;
pub mod parser;

pub use completion::{
    CompletionOptions, CompletionSession, TurnObserver, CANCELLED_NOTICE,
};
pub use conversation::{ConversationLog, ConversationTurn, ThroughputSample, TurnSnapshot};
pub use parser::{TokenStreamParser, DEFAULT_CLOSE_MARKER, DEFAULT_OPEN_MARKER};
