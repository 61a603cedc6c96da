//! Completion session - one user-turn-to-assistant-turn cycle
//!
//! Streams a reply from the loaded engine into the conversation log,
//! separating reasoning from visible text as fragments arrive. Token
//! updates are applied in strict arrival order; only one run may be in
//! flight on a session at a time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::provider::{CompletionRequest, GenerationHandle, LlmError, StreamCallback};

use super::conversation::{ConversationLog, ThroughputSample, TurnSnapshot};
use super::parser::TokenStreamParser;

/// Fixed notice appended to a turn when the user stops generation
pub const CANCELLED_NOTICE: &str = "generation stopped by user";

/// Observer invoked with a fresh snapshot after every turn update
pub type TurnObserver = Box<dyn Fn(TurnSnapshot) + Send + Sync>;

/// Tunable parameters for one completion run
#[derive(Debug, Clone)]
pub struct CompletionOptions {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub stop: Option<Vec<String>>,
    /// Reasoning markers; None uses the `<think>` defaults
    pub markers: Option<(String, String)>,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            max_tokens: Some(2048),
            temperature: Some(0.7),
            stop: None,
            markers: None,
        }
    }
}

/// Orchestrates streamed assistant replies into a shared conversation log
pub struct CompletionSession {
    log: Arc<Mutex<ConversationLog>>,
    cancel: CancellationToken,
    busy: AtomicBool,
    observer: Option<Arc<TurnObserver>>,
}

impl CompletionSession {
    pub fn new(log: Arc<Mutex<ConversationLog>>) -> Self {
        Self {
            log,
            cancel: CancellationToken::new(),
            busy: AtomicBool::new(false),
            observer: None,
        }
    }

    /// Attach a consume-only observer for per-fragment snapshots
    pub fn with_observer(mut self, observer: TurnObserver) -> Self {
        self.observer = Some(Arc::new(observer));
        self
    }

    /// Request the engine stop producing tokens. Cooperative: text that
    /// already streamed stays in the turn, followed by the fixed notice.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Run one completion against the given generation handle.
    ///
    /// Returns the throughput sample on normal completion, or `None`
    /// when generation was cancelled or failed after the stream began;
    /// that outcome is folded into the turn's visible text so the
    /// conversation stays the single record of what happened. `Err` is
    /// only returned before generation starts.
    pub async fn run(
        &self,
        handle: Arc<dyn GenerationHandle>,
        options: CompletionOptions,
    ) -> Result<Option<ThroughputSample>, LlmError> {
        if self.busy.swap(true, Ordering::SeqCst) {
            return Err(LlmError::CompletionInProgress);
        }

        let result = self.run_inner(handle, options).await;
        self.busy.store(false, Ordering::SeqCst);
        result
    }

    async fn run_inner(
        &self,
        handle: Arc<dyn GenerationHandle>,
        options: CompletionOptions,
    ) -> Result<Option<ThroughputSample>, LlmError> {
        let (turn_id, messages) = {
            let mut log = lock(&self.log);
            let turn_id = log.begin_assistant();
            (turn_id, log.messages())
        };
        self.emit_snapshot(turn_id);

        let request = CompletionRequest {
            messages,
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            stop: options.stop.clone(),
            stream: true,
            ..Default::default()
        };

        let parser = Arc::new(Mutex::new(match &options.markers {
            Some((open, close)) => TokenStreamParser::with_markers(open, close),
            None => TokenStreamParser::new(),
        }));

        // Fragments are parsed synchronously inside the callback so
        // updates land in strict arrival order.
        let callback: StreamCallback = {
            let parser = parser.clone();
            let conversation = self.log.clone();
            let observer = self.observer.clone();
            let cancel = self.cancel.clone();
            Box::new(move |fragment: String| {
                if cancel.is_cancelled() {
                    return;
                }

                let (visible, reasoning) = {
                    let mut parser = lock(&parser);
                    parser.feed(&fragment);
                    (
                        parser.visible_text(),
                        parser.reasoning().map(|s| s.to_string()),
                    )
                };

                let snapshot = {
                    let mut conversation = lock(&conversation);
                    conversation.update_turn(turn_id, visible, reasoning);
                    conversation.snapshot(turn_id)
                };

                if let (Some(observer), Some(snapshot)) = (observer.as_deref(), snapshot) {
                    observer(snapshot);
                }
            })
        };

        let result = handle
            .complete_streaming(request, callback, Some(self.cancel.clone()))
            .await;

        // Drain parser state into the turn regardless of outcome.
        let (visible, reasoning) = {
            let mut parser = lock(&parser);
            parser.finish();
            (
                parser.visible_text(),
                parser.reasoning().map(|s| s.to_string()),
            )
        };

        if self.cancel.is_cancelled() {
            let mut with_notice = visible;
            if !with_notice.is_empty() {
                with_notice.push_str("\n\n");
            }
            with_notice.push_str(CANCELLED_NOTICE);

            {
                let mut log = lock(&self.log);
                log.update_turn(turn_id, with_notice, reasoning);
                log.complete_turn(turn_id);
            }
            self.emit_snapshot(turn_id);
            return Ok(None);
        }

        match result {
            Ok(response) => {
                let sample = response.timing.as_ref().map(|t| ThroughputSample {
                    turn_id,
                    tokens_per_second: t.tokens_per_second(),
                });

                {
                    let mut log = lock(&self.log);
                    log.update_turn(turn_id, visible, reasoning);
                    log.complete_turn(turn_id);
                    if let Some(sample) = sample {
                        log.record_throughput(sample);
                    }
                }
                self.emit_snapshot(turn_id);
                Ok(sample)
            }
            Err(e) => {
                // Once the stream has begun, failures fold into the
                // conversation rather than crossing the event boundary.
                log::warn!("Generation failed mid-stream: {}", e);

                let mut with_error = visible;
                if !with_error.is_empty() {
                    with_error.push_str("\n\n");
                }
                with_error.push_str(&format!("generation failed: {}", e));

                {
                    let mut log = lock(&self.log);
                    log.update_turn(turn_id, with_error, reasoning);
                    log.complete_turn(turn_id);
                }
                self.emit_snapshot(turn_id);
                Ok(None)
            }
        }
    }

    fn emit_snapshot(&self, turn_id: Uuid) {
        if let Some(observer) = self.observer.as_deref() {
            if let Some(snapshot) = lock(&self.log).snapshot(turn_id) {
                observer(snapshot);
            }
        }
    }
}

/// Lock that survives a poisoned mutex; per-token critical sections
/// never leave the log in a torn state.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
