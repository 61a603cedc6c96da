//! Conversation state
//!
//! The log is append-only until an explicit reset. Assistant turns are
//! created empty and mutated in place while generation is in flight;
//! once complete, the only legal mutation is the reasoning-reveal
//! toggle.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::provider::{Message, MessageRole};

/// One message in the conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub id: Uuid,
    pub role: MessageRole,
    pub visible_content: String,
    /// Trimmed text of the turn's reasoning span, if one closed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    pub reasoning_revealed: bool,
    /// Generation finished; the turn no longer mutates except for
    /// `reasoning_revealed`
    pub complete: bool,
}

impl ConversationTurn {
    fn new(role: MessageRole, content: impl Into<String>, complete: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            visible_content: content.into(),
            reasoning: None,
            reasoning_revealed: false,
            complete,
        }
    }
}

/// Immutable view of one turn, handed to observers after each update.
/// The presentation boundary is consume-only.
#[derive(Debug, Clone, Serialize)]
pub struct TurnSnapshot {
    pub turn_id: Uuid,
    pub role: MessageRole,
    pub visible_content: String,
    pub reasoning: Option<String>,
    pub complete: bool,
}

/// Tokens-per-second for one completed assistant turn, keyed by the
/// turn id so attribution survives cancelled or skipped turns
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThroughputSample {
    pub turn_id: Uuid,
    pub tokens_per_second: f32,
}

/// Ordered record of conversation turns
pub struct ConversationLog {
    system_prompt: String,
    turns: Vec<ConversationTurn>,
    throughput: Vec<ThroughputSample>,
}

impl ConversationLog {
    /// Create a log seeded with its fixed system turn
    pub fn new(system_prompt: impl Into<String>) -> Self {
        let system_prompt = system_prompt.into();
        let turns = vec![ConversationTurn::new(
            MessageRole::System,
            system_prompt.clone(),
            true,
        )];
        Self {
            system_prompt,
            turns,
            throughput: Vec::new(),
        }
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn turn(&self, id: Uuid) -> Option<&ConversationTurn> {
        self.turns.iter().find(|t| t.id == id)
    }

    /// Append a completed user turn
    pub fn push_user(&mut self, content: impl Into<String>) -> Uuid {
        let turn = ConversationTurn::new(MessageRole::User, content, true);
        let id = turn.id;
        self.turns.push(turn);
        id
    }

    /// Append an empty assistant turn for an in-flight generation, so
    /// observers have an anchor before the first token arrives
    pub fn begin_assistant(&mut self) -> Uuid {
        let turn = ConversationTurn::new(MessageRole::Assistant, "", false);
        let id = turn.id;
        self.turns.push(turn);
        id
    }

    /// Overwrite the in-flight turn's accumulated text. No-op once the
    /// turn is complete.
    pub(crate) fn update_turn(&mut self, id: Uuid, visible: String, reasoning: Option<String>) {
        if let Some(turn) = self.turns.iter_mut().find(|t| t.id == id) {
            if turn.complete {
                return;
            }
            turn.visible_content = visible;
            turn.reasoning = reasoning;
        }
    }

    /// Seal an in-flight turn
    pub(crate) fn complete_turn(&mut self, id: Uuid) {
        if let Some(turn) = self.turns.iter_mut().find(|t| t.id == id) {
            turn.complete = true;
        }
    }

    /// The only mutation allowed on a completed turn
    pub fn set_reasoning_revealed(&mut self, id: Uuid, revealed: bool) {
        if let Some(turn) = self.turns.iter_mut().find(|t| t.id == id) {
            turn.reasoning_revealed = revealed;
        }
    }

    /// Clear back to the fixed system turn, dropping throughput samples
    pub fn reset(&mut self) {
        self.turns = vec![ConversationTurn::new(
            MessageRole::System,
            self.system_prompt.clone(),
            true,
        )];
        self.throughput.clear();
    }

    /// Role-tagged history for the engine. In-flight assistant turns are
    /// excluded so a half-built reply never feeds back into the prompt.
    pub fn messages(&self) -> Vec<Message> {
        self.turns
            .iter()
            .filter(|t| t.complete)
            .map(|t| Message {
                role: t.role.clone(),
                content: t.visible_content.clone(),
            })
            .collect()
    }

    pub fn snapshot(&self, id: Uuid) -> Option<TurnSnapshot> {
        self.turn(id).map(|t| TurnSnapshot {
            turn_id: t.id,
            role: t.role.clone(),
            visible_content: t.visible_content.clone(),
            reasoning: t.reasoning.clone(),
            complete: t.complete,
        })
    }

    pub(crate) fn record_throughput(&mut self, sample: ThroughputSample) {
        self.throughput.push(sample);
    }

    pub fn throughput(&self) -> &[ThroughputSample] {
        &self.throughput
    }

    pub fn throughput_for(&self, turn_id: Uuid) -> Option<f32> {
        self.throughput
            .iter()
            .find(|s| s.turn_id == turn_id)
            .map(|s| s.tokens_per_second)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_with_fixed_system_turn() {
        let log = ConversationLog::new("be helpful");
        assert_eq!(log.turns().len(), 1);
        assert_eq!(log.turns()[0].role, MessageRole::System);
        assert_eq!(log.turns()[0].visible_content, "be helpful");
        assert!(log.turns()[0].complete);
    }

    #[test]
    fn messages_exclude_in_flight_assistant_turn() {
        let mut log = ConversationLog::new("sys");
        log.push_user("hi");
        let id = log.begin_assistant();

        let messages = log.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].role, MessageRole::User);

        log.update_turn(id, "hello".to_string(), None);
        log.complete_turn(id);
        assert_eq!(log.messages().len(), 3);
    }

    #[test]
    fn completed_turn_rejects_content_updates() {
        let mut log = ConversationLog::new("sys");
        let id = log.begin_assistant();
        log.update_turn(id, "final".to_string(), None);
        log.complete_turn(id);

        log.update_turn(id, "tampered".to_string(), None);
        assert_eq!(log.turn(id).unwrap().visible_content, "final");

        // The reveal toggle stays legal.
        log.set_reasoning_revealed(id, true);
        assert!(log.turn(id).unwrap().reasoning_revealed);
    }

    #[test]
    fn reset_restores_system_turn_and_drops_samples() {
        let mut log = ConversationLog::new("sys");
        log.push_user("hi");
        let id = log.begin_assistant();
        log.complete_turn(id);
        log.record_throughput(ThroughputSample {
            turn_id: id,
            tokens_per_second: 12.5,
        });

        log.reset();

        assert_eq!(log.turns().len(), 1);
        assert_eq!(log.turns()[0].visible_content, "sys");
        assert!(log.throughput().is_empty());
    }

    #[test]
    fn throughput_is_keyed_by_turn() {
        let mut log = ConversationLog::new("sys");
        let a = log.begin_assistant();
        log.complete_turn(a);
        let b = log.begin_assistant();
        log.complete_turn(b);

        log.record_throughput(ThroughputSample {
            turn_id: b,
            tokens_per_second: 30.0,
        });

        assert_eq!(log.throughput_for(a), None);
        assert_eq!(log.throughput_for(b), Some(30.0));
    }
}
