//! The Reasoner (C3): the only stateful agent contract.
//!
//! Conversation history plus the two independently-replaceable auxiliary
//! context blocks are modelled the way the teacher's `SessionContext`
//! accumulates messages and working memory — append-only history, explicit
//! `Reset` to clear everything.

use crate::error::Result;
use crate::intelligence::{IntelligenceContext, TacticalPlanObject};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One role-tagged message in the Reasoner's conversation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: ConversationRole,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConversationRole {
    System,
    User,
    Assistant,
}

/// The Reasoner's response to one `Reason` call.
///
/// Contract: at most one tactical plan per call, and `action` is always
/// strategic prose — it never names tools or parameters directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasonerOutput {
    pub thought: String,
    pub action: String,
    pub is_complete: bool,
    pub tactical_plan: Option<TacticalPlanObject>,
}

/// The stateful strategic-reasoning agent.
#[async_trait]
pub trait Reasoner: Send + Sync {
    async fn reason(&mut self, observation: &str) -> Result<ReasonerOutput>;
    fn add_observation(&mut self, text: &str);
    fn set_intelligence_context(&mut self, ctx: IntelligenceContext);
    fn inject_anti_pattern_context(&mut self, text: String);
    fn inject_playbook_context(&mut self, text: String);
    fn reset(&mut self);

    fn conversation_len(&self) -> usize;
    fn intelligence_context(&self) -> Option<&IntelligenceContext>;
    fn anti_pattern_context(&self) -> Option<&str>;
    fn playbook_context(&self) -> Option<&str>;
}

/// Conversation/auxiliary-context bookkeeping shared by any concrete
/// Reasoner implementation. The LLM call itself (turning `history` plus the
/// injected blocks into a `ReasonerOutput`) is out of scope per spec.md §1;
/// this state holder is what the orchestrator drives and what `Reset`
/// clears.
#[derive(Debug, Clone, Default)]
pub struct ReasonerState {
    pub history: Vec<ConversationTurn>,
    pub intelligence_context: Option<IntelligenceContext>,
    pub anti_pattern_context: Option<String>,
    pub playbook_context: Option<String>,
}

impl ReasonerState {
    pub fn push_user(&mut self, text: impl Into<String>) {
        self.history.push(ConversationTurn {
            role: ConversationRole::User,
            content: text.into(),
        });
    }

    pub fn push_assistant(&mut self, text: impl Into<String>) {
        self.history.push(ConversationTurn {
            role: ConversationRole::Assistant,
            content: text.into(),
        });
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.intelligence_context = None;
        self.anti_pattern_context = None;
        self.playbook_context = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_clears_history_and_all_context_blocks() {
        let mut state = ReasonerState::default();
        state.push_user("observation");
        state.push_assistant("thought");
        state.intelligence_context = Some(IntelligenceContext::default());
        state.anti_pattern_context = Some("warn".into());
        state.playbook_context = Some("playbook".into());

        state.reset();

        assert!(state.history.is_empty());
        assert!(state.intelligence_context.is_none());
        assert!(state.anti_pattern_context.is_none());
        assert!(state.playbook_context.is_none());
    }

    #[test]
    fn add_observation_appends_without_clearing_prior_turns() {
        let mut state = ReasonerState::default();
        state.push_user("first");
        state.push_assistant("reply");
        state.push_user("second");
        assert_eq!(state.history.len(), 3);
    }
}
