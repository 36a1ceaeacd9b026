//! Passive answer sink that hands the debate result back to `solve`.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{Agent, AgentContext};
use crate::error::AgentResult;
use crate::protocol::{AgentId, Answer, Envelope, Message};

/// Shared cell holding the first answer published in a debate.
#[derive(Debug, Clone, Default)]
pub struct AnswerSlot(Arc<Mutex<Option<Answer>>>);

impl AnswerSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<Answer> {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Store `answer` unless one is already present; returns whether it
    /// was stored.
    fn fill(&self, answer: Answer) -> bool {
        let mut slot = self.0.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_some() {
            return false;
        }
        *slot = Some(answer);
        true
    }
}

pub struct AnswerCollector {
    id: AgentId,
    slot: AnswerSlot,
}

impl AnswerCollector {
    pub fn new(id: AgentId, slot: AnswerSlot) -> Self {
        Self { id, slot }
    }
}

#[async_trait]
impl Agent for AnswerCollector {
    fn id(&self) -> &AgentId {
        &self.id
    }

    async fn handle(&mut self, envelope: Envelope, _ctx: &AgentContext) -> AgentResult<()> {
        match envelope.message {
            Message::Answer(answer) => {
                let content = answer.content.clone();
                if self.slot.fill(answer) {
                    debug!(agent = %self.id, answer = %content, "Answer collected");
                } else {
                    warn!(agent = %self.id, answer = %content, "Extra answer ignored");
                }
            }
            other => debug!(agent = %self.id, kind = other.kind(), "Ignored"),
        }
        Ok(())
    }
}
