//! Domain expert: works only when named in an assignment.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::{Agent, AgentContext, OracleClient};
use crate::error::AgentResult;
use crate::extract::{extract_or_sentinel, ANSWER_FORMAT};
use crate::oracle::ChatMessage;
use crate::persona::Role;
use crate::protocol::{
    AgentId, AnswerToken, Envelope, ExpertAssignment, ExpertSolution, Message, Topic,
};

/// Prompt an assigned expert receives.
pub fn expert_prompt(assignment: &ExpertAssignment) -> String {
    let mut prompt = String::new();
    if !assignment.instruction.trim().is_empty() {
        prompt.push_str(&format!("Instruction from the orchestrator: {}\n", assignment.instruction.trim()));
    }
    prompt.push_str(&format!(
        "Solve the following math problem:\n{}\n{}",
        assignment.question, ANSWER_FORMAT
    ));
    prompt
}

pub struct Expert {
    id: AgentId,
    role: Role,
    oracle: OracleClient,
    system: ChatMessage,
    history: Vec<ChatMessage>,
}

impl Expert {
    /// Expert registered under its role's bus identity.
    pub fn new(role: Role, oracle: OracleClient) -> Self {
        Self {
            id: role.agent_id(),
            role,
            oracle,
            system: ChatMessage::system(role.system_prompt()),
            history: Vec::new(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    async fn on_assignment(&mut self, assignment: ExpertAssignment, ctx: &AgentContext) -> AgentResult<()> {
        if !assignment.is_assigned(&self.id) {
            debug!(agent = %self.id, "Not assigned, ignoring");
            return Ok(());
        }

        ctx.events().thinking(&self.id, 0);
        let prompt = ChatMessage::user(expert_prompt(&assignment));
        let mut conversation = vec![self.system.clone()];
        conversation.extend(self.history.iter().cloned());
        conversation.push(prompt.clone());

        let content = match self.oracle.complete(&conversation).await {
            Ok(content) => content,
            Err(e) => {
                // Report the miss so the orchestrator's stall detection sees it.
                warn!(agent = %self.id, "Expert oracle call failed: {}", e);
                ctx.publish(
                    Message::ExpertSolution(ExpertSolution {
                        expert_name: self.id.clone(),
                        question: assignment.question,
                        solution: format!("Error: {}", e),
                        answer: AnswerToken::NotFound,
                    }),
                    &Topic::solutions(),
                );
                return Err(e.into());
            }
        };
        self.history.push(prompt);
        self.history.push(ChatMessage::assistant(content.clone()));

        let answer = extract_or_sentinel(&content);
        if answer.is_valid() {
            info!(agent = %self.id, %answer, "Expert solved");
        } else {
            warn!(agent = %self.id, "Expert response had no answer marker");
        }
        ctx.events().response(&self.id, 0, &content, &answer.to_string());

        ctx.publish(
            Message::ExpertSolution(ExpertSolution {
                expert_name: self.id.clone(),
                question: assignment.question,
                solution: content,
                answer,
            }),
            &Topic::solutions(),
        );
        Ok(())
    }
}

#[async_trait]
impl Agent for Expert {
    fn id(&self) -> &AgentId {
        &self.id
    }

    async fn handle(&mut self, envelope: Envelope, ctx: &AgentContext) -> AgentResult<()> {
        match envelope.message {
            Message::ExpertAssignment(assignment) => self.on_assignment(assignment, ctx).await,
            other => {
                debug!(agent = %self.id, kind = other.kind(), "Ignored");
                Ok(())
            }
        }
    }
}
