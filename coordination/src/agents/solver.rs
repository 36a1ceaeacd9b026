//! Ring solver: answers, shares with neighbors, re-answers per round.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::{Agent, AgentContext, OracleClient};
use crate::error::AgentResult;
use crate::extract::{extract_answer, ANSWER_FORMAT};
use crate::oracle::ChatMessage;
use crate::persona::Role;
use crate::protocol::{
    AgentId, Envelope, FinalSolverResponse, IntermediateSolverResponse, Message, SolverRequest,
    Topic,
};
use crate::round_buffer::{BufferInsert, RoundBuffer};

/// First-round prompt for every solver.
pub fn initial_prompt(question: &str) -> String {
    format!(
        "Can you solve the following math problem?\n{}\nExplain your reasoning. {}",
        question, ANSWER_FORMAT
    )
}

/// Next-round prompt built from the neighbors' responses, in arrival order.
pub fn peer_prompt(responses: &[IntermediateSolverResponse], question: &str) -> String {
    let mut prompt = String::from("These are the solutions to the problem from other agents:\n");
    for (i, response) in responses.iter().enumerate() {
        prompt.push_str(&format!("Agent {} solution: {}\n", i + 1, response.content));
    }
    prompt.push_str(&format!(
        "Using the solutions from other agents as additional information, can you provide \
         your answer to the math problem? The original math problem is {}. Consider if there \
         are different approaches shown by other agents and explain your reasoning. {}",
        question, ANSWER_FORMAT
    ));
    prompt
}

/// One member of the solver ring.
///
/// The round counter starts at 0 and advances once per successful oracle
/// cycle. When it reaches `max_rounds` the solver sends its final answer
/// and ignores further requests for the question.
pub struct Solver {
    id: AgentId,
    role: Role,
    oracle: OracleClient,
    system: ChatMessage,
    history: Vec<ChatMessage>,
    round: u32,
    max_rounds: u32,
    buffer: RoundBuffer<IntermediateSolverResponse>,
    deliberation_delay: Duration,
}

impl Solver {
    pub fn new(id: AgentId, role: Role, oracle: OracleClient, neighbors: usize, max_rounds: u32) -> Self {
        Self {
            id,
            role,
            oracle,
            system: ChatMessage::system(role.system_prompt()),
            history: Vec::new(),
            round: 0,
            max_rounds,
            buffer: RoundBuffer::new(neighbors),
            deliberation_delay: Duration::ZERO,
        }
    }

    /// Pause after each round barrier before re-asking the oracle.
    pub fn with_deliberation_delay(mut self, delay: Duration) -> Self {
        self.deliberation_delay = delay;
        self
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn is_finished(&self) -> bool {
        self.round >= self.max_rounds
    }

    async fn on_request(&mut self, request: SolverRequest, ctx: &AgentContext) -> AgentResult<()> {
        if self.is_finished() {
            debug!(agent = %self.id, round = self.round, "Solver finished, request ignored");
            return Ok(());
        }

        ctx.events().thinking(&self.id, self.round);

        let prompt = ChatMessage::user(request.content);
        let mut conversation = Vec::with_capacity(self.history.len() + 2);
        conversation.push(self.system.clone());
        conversation.extend(self.history.iter().cloned());
        conversation.push(prompt.clone());

        let content = self.oracle.complete(&conversation).await?;
        self.history.push(prompt);
        self.history.push(ChatMessage::assistant(content.clone()));

        let answer = extract_answer(&content)?;
        ctx.events().response(&self.id, self.round, &content, &answer);

        self.round += 1;
        if self.round == self.max_rounds {
            info!(agent = %self.id, round = self.round, %answer, "Final answer");
            ctx.publish(
                Message::FinalSolverResponse(FinalSolverResponse { answer }),
                &Topic::final_responses(),
            );
        } else {
            debug!(agent = %self.id, round = self.round, %answer, "Intermediate answer");
            ctx.publish(
                Message::IntermediateSolverResponse(IntermediateSolverResponse {
                    content,
                    question: request.question,
                    answer,
                    round: self.round,
                }),
                &Topic::of(&self.id),
            );
        }
        Ok(())
    }

    async fn on_peer_response(
        &mut self,
        sender: Option<AgentId>,
        response: IntermediateSolverResponse,
        ctx: &AgentContext,
    ) -> AgentResult<()> {
        let Some(peer) = sender else {
            warn!(agent = %self.id, "Peer response without sender dropped");
            return Ok(());
        };

        let round = response.round;
        let question = response.question.clone();
        match self.buffer.insert(round, peer, response) {
            BufferInsert::Accumulating { received, expected } => {
                debug!(agent = %self.id, round, received, expected, "Waiting for neighbors");
                Ok(())
            }
            BufferInsert::Duplicate => {
                warn!(agent = %self.id, round, "Duplicate peer response ignored");
                Ok(())
            }
            BufferInsert::Released(batch) => {
                info!(agent = %self.id, round, neighbors = batch.len(), "Round complete");
                ctx.events().round_complete(&self.id, round);
                if !self.deliberation_delay.is_zero() {
                    tokio::time::sleep(self.deliberation_delay).await;
                }
                let request = SolverRequest {
                    content: peer_prompt(&batch, &question),
                    question,
                };
                ctx.send(Message::SolverRequest(request), &self.id)?;
                Ok(())
            }
        }
    }
}

#[async_trait]
impl Agent for Solver {
    fn id(&self) -> &AgentId {
        &self.id
    }

    async fn handle(&mut self, envelope: Envelope, ctx: &AgentContext) -> AgentResult<()> {
        match envelope.message {
            Message::SolverRequest(request) => self.on_request(request, ctx).await,
            Message::IntermediateSolverResponse(response) => {
                self.on_peer_response(envelope.sender, response, ctx).await
            }
            Message::Question(_)
            | Message::Answer(_)
            | Message::FinalSolverResponse(_)
            | Message::ExpertAssignment(_)
            | Message::ExpertSolution(_)
            | Message::EvaluationRequest(_) => {
                debug!(agent = %self.id, kind = envelope.message.kind(), "Ignored");
                Ok(())
            }
        }
    }
}
