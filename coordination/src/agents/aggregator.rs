//! Debate entry point and final reduction.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::solver::initial_prompt;
use super::{Agent, AgentContext};
use crate::config::Workflow;
use crate::error::AgentResult;
use crate::protocol::{AgentId, Answer, Envelope, Message, Question, SolverRequest, Topic};

/// Most frequent answer; ties go to the value seen first.
pub fn majority_vote<S: AsRef<str>>(answers: &[S]) -> Option<String> {
    let mut tally: Vec<(&str, usize)> = Vec::new();
    for answer in answers {
        let answer = answer.as_ref();
        match tally.iter_mut().find(|(value, _)| *value == answer) {
            Some((_, count)) => *count += 1,
            None => tally.push((answer, 1)),
        }
    }

    let mut best: Option<(&str, usize)> = None;
    for (value, count) in tally {
        // Strictly greater keeps the earliest value on a tie.
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((value, count));
        }
    }
    best.map(|(value, _)| value.to_string())
}

/// How the aggregator turns a debate into one answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReductionPolicy {
    /// Wait for one final response per solver, then vote.
    MajorityVote { solvers: usize },
    /// Hand the question to the orchestrator and pass the evaluator's
    /// answer through unchanged.
    Relay,
}

/// Accepts the question, fans it out, and reduces the outcome.
pub struct Aggregator {
    id: AgentId,
    policy: ReductionPolicy,
    finals: Vec<(Option<AgentId>, String)>,
    question: Option<String>,
}

impl Aggregator {
    pub fn new(id: AgentId, policy: ReductionPolicy) -> Self {
        Self {
            id,
            policy,
            finals: Vec::new(),
            question: None,
        }
    }

    pub fn policy(&self) -> ReductionPolicy {
        self.policy
    }

    fn on_question(&mut self, question: Question, ctx: &AgentContext) {
        info!(agent = %self.id, question = %question.content, "Question received");
        self.finals.clear();
        self.question = Some(question.content.clone());

        match self.policy {
            ReductionPolicy::MajorityVote { solvers } => {
                ctx.events().debate_started(&question.content, Workflow::Ring);
                let request = SolverRequest {
                    content: initial_prompt(&question.content),
                    question: question.content,
                };
                let reached = ctx.publish(Message::SolverRequest(request), &Topic::solvers());
                debug!(agent = %self.id, reached, solvers, "Initial request published");
            }
            ReductionPolicy::Relay => {
                ctx.events().debate_started(&question.content, Workflow::ExpertPanel);
                ctx.publish(Message::Question(question), &Topic::orchestrator());
            }
        }
    }

    fn on_final(&mut self, sender: Option<AgentId>, answer: String, ctx: &AgentContext) {
        let ReductionPolicy::MajorityVote { solvers } = self.policy else {
            debug!(agent = %self.id, "Final response ignored in relay mode");
            return;
        };

        if sender.is_some() && self.finals.iter().any(|(s, _)| s == &sender) {
            warn!(agent = %self.id, sender = ?sender, "Duplicate final response ignored");
            return;
        }
        self.finals.push((sender, answer));
        debug!(agent = %self.id, received = self.finals.len(), expected = solvers, "Final response");

        if self.finals.len() < solvers {
            return;
        }

        let answers: Vec<&str> = self.finals.iter().map(|(_, a)| a.as_str()).collect();
        if let Some(winner) = majority_vote(&answers) {
            info!(agent = %self.id, answers = ?answers, answer = %winner, "Majority vote");
            ctx.publish(Message::Answer(Answer::new(winner.clone())), &Topic::answers());
            ctx.events().debate_ended(&winner);
        }
        self.finals.clear();
        self.question = None;
    }

    fn on_answer(&mut self, answer: Answer, ctx: &AgentContext) {
        if self.policy != ReductionPolicy::Relay {
            return;
        }
        info!(agent = %self.id, answer = %answer.content, "Validated answer received");
        ctx.events().debate_ended(&answer.content);
        self.question = None;
    }
}

#[async_trait]
impl Agent for Aggregator {
    fn id(&self) -> &AgentId {
        &self.id
    }

    async fn handle(&mut self, envelope: Envelope, ctx: &AgentContext) -> AgentResult<()> {
        match envelope.message {
            Message::Question(question) => self.on_question(question, ctx),
            Message::FinalSolverResponse(response) => {
                self.on_final(envelope.sender, response.answer, ctx)
            }
            Message::Answer(answer) => self.on_answer(answer, ctx),
            Message::SolverRequest(_)
            | Message::IntermediateSolverResponse(_)
            | Message::ExpertAssignment(_)
            | Message::ExpertSolution(_)
            | Message::EvaluationRequest(_) => {
                debug!(agent = %self.id, kind = envelope.message.kind(), "Ignored");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{spawn_agent, FailureLog};
    use crate::bus::MessageBus;
    use crate::events::{EventBus, EventEmitter};
    use crate::protocol::FinalSolverResponse;
    use std::sync::Arc;

    #[test]
    fn test_majority_wins() {
        assert_eq!(majority_vote(&["72", "72", "72", "8"]).as_deref(), Some("72"));
    }

    #[test]
    fn test_tie_goes_to_first_seen() {
        assert_eq!(majority_vote(&["10", "10", "20", "20"]).as_deref(), Some("10"));
        assert_eq!(majority_vote(&["20", "10", "10", "20"]).as_deref(), Some("20"));
        assert_eq!(majority_vote(&["3", "1", "2"]).as_deref(), Some("3"));
    }

    #[test]
    fn test_empty_vote() {
        assert_eq!(majority_vote::<&str>(&[]), None);
    }

    #[tokio::test]
    async fn test_votes_once_per_solver_set() {
        let bus = MessageBus::new().shared();
        let id = AgentId::from("aggregator");
        let mailbox = bus.register(id.clone()).unwrap();
        bus.subscribe(&id, &Topic::final_responses());
        let sink_id = AgentId::from("sink");
        let mut sink = bus.register(sink_id.clone()).unwrap();
        bus.subscribe(&sink_id, &Topic::answers());

        let ctx = AgentContext::new(
            id.clone(),
            bus.clone(),
            EventEmitter::new(EventBus::new().shared(), "d-1"),
            FailureLog::default(),
        );
        let agent = Aggregator::new(id, ReductionPolicy::MajorityVote { solvers: 4 });
        spawn_agent(Box::new(agent), mailbox, ctx);

        let senders = ["s0", "s1", "s1", "s2", "s3"];
        let answers = ["10", "20", "10", "20", "10"];
        for (sender, answer) in senders.iter().zip(answers) {
            bus.publish(
                Message::FinalSolverResponse(FinalSolverResponse {
                    answer: answer.into(),
                }),
                &Topic::final_responses(),
                Some(&AgentId::from(*sender)),
            );
        }

        // s1's second response is dropped: votes are 10, 20, 20, 10.
        let env = sink.recv().await.unwrap();
        bus.complete();
        assert_eq!(env.message, Message::Answer(Answer::new("10")));
        bus.wait_idle().await;
    }
}
