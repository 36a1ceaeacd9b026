//! Message model for the debate engine.
//!
//! Every message kind an agent can receive is a variant of the closed
//! [`Message`] union, so each agent dispatches with an exhaustive `match`.
//! Messages travel inside an [`Envelope`] that records the publishing agent
//! and the topic it was published on.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ledger::ProgressLedger;

/// Sentinel forwarded by an expert whose response carried no answer marker.
pub const NO_ANSWER_FOUND: &str = "NOT_FOUND";

/// Answer content published when the evaluator could not extract a result.
pub const EVALUATION_INCOMPLETE: &str = "EVALUATION_INCOMPLETE";

/// Identity of an agent on the bus.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AgentId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for AgentId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A named publish/subscribe channel.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Topic(String);

impl Topic {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Where `solve` drops the initiating question.
    pub fn entry() -> Self {
        Self::new("question")
    }

    /// Broadcast topic every ring solver listens on.
    pub fn solvers() -> Self {
        Self::new("solver_requests")
    }

    /// Outbound topic owned by a single agent; its neighbors subscribe here.
    pub fn of(agent: &AgentId) -> Self {
        Self(format!("agent/{}", agent))
    }

    /// Final solver responses, consumed by the aggregator.
    pub fn final_responses() -> Self {
        Self::new("final_responses")
    }

    /// The reduced or validated answer.
    pub fn answers() -> Self {
        Self::new("answers")
    }

    /// Questions relayed to the orchestrator.
    pub fn orchestrator() -> Self {
        Self::new("orchestrator")
    }

    /// Expert assignments, fanned out to every expert.
    pub fn assignments() -> Self {
        Self::new("expert_assignments")
    }

    /// Expert solutions, read by the orchestrator and the evaluator.
    pub fn solutions() -> Self {
        Self::new("expert_solutions")
    }

    /// Evaluation requests from the orchestrator.
    pub fn evaluation() -> Self {
        Self::new("evaluation")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The question under debate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub content: String,
}

impl Question {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

/// The single reduced or validated answer of a debate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub content: String,
}

impl Answer {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

/// Ask an agent to produce a new answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolverRequest {
    /// Prompt for this round.
    pub content: String,
    /// The original question.
    pub question: String,
}

/// A solver's answer for one completed round, shared with its neighbors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntermediateSolverResponse {
    pub content: String,
    pub question: String,
    pub answer: String,
    pub round: u32,
}

/// A solver's last answer, sent to the aggregator once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalSolverResponse {
    pub answer: String,
}

/// Numeric answer token, or the marker that none was found.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AnswerToken {
    Value(String),
    NotFound,
}

impl AnswerToken {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Value(_))
    }

    pub fn value(&self) -> Option<&str> {
        match self {
            Self::Value(v) => Some(v),
            Self::NotFound => None,
        }
    }
}

impl fmt::Display for AnswerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => f.write_str(v),
            Self::NotFound => f.write_str(NO_ANSWER_FOUND),
        }
    }
}

/// Orchestrator's choice of which experts work on the question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpertAssignment {
    pub question: String,
    /// Never empty; duplicates removed, first occurrence kept.
    pub assigned_experts: Vec<AgentId>,
    pub reasoning: String,
    /// Orchestrator's instruction for the assigned experts.
    pub instruction: String,
}

impl ExpertAssignment {
    /// Build an assignment, falling back to `default_expert` when `experts`
    /// is empty.
    pub fn new(
        question: impl Into<String>,
        experts: impl IntoIterator<Item = AgentId>,
        default_expert: &AgentId,
        reasoning: impl Into<String>,
        instruction: impl Into<String>,
    ) -> Self {
        let mut assigned_experts: Vec<AgentId> = Vec::new();
        for expert in experts {
            if !assigned_experts.contains(&expert) {
                assigned_experts.push(expert);
            }
        }
        if assigned_experts.is_empty() {
            assigned_experts.push(default_expert.clone());
        }
        Self {
            question: question.into(),
            assigned_experts,
            reasoning: reasoning.into(),
            instruction: instruction.into(),
        }
    }

    pub fn is_assigned(&self, expert: &AgentId) -> bool {
        self.assigned_experts.contains(expert)
    }
}

/// One assigned expert's solution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpertSolution {
    pub expert_name: AgentId,
    pub question: String,
    pub solution: String,
    pub answer: AnswerToken,
}

/// Orchestrator → evaluator: review the solutions of `expected_experts`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationRequest {
    pub question: String,
    pub expected_experts: Vec<AgentId>,
    /// Set when stall detection cut expert work short.
    pub forced: bool,
    /// The orchestrator's ledger at hand-off; the evaluator closes it.
    pub progress: ProgressLedger,
}

/// Closed union of everything that travels over the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    Question(Question),
    Answer(Answer),
    SolverRequest(SolverRequest),
    IntermediateSolverResponse(IntermediateSolverResponse),
    FinalSolverResponse(FinalSolverResponse),
    ExpertAssignment(ExpertAssignment),
    ExpertSolution(ExpertSolution),
    EvaluationRequest(EvaluationRequest),
}

impl Message {
    /// Stable name of the variant, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Question(_) => "question",
            Self::Answer(_) => "answer",
            Self::SolverRequest(_) => "solver_request",
            Self::IntermediateSolverResponse(_) => "intermediate_solver_response",
            Self::FinalSolverResponse(_) => "final_solver_response",
            Self::ExpertAssignment(_) => "expert_assignment",
            Self::ExpertSolution(_) => "expert_solution",
            Self::EvaluationRequest(_) => "evaluation_request",
        }
    }
}

/// A message plus its routing metadata.
#[derive(Debug, Clone)]
pub struct Envelope {
    /// Publishing agent; `None` for messages injected from outside the bus.
    pub sender: Option<AgentId>,
    /// Topic the message was published on; `None` for direct sends.
    pub topic: Option<Topic>,
    pub message: Message,
}
