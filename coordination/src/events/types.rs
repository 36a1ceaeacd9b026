//! Observable debate events
//!
//! One variant per state transition the observer sink is told about.
//! Every event carries the id of the debate that produced it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::Workflow;
use crate::ledger::{ProgressLedger, TaskLedger};
use crate::protocol::AgentId;

/// Unique identifier of one `solve` run
pub type DebateId = String;

/// All debate coordination events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DebateEvent {
    /// The aggregator accepted a question
    DebateStarted {
        debate_id: DebateId,
        question: String,
        workflow: Workflow,
        timestamp: DateTime<Utc>,
    },

    /// An agent is about to call the oracle
    AgentThinking {
        debate_id: DebateId,
        agent: AgentId,
        round: u32,
        timestamp: DateTime<Utc>,
    },

    /// An agent's oracle call returned and its answer was extracted
    AgentResponse {
        debate_id: DebateId,
        agent: AgentId,
        round: u32,
        content: String,
        answer: String,
        timestamp: DateTime<Utc>,
    },

    /// A solver's round barrier released
    RoundComplete {
        debate_id: DebateId,
        agent: AgentId,
        round: u32,
        timestamp: DateTime<Utc>,
    },

    /// The orchestrator published an expert assignment
    ExpertAssigned {
        debate_id: DebateId,
        experts: Vec<AgentId>,
        reasoning: String,
        timestamp: DateTime<Utc>,
    },

    /// The evaluator started its review
    EvaluationStarted {
        debate_id: DebateId,
        experts: Vec<AgentId>,
        forced: bool,
        timestamp: DateTime<Utc>,
    },

    TaskLedgerUpdated {
        debate_id: DebateId,
        ledger: TaskLedger,
        timestamp: DateTime<Utc>,
    },

    ProgressLedgerUpdated {
        debate_id: DebateId,
        ledger: ProgressLedger,
        timestamp: DateTime<Utc>,
    },

    /// The final answer was published
    DebateEnded {
        debate_id: DebateId,
        answer: String,
        timestamp: DateTime<Utc>,
    },

    /// An agent's handler failed
    AgentFailed {
        debate_id: DebateId,
        agent: AgentId,
        message: String,
        fatal: bool,
        timestamp: DateTime<Utc>,
    },
}

impl DebateEvent {
    /// Get the timestamp of this event
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            DebateEvent::DebateStarted { timestamp, .. } => *timestamp,
            DebateEvent::AgentThinking { timestamp, .. } => *timestamp,
            DebateEvent::AgentResponse { timestamp, .. } => *timestamp,
            DebateEvent::RoundComplete { timestamp, .. } => *timestamp,
            DebateEvent::ExpertAssigned { timestamp, .. } => *timestamp,
            DebateEvent::EvaluationStarted { timestamp, .. } => *timestamp,
            DebateEvent::TaskLedgerUpdated { timestamp, .. } => *timestamp,
            DebateEvent::ProgressLedgerUpdated { timestamp, .. } => *timestamp,
            DebateEvent::DebateEnded { timestamp, .. } => *timestamp,
            DebateEvent::AgentFailed { timestamp, .. } => *timestamp,
        }
    }

    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            DebateEvent::DebateStarted { .. } => "debate_started",
            DebateEvent::AgentThinking { .. } => "agent_thinking",
            DebateEvent::AgentResponse { .. } => "agent_response",
            DebateEvent::RoundComplete { .. } => "round_complete",
            DebateEvent::ExpertAssigned { .. } => "expert_assigned",
            DebateEvent::EvaluationStarted { .. } => "evaluation_started",
            DebateEvent::TaskLedgerUpdated { .. } => "task_ledger_updated",
            DebateEvent::ProgressLedgerUpdated { .. } => "progress_ledger_updated",
            DebateEvent::DebateEnded { .. } => "debate_ended",
            DebateEvent::AgentFailed { .. } => "agent_failed",
        }
    }

    pub fn debate_id(&self) -> &str {
        match self {
            DebateEvent::DebateStarted { debate_id, .. }
            | DebateEvent::AgentThinking { debate_id, .. }
            | DebateEvent::AgentResponse { debate_id, .. }
            | DebateEvent::RoundComplete { debate_id, .. }
            | DebateEvent::ExpertAssigned { debate_id, .. }
            | DebateEvent::EvaluationStarted { debate_id, .. }
            | DebateEvent::TaskLedgerUpdated { debate_id, .. }
            | DebateEvent::ProgressLedgerUpdated { debate_id, .. }
            | DebateEvent::DebateEnded { debate_id, .. }
            | DebateEvent::AgentFailed { debate_id, .. } => debate_id,
        }
    }

    /// Get the agent if this event is agent-scoped
    pub fn agent(&self) -> Option<&AgentId> {
        match self {
            DebateEvent::AgentThinking { agent, .. }
            | DebateEvent::AgentResponse { agent, .. }
            | DebateEvent::RoundComplete { agent, .. }
            | DebateEvent::AgentFailed { agent, .. } => Some(agent),
            _ => None,
        }
    }

    /// Generate a new debate ID
    pub fn new_debate_id() -> DebateId {
        uuid::Uuid::new_v4().to_string()
    }
}
