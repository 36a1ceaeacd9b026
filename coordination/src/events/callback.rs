//! Observer sink: named notifications for a debate's state transitions.
//!
//! Callbacks run on their own dispatcher task fed by the [`EventBus`], so a
//! slow or panicking observer never holds up an agent.

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::bus::EventBus;
use super::types::DebateEvent;
use crate::ledger::{ProgressLedger, TaskLedger};
use crate::protocol::AgentId;

/// Receives debate notifications. Every method defaults to a no-op.
pub trait DebateCallback: Send + Sync {
    fn on_debate_start(&self, _question: &str) {}

    fn on_thinking(&self, _agent: &AgentId, _round: u32) {}

    fn on_response(&self, _agent: &AgentId, _round: u32, _content: &str, _answer: &str) {}

    fn on_round_complete(&self, _agent: &AgentId, _round: u32) {}

    fn on_expert_assignment(&self, _experts: &[AgentId], _reasoning: &str) {}

    fn on_evaluation_start(&self, _experts: &[AgentId]) {}

    fn on_task_ledger_update(&self, _ledger: &TaskLedger) {}

    fn on_progress_ledger_update(&self, _ledger: &ProgressLedger) {}

    fn on_debate_end(&self, _answer: &str) {}

    fn on_error(&self, _agent: &AgentId, _message: &str, _fatal: bool) {}

    /// Route `event` to the matching notification.
    fn on_event(&self, event: &DebateEvent) {
        match event {
            DebateEvent::DebateStarted { question, .. } => self.on_debate_start(question),
            DebateEvent::AgentThinking { agent, round, .. } => self.on_thinking(agent, *round),
            DebateEvent::AgentResponse {
                agent,
                round,
                content,
                answer,
                ..
            } => self.on_response(agent, *round, content, answer),
            DebateEvent::RoundComplete { agent, round, .. } => {
                self.on_round_complete(agent, *round)
            }
            DebateEvent::ExpertAssigned {
                experts, reasoning, ..
            } => self.on_expert_assignment(experts, reasoning),
            DebateEvent::EvaluationStarted { experts, .. } => self.on_evaluation_start(experts),
            DebateEvent::TaskLedgerUpdated { ledger, .. } => self.on_task_ledger_update(ledger),
            DebateEvent::ProgressLedgerUpdated { ledger, .. } => {
                self.on_progress_ledger_update(ledger)
            }
            DebateEvent::DebateEnded { answer, .. } => self.on_debate_end(answer),
            DebateEvent::AgentFailed {
                agent,
                message,
                fatal,
                ..
            } => self.on_error(agent, message, *fatal),
        }
    }
}

/// Start a dispatcher task that feeds every event on `bus` to `callback`.
///
/// The task ends when the bus is dropped. Lagged events are skipped.
pub fn spawn_callback(bus: &EventBus, callback: Arc<dyn DebateCallback>) -> JoinHandle<()> {
    let mut receiver = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    let cb = Arc::clone(&callback);
                    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                        cb.on_event(&event)
                    }));
                    if outcome.is_err() {
                        error!(event_type = event.event_type(), "Debate callback panicked");
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Debate callback lagging, events dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

/// Writes every notification to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingCallback;

impl DebateCallback for LoggingCallback {
    fn on_debate_start(&self, question: &str) {
        info!(question, "Debate started");
    }

    fn on_thinking(&self, agent: &AgentId, round: u32) {
        info!(%agent, round, "Thinking");
    }

    fn on_response(&self, agent: &AgentId, round: u32, _content: &str, answer: &str) {
        info!(%agent, round, answer, "Response");
    }

    fn on_round_complete(&self, agent: &AgentId, round: u32) {
        info!(%agent, round, "Round complete");
    }

    fn on_expert_assignment(&self, experts: &[AgentId], reasoning: &str) {
        let names: Vec<&str> = experts.iter().map(AgentId::as_str).collect();
        info!(experts = ?names, reasoning, "Experts assigned");
    }

    fn on_evaluation_start(&self, experts: &[AgentId]) {
        info!(experts = experts.len(), "Evaluation started");
    }

    fn on_task_ledger_update(&self, ledger: &TaskLedger) {
        info!(
            facts = ledger.given_facts.len(),
            plan_steps = ledger.task_plan.len(),
            "Task ledger updated"
        );
    }

    fn on_progress_ledger_update(&self, ledger: &ProgressLedger) {
        info!(
            complete = ledger.task_complete,
            progress = ledger.progress_being_made,
            stall_count = ledger.stall_count,
            next = %ledger.next_speaker,
            "Progress ledger updated"
        );
    }

    fn on_debate_end(&self, answer: &str) {
        info!(answer, "Debate ended");
    }

    fn on_error(&self, agent: &AgentId, message: &str, fatal: bool) {
        if fatal {
            error!(%agent, message, "Agent failed");
        } else {
            warn!(%agent, message, "Agent failed");
        }
    }
}
