//! Event bus for debate observers
//!
//! Tokio broadcast channel. Publishing never blocks and never fails: a
//! slow subscriber lags and loses events, an absent one costs nothing.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::debug;

use super::history::EventHistory;
use super::types::{DebateEvent, DebateId};
use crate::config::Workflow;
use crate::ledger::{ProgressLedger, TaskLedger};
use crate::protocol::AgentId;

/// Channel capacity for broadcast
const CHANNEL_CAPACITY: usize = 1024;

/// Shared reference to EventBus
pub type SharedEventBus = Arc<EventBus>;

/// Broadcast event bus
pub struct EventBus {
    sender: broadcast::Sender<DebateEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(CHANNEL_CAPACITY)
    }

    /// Bus whose subscribers lag after `capacity` unread events
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Create a shared reference to this event bus
    pub fn shared(self) -> SharedEventBus {
        Arc::new(self)
    }

    /// Publish an event to all subscribers; returns how many received it
    pub fn publish(&self, event: DebateEvent) -> usize {
        let event_type = event.event_type();
        match self.sender.send(event) {
            Ok(count) => {
                debug!(event_type, receivers = count, "Event published");
                count
            }
            Err(_) => {
                debug!(event_type, "Event published (no receivers)");
                0
            }
        }
    }

    /// Subscribe to receive events
    pub fn subscribe(&self) -> broadcast::Receiver<DebateEvent> {
        self.sender.subscribe()
    }

    /// Get the number of current subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Event filter for selective subscription
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub debate_id: Option<DebateId>,
    pub agent: Option<AgentId>,
    pub event_types: Option<Vec<String>>,
}

impl EventFilter {
    /// Create a new empty filter (matches all events)
    pub fn new() -> Self {
        Self::default()
    }

    pub fn debate(mut self, debate_id: &str) -> Self {
        self.debate_id = Some(debate_id.to_string());
        self
    }

    pub fn agent(mut self, agent: &AgentId) -> Self {
        self.agent = Some(agent.clone());
        self
    }

    pub fn types(mut self, event_types: Vec<&str>) -> Self {
        self.event_types = Some(event_types.into_iter().map(String::from).collect());
        self
    }

    /// Check if an event matches this filter
    pub fn matches(&self, event: &DebateEvent) -> bool {
        if let Some(ref id) = self.debate_id {
            if event.debate_id() != id {
                return false;
            }
        }

        // Non-agent events pass an agent filter.
        if let Some(ref agent) = self.agent {
            if let Some(event_agent) = event.agent() {
                if event_agent != agent {
                    return false;
                }
            }
        }

        if let Some(ref types) = self.event_types {
            if !types.iter().any(|t| t == event.event_type()) {
                return false;
            }
        }

        true
    }
}

/// Filtered event receiver that only yields matching events
pub struct FilteredReceiver {
    receiver: broadcast::Receiver<DebateEvent>,
    filter: EventFilter,
}

impl FilteredReceiver {
    pub fn new(receiver: broadcast::Receiver<DebateEvent>, filter: EventFilter) -> Self {
        Self { receiver, filter }
    }

    /// Receive the next matching event
    pub async fn recv(&mut self) -> Result<DebateEvent, broadcast::error::RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.filter.matches(&event) {
                return Ok(event);
            }
        }
    }
}

/// Extension trait for subscribing with filters
pub trait EventBusExt {
    fn subscribe_filtered(&self, filter: EventFilter) -> FilteredReceiver;
}

impl EventBusExt for EventBus {
    fn subscribe_filtered(&self, filter: EventFilter) -> FilteredReceiver {
        FilteredReceiver::new(self.subscribe(), filter)
    }
}

/// Per-debate handle agents use to report state transitions.
///
/// Broadcast subscribers may lag; the optional transcript records every
/// event before it is broadcast and never drops one.
#[derive(Clone)]
pub struct EventEmitter {
    bus: SharedEventBus,
    debate_id: DebateId,
    transcript: Option<Arc<EventHistory>>,
}

impl EventEmitter {
    pub fn new(bus: SharedEventBus, debate_id: impl Into<DebateId>) -> Self {
        Self {
            bus,
            debate_id: debate_id.into(),
            transcript: None,
        }
    }

    /// Also record every emitted event into `transcript`.
    pub fn with_transcript(mut self, transcript: Arc<EventHistory>) -> Self {
        self.transcript = Some(transcript);
        self
    }

    fn emit(&self, event: DebateEvent) {
        if let Some(transcript) = &self.transcript {
            transcript.record(event.clone());
        }
        self.bus.publish(event);
    }

    pub fn debate_id(&self) -> &str {
        &self.debate_id
    }

    fn id(&self) -> DebateId {
        self.debate_id.clone()
    }

    pub fn debate_started(&self, question: &str, workflow: Workflow) {
        self.emit(DebateEvent::DebateStarted {
            debate_id: self.id(),
            question: question.to_string(),
            workflow,
            timestamp: Utc::now(),
        });
    }

    pub fn thinking(&self, agent: &AgentId, round: u32) {
        self.emit(DebateEvent::AgentThinking {
            debate_id: self.id(),
            agent: agent.clone(),
            round,
            timestamp: Utc::now(),
        });
    }

    pub fn response(&self, agent: &AgentId, round: u32, content: &str, answer: &str) {
        self.emit(DebateEvent::AgentResponse {
            debate_id: self.id(),
            agent: agent.clone(),
            round,
            content: content.to_string(),
            answer: answer.to_string(),
            timestamp: Utc::now(),
        });
    }

    pub fn round_complete(&self, agent: &AgentId, round: u32) {
        self.emit(DebateEvent::RoundComplete {
            debate_id: self.id(),
            agent: agent.clone(),
            round,
            timestamp: Utc::now(),
        });
    }

    pub fn expert_assigned(&self, experts: &[AgentId], reasoning: &str) {
        self.emit(DebateEvent::ExpertAssigned {
            debate_id: self.id(),
            experts: experts.to_vec(),
            reasoning: reasoning.to_string(),
            timestamp: Utc::now(),
        });
    }

    pub fn evaluation_started(&self, experts: &[AgentId], forced: bool) {
        self.emit(DebateEvent::EvaluationStarted {
            debate_id: self.id(),
            experts: experts.to_vec(),
            forced,
            timestamp: Utc::now(),
        });
    }

    pub fn task_ledger(&self, ledger: &TaskLedger) {
        self.emit(DebateEvent::TaskLedgerUpdated {
            debate_id: self.id(),
            ledger: ledger.clone(),
            timestamp: Utc::now(),
        });
    }

    pub fn progress_ledger(&self, ledger: &ProgressLedger) {
        self.emit(DebateEvent::ProgressLedgerUpdated {
            debate_id: self.id(),
            ledger: ledger.clone(),
            timestamp: Utc::now(),
        });
    }

    pub fn debate_ended(&self, answer: &str) {
        self.emit(DebateEvent::DebateEnded {
            debate_id: self.id(),
            answer: answer.to_string(),
            timestamp: Utc::now(),
        });
    }

    pub fn agent_failed(&self, agent: &AgentId, message: &str, fatal: bool) {
        self.emit(DebateEvent::AgentFailed {
            debate_id: self.id(),
            agent: agent.clone(),
            message: message.to_string(),
            fatal,
            timestamp: Utc::now(),
        });
    }
}
