//! Debate agents and the mailbox loop that drives them.
//!
//! Each agent is an actor: a task owns the agent's state and its
//! [`Mailbox`], and handles one envelope to completion before taking the
//! next. A handler error or panic is reported through the event sink and
//! never escapes the loop; a fatal error halts the bus.

pub mod aggregator;
pub mod collector;
pub mod evaluator;
pub mod expert;
pub mod orchestrator;
pub mod solver;

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::bus::{BusResult, Mailbox, SharedMessageBus};
use crate::error::{AgentError, AgentResult};
use crate::events::EventEmitter;
use crate::oracle::{ChatMessage, CompletionOracle, OracleError, OracleResult};
use crate::protocol::{AgentId, Envelope, Message, Topic};

pub use aggregator::{majority_vote, Aggregator, ReductionPolicy};
pub use collector::{AnswerCollector, AnswerSlot};
pub use evaluator::Evaluator;
pub use expert::Expert;
pub use orchestrator::Orchestrator;
pub use solver::Solver;

/// A message handler with private state.
#[async_trait]
pub trait Agent: Send {
    fn id(&self) -> &AgentId;

    /// Handle one envelope. Called sequentially, never concurrently.
    async fn handle(&mut self, envelope: Envelope, ctx: &AgentContext) -> AgentResult<()>;
}

/// A handler failure recorded for the caller of `solve`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentFailure {
    pub agent: AgentId,
    pub message: String,
    pub fatal: bool,
}

/// Failures collected across every agent of one debate.
pub type FailureLog = Arc<Mutex<Vec<AgentFailure>>>;

/// Everything an agent needs besides its own state.
#[derive(Clone)]
pub struct AgentContext {
    id: AgentId,
    bus: SharedMessageBus,
    events: EventEmitter,
    failures: FailureLog,
}

impl AgentContext {
    pub fn new(id: AgentId, bus: SharedMessageBus, events: EventEmitter, failures: FailureLog) -> Self {
        Self {
            id,
            bus,
            events,
            failures,
        }
    }

    pub fn id(&self) -> &AgentId {
        &self.id
    }

    pub fn events(&self) -> &EventEmitter {
        &self.events
    }

    /// Publish as this agent.
    pub fn publish(&self, message: Message, topic: &Topic) -> usize {
        self.bus.publish(message, topic, Some(&self.id))
    }

    /// Point-to-point delivery as this agent.
    pub fn send(&self, message: Message, recipient: &AgentId) -> BusResult<()> {
        self.bus.send(message, recipient, Some(&self.id))
    }

    fn report(&self, err: &AgentError) {
        let fatal = err.is_fatal();
        let message = err.to_string();
        if fatal {
            error!(agent = %self.id, "Fatal agent failure: {}", message);
            self.bus.halt();
        } else {
            warn!(agent = %self.id, "Agent step failed: {}", message);
        }
        self.events.agent_failed(&self.id, &message, fatal);
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(AgentFailure {
                agent: self.id.clone(),
                message,
                fatal,
            });
    }
}

/// Run `agent` on its own task until the bus drops its mailbox.
pub fn spawn_agent(mut agent: Box<dyn Agent>, mut mailbox: Mailbox, ctx: AgentContext) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(envelope) = mailbox.recv().await {
            if ctx.bus.is_halted() {
                debug!(agent = %ctx.id, kind = envelope.message.kind(), "Bus halted, envelope drained");
                ctx.bus.complete();
                continue;
            }

            let kind = envelope.message.kind();
            debug!(agent = %ctx.id, kind, "Handling message");
            let outcome = AssertUnwindSafe(agent.handle(envelope, &ctx))
                .catch_unwind()
                .await;
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(err)) => ctx.report(&err),
                Err(panic) => ctx.report(&AgentError::Panicked(panic_message(panic.as_ref()))),
            }
            ctx.bus.complete();
        }
        debug!(agent = %ctx.id, "Mailbox closed");
    })
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Oracle handle plus the call policy shared by every oracle-backed agent.
#[derive(Clone)]
pub struct OracleClient {
    oracle: Arc<dyn CompletionOracle>,
    timeout: Duration,
    thinking_delay: Duration,
}

impl OracleClient {
    pub fn new(oracle: Arc<dyn CompletionOracle>, timeout: Duration) -> Self {
        Self {
            oracle,
            timeout,
            thinking_delay: Duration::ZERO,
        }
    }

    /// Pause before every call.
    pub fn with_thinking_delay(mut self, delay: Duration) -> Self {
        self.thinking_delay = delay;
        self
    }

    /// Call the oracle, bounded by the configured timeout.
    pub async fn complete(&self, messages: &[ChatMessage]) -> OracleResult<String> {
        if !self.thinking_delay.is_zero() {
            tokio::time::sleep(self.thinking_delay).await;
        }
        tokio::time::timeout(self.timeout, self.oracle.complete(messages))
            .await
            .map_err(|_| OracleError::Timeout(self.timeout))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::MessageBus;
    use crate::events::EventBus;
    use crate::extract::ExtractionError;
    use crate::oracle::MockCompletionOracle;
    use crate::protocol::Question;

    enum Behavior {
        Fine,
        Fail,
        Fatal,
        Panic,
    }

    struct Scripted {
        id: AgentId,
        behavior: Behavior,
    }

    #[async_trait]
    impl Agent for Scripted {
        fn id(&self) -> &AgentId {
            &self.id
        }

        async fn handle(&mut self, _envelope: Envelope, _ctx: &AgentContext) -> AgentResult<()> {
            match self.behavior {
                Behavior::Fine => Ok(()),
                Behavior::Fail => Err(OracleError::EmptyResponse.into()),
                Behavior::Fatal => Err(ExtractionError {
                    preview: "no marker".into(),
                }
                .into()),
                Behavior::Panic => panic!("handler bug"),
            }
        }
    }

    async fn run_scripted(behavior: Behavior) -> (SharedMessageBus, Vec<AgentFailure>) {
        let bus = MessageBus::new().shared();
        let failures: FailureLog = Arc::default();
        let id = AgentId::from("scripted");
        let mailbox = bus.register(id.clone()).unwrap();
        bus.subscribe(&id, &Topic::entry());
        let ctx = AgentContext::new(
            id.clone(),
            bus.clone(),
            EventEmitter::new(EventBus::new().shared(), "d-1"),
            failures.clone(),
        );
        let handle = spawn_agent(Box::new(Scripted { id, behavior }), mailbox, ctx);

        bus.publish(Message::Question(Question::new("q")), &Topic::entry(), None);
        bus.publish(Message::Question(Question::new("q")), &Topic::entry(), None);
        bus.wait_idle().await;
        bus.close();
        handle.await.unwrap();

        let failures = failures.lock().unwrap().clone();
        (bus, failures)
    }

    #[tokio::test]
    async fn test_loop_reaches_idle() {
        let (bus, failures) = run_scripted(Behavior::Fine).await;
        assert!(bus.is_idle());
        assert!(failures.is_empty());
    }

    #[tokio::test]
    async fn test_non_fatal_error_keeps_running() {
        let (bus, failures) = run_scripted(Behavior::Fail).await;
        assert_eq!(failures.len(), 2);
        assert!(!failures[0].fatal);
        assert!(!bus.is_halted());
    }

    #[tokio::test]
    async fn test_fatal_error_halts_and_drains() {
        let (bus, failures) = run_scripted(Behavior::Fatal).await;
        assert_eq!(failures.len(), 1);
        assert!(failures[0].fatal);
        assert!(bus.is_halted());
        assert!(bus.is_idle());
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let (bus, failures) = run_scripted(Behavior::Panic).await;
        assert_eq!(failures.len(), 2);
        assert!(failures[0].message.contains("handler bug"));
        assert!(bus.is_idle());
    }

    struct SlowOracle;

    #[async_trait]
    impl CompletionOracle for SlowOracle {
        async fn complete(&self, _messages: &[ChatMessage]) -> OracleResult<String> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok("late {{1}}".to_string())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_oracle_client_times_out() {
        let client = OracleClient::new(Arc::new(SlowOracle), Duration::from_secs(5));
        let result = client.complete(&[ChatMessage::user("q")]).await;
        assert!(matches!(result, Err(OracleError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_oracle_client_passes_through() {
        let mut oracle = MockCompletionOracle::new();
        oracle
            .expect_complete()
            .times(1)
            .returning(|_| Ok("fine {{2}}".to_string()));
        let client = OracleClient::new(Arc::new(oracle), Duration::from_secs(5));
        assert_eq!(
            client.complete(&[ChatMessage::user("q")]).await.unwrap(),
            "fine {{2}}"
        );
    }
}
