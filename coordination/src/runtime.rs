//! Debate runtime: wires agents to a fresh bus per question and runs it
//! until idle.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::agents::{
    spawn_agent, Agent, AgentContext, AgentFailure, Aggregator, AnswerCollector, AnswerSlot,
    Evaluator, Expert, FailureLog, OracleClient, Orchestrator, ReductionPolicy, Solver,
};
use crate::bus::MessageBus;
use crate::config::{EngineConfig, Workflow};
use crate::error::{DebateError, DebateResult};
use crate::events::{
    spawn_callback, DebateCallback, DebateEvent, DebateId, EventBus, EventEmitter, EventHistory,
    SharedEventBus,
};
use crate::lookup::{FactLookup, KeywordLookup};
use crate::oracle::CompletionOracle;
use crate::persona::Role;
use crate::protocol::{AgentId, Answer, Message, Question, Topic};
use crate::topology::{PipelineRoster, TopologyBuilder, TopologyPlan};

/// Bus identity of the aggregator.
pub const AGGREGATOR: &str = "aggregator";
/// Bus identity of the answer collector.
pub const COLLECTOR: &str = "collector";

/// Result of one `solve` run.
#[derive(Debug, Clone, Serialize)]
pub struct DebateOutcome {
    pub debate_id: DebateId,
    pub question: String,
    /// `None` when the debate went idle without publishing an answer,
    /// e.g. after an oracle failure stalled it.
    pub answer: Option<Answer>,
    /// Non-fatal handler failures, in the order they happened.
    pub failures: Vec<AgentFailure>,
    /// Every event the debate emitted.
    pub events: Vec<DebateEvent>,
    pub elapsed_ms: u64,
}

impl DebateOutcome {
    pub fn answer_content(&self) -> Option<&str> {
        self.answer.as_ref().map(|a| a.content.as_str())
    }
}

/// Owns the configuration, the oracle handle and the observer sink; each
/// `solve` gets its own bus and agents.
pub struct DebateManager {
    config: EngineConfig,
    oracle: Arc<dyn CompletionOracle>,
    lookup: Arc<dyn FactLookup>,
    events: SharedEventBus,
    dispatchers: Vec<JoinHandle<()>>,
}

impl DebateManager {
    pub fn new(config: EngineConfig, oracle: Arc<dyn CompletionOracle>) -> DebateResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            oracle,
            lookup: Arc::new(KeywordLookup),
            events: EventBus::new().shared(),
            dispatchers: Vec::new(),
        })
    }

    /// Replace the fact lookup used by the orchestrator.
    pub fn with_lookup(mut self, lookup: Arc<dyn FactLookup>) -> Self {
        self.lookup = lookup;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn event_bus(&self) -> SharedEventBus {
        Arc::clone(&self.events)
    }

    /// Deliver every future event to `callback` on its own task.
    pub fn register_callback(&mut self, callback: Arc<dyn DebateCallback>) {
        self.dispatchers.push(spawn_callback(&self.events, callback));
    }

    /// Subscription plan for the configured workflow.
    pub fn plan(&self) -> DebateResult<TopologyPlan> {
        let aggregator = AgentId::from(AGGREGATOR);
        let collector = AgentId::from(COLLECTOR);
        let plan = match self.config.workflow {
            Workflow::Ring => TopologyBuilder::ring(&self.config.solver_ids(), self.config.neighbors)?
                .subscribe(&aggregator, Topic::entry())
                .subscribe(&aggregator, Topic::final_responses())
                .subscribe(&collector, Topic::answers()),
            Workflow::ExpertPanel => TopologyBuilder::pipeline(&PipelineRoster {
                aggregator,
                orchestrator: Role::Orchestrator.agent_id(),
                experts: Role::EXPERTS.iter().map(|r| r.agent_id()).collect(),
                evaluator: Role::Evaluator.agent_id(),
                collector,
            })?,
        };
        Ok(plan)
    }

    fn oracle_client(&self) -> OracleClient {
        OracleClient::new(Arc::clone(&self.oracle), self.config.oracle.timeout())
            .with_thinking_delay(self.config.thinking_delay())
    }

    fn build_agents(&self, plan: &TopologyPlan, slot: &AnswerSlot) -> Vec<Box<dyn Agent>> {
        let mut agents: Vec<Box<dyn Agent>> = Vec::new();
        match self.config.workflow {
            Workflow::Ring => {
                for (i, id) in self.config.solver_ids().into_iter().enumerate() {
                    let expected = plan.expected_peers(&id);
                    let solver = Solver::new(
                        id,
                        Role::solver_for_index(i),
                        self.oracle_client(),
                        expected,
                        self.config.max_rounds,
                    )
                    .with_deliberation_delay(self.config.deliberation_delay());
                    agents.push(Box::new(solver));
                }
                agents.push(Box::new(Aggregator::new(
                    AgentId::from(AGGREGATOR),
                    ReductionPolicy::MajorityVote {
                        solvers: self.config.num_solvers,
                    },
                )));
            }
            Workflow::ExpertPanel => {
                agents.push(Box::new(Aggregator::new(
                    AgentId::from(AGGREGATOR),
                    ReductionPolicy::Relay,
                )));
                agents.push(Box::new(Orchestrator::new(
                    self.oracle_client(),
                    Arc::clone(&self.lookup),
                    self.config.default_expert,
                )));
                for role in Role::EXPERTS {
                    agents.push(Box::new(Expert::new(role, self.oracle_client())));
                }
                agents.push(Box::new(Evaluator::new(self.oracle_client())));
            }
        }
        agents.push(Box::new(AnswerCollector::new(
            AgentId::from(COLLECTOR),
            slot.clone(),
        )));
        agents
    }

    /// Run one debate on `question` until no agent has work left.
    ///
    /// Returns [`DebateError::Fatal`] when an agent failure halted the run.
    pub async fn solve(&self, question: &str) -> DebateResult<DebateOutcome> {
        let started = Instant::now();
        let debate_id = DebateEvent::new_debate_id();
        let transcript = Arc::new(EventHistory::new());
        let emitter = EventEmitter::new(Arc::clone(&self.events), debate_id.clone())
            .with_transcript(Arc::clone(&transcript));

        let plan = self.plan()?;
        let bus = MessageBus::new().shared();
        let failures = FailureLog::default();
        let slot = AnswerSlot::new();

        let mut handles = Vec::new();
        for agent in self.build_agents(&plan, &slot) {
            let id = agent.id().clone();
            let mailbox = bus.register(id.clone())?;
            let ctx = AgentContext::new(id, Arc::clone(&bus), emitter.clone(), Arc::clone(&failures));
            handles.push(spawn_agent(agent, mailbox, ctx));
        }
        plan.apply(&bus);

        info!(
            debate_id = %debate_id,
            workflow = %self.config.workflow,
            agents = handles.len(),
            "Debate starting"
        );
        bus.publish(Message::Question(Question::new(question)), &Topic::entry(), None);
        bus.wait_idle().await;
        bus.close();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(debate_id = %debate_id, "Agent task ended abnormally: {}", e);
            }
        }

        let events = transcript.events();

        let failures = failures.lock().unwrap_or_else(|e| e.into_inner()).clone();
        if let Some(fatal) = failures.iter().find(|f| f.fatal) {
            return Err(DebateError::Fatal {
                agent: fatal.agent.clone(),
                message: fatal.message.clone(),
            });
        }

        let outcome = DebateOutcome {
            debate_id,
            question: question.to_string(),
            answer: slot.get(),
            failures,
            events,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        match outcome.answer_content() {
            Some(answer) => info!(debate_id = %outcome.debate_id, answer, "Debate finished"),
            None => warn!(
                debate_id = %outcome.debate_id,
                failures = outcome.failures.len(),
                "Debate went idle without an answer"
            ),
        }
        Ok(outcome)
    }
}

impl Drop for DebateManager {
    fn drop(&mut self) {
        for dispatcher in &self.dispatchers {
            dispatcher.abort();
        }
    }
}
