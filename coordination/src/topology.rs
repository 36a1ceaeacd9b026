//! Topology builder: who listens to whom.
//!
//! Two shapes are supported:
//!
//! ```text
//! Ring (K = 2)                       Pipeline
//!
//!   s0 ── s1                          question → aggregator
//!   │      │                                      │ relay
//!   s3 ── s2                                      ▼
//!                                            orchestrator ──assign──▶ experts
//!   every solver listens to its K             ▲    │                    │
//!   ring neighbors' topics                    └────┼──── solutions ◀────┘
//!                                                  ▼          │
//!                                              evaluator ◀────┘
//!                                                  │ answer
//!                                                  ▼
//!                                             aggregator
//! ```
//!
//! Plans are pure values: the same roster and shape always give the same
//! subscription set, and [`TopologyPlan::apply`] installs it on a bus.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::bus::MessageBus;
use crate::protocol::{AgentId, Topic};

/// Error type for topology construction
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TopologyError {
    #[error("Roster is empty")]
    EmptyRoster,

    #[error("Agent appears more than once: {0}")]
    DuplicateAgent(AgentId),

    #[error("Neighbor count {neighbors} cannot be satisfied by a roster of {roster}")]
    InvalidNeighborCount { neighbors: usize, roster: usize },

    #[error("Agent {agent} expects {expected} peers per round but only {available} publish to it")]
    UnsatisfiableBarrier {
        agent: AgentId,
        expected: usize,
        available: usize,
    },

    #[error("Pipeline needs at least one expert")]
    NoExperts,
}

/// Result type for topology operations
pub type TopologyResult<T> = Result<T, TopologyError>;

/// Shape of the subscription graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Shape {
    Ring { neighbors: usize },
    Pipeline,
}

/// One edge: `subscriber` receives everything published on `topic`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Subscription {
    pub subscriber: AgentId,
    pub topic: Topic,
}

/// Roles taking part in the expert-panel pipeline.
#[derive(Debug, Clone)]
pub struct PipelineRoster {
    pub aggregator: AgentId,
    pub orchestrator: AgentId,
    pub experts: Vec<AgentId>,
    pub evaluator: AgentId,
    pub collector: AgentId,
}

/// A computed set of subscriptions.
#[derive(Debug, Clone, Serialize)]
pub struct TopologyPlan {
    shape: Shape,
    subscriptions: BTreeSet<Subscription>,
    /// Ring peers each solver buffers per round.
    neighbors: BTreeMap<AgentId, Vec<AgentId>>,
}

impl TopologyPlan {
    fn new(shape: Shape) -> Self {
        Self {
            shape,
            subscriptions: BTreeSet::new(),
            neighbors: BTreeMap::new(),
        }
    }

    /// Add a fixed edge.
    pub fn subscribe(mut self, subscriber: &AgentId, topic: Topic) -> Self {
        self.add(subscriber, topic);
        self
    }

    fn add(&mut self, subscriber: &AgentId, topic: Topic) {
        self.subscriptions.insert(Subscription {
            subscriber: subscriber.clone(),
            topic,
        });
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    /// All edges, in a stable order.
    pub fn subscriptions(&self) -> impl Iterator<Item = &Subscription> {
        self.subscriptions.iter()
    }

    /// Ring peers of `agent` (predecessors nearest-first, then successors).
    pub fn neighbors_of(&self, agent: &AgentId) -> &[AgentId] {
        self.neighbors
            .get(agent)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Number of peer responses `agent` must collect before a round releases.
    pub fn expected_peers(&self, agent: &AgentId) -> usize {
        self.neighbors_of(agent).len()
    }

    /// Topics `agent` listens on.
    pub fn topics_of(&self, agent: &AgentId) -> Vec<Topic> {
        self.subscriptions
            .iter()
            .filter(|s| &s.subscriber == agent)
            .map(|s| s.topic.clone())
            .collect()
    }

    /// Check that every ring solver listens to as many distinct peer topics
    /// as the barrier expects.
    pub fn validate(&self) -> TopologyResult<()> {
        for (agent, peers) in &self.neighbors {
            let listening: BTreeSet<&AgentId> = peers
                .iter()
                .filter(|peer| {
                    self.subscriptions.contains(&Subscription {
                        subscriber: agent.clone(),
                        topic: Topic::of(peer),
                    })
                })
                .collect();
            if listening.len() != peers.len() {
                return Err(TopologyError::UnsatisfiableBarrier {
                    agent: agent.clone(),
                    expected: peers.len(),
                    available: listening.len(),
                });
            }
        }
        Ok(())
    }

    /// Install every edge on `bus`. Subscribing is idempotent, so applying
    /// twice is harmless.
    ///
    /// Returns the subscribers that have no mailbox yet; deliveries to them
    /// are dropped until they register.
    pub fn apply(&self, bus: &MessageBus) -> Vec<AgentId> {
        let mut unregistered: Vec<AgentId> = Vec::new();
        for sub in &self.subscriptions {
            bus.subscribe(&sub.subscriber, &sub.topic);
            if !bus.is_registered(&sub.subscriber) && !unregistered.contains(&sub.subscriber) {
                warn!(agent = %sub.subscriber, topic = %sub.topic, "Subscriber has no mailbox");
                unregistered.push(sub.subscriber.clone());
            }
        }
        unregistered
    }
}

/// Computes subscription plans.
pub struct TopologyBuilder;

impl TopologyBuilder {
    /// Ring of `roster` where each solver listens to `neighbors` peers:
    /// `ceil(K/2)` successors and `floor(K/2)` predecessors, wrapping around.
    /// Every solver also listens on [`Topic::solvers`].
    pub fn ring(roster: &[AgentId], neighbors: usize) -> TopologyResult<TopologyPlan> {
        check_unique(roster.iter())?;
        let n = roster.len();
        if neighbors == 0 || neighbors >= n {
            return Err(TopologyError::InvalidNeighborCount {
                neighbors,
                roster: n,
            });
        }

        let successors = neighbors.div_ceil(2);
        let predecessors = neighbors / 2;

        let mut plan = TopologyPlan::new(Shape::Ring { neighbors });
        for (i, agent) in roster.iter().enumerate() {
            let mut peers: Vec<AgentId> = Vec::with_capacity(neighbors);
            for step in 1..=predecessors {
                peers.push(roster[(i + n - step) % n].clone());
            }
            for step in 1..=successors {
                peers.push(roster[(i + step) % n].clone());
            }

            let distinct: BTreeSet<&AgentId> = peers.iter().collect();
            if distinct.len() != neighbors {
                return Err(TopologyError::UnsatisfiableBarrier {
                    agent: agent.clone(),
                    expected: neighbors,
                    available: distinct.len(),
                });
            }

            plan.add(agent, Topic::solvers());
            for peer in &peers {
                plan.add(agent, Topic::of(peer));
            }
            plan.neighbors.insert(agent.clone(), peers);
        }

        plan.validate()?;
        Ok(plan)
    }

    /// Directed per-message-type edges of the expert panel.
    pub fn pipeline(roster: &PipelineRoster) -> TopologyResult<TopologyPlan> {
        if roster.experts.is_empty() {
            return Err(TopologyError::NoExperts);
        }
        check_unique(
            [
                &roster.aggregator,
                &roster.orchestrator,
                &roster.evaluator,
                &roster.collector,
            ]
            .into_iter()
            .chain(roster.experts.iter()),
        )?;

        let mut plan = TopologyPlan::new(Shape::Pipeline)
            .subscribe(&roster.aggregator, Topic::entry())
            .subscribe(&roster.orchestrator, Topic::orchestrator())
            .subscribe(&roster.orchestrator, Topic::solutions())
            .subscribe(&roster.evaluator, Topic::solutions())
            .subscribe(&roster.evaluator, Topic::evaluation())
            .subscribe(&roster.aggregator, Topic::answers())
            .subscribe(&roster.collector, Topic::answers());
        for expert in &roster.experts {
            plan.add(expert, Topic::assignments());
        }
        Ok(plan)
    }
}

fn check_unique<'a>(ids: impl Iterator<Item = &'a AgentId>) -> TopologyResult<()> {
    let mut seen = BTreeSet::new();
    let mut any = false;
    for id in ids {
        any = true;
        if !seen.insert(id) {
            return Err(TopologyError::DuplicateAgent(id.clone()));
        }
    }
    if !any {
        return Err(TopologyError::EmptyRoster);
    }
    Ok(())
}
