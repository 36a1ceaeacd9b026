//! Round-synchronized multi-agent debate engine.
//!
//! Agents are actors on an in-process topic bus. Two workflows are built
//! on it:
//!
//! ## Ring debate
//! Solvers with distinct personas sit on a ring. Each round a solver
//! answers, publishes on its own topic, and waits at a barrier until its
//! K nearest peers have answered the same round. After `max_rounds` the
//! aggregator takes a majority vote over the final answers.
//!
//! ## Expert panel
//! An orchestrator analyzes the question into a task ledger and assigns
//! domain experts; an evaluator reviews their solutions once all (or,
//! after a stall, the reporting subset) are in, and the aggregator relays
//! the verdict.
//!
//! Every step is reported as a [`DebateEvent`] on a broadcast bus that
//! callbacks and the returned transcript read from.
//!
//! # Usage
//!
//! ```bash
//! # Ring debate against a local OpenAI-compatible endpoint
//! DEBATE_ORACLE_URL=http://localhost:8000/v1/chat/completions debate solve "What is 12 * 6?"
//!
//! # Expert panel, JSON outcome on stdout
//! debate solve --workflow expert_panel --json "Area of a 3-4-5 triangle?"
//!
//! # Print the subscription plan
//! debate topology --solvers 6 --neighbors 2
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod agents;
pub mod bus;
pub mod config;
pub mod error;
pub mod events;
pub mod extract;
pub mod ledger;
pub mod lookup;
pub mod oracle;
pub mod persona;
pub mod protocol;
pub mod round_buffer;
pub mod runtime;
pub mod topology;

pub use agents::{majority_vote, AgentFailure};
pub use bus::{BusError, MessageBus, SharedMessageBus};
pub use config::{ConfigError, EngineConfig, OracleConfig, Workflow};
pub use error::{AgentError, DebateError, DebateResult};
pub use events::{
    DebateCallback, DebateEvent, EventBus, EventFilter, EventHistory, LoggingCallback,
};
pub use extract::{extract_answer, ExtractionError};
pub use ledger::{ProgressLedger, TaskLedger};
pub use oracle::{ChatMessage, CompletionOracle, HttpOracle, OracleError, ScriptedOracle};
pub use persona::Role;
pub use protocol::{AgentId, Answer, AnswerToken, Message, Question, Topic};
pub use runtime::{DebateManager, DebateOutcome};
pub use topology::{Shape, TopologyBuilder, TopologyError, TopologyPlan};
