//! Agent- and run-level error types.

use crate::bus::BusError;
use crate::config::ConfigError;
use crate::extract::ExtractionError;
use crate::oracle::OracleError;
use crate::protocol::AgentId;
use crate::topology::TopologyError;

/// Failure while an agent handles one message.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Oracle call failed: {0}")]
    Oracle(#[from] OracleError),

    #[error("Answer extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Bus delivery failed: {0}")]
    Bus(#[from] BusError),

    #[error("Agent panicked: {0}")]
    Panicked(String),
}

impl AgentError {
    /// Fatal errors halt the whole debate; everything else is isolated to
    /// the failing agent's current step.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Extraction(_))
    }
}

/// Result type for agent handlers
pub type AgentResult<T> = Result<T, AgentError>;

/// Failure of a whole `solve` run.
#[derive(Debug, thiserror::Error)]
pub enum DebateError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Topology error: {0}")]
    Topology(#[from] TopologyError),

    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    #[error("Debate halted by {agent}: {message}")]
    Fatal { agent: AgentId, message: String },
}

/// Result type for debate runs
pub type DebateResult<T> = Result<T, DebateError>;
