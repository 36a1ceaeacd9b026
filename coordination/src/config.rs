//! Engine configuration: defaults, TOML file, environment overrides.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::persona::Role;
use crate::protocol::AgentId;
use crate::topology::{TopologyBuilder, TopologyError};

/// Errors from loading or validating configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {key}: {value}")]
    InvalidEnv { key: &'static str, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error(transparent)]
    Topology(#[from] TopologyError),
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Which coordination shape a debate runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Workflow {
    /// Solvers on a ring exchange answers for a fixed number of rounds,
    /// then the aggregator takes a majority vote.
    Ring,
    /// Orchestrator assigns experts, the evaluator validates, the
    /// aggregator relays.
    ExpertPanel,
}

impl std::fmt::Display for Workflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ring => write!(f, "ring"),
            Self::ExpertPanel => write!(f, "expert_panel"),
        }
    }
}

impl std::str::FromStr for Workflow {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "ring" | "debate" => Ok(Self::Ring),
            "expert_panel" | "experts" | "pipeline" => Ok(Self::ExpertPanel),
            other => Err(ConfigError::Invalid(format!("unknown workflow '{}'", other))),
        }
    }
}

/// Completion oracle endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    /// Full chat-completions URL.
    pub url: String,
    pub model: String,
    /// Sent as a bearer token when set.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8000/v1/chat/completions".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            timeout_secs: 120,
            temperature: 0.7,
            max_tokens: 1024,
        }
    }
}

impl OracleConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub workflow: Workflow,
    /// Ring size.
    pub num_solvers: usize,
    /// Peers each solver waits for per round.
    pub neighbors: usize,
    /// Oracle cycles per solver before its final response.
    pub max_rounds: u32,
    /// Pause before each oracle call.
    pub thinking_delay_ms: u64,
    /// Pause after each round barrier.
    pub deliberation_delay_ms: u64,
    /// Expert assigned when the orchestrator's analysis names none.
    pub default_expert: Role,
    pub oracle: OracleConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workflow: Workflow::Ring,
            num_solvers: 4,
            neighbors: 2,
            max_rounds: 3,
            thinking_delay_ms: 0,
            deliberation_delay_ms: 0,
            default_expert: Role::GeneralExpert,
            oracle: OracleConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parse a TOML document; missing keys keep their defaults.
    pub fn from_toml_str(s: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn from_toml_file(path: &Path) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Apply `DEBATE_*` environment overrides.
    pub fn with_env_overrides(self) -> ConfigResult<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup (the environment in
    /// production, a map in tests).
    pub fn with_overrides<F>(mut self, lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("DEBATE_ORACLE_URL") {
            self.oracle.url = url;
        }
        if let Some(model) = lookup("DEBATE_ORACLE_MODEL") {
            self.oracle.model = model;
        }
        if let Some(key) = lookup("DEBATE_ORACLE_API_KEY") {
            self.oracle.api_key = Some(key);
        }
        if let Some(value) = lookup("DEBATE_MAX_ROUNDS") {
            self.max_rounds = value.parse().map_err(|_| ConfigError::InvalidEnv {
                key: "DEBATE_MAX_ROUNDS",
                value,
            })?;
        }
        if let Some(value) = lookup("DEBATE_NUM_SOLVERS") {
            self.num_solvers = value.parse().map_err(|_| ConfigError::InvalidEnv {
                key: "DEBATE_NUM_SOLVERS",
                value,
            })?;
        }
        if let Some(value) = lookup("DEBATE_WORKFLOW") {
            self.workflow = value.parse()?;
        }
        Ok(self)
    }

    /// Ring roster identities, `solver_0 .. solver_{n-1}`.
    pub fn solver_ids(&self) -> Vec<AgentId> {
        (0..self.num_solvers)
            .map(|i| AgentId::new(format!("solver_{}", i)))
            .collect()
    }

    /// Reject settings the engine cannot run to completion.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_rounds == 0 {
            return Err(ConfigError::Invalid("max_rounds must be at least 1".into()));
        }
        if !self.default_expert.is_expert() {
            return Err(ConfigError::Invalid(format!(
                "default_expert must be an expert role, got {}",
                self.default_expert
            )));
        }
        if self.workflow == Workflow::Ring {
            if self.num_solvers == 0 {
                return Err(ConfigError::Invalid("num_solvers must be at least 1".into()));
            }
            TopologyBuilder::ring(&self.solver_ids(), self.neighbors)?;
        }
        Ok(())
    }

    pub fn thinking_delay(&self) -> Duration {
        Duration::from_millis(self.thinking_delay_ms)
    }

    pub fn deliberation_delay(&self) -> Duration {
        Duration::from_millis(self.deliberation_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults_validate() {
        let config = EngineConfig::default();
        assert_eq!(config.num_solvers, 4);
        assert_eq!(config.max_rounds, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            workflow = "expert_panel"
            max_rounds = 5

            [oracle]
            model = "local-model"
            "#,
        )
        .unwrap();
        assert_eq!(config.workflow, Workflow::ExpertPanel);
        assert_eq!(config.max_rounds, 5);
        assert_eq!(config.num_solvers, 4);
        assert_eq!(config.oracle.model, "local-model");
        assert_eq!(config.oracle.timeout_secs, 120);
    }

    #[test]
    fn test_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "num_solvers = 6\nneighbors = 2\ndefault_expert = \"algebra_expert\"").unwrap();
        let config = EngineConfig::from_toml_file(file.path()).unwrap();
        assert_eq!(config.num_solvers, 6);
        assert_eq!(config.default_expert, Role::AlgebraExpert);
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let err = EngineConfig::from_toml_file(Path::new("/nonexistent/debate.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("DEBATE_ORACLE_URL", "http://oracle:9000/v1/chat/completions"),
            ("DEBATE_MAX_ROUNDS", "2"),
            ("DEBATE_WORKFLOW", "pipeline"),
        ]
        .into_iter()
        .collect();
        let config = EngineConfig::default()
            .with_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.oracle.url, "http://oracle:9000/v1/chat/completions");
        assert_eq!(config.max_rounds, 2);
        assert_eq!(config.workflow, Workflow::ExpertPanel);
    }

    #[test]
    fn test_bad_override_is_error() {
        let err = EngineConfig::default()
            .with_overrides(|k| (k == "DEBATE_NUM_SOLVERS").then(|| "many".to_string()))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidEnv {
                key: "DEBATE_NUM_SOLVERS",
                ..
            }
        ));
    }

    #[test]
    fn test_validate_rejects_unsatisfiable_ring() {
        let config = EngineConfig {
            num_solvers: 2,
            neighbors: 2,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Topology(TopologyError::InvalidNeighborCount { .. }))
        ));

        let odd = EngineConfig {
            num_solvers: 5,
            neighbors: 3,
            ..Default::default()
        };
        assert!(odd.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_non_expert_default() {
        let config = EngineConfig {
            default_expert: Role::Evaluator,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
