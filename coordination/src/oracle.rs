//! Completion oracle adapter.
//!
//! Agents turn a persona plus conversation history into free text through
//! the [`CompletionOracle`] trait. [`HttpOracle`] talks to any
//! OpenAI-compatible `/chat/completions` endpoint; [`ScriptedOracle`] plays
//! back canned responses per role for offline runs and tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::OracleConfig;
use crate::persona::Role;

/// Errors from oracle invocations
#[derive(Debug, Clone, thiserror::Error)]
pub enum OracleError {
    #[error("API request failed: {0}")]
    RequestFailed(String),

    #[error("API error ({status}): {body}")]
    Status { status: u16, body: String },

    #[error("Response parse error: {0}")]
    ParseError(String),

    #[error("Empty response from oracle")]
    EmptyResponse,

    #[error("Oracle call timed out after {0:?}")]
    Timeout(Duration),

    #[error("No scripted response left for {0}")]
    Exhausted(String),
}

/// Result type for oracle operations
pub type OracleResult<T> = Result<T, OracleError>;

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One role-tagged conversation turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// A language-completion service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CompletionOracle: Send + Sync {
    /// Complete the conversation and return the assistant's text.
    async fn complete(&self, messages: &[ChatMessage]) -> OracleResult<String>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// OpenAI-compatible chat-completions client.
pub struct HttpOracle {
    config: OracleConfig,
    http: reqwest::Client,
}

impl HttpOracle {
    pub fn new(config: OracleConfig) -> OracleResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| OracleError::RequestFailed(e.to_string()))?;
        Ok(Self { config, http })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }
}

#[async_trait]
impl CompletionOracle for HttpOracle {
    async fn complete(&self, messages: &[ChatMessage]) -> OracleResult<String> {
        let start = Instant::now();
        let request = ChatRequest {
            model: &self.config.model,
            messages,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        let mut builder = self.http.post(&self.config.url).json(&request);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                OracleError::Timeout(Duration::from_secs(self.config.timeout_secs))
            } else {
                OracleError::RequestFailed(e.to_string())
            }
        })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(OracleError::Status { status, body });
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| OracleError::ParseError(e.to_string()))?;

        let content = chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(OracleError::EmptyResponse)?;

        debug!(
            model = %self.config.model,
            latency_ms = start.elapsed().as_millis() as u64,
            chars = content.len(),
            "Oracle completed"
        );
        Ok(content)
    }
}

/// Plays back queued responses keyed by the role whose system prompt opens
/// the conversation.
///
/// Each role's queue is consumed in order; once it runs dry the role's
/// repeat response (if any) is used, then the global fallback.
pub struct ScriptedOracle {
    queues: Mutex<HashMap<Role, VecDeque<OracleResult<String>>>>,
    repeat: HashMap<Role, String>,
    fallback: Option<String>,
    calls: AtomicUsize,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            repeat: HashMap::new(),
            fallback: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Queue responses for `role`.
    pub fn script<I, S>(self, role: Role, responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push(role, responses.into_iter().map(|s| Ok(s.into())))
    }

    /// Queue a failure for `role`.
    pub fn fail(self, role: Role, error: OracleError) -> Self {
        self.push(role, std::iter::once(Err(error)))
    }

    fn push(self, role: Role, items: impl Iterator<Item = OracleResult<String>>) -> Self {
        self.queues
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(role)
            .or_default()
            .extend(items);
        self
    }

    /// Answer every call for `role` with `response` once its queue is empty.
    pub fn repeat(mut self, role: Role, response: impl Into<String>) -> Self {
        self.repeat.insert(role, response.into());
        self
    }

    /// Response for any call no queue or repeat covers.
    pub fn with_fallback(mut self, response: impl Into<String>) -> Self {
        self.fallback = Some(response.into());
        self
    }

    /// Total calls served so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn role_of(messages: &[ChatMessage]) -> Option<Role> {
        let system = messages.iter().find(|m| m.role == ChatRole::System)?;
        ROLES
            .iter()
            .copied()
            .find(|role| system.content.starts_with(role.description()))
    }
}

const ROLES: [Role; 9] = [
    Role::MethodicalSolver,
    Role::CreativeSolver,
    Role::DetailSolver,
    Role::IntuitiveSolver,
    Role::Orchestrator,
    Role::GeometryExpert,
    Role::AlgebraExpert,
    Role::GeneralExpert,
    Role::Evaluator,
];

impl Default for ScriptedOracle {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CompletionOracle for ScriptedOracle {
    async fn complete(&self, messages: &[ChatMessage]) -> OracleResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let role = Self::role_of(messages);

        if let Some(role) = role {
            let next = self
                .queues
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .get_mut(&role)
                .and_then(|q| q.pop_front());
            if let Some(item) = next {
                return item;
            }
            if let Some(response) = self.repeat.get(&role) {
                return Ok(response.clone());
            }
        }

        self.fallback.clone().ok_or_else(|| {
            OracleError::Exhausted(role.map(|r| r.to_string()).unwrap_or_else(|| "unknown".into()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conversation(role: Role, prompt: &str) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(role.system_prompt()),
            ChatMessage::user(prompt),
        ]
    }

    #[tokio::test]
    async fn test_scripted_queue_then_repeat() {
        let oracle = ScriptedOracle::new()
            .script(Role::GeometryExpert, ["first {{1}}", "second {{2}}"])
            .repeat(Role::GeometryExpert, "again {{3}}");

        let msgs = conversation(Role::GeometryExpert, "q");
        assert_eq!(oracle.complete(&msgs).await.unwrap(), "first {{1}}");
        assert_eq!(oracle.complete(&msgs).await.unwrap(), "second {{2}}");
        assert_eq!(oracle.complete(&msgs).await.unwrap(), "again {{3}}");
        assert_eq!(oracle.calls(), 3);
    }

    #[tokio::test]
    async fn test_scripted_routes_by_role() {
        let oracle = ScriptedOracle::new()
            .script(Role::AlgebraExpert, ["algebra {{5}}"])
            .with_fallback("fallback {{0}}");

        let algebra = conversation(Role::AlgebraExpert, "q");
        let geometry = conversation(Role::GeometryExpert, "q");
        assert_eq!(oracle.complete(&geometry).await.unwrap(), "fallback {{0}}");
        assert_eq!(oracle.complete(&algebra).await.unwrap(), "algebra {{5}}");
    }

    #[tokio::test]
    async fn test_scripted_failure_and_exhaustion() {
        let oracle = ScriptedOracle::new().fail(Role::Evaluator, OracleError::EmptyResponse);
        let msgs = conversation(Role::Evaluator, "q");
        assert!(matches!(
            oracle.complete(&msgs).await,
            Err(OracleError::EmptyResponse)
        ));
        assert!(matches!(
            oracle.complete(&msgs).await,
            Err(OracleError::Exhausted(role)) if role == "evaluator"
        ));
    }

    #[test]
    fn test_chat_message_serializes_lowercase_role() {
        let json = serde_json::to_value(ChatMessage::assistant("hi")).unwrap();
        assert_eq!(json["role"], "assistant");
        assert_eq!(json["content"], "hi");
    }
}
