//! Error types for debate-forge operations.
//!
//! Defines error types for each major subsystem:
//! - LLM gateway calls
//! - Configuration and roster loading
//! - Debate orchestration
//! - Judging and score aggregation
//! - Transcript persistence

use thiserror::Error;

use crate::debate::Phase;

/// Errors that can occur during LLM gateway operations.
///
/// The gateway classifies every backend failure into this taxonomy so that
/// calling components never have to inspect provider-specific errors.
/// Transient variants are retried inside the gateway; they only surface
/// once its retry budget is exhausted.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Request timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid response from backend: {0}")]
    InvalidResponse(String),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Missing API key: {0} environment variable not set")]
    MissingApiKey(String),
}

impl LlmError {
    /// Returns true if this error is worth retrying with backoff.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RateLimited(_) | Self::Timeout { .. } | Self::Transport(_) => true,
            Self::Api { code, .. } => *code >= 500,
            Self::InvalidResponse(_) | Self::MissingApiKey(_) => false,
        }
    }
}

/// Errors that can occur while loading or validating configuration.
///
/// All of these are fatal and raised before the first model call, so a
/// malformed setup never gets partway into a debate.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Roster has {0} agent(s): a debate needs at least two")]
    RosterTooSmall(usize),

    #[error("Duplicate agent id '{0}' in roster")]
    DuplicateAgent(String),

    #[error("Unknown agent id '{0}': not present in the registry")]
    UnknownAgent(String),

    #[error("Invalid agent role '{0}': expected 'Name:Instructions'")]
    InvalidAgentRole(String),

    #[error("Round count must be at least 1, got {0}")]
    InvalidRounds(u32),

    #[error("Temperature {0} is outside the valid range [0, 2]")]
    InvalidTemperature(f64),

    #[error("Failed to parse agent registry: {0}")]
    RegistryParse(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while running a debate.
#[derive(Debug, Error)]
pub enum DebateError {
    /// Invalid roster or debate parameters, raised before any turn runs.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// One agent's turn kept failing after the per-turn retry budget.
    /// The partial transcript has already been persisted when this is raised.
    #[error(
        "Agent '{agent}' failed in round {round} ({phase}) after {attempts} attempt(s): {source}"
    )]
    AgentTurnFailure {
        agent: String,
        round: u32,
        phase: Phase,
        attempts: u32,
        source: LlmError,
    },

    /// A turn referenced a speaker or target outside the roster.
    #[error("Turn references unknown agent '{0}'")]
    RosterViolation(String),

    /// Cooperative cancellation was observed at a phase boundary.
    #[error("Debate cancelled in round {round} before {phase}")]
    Cancelled { round: u32, phase: Phase },

    #[error("Judging failed: {0}")]
    Judge(#[from] JudgeError),

    #[error("Transcript store error: {0}")]
    Storage(#[from] StorageError),
}

/// Errors that can occur during judging and score aggregation.
#[derive(Debug, Error)]
pub enum JudgeError {
    #[error("Invalid rubric: {0}")]
    InvalidRubric(String),

    /// Judge output was unusable even after the single stricter-format retry.
    /// Distinguished from agent failures so callers can fall back to the
    /// rule-based judge.
    #[error("Judge output unusable after retry: {0}")]
    JudgmentParse(String),

    #[error("Score for dimension '{0}' missing from aggregation input")]
    MissingDimension(String),

    #[error("Score sheet incomplete: agent '{agent}' is missing dimension '{dimension}'")]
    IncompleteScoreSheet { agent: String, dimension: String },

    #[error("Score {score} for agent '{agent}', dimension '{dimension}' is outside [0, {max}]")]
    ScoreOutOfBounds {
        agent: String,
        dimension: String,
        score: f64,
        max: f64,
    },

    #[error("Agent '{0}' has no answer to score")]
    MissingAnswer(String),

    #[error("Panel judge has no members")]
    EmptyPanel,

    #[error("LLM error during judging: {0}")]
    Llm(#[from] LlmError),
}

/// Errors that can occur while persisting transcript records.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
