//! Error types for Stream Advisor.

use std::time::Duration;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("Analyzer error: {0}")]
    Analyzer(#[from] AnalyzerError),

    #[error("Classifier error: {0}")]
    Classifier(#[from] ClassifierError),

    #[error("Dialogue error: {0}")]
    Dialogue(#[from] DialogueError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Provider {provider} timed out after {timeout:?}")]
    Timeout { provider: String, timeout: Duration },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Stream label errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    #[error("Unknown stream label: '{label}'")]
    Unknown { label: String },
}

/// Conversation analyzer errors.
///
/// None of these escape `ConversationAnalyzer::analyze`; they are recorded on
/// the degraded verdict and logged.
#[derive(Debug, thiserror::Error)]
pub enum AnalyzerError {
    #[error("Oracle unavailable: {0}")]
    OracleUnavailable(#[from] LlmError),

    #[error("Reply grammar violation: {reason}")]
    VerdictParse { reason: String },

    #[error("Invalid stream label in verdict: {0}")]
    InvalidStreamLabel(#[from] StreamError),
}

/// Feature classifier errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClassifierError {
    #[error("Invalid feature vector: {field} {reason}")]
    InvalidFeatureVector { field: String, reason: String },

    #[error("Trained model disagrees with the rule table on {mismatches} training examples")]
    SelfConsistency { mismatches: usize },

    #[error("Cannot fit a model on an empty training set")]
    EmptyTrainingSet,
}

/// Dialogue manager errors.
#[derive(Debug, thiserror::Error)]
pub enum DialogueError {
    #[error("Empty user input")]
    EmptyInput,

    #[error("Session {id} not found")]
    SessionNotFound { id: uuid::Uuid },
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
