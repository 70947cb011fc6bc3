//! # Error Taxonomy
//!
//! Typed failures for each seam of the pipeline. Stage code degrades
//! `ProviderError` and `ParseError` into sentinels; only the planner escalates.

use thiserror::Error;

/// Failure of a single completion call
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Network or transport failure
    #[error("transport error: {0}")]
    Transport(String),
    /// Provider answered 429
    #[error("rate limited by provider: {0}")]
    RateLimited(String),
    /// Any other non-success HTTP status
    #[error("provider returned status {status}: {body}")]
    Status { status: u16, body: String },
    /// Body could not be decoded
    #[error("malformed provider response: {0}")]
    Malformed(String),
    /// Decoded body carried no text
    #[error("provider returned an empty response")]
    Empty,
    /// Call exceeded the per-call deadline
    #[error("completion call timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Failure to interpret model output
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("no balanced JSON object found in model output")]
    NoJsonObject,
    #[error("invalid JSON: {0}")]
    InvalidJson(String),
    #[error("plan schema violation: {0}")]
    Schema(String),
    #[error("no clarity score in {0:?}")]
    NoDigits(String),
    #[error("clarity score {0} is outside 1..=10")]
    OutOfRange(u64),
}

/// Conversation store failure
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("failed to serialize conversation: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("database lock poisoned: {0}")]
    Lock(String),
    #[error("failed to prepare database directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("unknown prompt '{0}'")]
    UnknownPrompt(String),
    #[error("prompt '{0}' cannot be blank")]
    BlankPrompt(String),
}

/// Invalid configuration value
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Reasons a run is refused or cannot proceed
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RunError {
    #[error("No prompt received.")]
    EmptyPrompt,
    #[error("illegal phase transition {from:?} -> {to:?}")]
    IllegalTransition {
        from: crate::swarm::pipeline::PipelinePhase,
        to: crate::swarm::pipeline::PipelinePhase,
    },
}
