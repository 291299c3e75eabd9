use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LotsawaError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Input file not found: {0}")]
    NoInput(PathBuf),

    #[error("Invalid input record {record}: {reason}")]
    Input { record: usize, reason: String },

    #[error("Sink error ({location}): {reason}")]
    Sink { location: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Classifies a failed generation for retry and reporting decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum FailureKind {
    /// Content failure (malformed structured output, empty artifact)
    Business,
    /// Infrastructure failure (API timeout, rate limit, network error)
    System,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::Business => write!(f, "Business"),
            FailureKind::System => write!(f, "System"),
        }
    }
}
