//! LOTSAWA configuration loaded from `lotsawa.toml`.
//!
//! [`LotsawaConfig`] holds every tunable setting. Missing values fall back to
//! defaults, and `ANTHROPIC_API_KEY` in the environment wins over the file.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::coordinator::RetryPolicy;
use crate::error::LotsawaError;
use crate::executor::IterationLimits;
use crate::logging::LoggingConfig;
use crate::pipeline::{FormatLoop, PipelineKind, PipelineSpec};

const DEFAULT_PATH: &str = "lotsawa.toml";

/// Top-level configuration loaded from `lotsawa.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct LotsawaConfig {
    /// Anthropic API key.
    #[serde(default)]
    pub api_key: String,

    /// Model used for every call.
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Per-call timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Target language for records that do not name one.
    #[serde(default = "default_target_language")]
    pub target_language: String,

    #[serde(default)]
    pub pipeline: PipelineKind,

    #[serde(default)]
    pub format_loop: FormatLoop,

    /// Items per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Batch attempts before degrading to individual items.
    #[serde(default = "default_retries")]
    pub max_batch_retries: u32,

    /// Attempts per item once degraded.
    #[serde(default = "default_retries")]
    pub max_item_retries: u32,

    /// Fixed delay between attempts, in seconds.
    #[serde(default = "default_retry_delay_seconds")]
    pub retry_delay_seconds: u64,

    #[serde(default = "default_max_content_iterations")]
    pub max_content_iterations: u32,

    #[serde(default = "default_max_format_iterations")]
    pub max_format_iterations: u32,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_model() -> String {
    "claude-sonnet-4-5-20250929".to_string()
}

fn default_max_tokens() -> u32 {
    5000
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_target_language() -> String {
    "English".to_string()
}

fn default_batch_size() -> usize {
    2
}

// Shared by batch and item retries.
fn default_retries() -> u32 {
    3
}

fn default_retry_delay_seconds() -> u64 {
    5
}

fn default_max_content_iterations() -> u32 {
    3
}

fn default_max_format_iterations() -> u32 {
    1
}

impl Default for LotsawaConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            request_timeout_secs: default_request_timeout_secs(),
            target_language: default_target_language(),
            pipeline: PipelineKind::default(),
            format_loop: FormatLoop::default(),
            batch_size: default_batch_size(),
            max_batch_retries: default_retries(),
            max_item_retries: default_retries(),
            retry_delay_seconds: default_retry_delay_seconds(),
            max_content_iterations: default_max_content_iterations(),
            max_format_iterations: default_max_format_iterations(),
            logging: LoggingConfig::default(),
        }
    }
}

impl LotsawaConfig {
    /// Load from `path`, or from `lotsawa.toml` in the working directory.
    /// A missing default file yields defaults; a missing explicit path is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, LotsawaError> {
        let mut config = match path {
            Some(path) if !path.exists() => {
                return Err(LotsawaError::Config(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_PATH).exists() => Self::from_file(Path::new(DEFAULT_PATH))?,
            None => Self::default(),
        };

        // The environment wins over the file for the API key.
        if let Ok(key) = std::env::var("ANTHROPIC_API_KEY") {
            if !key.is_empty() {
                config.api_key = key;
            }
        }

        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, LotsawaError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str::<LotsawaConfig>(&contents)?)
    }

    /// Reject settings a run could not work with.
    pub fn validate(&self) -> Result<(), LotsawaError> {
        if self.batch_size == 0 {
            return Err(LotsawaError::Config("batch_size must be at least 1".into()));
        }
        if self.request_timeout_secs == 0 {
            return Err(LotsawaError::Config(
                "request_timeout_secs must be at least 1".into(),
            ));
        }
        if self.target_language.trim().is_empty() {
            return Err(LotsawaError::Config("target_language must not be empty".into()));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            batch_size: self.batch_size,
            max_batch_retries: self.max_batch_retries,
            max_item_retries: self.max_item_retries,
            retry_delay: Duration::from_secs(self.retry_delay_seconds),
        }
    }

    pub fn iteration_limits(&self) -> IterationLimits {
        IterationLimits {
            max_content_iterations: self.max_content_iterations,
            max_format_iterations: self.max_format_iterations,
        }
    }

    pub fn pipeline_spec(&self) -> PipelineSpec {
        PipelineSpec::for_kind(self.pipeline, self.format_loop)
    }
}
