//! Structured logging through `tracing`.
//!
//! Logs always go to stderr; stdout belongs to the progress bar and the run
//! summary. Filter precedence, highest first: the `LOTSAWA_LOG` environment
//! variable, `--verbose`, then `[logging].level` from the config file.

use serde::{Deserialize, Serialize};
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::{EnvFilter, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::LotsawaError;

const ENV_FILTER: &str = "LOTSAWA_LOG";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// trace, debug, info, warn, error or off. Also accepts full filter
    /// directives such as `lotsawa=debug,reqwest=warn`.
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
        }
    }
}

/// Install the global subscriber. Call once, before any work starts.
pub fn init(config: &LoggingConfig, verbose: bool) -> Result<(), LotsawaError> {
    let filter = match EnvFilter::try_from_env(ENV_FILTER) {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(directive(config, verbose))
            .map_err(|e| LotsawaError::Config(format!("invalid log level `{}`: {e}", config.level)))?,
    };

    let registry = Registry::default().with(filter);
    let result = match config.format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        LogFormat::Text => registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_writer(std::io::stderr),
            )
            .try_init(),
    };
    result.map_err(|e| LotsawaError::Config(format!("logging already initialised: {e}")))
}

fn directive(config: &LoggingConfig, verbose: bool) -> &str {
    if verbose { "debug" } else { config.level.as_str() }
}
