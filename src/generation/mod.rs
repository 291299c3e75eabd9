//! The capability this crate consumes: an external text-generation service.
//!
//! [`GenerationPort`] is injected into the executor at construction so the
//! real HTTP client and scripted test doubles are interchangeable.

mod schema;

use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use crate::error::FailureKind;

pub use schema::{Field, FieldKind, Schema, StructuredOutput};

#[derive(Debug, Error)]
pub enum GenerationError {
    /// Transport-level failure (network, HTTP status, rate limit).
    #[error("transient service failure: {0}")]
    Transient(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The service answered but the output failed validation.
    #[error("malformed output for {schema}: {reason}")]
    Malformed { schema: &'static str, reason: String },
}

impl GenerationError {
    pub fn malformed(schema: &'static str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            schema,
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            GenerationError::Malformed { .. } => FailureKind::Business,
            GenerationError::Transient(_) | GenerationError::Timeout(_) => FailureKind::System,
        }
    }
}

/// Abstraction over the text-generation service. Implementations must
/// tolerate concurrent calls from many work items.
#[allow(async_fn_in_trait)]
pub trait GenerationPort: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;

    /// Vectorized `generate`. All-or-nothing: one failed prompt fails the call.
    async fn generate_batch(&self, prompts: &[String]) -> Result<Vec<String>, GenerationError> {
        futures::future::try_join_all(prompts.iter().map(|prompt| self.generate(prompt))).await
    }

    /// `generate` constrained to `schema`; the returned record has been
    /// conformed to the schema's fields.
    async fn generate_structured(
        &self,
        prompt: &str,
        schema: &Schema,
    ) -> Result<Value, GenerationError> {
        let text = self.generate(&schema.instruct(prompt)).await?;
        schema.parse(&text)
    }
}

/// Typed wrapper around [`GenerationPort::generate_structured`].
pub async fn structured<T, P>(port: &P, prompt: &str) -> Result<T, GenerationError>
where
    T: StructuredOutput,
    P: GenerationPort,
{
    let value = port.generate_structured(prompt, &T::SCHEMA).await?;
    serde_json::from_value(value).map_err(|e| GenerationError::malformed(T::SCHEMA.name, e.to_string()))
}
