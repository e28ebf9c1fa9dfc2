//! Code-transform oracle seam.
//!
//! The oracle is a text-in/text-out service: it receives a system instruction
//! and a user prompt and answers with the full replacement content of a test
//! file. It has no retry of its own; [`RetryingOracle`] adds a small bounded
//! retry at the call site for transient failures, independent of the
//! build-repair budget.

pub mod client;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

pub use client::HttpOracle;

/// One request to the oracle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleRequest {
    /// System-role instructions.
    pub system: String,

    /// User-role prompt embedding source/test content and diagnostics.
    pub user: String,
}

impl OracleRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }
}

/// Errors from a single oracle call.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    /// HTTP transport failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    /// The service answered without any choice content.
    #[error("oracle returned no content")]
    EmptyResponse,

    /// The oracle is not configured (missing endpoint or token).
    #[error("oracle not configured: {0}")]
    NotConfigured(String),

    /// Failure reported by a non-HTTP oracle implementation.
    #[error("{0}")]
    Other(String),
}

/// Text-generation service producing replacement artifact content.
#[async_trait]
pub trait CodeTransformOracle: Send + Sync {
    /// Return the raw replacement content for `request`.
    async fn transform(&self, request: &OracleRequest) -> Result<String, OracleError>;
}

#[async_trait]
impl<T: CodeTransformOracle + ?Sized> CodeTransformOracle for std::sync::Arc<T> {
    async fn transform(&self, request: &OracleRequest) -> Result<String, OracleError> {
        (**self).transform(request).await
    }
}

/// Bounded retry wrapper around any oracle, with exponential backoff.
pub struct RetryingOracle<O> {
    inner: O,
    max_retries: u32,
    backoff_base: Duration,
}

impl<O: CodeTransformOracle> RetryingOracle<O> {
    /// Wrap `inner`, retrying each failed call up to `max_retries` times.
    pub fn new(inner: O, max_retries: u32) -> Self {
        Self {
            inner,
            max_retries,
            backoff_base: Duration::ZERO,
        }
    }

    /// Sleep `base * 2^(n-1)` before retry `n` (no delay by default).
    pub fn with_backoff(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    /// Delay before retry number `attempt` (1-based).
    fn backoff_for(&self, attempt: u32) -> Duration {
        self.backoff_base
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }

    pub fn inner(&self) -> &O {
        &self.inner
    }
}

#[async_trait]
impl<O: CodeTransformOracle> CodeTransformOracle for RetryingOracle<O> {
    async fn transform(&self, request: &OracleRequest) -> Result<String, OracleError> {
        let mut attempt = 0u32;
        loop {
            match self.inner.transform(request).await {
                Ok(content) => return Ok(content),
                Err(e) if attempt < self.max_retries => {
                    attempt += 1;
                    warn!(attempt, max_retries = self.max_retries, error = %e, "oracle call failed; retrying");
                    let delay = self.backoff_for(attempt);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}
