//! Extractor trait

use crate::types::{Extraction, PromptTemplate, TargetSchema};

/// Result type for extraction calls
pub type ExtractResult<T> = Result<T, ExtractError>;

/// Extraction error types
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("rate limited: retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}

impl ExtractError {
    /// Convert into the engine error, tagged with the extractor name.
    pub fn into_core(self, extractor: &str) -> coachflow_core::Error {
        coachflow_core::Error::extraction(extractor, self.to_string())
    }
}

/// A text-understanding service.
///
/// Implementations must return only fields that conform to `schema`
/// (see [`Extraction::conform`]): partial information is kept, anything
/// that does not fit is dropped rather than guessed.
#[async_trait::async_trait]
pub trait Extractor: Send + Sync {
    fn name(&self) -> &str;

    async fn extract(
        &self,
        raw_text: &str,
        prompt: &PromptTemplate,
        schema: &TargetSchema,
    ) -> ExtractResult<Extraction>;
}
