use crate::domain::analysis::{AnalysisRequest, AnalysisResult};
use std::fmt;

pub mod error;
pub mod gemini;
pub mod json;
pub mod prompts;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Gemini,
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Gemini => f.write_str("Gemini"),
        }
    }
}

/// Stateless request/response adapter over the remote analysis service.
#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    fn provider(&self) -> Provider;

    async fn analyze_stocks(&self, request: AnalysisRequest) -> anyhow::Result<AnalysisResult>;
}
