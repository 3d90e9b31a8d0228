use serde::{Deserialize, Serialize};

use crate::models::domain::MatchResult;

/// A ranked donor plus a readable explanation of its score
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedMatch {
    #[serde(flatten)]
    pub result: MatchResult,
    pub explanation: String,
}

impl From<MatchResult> for RankedMatch {
    fn from(result: MatchResult) -> Self {
        let explanation = result.explanation();
        Self { result, explanation }
    }
}

/// Response for the rank endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankResponse {
    pub case_id: Option<i64>,
    pub matches: Vec<RankedMatch>,
    pub total_candidates: usize,
    pub model_version: Option<String>,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub model_version: Option<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub status_code: u16,
    #[serde(default)]
    pub retryable: bool,
}

/// Model reload response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelReloadResponse {
    pub model_version: Option<String>,
    pub path: String,
}
