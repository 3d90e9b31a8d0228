use thiserror::Error;

use crate::services::RegistryError;

/// Malformed ranking input. Never retried.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Unknown blood group: {0}")]
    UnknownBloodGroup(String),

    #[error("Unknown organ type: {0}")]
    UnknownOrganType(String),

    #[error("Unknown approval status: {0}")]
    UnknownApprovalStatus(String),

    #[error("Urgency level must be between 1 and 5, got {0}")]
    UrgencyOutOfRange(u8),

    #[error("Latitude and longitude must both be present and within range")]
    InvalidCoordinates,

    #[error("max_results must be at least 1")]
    NoResultsRequested,

    #[error("Search radius must be a positive number of kilometers, got {0}")]
    InvalidSearchRadius(f64),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Provide either a case id or an inline patient, not both")]
    ConflictingTarget,
}

/// Errors surfaced by a ranking call
#[derive(Debug, Error)]
pub enum MatchError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Registry unavailable: {0}")]
    StoreUnavailable(#[from] RegistryError),

    #[error("Case not found: {0}")]
    CaseNotFound(i64),
}

impl MatchError {
    /// Whether the caller may retry the whole ranking call
    pub fn is_retryable(&self) -> bool {
        match self {
            MatchError::StoreUnavailable(err) => err.is_retryable(),
            MatchError::Validation(_) | MatchError::CaseNotFound(_) => false,
        }
    }
}
