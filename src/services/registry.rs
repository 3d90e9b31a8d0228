use std::future::Future;
use thiserror::Error;

use crate::models::{BloodGroup, DonorCandidate, MatchRecord, OrganType, PatientRequest};

/// SQLSTATE raised when a statement hits `statement_timeout`
const QUERY_CANCELED: &str = "57014";

#[derive(Debug, Error)]
pub enum RegistryError {
    /// Connection, pool or timeout failure. Retrying the call may succeed.
    #[error("Registry unavailable: {0}")]
    Unavailable(String),

    #[error("Corrupt registry row: {0}")]
    CorruptRow(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl RegistryError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, RegistryError::Unavailable(_))
    }
}

impl From<sqlx::Error> for RegistryError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => RegistryError::Unavailable(err.to_string()),
            sqlx::Error::Database(db) if db.code().as_deref() == Some(QUERY_CANCELED) => {
                RegistryError::Unavailable(err.to_string())
            }
            _ => RegistryError::Database(err),
        }
    }
}

/// Store of donors, cases and persisted match results.
///
/// Candidate queries only return donors that are available and approved.
/// No ordering is guaranteed.
pub trait Registry: Send + Sync {
    fn find_candidates(
        &self,
        organ_type: OrganType,
        blood_groups: &[BloodGroup],
    ) -> impl Future<Output = Result<Vec<DonorCandidate>, RegistryError>> + Send;

    /// Patient request stored for an emergency case
    fn find_case(
        &self,
        case_id: i64,
    ) -> impl Future<Output = Result<Option<PatientRequest>, RegistryError>> + Send;

    /// Append match results. All records are written or none are.
    fn record_matches(
        &self,
        records: &[MatchRecord],
    ) -> impl Future<Output = Result<(), RegistryError>> + Send;

    fn health_check(&self) -> impl Future<Output = Result<bool, RegistryError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_failures_are_retryable() {
        assert!(RegistryError::from(sqlx::Error::PoolTimedOut).is_retryable());
        assert!(RegistryError::from(sqlx::Error::PoolClosed).is_retryable());

        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert!(RegistryError::from(sqlx::Error::Io(io)).is_retryable());
    }

    #[test]
    fn test_other_failures_are_not_retryable() {
        assert!(!RegistryError::from(sqlx::Error::RowNotFound).is_retryable());
        assert!(!RegistryError::CorruptRow("bad blood group".into()).is_retryable());
    }
}
