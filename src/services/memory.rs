use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

use crate::models::{
    ApprovalStatus, BloodGroup, DonorCandidate, MatchRecord, OrganType, PatientRequest,
};
use crate::services::registry::{Registry, RegistryError};

/// Registry kept entirely in process memory.
///
/// Used by tests, benchmarks and local runs without PostgreSQL.
/// `set_unavailable` makes every call fail the way a lost connection would.
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    donors: RwLock<Vec<DonorCandidate>>,
    cases: RwLock<HashMap<i64, PatientRequest>>,
    records: RwLock<Vec<MatchRecord>>,
    unavailable: AtomicBool,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_donors(donors: Vec<DonorCandidate>) -> Self {
        Self {
            donors: RwLock::new(donors),
            ..Self::default()
        }
    }

    pub fn add_donor(&self, donor: DonorCandidate) {
        self.donors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(donor);
    }

    pub fn add_case(&self, case_id: i64, request: PatientRequest) {
        self.cases
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(case_id, request);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Snapshot of every persisted match record
    pub fn records(&self) -> Vec<MatchRecord> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn check_available(&self) -> Result<(), RegistryError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(RegistryError::Unavailable("in-memory registry is offline".to_string()))
        } else {
            Ok(())
        }
    }
}

impl Registry for InMemoryRegistry {
    async fn find_candidates(
        &self,
        organ_type: OrganType,
        blood_groups: &[BloodGroup],
    ) -> Result<Vec<DonorCandidate>, RegistryError> {
        self.check_available()?;

        let donors = self.donors.read().unwrap_or_else(PoisonError::into_inner);
        Ok(donors
            .iter()
            .filter(|d| {
                d.organ_type == organ_type
                    && d.is_available
                    && d.approval_status == ApprovalStatus::Approved
                    && blood_groups.contains(&d.blood_group)
            })
            .cloned()
            .collect())
    }

    async fn find_case(&self, case_id: i64) -> Result<Option<PatientRequest>, RegistryError> {
        self.check_available()?;

        let cases = self.cases.read().unwrap_or_else(PoisonError::into_inner);
        Ok(cases.get(&case_id).cloned())
    }

    async fn record_matches(&self, records: &[MatchRecord]) -> Result<(), RegistryError> {
        self.check_available()?;

        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(records);
        Ok(())
    }

    async fn health_check(&self) -> Result<bool, RegistryError> {
        Ok(!self.unavailable.load(Ordering::SeqCst))
    }
}
