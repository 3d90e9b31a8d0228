pub mod domain;
pub mod requests;
pub mod responses;

pub use domain::{
    ApprovalStatus, BloodGroup, DonorCandidate, Location, MatchRecord, MatchResult, OrganType,
    PatientRequest, ProbabilitySource,
};
pub use requests::{ModelReloadRequest, PatientPayload, RankRequest};
pub use responses::{ErrorResponse, HealthResponse, ModelReloadResponse, RankResponse, RankedMatch};
