//! Organ Match - donor matching and ranking engine for organ donation cases
//!
//! Candidates are filtered by hard medical constraints, scored by a
//! deterministic rule score and a learned probability of success, and
//! ranked by a hybrid of both. The training pipeline that produces the
//! learned scorer lives in [`ml`].

pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod ml;
pub mod models;
pub mod routes;
pub mod services;

// Re-export commonly used types
pub use crate::core::{Matcher, RankOptions, Ranking};
pub use error::{MatchError, ValidationError};
pub use ml::{LearnedScorer, ScorerHandle, TrainedModel};
pub use models::{BloodGroup, DonorCandidate, MatchResult, OrganType, PatientRequest};
pub use services::{InMemoryRegistry, PostgresRegistry, Registry, RegistryError};
