use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

/// ABO/Rh blood group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BloodGroup {
    #[serde(rename = "A+")]
    APos,
    #[serde(rename = "A-")]
    ANeg,
    #[serde(rename = "B+")]
    BPos,
    #[serde(rename = "B-")]
    BNeg,
    #[serde(rename = "AB+")]
    AbPos,
    #[serde(rename = "AB-")]
    AbNeg,
    #[serde(rename = "O+")]
    OPos,
    #[serde(rename = "O-")]
    ONeg,
}

impl BloodGroup {
    pub const ALL: [BloodGroup; 8] = [
        BloodGroup::APos,
        BloodGroup::ANeg,
        BloodGroup::BPos,
        BloodGroup::BNeg,
        BloodGroup::AbPos,
        BloodGroup::AbNeg,
        BloodGroup::OPos,
        BloodGroup::ONeg,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BloodGroup::APos => "A+",
            BloodGroup::ANeg => "A-",
            BloodGroup::BPos => "B+",
            BloodGroup::BNeg => "B-",
            BloodGroup::AbPos => "AB+",
            BloodGroup::AbNeg => "AB-",
            BloodGroup::OPos => "O+",
            BloodGroup::ONeg => "O-",
        }
    }
}

impl fmt::Display for BloodGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BloodGroup {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase();
        BloodGroup::ALL
            .iter()
            .copied()
            .find(|group| group.as_str() == normalized)
            .ok_or_else(|| ValidationError::UnknownBloodGroup(s.to_string()))
    }
}

/// Organ requested by a patient or offered by a donor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrganType {
    Kidney,
    Liver,
    Heart,
    Lung,
    Pancreas,
    Cornea,
    Intestine,
    BoneMarrow,
}

impl OrganType {
    pub const ALL: [OrganType; 8] = [
        OrganType::Kidney,
        OrganType::Liver,
        OrganType::Heart,
        OrganType::Lung,
        OrganType::Pancreas,
        OrganType::Cornea,
        OrganType::Intestine,
        OrganType::BoneMarrow,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrganType::Kidney => "kidney",
            OrganType::Liver => "liver",
            OrganType::Heart => "heart",
            OrganType::Lung => "lung",
            OrganType::Pancreas => "pancreas",
            OrganType::Cornea => "cornea",
            OrganType::Intestine => "intestine",
            OrganType::BoneMarrow => "bone_marrow",
        }
    }
}

impl fmt::Display for OrganType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrganType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        OrganType::ALL
            .iter()
            .copied()
            .find(|organ| organ.as_str() == normalized)
            .ok_or_else(|| ValidationError::UnknownOrganType(s.to_string()))
    }
}

/// Hospital approval state of a donor listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
        }
    }
}

impl FromStr for ApprovalStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(ApprovalStatus::Pending),
            "approved" => Ok(ApprovalStatus::Approved),
            "rejected" => Ok(ApprovalStatus::Rejected),
            _ => Err(ValidationError::UnknownApprovalStatus(s.to_string())),
        }
    }
}

/// Where a patient or donor is. Any part may be missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

impl Location {
    pub fn city(city: &str, state: &str) -> Self {
        Self {
            city: Some(city.to_string()),
            state: Some(state.to_string()),
            latitude: None,
            longitude: None,
        }
    }

    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        }
    }

    pub fn with_coordinates(mut self, latitude: f64, longitude: f64) -> Self {
        self.latitude = Some(latitude);
        self.longitude = Some(longitude);
        self
    }
}

/// A patient's organ requirement; input to a single ranking call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientRequest {
    pub organ_type: OrganType,
    pub blood_group: BloodGroup,
    pub age: u32,
    pub urgency_level: u8,
    #[serde(default)]
    pub location: Location,
}

impl PatientRequest {
    pub const MIN_URGENCY: u8 = 1;
    pub const MAX_URGENCY: u8 = 5;

    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(Self::MIN_URGENCY..=Self::MAX_URGENCY).contains(&self.urgency_level) {
            return Err(ValidationError::UrgencyOutOfRange(self.urgency_level));
        }

        match (self.location.latitude, self.location.longitude) {
            (Some(lat), Some(lon)) => {
                if !lat.is_finite() || !lon.is_finite() || lat.abs() > 90.0 || lon.abs() > 180.0 {
                    return Err(ValidationError::InvalidCoordinates);
                }
            }
            (None, None) => {}
            _ => return Err(ValidationError::InvalidCoordinates),
        }

        Ok(())
    }
}

/// Registry snapshot of a donor listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DonorCandidate {
    pub donor_id: i64,
    pub organ_type: OrganType,
    pub blood_group: BloodGroup,
    pub age: u32,
    #[serde(default)]
    pub location: Location,
    pub is_available: bool,
    pub approval_status: ApprovalStatus,
    /// Reputation of the listing hospital, 0-1
    #[serde(default)]
    pub reliability_score: Option<f64>,
    pub registered_at: DateTime<Utc>,
}

/// Where a candidate's match probability came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbabilitySource {
    Model,
    RuleScore,
}

/// Scored candidate produced by one ranking call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    pub donor_id: i64,
    pub compatibility_score: f64,
    pub match_probability: f64,
    pub probability_source: ProbabilitySource,
    pub urgency_weight: f64,
    pub final_score: f64,
    pub blood_compatible: bool,
    pub organ_match: bool,
    pub age_compatible: bool,
    pub distance_km: Option<f64>,
    pub features: crate::core::features::FeatureVector,
}

impl MatchResult {
    /// One-line human readable summary of why the donor ranked where it did
    pub fn explanation(&self) -> String {
        let mut parts = Vec::with_capacity(5);

        parts.push(if self.blood_compatible {
            "blood group compatible".to_string()
        } else {
            "blood group incompatible".to_string()
        });

        if self.organ_match {
            parts.push("organ type matches".to_string());
        }

        if self.age_compatible {
            parts.push("age compatible".to_string());
        }

        if let Some(distance) = self.distance_km {
            parts.push(format!("distance: {:.1} km", distance));
        }

        parts.push(format!("match score: {:.2}/1.0", self.final_score));

        parts.join(" | ")
    }
}

/// Persisted form of a MatchResult bound to a case. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRecord {
    pub case_id: i64,
    pub donor_id: i64,
    pub compatibility_score: f64,
    pub distance_km: Option<f64>,
    pub match_probability: f64,
    pub urgency_weight: f64,
    pub final_score: f64,
    pub blood_compatible: bool,
    pub organ_match: bool,
    pub age_compatible: bool,
    pub status: String,
    pub features: Vec<f64>,
    pub model_version: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl MatchRecord {
    pub const PENDING: &'static str = "pending";

    pub fn pending(
        case_id: i64,
        result: &MatchResult,
        model_version: Option<&str>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            case_id,
            donor_id: result.donor_id,
            compatibility_score: result.compatibility_score,
            distance_km: result.distance_km,
            match_probability: result.match_probability,
            urgency_weight: result.urgency_weight,
            final_score: result.final_score,
            blood_compatible: result.blood_compatible,
            organ_match: result.organ_match,
            age_compatible: result.age_compatible,
            status: Self::PENDING.to_string(),
            features: result.features.to_array().to_vec(),
            model_version: model_version.map(str::to_string),
            created_at,
        }
    }
}
