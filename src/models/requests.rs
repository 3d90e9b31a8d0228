use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use validator::Validate;

use crate::error::ValidationError;
use crate::models::domain::{Location, PatientRequest};

/// Patient fields supplied inline with a ranking request.
/// Enumerations arrive as text so unknown values surface as validation errors.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PatientPayload {
    #[validate(length(min = 1))]
    #[serde(alias = "organ_type")]
    pub organ_type: String,
    #[validate(length(min = 1))]
    #[serde(alias = "blood_group")]
    pub blood_group: String,
    #[validate(range(max = 150))]
    pub age: u32,
    #[validate(range(min = 1, max = 5))]
    #[serde(alias = "urgency_level")]
    pub urgency_level: u8,
    #[serde(default)]
    pub location: Location,
}

impl TryFrom<&PatientPayload> for PatientRequest {
    type Error = ValidationError;

    fn try_from(payload: &PatientPayload) -> Result<Self, Self::Error> {
        let request = PatientRequest {
            organ_type: payload.organ_type.parse()?,
            blood_group: payload.blood_group.parse()?,
            age: payload.age,
            urgency_level: payload.urgency_level,
            location: payload.location.clone(),
        };
        request.validate()?;
        Ok(request)
    }
}

/// Request to rank donors, either for a stored case or an inline patient
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RankRequest {
    #[serde(default, alias = "case_id")]
    pub case_id: Option<i64>,
    #[validate(nested)]
    #[serde(default)]
    pub patient: Option<PatientPayload>,
    #[validate(range(min = 1))]
    #[serde(default, alias = "max_results")]
    pub max_results: Option<usize>,
    #[validate(range(exclusive_min = 0.0))]
    #[serde(default, alias = "search_radius_km")]
    pub search_radius_km: Option<f64>,
}

/// Optional body of a model reload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelReloadRequest {
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BloodGroup, OrganType};

    fn payload(blood_group: &str) -> PatientPayload {
        PatientPayload {
            organ_type: "Kidney".to_string(),
            blood_group: blood_group.to_string(),
            age: 40,
            urgency_level: 4,
            location: Location::city("Mumbai", "Maharashtra"),
        }
    }

    #[test]
    fn test_payload_conversion() {
        let request = PatientRequest::try_from(&payload("o-")).unwrap();
        assert_eq!(request.organ_type, OrganType::Kidney);
        assert_eq!(request.blood_group, BloodGroup::ONeg);
    }

    #[test]
    fn test_unknown_blood_group() {
        assert_eq!(
            PatientRequest::try_from(&payload("C+")),
            Err(ValidationError::UnknownBloodGroup("C+".to_string()))
        );
    }

    #[test]
    fn test_rank_request_json() {
        let json = r#"{
            "patient": {
                "organType": "liver",
                "bloodGroup": "AB+",
                "age": 52,
                "urgencyLevel": 9
            },
            "maxResults": 0
        }"#;

        let request: RankRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.case_id, None);
        assert!(request.validate().is_err());
    }
}
