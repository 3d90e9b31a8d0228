use crate::core::distance::{haversine_distance, proximity_score};
use crate::models::{ApprovalStatus, BloodGroup, DonorCandidate, Location, PatientRequest};

/// Maximum donor/patient age gap, in years, still considered compatible
pub const MAX_AGE_GAP_YEARS: u32 = 20;

/// Location score when neither coordinates nor city names are available
pub const UNKNOWN_LOCATION_SCORE: f64 = 0.5;

const SAME_CITY_SCORE: f64 = 1.0;
const SAME_STATE_SCORE: f64 = 0.7;
const OTHER_REGION_SCORE: f64 = 0.3;
const SAME_STATE_DISTANCE_KM: f64 = 100.0;
const OTHER_REGION_DISTANCE_KM: f64 = 300.0;

use BloodGroup::*;

/// Donor groups accepted for a patient of the keyed group.
///
/// O-negative patients accept every group, AB-positive patients accept only
/// AB-positive. Lookup is keyed by the patient's group.
const COMPATIBILITY: [(BloodGroup, &[BloodGroup]); 8] = [
    (ONeg, &[ONeg, OPos, ANeg, APos, BNeg, BPos, AbNeg, AbPos]),
    (OPos, &[OPos, APos, BPos, AbPos]),
    (ANeg, &[ANeg, APos, AbNeg, AbPos]),
    (APos, &[APos, AbPos]),
    (BNeg, &[BNeg, BPos, AbNeg, AbPos]),
    (BPos, &[BPos, AbPos]),
    (AbNeg, &[AbNeg, AbPos]),
    (AbPos, &[AbPos]),
];

/// Blood groups whose donors may be ranked for a patient of `patient` group
pub fn compatible_blood_groups(patient: BloodGroup) -> &'static [BloodGroup] {
    COMPATIBILITY
        .iter()
        .find(|(group, _)| *group == patient)
        .map(|(_, accepted)| *accepted)
        .unwrap_or(&[])
}

#[inline]
pub fn is_blood_compatible(patient: BloodGroup, donor: BloodGroup) -> bool {
    compatible_blood_groups(patient).contains(&donor)
}

#[inline]
pub fn is_age_compatible(patient_age: u32, donor_age: u32) -> bool {
    patient_age.abs_diff(donor_age) <= MAX_AGE_GAP_YEARS
}

/// Outcome of comparing a patient's and a donor's location
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationAssessment {
    pub score: f64,
    /// Exact for coordinates, approximate for the city/state tiers, None when unknown
    pub distance_km: Option<f64>,
}

impl LocationAssessment {
    pub fn within_radius(&self, search_radius_km: f64) -> bool {
        self.distance_km.map_or(true, |distance| distance <= search_radius_km)
    }
}

/// Score how close a donor is to the patient
///
/// Great-circle distance when both sides carry coordinates, otherwise a
/// three-tier city/state heuristic.
pub fn assess_location(
    patient: &Location,
    donor: &Location,
    search_radius_km: f64,
) -> LocationAssessment {
    if let (Some((plat, plon)), Some((dlat, dlon))) = (patient.coordinates(), donor.coordinates()) {
        let distance = haversine_distance(plat, plon, dlat, dlon);
        return LocationAssessment {
            score: proximity_score(distance, search_radius_km),
            distance_km: Some(distance),
        };
    }

    let (Some(patient_city), Some(donor_city)) = (patient.city.as_deref(), donor.city.as_deref())
    else {
        return LocationAssessment {
            score: UNKNOWN_LOCATION_SCORE,
            distance_km: None,
        };
    };

    if same_place(patient_city, donor_city) {
        return LocationAssessment {
            score: SAME_CITY_SCORE,
            distance_km: Some(0.0),
        };
    }

    let same_state = match (patient.state.as_deref(), donor.state.as_deref()) {
        (Some(a), Some(b)) => same_place(a, b),
        _ => false,
    };

    if same_state {
        LocationAssessment {
            score: SAME_STATE_SCORE,
            distance_km: Some(SAME_STATE_DISTANCE_KM),
        }
    } else {
        LocationAssessment {
            score: OTHER_REGION_SCORE,
            distance_km: Some(OTHER_REGION_DISTANCE_KM),
        }
    }
}

fn same_place(a: &str, b: &str) -> bool {
    let a = a.trim();
    let b = b.trim();
    !a.is_empty() && a.eq_ignore_ascii_case(b)
}

/// Hard constraints a donor must pass before any scoring
///
/// The registry query already applies these; they are checked again so a
/// misbehaving store can never leak an incompatible donor into a ranking.
#[inline]
pub fn passes_hard_constraints(request: &PatientRequest, donor: &DonorCandidate) -> bool {
    if !donor.is_available || donor.approval_status != ApprovalStatus::Approved {
        return false;
    }

    if donor.organ_type != request.organ_type {
        return false;
    }

    is_blood_compatible(request.blood_group, donor.blood_group)
}

/// Boolean and continuous compatibility signals for one patient/donor pair
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompatibilitySignals {
    pub blood_compatible: bool,
    pub organ_match: bool,
    pub age_compatible: bool,
    pub location: LocationAssessment,
}

pub fn evaluate(
    request: &PatientRequest,
    donor: &DonorCandidate,
    search_radius_km: f64,
) -> CompatibilitySignals {
    CompatibilitySignals {
        blood_compatible: is_blood_compatible(request.blood_group, donor.blood_group),
        organ_match: donor.organ_type == request.organ_type,
        age_compatible: is_age_compatible(request.age, donor.age),
        location: assess_location(&request.location, &donor.location, search_radius_km),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OrganType;
    use chrono::Utc;

    fn create_test_request(blood_group: BloodGroup) -> PatientRequest {
        PatientRequest {
            organ_type: OrganType::Kidney,
            blood_group,
            age: 40,
            urgency_level: 3,
            location: Location::city("Pune", "Maharashtra"),
        }
    }

    fn create_test_donor(blood_group: BloodGroup) -> DonorCandidate {
        DonorCandidate {
            donor_id: 1,
            organ_type: OrganType::Kidney,
            blood_group,
            age: 38,
            location: Location::city("Pune", "Maharashtra"),
            is_available: true,
            approval_status: ApprovalStatus::Approved,
            reliability_score: Some(0.9),
            registered_at: Utc::now(),
        }
    }

    #[test]
    fn test_universal_rows() {
        assert_eq!(compatible_blood_groups(ONeg).len(), 8);
        assert_eq!(compatible_blood_groups(AbPos), &[AbPos]);
    }

    #[test]
    fn test_every_group_accepts_itself() {
        for group in BloodGroup::ALL {
            assert!(is_blood_compatible(group, group), "{} should accept itself", group);
        }
    }

    #[test]
    fn test_ab_positive_patient_rejects_b_positive() {
        assert!(!is_blood_compatible(AbPos, BPos));
    }

    #[test]
    fn test_age_window() {
        assert!(is_age_compatible(40, 38));
        assert!(is_age_compatible(40, 60));
        assert!(is_age_compatible(60, 40));
        assert!(!is_age_compatible(40, 61));
        assert!(!is_age_compatible(10, 31));
    }

    #[test]
    fn test_location_tiers() {
        let pune = Location::city("Pune", "Maharashtra");

        let same_city = assess_location(&pune, &Location::city("PUNE ", "Maharashtra"), 500.0);
        assert_eq!(same_city.score, 1.0);
        assert_eq!(same_city.distance_km, Some(0.0));

        let same_state = assess_location(&pune, &Location::city("Nagpur", "maharashtra"), 500.0);
        assert_eq!(same_state.score, 0.7);
        assert_eq!(same_state.distance_km, Some(100.0));

        let elsewhere = assess_location(&pune, &Location::city("Chennai", "Tamil Nadu"), 500.0);
        assert_eq!(elsewhere.score, 0.3);
        assert_eq!(elsewhere.distance_km, Some(300.0));
    }

    #[test]
    fn test_location_unknown() {
        let assessment = assess_location(&Location::default(), &Location::city("Pune", "MH"), 500.0);
        assert_eq!(assessment.score, UNKNOWN_LOCATION_SCORE);
        assert_eq!(assessment.distance_km, None);
        assert!(assessment.within_radius(1.0));
    }

    #[test]
    fn test_location_coordinates_override_tiers() {
        let mumbai = Location::city("Mumbai", "Maharashtra").with_coordinates(19.0760, 72.8777);
        let pune = Location::city("Pune", "Maharashtra").with_coordinates(18.5204, 73.8567);

        let assessment = assess_location(&mumbai, &pune, 500.0);
        let distance = assessment.distance_km.unwrap();
        assert!(distance > 100.0 && distance < 140.0);
        assert!((assessment.score - (1.0 - distance / 500.0)).abs() < 1e-12);
        assert!(!assessment.within_radius(50.0));
    }

    #[test]
    fn test_hard_constraints() {
        let request = create_test_request(AbPos);
        assert!(passes_hard_constraints(&request, &create_test_donor(AbPos)));
        assert!(!passes_hard_constraints(&request, &create_test_donor(BPos)));

        let mut unavailable = create_test_donor(AbPos);
        unavailable.is_available = false;
        assert!(!passes_hard_constraints(&request, &unavailable));

        let mut pending = create_test_donor(AbPos);
        pending.approval_status = ApprovalStatus::Pending;
        assert!(!passes_hard_constraints(&request, &pending));

        let mut liver = create_test_donor(AbPos);
        liver.organ_type = OrganType::Liver;
        assert!(!passes_hard_constraints(&request, &liver));
    }

    #[test]
    fn test_evaluate_signals() {
        let signals = evaluate(&create_test_request(ONeg), &create_test_donor(ONeg), 500.0);
        assert!(signals.blood_compatible);
        assert!(signals.organ_match);
        assert!(signals.age_compatible);
        assert_eq!(signals.location.score, 1.0);
    }
}
