use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::compatibility::CompatibilitySignals;
use crate::models::{DonorCandidate, PatientRequest};

/// Number of features the learned scorer consumes
pub const FEATURE_COUNT: usize = 8;

/// Feature order. Part of the persisted model contract.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "blood_compatible",
    "organ_match",
    "age_compatible",
    "distance_normalized",
    "urgency_weight",
    "reliability_score",
    "freshness_score",
    "compatibility_score",
];

/// Normalized distance when the distance is unknown
pub const UNKNOWN_DISTANCE_NORMALIZED: f64 = 0.5;

/// Reliability assumed for donors whose hospital has no score yet
pub const DEFAULT_RELIABILITY: f64 = 0.5;

/// Freshness never drops below this, so old listings still count
pub const MIN_FRESHNESS: f64 = 0.5;

const FRESHNESS_HORIZON_DAYS: f64 = 365.0;

/// Fixed-schema model input; every field is in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub blood_compatible: f64,
    pub organ_match: f64,
    pub age_compatible: f64,
    pub distance_normalized: f64,
    pub urgency_weight: f64,
    pub reliability_score: f64,
    pub freshness_score: f64,
    pub compatibility_score: f64,
}

impl FeatureVector {
    /// Values in `FEATURE_NAMES` order
    pub fn to_array(&self) -> [f64; FEATURE_COUNT] {
        [
            self.blood_compatible,
            self.organ_match,
            self.age_compatible,
            self.distance_normalized,
            self.urgency_weight,
            self.reliability_score,
            self.freshness_score,
            self.compatibility_score,
        ]
    }

    pub fn from_array(values: [f64; FEATURE_COUNT]) -> Self {
        Self {
            blood_compatible: values[0],
            organ_match: values[1],
            age_compatible: values[2],
            distance_normalized: values[3],
            urgency_weight: values[4],
            reliability_score: values[5],
            freshness_score: values[6],
            compatibility_score: values[7],
        }
    }

    /// Name of the first non-finite field, if any
    pub fn first_non_finite(&self) -> Option<&'static str> {
        self.to_array()
            .iter()
            .zip(FEATURE_NAMES)
            .find(|(value, _)| !value.is_finite())
            .map(|(_, name)| name)
    }
}

#[inline]
fn flag(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

#[inline]
pub fn urgency_weight(urgency_level: u8) -> f64 {
    f64::from(urgency_level) / 5.0
}

#[inline]
pub fn reliability(donor: &DonorCandidate) -> f64 {
    donor
        .reliability_score
        .filter(|score| score.is_finite())
        .map_or(DEFAULT_RELIABILITY, |score| score.clamp(0.0, 1.0))
}

/// Linear decay over a year, floored at `MIN_FRESHNESS`
pub fn freshness_score(registered_at: DateTime<Utc>, evaluated_at: DateTime<Utc>) -> f64 {
    let days = (evaluated_at - registered_at).num_days().max(0) as f64;
    (1.0 - days / FRESHNESS_HORIZON_DAYS).max(MIN_FRESHNESS)
}

pub fn distance_normalized(distance_km: Option<f64>, search_radius_km: f64) -> f64 {
    match distance_km {
        Some(distance) if search_radius_km > 0.0 => (distance / search_radius_km).clamp(0.0, 1.0),
        _ => UNKNOWN_DISTANCE_NORMALIZED,
    }
}

/// Turn a patient/donor pair into the model's feature vector
pub fn build_features(
    request: &PatientRequest,
    donor: &DonorCandidate,
    signals: &CompatibilitySignals,
    compatibility_score: f64,
    search_radius_km: f64,
    evaluated_at: DateTime<Utc>,
) -> FeatureVector {
    FeatureVector {
        blood_compatible: flag(signals.blood_compatible),
        organ_match: flag(signals.organ_match),
        age_compatible: flag(signals.age_compatible),
        distance_normalized: distance_normalized(signals.location.distance_km, search_radius_km),
        urgency_weight: urgency_weight(request.urgency_level),
        reliability_score: reliability(donor),
        freshness_score: freshness_score(donor.registered_at, evaluated_at),
        compatibility_score,
    }
}
