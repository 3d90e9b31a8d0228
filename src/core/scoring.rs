use crate::core::compatibility::CompatibilitySignals;
use crate::core::features::FeatureVector;

/// Age term used when the age gap is too wide. Age is a soft penalty.
const AGE_MISMATCH_CREDIT: f64 = 0.5;

/// Weights of the pure compatibility judgment
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuleWeights {
    pub blood: f64,
    pub organ: f64,
    pub age: f64,
    pub location: f64,
}

impl Default for RuleWeights {
    fn default() -> Self {
        Self {
            blood: 0.4,
            organ: 0.3,
            age: 0.2,
            location: 0.1,
        }
    }
}

/// Weights of the operational ranking score. Deliberately distinct from
/// `RuleWeights` so urgency and reliability move the final order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HybridWeights {
    pub compatibility: f64,
    pub probability: f64,
    pub urgency: f64,
    pub reliability: f64,
}

impl Default for HybridWeights {
    fn default() -> Self {
        Self {
            compatibility: 0.4,
            probability: 0.3,
            urgency: 0.2,
            reliability: 0.1,
        }
    }
}

/// Calculate the rule-based compatibility score (0-1)
///
/// score = (
///     blood_compatible * 0.4 +
///     organ_match      * 0.3 +
///     age_term         * 0.2 +    # 1.0 if compatible, else 0.5
///     location_score   * 0.1
/// )
pub fn rule_score(signals: &CompatibilitySignals, weights: &RuleWeights) -> f64 {
    let blood = if signals.blood_compatible { 1.0 } else { 0.0 };
    let organ = if signals.organ_match { 1.0 } else { 0.0 };
    let age = if signals.age_compatible { 1.0 } else { AGE_MISMATCH_CREDIT };

    let score = blood * weights.blood
        + organ * weights.organ
        + age * weights.age
        + signals.location.score * weights.location;

    score.clamp(0.0, 1.0)
}

/// Calculate the final hybrid ranking score (0-1)
pub fn final_score(features: &FeatureVector, match_probability: f64, weights: &HybridWeights) -> f64 {
    let score = features.compatibility_score * weights.compatibility
        + match_probability * weights.probability
        + features.urgency_weight * weights.urgency
        + features.reliability_score * weights.reliability;

    score.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::compatibility::LocationAssessment;

    fn signals(blood: bool, organ: bool, age: bool, location_score: f64) -> CompatibilitySignals {
        CompatibilitySignals {
            blood_compatible: blood,
            organ_match: organ,
            age_compatible: age,
            location: LocationAssessment {
                score: location_score,
                distance_km: None,
            },
        }
    }

    #[test]
    fn test_perfect_rule_score() {
        let score = rule_score(&signals(true, true, true, 1.0), &RuleWeights::default());
        assert!((score - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_age_mismatch_is_soft_penalty() {
        let weights = RuleWeights::default();
        let compatible = rule_score(&signals(true, true, true, 0.3), &weights);
        let mismatch = rule_score(&signals(true, true, false, 0.3), &weights);

        assert!((compatible - mismatch - 0.1).abs() < 1e-12);
        assert!(mismatch > 0.0);
    }

    #[test]
    fn test_rule_score_bounds() {
        let weights = RuleWeights::default();
        for blood in [false, true] {
            for organ in [false, true] {
                for age in [false, true] {
                    for location in [0.0, 0.3, 0.5, 0.7, 1.0] {
                        let score = rule_score(&signals(blood, organ, age, location), &weights);
                        assert!((0.0..=1.0).contains(&score));
                    }
                }
            }
        }
    }

    #[test]
    fn test_final_score_weights() {
        let features = FeatureVector::from_array([1.0, 1.0, 1.0, 0.0, 0.6, 0.9, 1.0, 1.0]);
        let score = final_score(&features, 0.5, &HybridWeights::default());
        // 0.4 * 1.0 + 0.3 * 0.5 + 0.2 * 0.6 + 0.1 * 0.9
        assert!((score - 0.76).abs() < 1e-12);
    }

    #[test]
    fn test_final_score_clipped() {
        let features = FeatureVector::from_array([1.0; 8]);
        let score = final_score(&features, 3.0, &HybridWeights::default());
        assert_eq!(score, 1.0);
    }
}
