//! Synthetic labeled examples used to bootstrap the learned scorer before
//! real donation outcomes accumulate. Labels are correlated with the
//! features by construction.

use rand::Rng;
use rand_distr::{Bernoulli, Beta, Distribution, Normal, Uniform};

use crate::core::features::FeatureVector;
use crate::ml::dataset::Dataset;

/// Probability threshold above which a synthetic match counts as successful
pub const SUCCESS_THRESHOLD: f64 = 0.6;

/// Standard deviation of the label noise
pub const LABEL_NOISE_STD: f64 = 0.1;

#[derive(Debug, thiserror::Error)]
#[error("Invalid synthetic distribution: {0}")]
pub struct DistributionError(String);

/// Feature distributions for synthetic sampling
#[derive(Debug, Clone)]
pub struct SyntheticGenerator {
    blood: Bernoulli,
    organ: Bernoulli,
    age: Bernoulli,
    distance: Beta<f64>,
    urgency: Uniform<f64>,
    reliability: Beta<f64>,
    freshness: Beta<f64>,
    noise: Normal<f64>,
}

impl SyntheticGenerator {
    pub fn new() -> Result<Self, DistributionError> {
        let err = |e: &dyn std::fmt::Display| DistributionError(e.to_string());

        Ok(Self {
            blood: Bernoulli::new(0.7).map_err(|e| err(&e))?,
            organ: Bernoulli::new(0.8).map_err(|e| err(&e))?,
            age: Bernoulli::new(0.7).map_err(|e| err(&e))?,
            // Skewed towards nearby donors
            distance: Beta::new(2.0, 5.0).map_err(|e| err(&e))?,
            urgency: Uniform::new_inclusive(0.2, 1.0),
            // Skewed towards reliable hospitals and recent listings
            reliability: Beta::new(5.0, 2.0).map_err(|e| err(&e))?,
            freshness: Beta::new(3.0, 2.0).map_err(|e| err(&e))?,
            noise: Normal::new(0.0, LABEL_NOISE_STD).map_err(|e| err(&e))?,
        })
    }

    /// Draw one labeled example
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> (FeatureVector, bool) {
        let flag = |hit: bool| if hit { 1.0 } else { 0.0 };

        let blood = flag(self.blood.sample(rng));
        let organ = flag(self.organ.sample(rng));
        let age = flag(self.age.sample(rng));
        let distance = self.distance.sample(rng);
        let urgency = self.urgency.sample(rng);
        let reliability = self.reliability.sample(rng);
        let freshness = self.freshness.sample(rng);

        let compatibility = blood * 0.4 + organ * 0.3 + age * 0.2 + (1.0 - distance) * 0.1;

        let success_probability = blood * 0.3
            + organ * 0.25
            + age * 0.15
            + (1.0 - distance) * 0.1
            + urgency * 0.1
            + reliability * 0.05
            + freshness * 0.05;
        let noisy = (success_probability + self.noise.sample(rng)).clamp(0.0, 1.0);

        let features = FeatureVector {
            blood_compatible: blood,
            organ_match: organ,
            age_compatible: age,
            distance_normalized: distance,
            urgency_weight: urgency,
            reliability_score: reliability,
            freshness_score: freshness,
            compatibility_score: compatibility,
        };

        (features, noisy > SUCCESS_THRESHOLD)
    }

    pub fn generate<R: Rng + ?Sized>(&self, samples: usize, rng: &mut R) -> Dataset {
        let mut data = Dataset::with_capacity(samples);
        for _ in 0..samples {
            let (features, success) = self.sample(rng);
            data.push(&features, success);
        }
        data
    }
}
