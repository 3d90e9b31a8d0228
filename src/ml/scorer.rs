use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;

use crate::core::features::FeatureVector;
use crate::ml::artifact::{ArtifactError, TrainedModel};
use crate::ml::gbdt::{sigmoid, GbdtError};

/// Outcome of scoring a single feature vector
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Prediction {
    /// Probability from the trained model
    Learned(f64),
    /// No model is attached; the rule score stands in
    RuleScore(f64),
}

impl Prediction {
    pub fn probability(&self) -> f64 {
        match *self {
            Prediction::Learned(p) | Prediction::RuleScore(p) => p,
        }
    }
}

#[derive(Debug, Error)]
pub enum PredictionError {
    #[error("Feature {name} is not a finite number")]
    NonFiniteFeature { name: &'static str },

    #[error("Model produced a non-finite probability")]
    NonFiniteOutput,

    #[error("Model evaluation failed: {0}")]
    Model(#[from] GbdtError),
}

/// Immutable scorer built around an optional verified artifact
#[derive(Debug, Default)]
pub struct LearnedScorer {
    model: Option<TrainedModel>,
}

impl LearnedScorer {
    /// Scorer that answers every prediction with the rule score
    pub fn rule_only() -> Self {
        Self { model: None }
    }

    /// Attach an artifact. Its feature schema is checked here once,
    /// so predictions never re-validate order or length.
    pub fn from_artifact(model: TrainedModel) -> Result<Self, ArtifactError> {
        model.verify()?;
        Ok(Self { model: Some(model) })
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ArtifactError> {
        Self::from_artifact(TrainedModel::load(path)?)
    }

    pub fn version(&self) -> Option<&str> {
        self.model.as_ref().map(|m| m.version.as_str())
    }

    pub fn is_learned(&self) -> bool {
        self.model.is_some()
    }

    pub fn predict(&self, features: &FeatureVector) -> Result<Prediction, PredictionError> {
        if let Some(name) = features.first_non_finite() {
            return Err(PredictionError::NonFiniteFeature { name });
        }

        let Some(artifact) = &self.model else {
            return Ok(Prediction::RuleScore(features.compatibility_score.clamp(0.0, 1.0)));
        };

        // An overflowing ensemble sum is a failed prediction, not a certainty
        let raw = artifact.model.raw_score(&features.to_array())?;
        if !raw.is_finite() {
            return Err(PredictionError::NonFiniteOutput);
        }

        Ok(Prediction::Learned(sigmoid(raw).clamp(0.0, 1.0)))
    }
}

/// Shared pointer to the scorer currently in service.
///
/// Ranking calls take one `Arc` snapshot up front; a swap replaces the
/// pointer and never touches a scorer that is already in use.
#[derive(Debug, Clone)]
pub struct ScorerHandle {
    current: Arc<RwLock<Arc<LearnedScorer>>>,
}

impl ScorerHandle {
    pub fn new(scorer: LearnedScorer) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(scorer))),
        }
    }

    pub fn rule_only() -> Self {
        Self::new(LearnedScorer::rule_only())
    }

    pub fn current(&self) -> Arc<LearnedScorer> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Replace the scorer in service, returning the one it replaced
    pub fn swap(&self, scorer: LearnedScorer) -> Arc<LearnedScorer> {
        let next = Arc::new(scorer);
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, next)
    }

    /// Load and verify an artifact, then swap it in.
    /// On failure the previous scorer stays in service.
    pub fn reload_from<P: AsRef<Path>>(&self, path: P) -> Result<Option<String>, ArtifactError> {
        let path = path.as_ref();
        let scorer = match LearnedScorer::load(path) {
            Ok(scorer) => scorer,
            Err(e) => {
                tracing::error!(
                    "Model reload from {} failed, keeping version {:?}: {}",
                    path.display(),
                    self.current().version(),
                    e
                );
                return Err(e);
            }
        };

        let version = scorer.version().map(str::to_string);
        let previous = self.swap(scorer);
        tracing::info!(
            "Swapped model {:?} -> {:?}",
            previous.version(),
            version
        );

        Ok(version)
    }
}

impl Default for ScorerHandle {
    fn default() -> Self {
        Self::rule_only()
    }
}
