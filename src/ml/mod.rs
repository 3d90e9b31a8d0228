pub mod artifact;
pub mod dataset;
pub mod gbdt;
pub mod metrics;
pub mod scorer;
pub mod synthetic;
pub mod training;

pub use artifact::{ArtifactError, LabelSource, TrainedModel};
pub use dataset::Dataset;
pub use scorer::{LearnedScorer, Prediction, PredictionError, ScorerHandle};
pub use training::TrainingError;
