//! Offline training pipeline: pick a label source, split, boost, evaluate
//! and publish a new artifact. Nothing is written unless every step succeeds.

use chrono::Utc;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::TrainingSettings;
use crate::core::features::FEATURE_NAMES;
use crate::ml::artifact::{ArtifactError, LabelSource, TrainedModel};
use crate::ml::dataset::Dataset;
use crate::ml::gbdt::{self, BoostedModel, GbdtError};
use crate::ml::metrics::{
    average_precision, precision_at_k, precision_recall, roc_auc, EvaluationReport,
    FeatureImportance, PrecisionAtK,
};
use crate::ml::synthetic::{DistributionError, SyntheticGenerator};
use crate::services::RegistryError;

/// Probability above which a prediction counts as a positive
pub const DECISION_THRESHOLD: f64 = 0.5;

/// Smallest split that still leaves something to learn from and evaluate on
const MIN_TRAINING_SAMPLES: usize = 50;

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("Not enough training data: {found} samples, need at least {required}")]
    InsufficientData { found: usize, required: usize },

    #[error("Training data contains a single class")]
    SingleClass,

    #[error("Training did not converge: {0}")]
    NonConvergence(String),

    #[error(transparent)]
    Distribution(#[from] DistributionError),

    #[error("Artifact error: {0}")]
    Artifact(#[from] ArtifactError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Model error: {0}")]
    Model(GbdtError),
}

impl From<GbdtError> for TrainingError {
    fn from(err: GbdtError) -> Self {
        match err {
            GbdtError::Diverged { .. } => TrainingError::NonConvergence(err.to_string()),
            other => TrainingError::Model(other),
        }
    }
}

/// Choose between historical outcomes and synthetic bootstrap data
pub fn select_labels(
    history: Option<Dataset>,
    settings: &TrainingSettings,
    rng: &mut ChaCha8Rng,
) -> Result<(Dataset, LabelSource), TrainingError> {
    if let Some(history) = history {
        if history.len() >= settings.min_history && history.has_both_classes() {
            tracing::info!(
                "Training on {} historical outcomes ({:.1}% successful)",
                history.len(),
                history.positive_rate() * 100.0
            );
            return Ok((history, LabelSource::Historical));
        }

        tracing::warn!(
            "Only {} usable historical outcomes (need {} with both classes), using synthetic data",
            history.len(),
            settings.min_history
        );
    }

    let generator = SyntheticGenerator::new()?;
    let data = generator.generate(settings.synthetic_samples, rng);
    tracing::info!(
        "Generated {} synthetic samples ({:.1}% successful)",
        data.len(),
        data.positive_rate() * 100.0
    );

    Ok((data, LabelSource::Synthetic))
}

/// Score a model on a held-out split
pub fn evaluate(
    model: &BoostedModel,
    test: &Dataset,
    k_values: &[usize],
) -> Result<EvaluationReport, GbdtError> {
    let scores = test
        .rows()
        .iter()
        .map(|row| model.predict_proba(row))
        .collect::<Result<Vec<f64>, _>>()?;
    let labels = test.labels();

    let (precision, recall) = precision_recall(labels, &scores, DECISION_THRESHOLD);

    let precision_at_k = k_values
        .iter()
        .filter_map(|&k| precision_at_k(labels, &scores, k).map(|precision| PrecisionAtK { k, precision }))
        .collect();

    let mut feature_importance: Vec<FeatureImportance> = model
        .feature_importance()
        .into_iter()
        .zip(FEATURE_NAMES)
        .map(|(gain, name)| FeatureImportance {
            feature: name.to_string(),
            gain,
        })
        .collect();
    feature_importance.sort_by(|a, b| b.gain.total_cmp(&a.gain));

    Ok(EvaluationReport {
        test_samples: test.len(),
        positive_rate: test.positive_rate(),
        precision,
        recall,
        roc_auc: roc_auc(labels, &scores),
        average_precision: average_precision(labels, &scores),
        precision_at_k,
        feature_importance,
    })
}

/// Train and evaluate a model without persisting it
pub fn train(
    settings: &TrainingSettings,
    history: Option<Dataset>,
) -> Result<TrainedModel, TrainingError> {
    let mut rng = ChaCha8Rng::seed_from_u64(settings.seed);

    let (data, label_source) = select_labels(history, settings, &mut rng)?;
    if data.len() < MIN_TRAINING_SAMPLES {
        return Err(TrainingError::InsufficientData {
            found: data.len(),
            required: MIN_TRAINING_SAMPLES,
        });
    }
    if !data.has_both_classes() {
        return Err(TrainingError::SingleClass);
    }

    let (train_part, test) = data.stratified_split(settings.test_ratio, &mut rng);
    let (train_set, validation) = train_part.stratified_split(settings.validation_ratio, &mut rng);
    if !train_set.has_both_classes() {
        return Err(TrainingError::SingleClass);
    }

    tracing::info!(
        "Split: {} train, {} validation, {} test",
        train_set.len(),
        validation.len(),
        test.len()
    );

    let validation_pair = (!validation.is_empty()).then(|| (validation.rows(), validation.labels()));
    let report = gbdt::fit(
        &settings.boosting,
        (train_set.rows(), train_set.labels()),
        validation_pair,
        &mut rng,
    )?;

    if report.model.trees.is_empty() {
        return Err(TrainingError::NonConvergence("no trees were kept".to_string()));
    }

    tracing::info!(
        "Boosting finished after {} rounds, keeping {} trees (validation AUC {:?})",
        report.rounds_run,
        report.best_round,
        report.best_validation_auc
    );

    let evaluation = if test.is_empty() {
        None
    } else {
        let evaluation = evaluate(&report.model, &test, &settings.precision_k)?;
        evaluation.log();
        Some(evaluation)
    };

    Ok(TrainedModel::new(report.model, label_source, evaluation, Utc::now()))
}

/// Train, then publish a new artifact into `artifact_dir`
pub fn train_and_publish<P: AsRef<Path>>(
    settings: &TrainingSettings,
    history: Option<Dataset>,
    artifact_dir: P,
) -> Result<(TrainedModel, PathBuf), TrainingError> {
    let artifact = train(settings, history)?;
    let path = artifact.publish(artifact_dir)?;
    Ok((artifact, path))
}
