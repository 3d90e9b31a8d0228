//! Offline training job. Reads outcome history from PostgreSQL when
//! reachable, trains a new scorer and publishes it as a fresh artifact.
//! A failed run leaves every existing artifact untouched.

use std::process::ExitCode;
use tracing::{error, info, warn};

use organ_match::config::Settings;
use organ_match::ml::training::{train_and_publish, TrainingError};
use organ_match::ml::Dataset;
use organ_match::{logging, PostgresRegistry};

async fn load_history(settings: &Settings) -> Result<Dataset, TrainingError> {
    let registry = PostgresRegistry::from_settings(&settings.database).await?;
    Ok(registry.training_history().await?)
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();

    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    logging::init(&settings.logging);
    info!("Starting model training (seed {})", settings.training.seed);

    let history = match load_history(&settings).await {
        Ok(history) => Some(history),
        Err(e) => {
            warn!("Outcome history unavailable ({}), training on synthetic data", e);
            None
        }
    };

    let training = settings.training.clone();
    let artifact_dir = settings.model.artifact_dir.clone();

    // CPU-bound; rayon parallelizes split search inside
    let outcome =
        tokio::task::spawn_blocking(move || train_and_publish(&training, history, &artifact_dir)).await;

    match outcome {
        Ok(Ok((artifact, path))) => {
            info!(
                "Published model {} ({} trees, {:?} labels) to {}",
                artifact.version,
                artifact.model.trees.len(),
                artifact.label_source,
                path.display()
            );
            ExitCode::SUCCESS
        }
        Ok(Err(e)) => {
            error!("Training failed, deployed models are unchanged: {}", e);
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("Training task panicked: {}", e);
            ExitCode::FAILURE
        }
    }
}
