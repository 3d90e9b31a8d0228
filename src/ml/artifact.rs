use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

use crate::core::features::FEATURE_NAMES;
use crate::ml::gbdt::{BoostedModel, GbdtError};
use crate::ml::metrics::EvaluationReport;

/// Artifact layout version understood by this build
pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

const ARTIFACT_PREFIX: &str = "match-model-";
const ARTIFACT_EXTENSION: &str = "json";

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unsupported artifact format version {0}")]
    UnsupportedFormat(u32),

    #[error("Feature schema mismatch: expected {expected:?}, artifact has {found:?}")]
    SchemaMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("Invalid model: {0}")]
    InvalidModel(#[from] GbdtError),

    #[error("Artifact already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("Artifact path {0} is outside the model directory")]
    OutsideArtifactDir(PathBuf),
}

impl ArtifactError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        ArtifactError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Where the training examples of an artifact came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelSource {
    Historical,
    Synthetic,
}

/// A trained scorer plus the feature order it was trained against.
///
/// Written once by the training pipeline and never modified afterwards;
/// retraining produces a new artifact with a new version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedModel {
    pub format_version: u32,
    pub version: String,
    pub created_at: DateTime<Utc>,
    pub feature_names: Vec<String>,
    pub label_source: LabelSource,
    pub model: BoostedModel,
    #[serde(default)]
    pub evaluation: Option<EvaluationReport>,
}

impl TrainedModel {
    pub fn new(
        model: BoostedModel,
        label_source: LabelSource,
        evaluation: Option<EvaluationReport>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        Self {
            format_version: ARTIFACT_FORMAT_VERSION,
            version: format!("{}-{}", created_at.format("%Y%m%d%H%M%S"), &suffix[..8]),
            created_at,
            feature_names: FEATURE_NAMES.iter().map(|name| name.to_string()).collect(),
            label_source,
            model,
            evaluation,
        }
    }

    /// Check the artifact against the feature builder's schema and the
    /// structural soundness of every tree
    pub fn verify(&self) -> Result<(), ArtifactError> {
        if self.format_version != ARTIFACT_FORMAT_VERSION {
            return Err(ArtifactError::UnsupportedFormat(self.format_version));
        }

        let schema_matches = self.feature_names.len() == FEATURE_NAMES.len()
            && self
                .feature_names
                .iter()
                .zip(FEATURE_NAMES)
                .all(|(found, expected)| found == expected);

        if !schema_matches || self.model.num_features != FEATURE_NAMES.len() {
            return Err(ArtifactError::SchemaMismatch {
                expected: FEATURE_NAMES.iter().map(|name| name.to_string()).collect(),
                found: self.feature_names.clone(),
            });
        }

        self.model.validate()?;
        Ok(())
    }

    /// Read and verify an artifact. Fails closed on a missing or foreign schema.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ArtifactError> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|e| ArtifactError::io(path, e))?;
        let artifact: TrainedModel = serde_json::from_slice(&bytes)?;
        artifact.verify()?;

        tracing::info!(
            "Loaded model artifact {} ({} trees) from {}",
            artifact.version,
            artifact.model.trees.len(),
            path.display()
        );

        Ok(artifact)
    }

    pub fn file_name(&self) -> String {
        format!("{}{}.{}", ARTIFACT_PREFIX, self.version, ARTIFACT_EXTENSION)
    }

    /// Write the artifact as a new file under `dir` and return its path.
    ///
    /// Existing artifacts are never overwritten. The content goes to a
    /// temporary file first and is renamed into place once fully written.
    pub fn publish<P: AsRef<Path>>(&self, dir: P) -> Result<PathBuf, ArtifactError> {
        self.verify()?;

        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|e| ArtifactError::io(dir, e))?;

        let target = dir.join(self.file_name());
        if target.exists() {
            return Err(ArtifactError::AlreadyExists(target));
        }

        let staging = dir.join(format!(".{}.tmp", self.file_name()));
        let json = serde_json::to_vec_pretty(self)?;

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&staging)
            .map_err(|e| ArtifactError::io(&staging, e))?;
        let written = file
            .write_all(&json)
            .and_then(|_| file.sync_all())
            .map_err(|e| ArtifactError::io(&staging, e));
        drop(file);

        if let Err(e) = written {
            let _ = fs::remove_file(&staging);
            return Err(e);
        }

        fs::rename(&staging, &target).map_err(|e| ArtifactError::io(&target, e))?;

        tracing::info!("Published model artifact {} to {}", self.version, target.display());
        Ok(target)
    }
}

/// Most recently created artifact file in `dir`, by file name
pub fn latest_artifact<P: AsRef<Path>>(dir: P) -> Result<Option<PathBuf>, ArtifactError> {
    let dir = dir.as_ref();
    if !dir.exists() {
        return Ok(None);
    }

    let entries = fs::read_dir(dir).map_err(|e| ArtifactError::io(dir, e))?;
    let mut newest: Option<PathBuf> = None;

    for entry in entries {
        let path = entry.map_err(|e| ArtifactError::io(dir, e))?.path();
        let is_artifact = path
            .file_name()
            .and_then(|name| name.to_str())
            .map_or(false, |name| {
                name.starts_with(ARTIFACT_PREFIX) && name.ends_with(ARTIFACT_EXTENSION)
            });

        if is_artifact && newest.as_ref().map_or(true, |current| path > *current) {
            newest = Some(path);
        }
    }

    Ok(newest)
}

/// Explicit artifact path if given, otherwise the newest artifact in `dir`
pub fn locate_artifact(explicit: Option<&Path>, dir: &Path) -> Result<Option<PathBuf>, ArtifactError> {
    match explicit {
        Some(path) => Ok(Some(path.to_path_buf())),
        None => latest_artifact(dir),
    }
}

/// Resolve a caller-supplied artifact name inside `dir`.
///
/// Accepts a bare file name, or `dir` joined with a file name. Anything
/// else is rejected before the filesystem is touched.
pub fn resolve_in_dir(requested: &Path, dir: &Path) -> Result<PathBuf, ArtifactError> {
    let outside = || ArtifactError::OutsideArtifactDir(requested.to_path_buf());

    let mut components = requested.components();
    let Some(Component::Normal(name)) = components.next_back() else {
        return Err(outside());
    };
    if components.as_path() != Path::new("") && components.as_path() != dir {
        return Err(outside());
    }

    Ok(dir.join(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::gbdt::{Node, Tree};

    fn tiny_model() -> BoostedModel {
        BoostedModel {
            base_score: 0.0,
            num_features: FEATURE_NAMES.len(),
            trees: vec![Tree::new(vec![
                Node::split(0, 0.5, 1.0, 1, 2),
                Node::leaf(-1.0),
                Node::leaf(1.0),
            ])],
        }
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("organ-match-{}-{}", name, uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_verify_accepts_current_schema() {
        let artifact = TrainedModel::new(tiny_model(), LabelSource::Synthetic, None, Utc::now());
        assert!(artifact.verify().is_ok());
    }

    #[test]
    fn test_verify_rejects_reordered_schema() {
        let mut artifact = TrainedModel::new(tiny_model(), LabelSource::Synthetic, None, Utc::now());
        artifact.feature_names.swap(0, 1);
        assert!(matches!(artifact.verify(), Err(ArtifactError::SchemaMismatch { .. })));
    }

    #[test]
    fn test_verify_rejects_short_schema() {
        let mut artifact = TrainedModel::new(tiny_model(), LabelSource::Synthetic, None, Utc::now());
        artifact.feature_names.pop();
        assert!(matches!(artifact.verify(), Err(ArtifactError::SchemaMismatch { .. })));
    }

    #[test]
    fn test_load_without_schema_fails_closed() {
        let dir = scratch_dir("noschema");
        let path = dir.join("model.json");
        let mut value = serde_json::to_value(TrainedModel::new(
            tiny_model(),
            LabelSource::Synthetic,
            None,
            Utc::now(),
        ))
        .unwrap();
        value.as_object_mut().unwrap().remove("feature_names");
        fs::write(&path, serde_json::to_vec(&value).unwrap()).unwrap();

        assert!(matches!(TrainedModel::load(&path), Err(ArtifactError::Serialization(_))));
        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_publish_then_load() {
        let dir = scratch_dir("publish");
        let artifact = TrainedModel::new(tiny_model(), LabelSource::Synthetic, None, Utc::now());

        let path = artifact.publish(&dir).unwrap();
        let loaded = TrainedModel::load(&path).unwrap();
        assert_eq!(loaded, artifact);

        // Publishing the same version again must not overwrite it
        assert!(matches!(artifact.publish(&dir), Err(ArtifactError::AlreadyExists(_))));
        assert_eq!(latest_artifact(&dir).unwrap(), Some(path));

        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_latest_artifact_missing_dir() {
        let dir = std::env::temp_dir().join(format!("organ-match-missing-{}", uuid::Uuid::new_v4()));
        assert_eq!(latest_artifact(&dir).unwrap(), None);
    }

    #[test]
    fn test_resolve_in_dir() {
        let dir = Path::new("models");
        let expected = PathBuf::from("models/match-model-1.json");

        assert_eq!(resolve_in_dir(Path::new("match-model-1.json"), dir).unwrap(), expected);
        assert_eq!(resolve_in_dir(Path::new("models/match-model-1.json"), dir).unwrap(), expected);

        for requested in ["/etc/hostname", "../match-model-1.json", "models/../secret.json", "other/match-model-1.json", "..", ""] {
            assert!(
                matches!(resolve_in_dir(Path::new(requested), dir), Err(ArtifactError::OutsideArtifactDir(_))),
                "{} was accepted",
                requested
            );
        }
    }
}
