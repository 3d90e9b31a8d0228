// Training pipeline tests for Organ Match

use actix_web::{test, web, App};
use chrono::{TimeZone, Utc};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use organ_match::config::{MatchingSettings, ModelSettings, TrainingSettings};
use organ_match::ml::artifact::{latest_artifact, ArtifactError};
use organ_match::ml::synthetic::SyntheticGenerator;
use organ_match::ml::training::{train, train_and_publish};
use organ_match::ml::{LabelSource, Prediction};
use organ_match::models::{
    ApprovalStatus, BloodGroup, DonorCandidate, Location, OrganType, PatientRequest, ProbabilitySource,
};
use organ_match::routes::{self, AppState};
use organ_match::{InMemoryRegistry, LearnedScorer, Matcher, RankOptions, ScorerHandle, TrainedModel};

fn scratch_dir(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("organ-match-{}-{}", name, uuid::Uuid::new_v4()))
}

fn quick_settings() -> TrainingSettings {
    let mut settings = TrainingSettings {
        synthetic_samples: 1200,
        ..TrainingSettings::default()
    };
    settings.boosting.num_rounds = 30;
    settings.boosting.max_depth = 3;
    settings
}

fn donor(id: i64, blood_group: BloodGroup) -> DonorCandidate {
    DonorCandidate {
        donor_id: id,
        organ_type: OrganType::Kidney,
        blood_group,
        age: 30 + id as u32,
        location: Location::city("Pune", "Maharashtra"),
        is_available: true,
        approval_status: ApprovalStatus::Approved,
        reliability_score: Some(0.8),
        registered_at: Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
    }
}

#[::core::prelude::v1::test]
fn test_published_artifact_carries_schema() {
    let dir = scratch_dir("schema");
    let (artifact, path) = train_and_publish(&quick_settings(), None, &dir).unwrap();

    assert_eq!(artifact.label_source, LabelSource::Synthetic);
    assert!(path.file_name().unwrap().to_str().unwrap().starts_with("match-model-"));

    let raw: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
    let names: Vec<&str> = raw["feature_names"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap())
        .collect();
    assert_eq!(names, organ_match::core::FEATURE_NAMES.to_vec());

    assert_eq!(TrainedModel::load(&path).unwrap(), artifact);
    fs::remove_dir_all(dir).ok();
}

#[::core::prelude::v1::test]
fn test_reloaded_model_is_bit_identical() {
    let dir = scratch_dir("bits");
    let settings = TrainingSettings {
        synthetic_samples: 2000,
        ..quick_settings()
    };
    let trained = train(&settings, None).unwrap();
    let path = trained.publish(&dir).unwrap();
    let loaded = TrainedModel::load(&path).unwrap();

    assert_eq!(loaded.model.base_score.to_bits(), trained.model.base_score.to_bits());
    assert_eq!(loaded, trained);

    let generator = SyntheticGenerator::new().unwrap();
    let mut rng = ChaCha8Rng::seed_from_u64(11);
    let sample_rows = generator.generate(200, &mut rng);
    for row in sample_rows.rows() {
        let before = trained.model.predict_proba(row).unwrap();
        let after = loaded.model.predict_proba(row).unwrap();
        assert_eq!(before.to_bits(), after.to_bits());
    }
    fs::remove_dir_all(dir).ok();
}

#[::core::prelude::v1::test]
fn test_retraining_adds_new_artifact() {
    let dir = scratch_dir("retrain");
    let (_, first) = train_and_publish(&quick_settings(), None, &dir).unwrap();
    let before = fs::read(&first).unwrap();

    let (_, second) = train_and_publish(&quick_settings(), None, &dir).unwrap();

    assert_ne!(first, second);
    assert_eq!(fs::read(&first).unwrap(), before);
    assert_eq!(fs::read_dir(&dir).unwrap().count(), 2);
    assert!(latest_artifact(&dir).unwrap().is_some());
    fs::remove_dir_all(dir).ok();
}

#[::core::prelude::v1::test]
fn test_reload_then_rank_with_model() {
    let dir = scratch_dir("reload");
    let (artifact, path) = train_and_publish(&quick_settings(), None, &dir).unwrap();

    let handle = ScorerHandle::rule_only();
    let matcher = Matcher::new(handle.clone());
    assert_eq!(handle.reload_from(&path).unwrap(), Some(artifact.version.clone()));

    let registry = InMemoryRegistry::with_donors((1..=5).map(|id| donor(id, BloodGroup::ONeg)).collect());
    let patient = PatientRequest {
        organ_type: OrganType::Kidney,
        blood_group: BloodGroup::ONeg,
        age: 33,
        urgency_level: 5,
        location: Location::city("Pune", "Maharashtra"),
    };
    let options = RankOptions::new(10, 500.0).at(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap());

    let ranking = tokio_test::block_on(matcher.rank(&registry, &patient, &options)).unwrap();

    assert_eq!(ranking.model_version.as_deref(), Some(artifact.version.as_str()));
    assert_eq!(ranking.matches.len(), 5);
    for m in &ranking.matches {
        assert_eq!(m.probability_source, ProbabilitySource::Model);
        assert!((0.0..=1.0).contains(&m.match_probability));
        assert!((0.0..=1.0).contains(&m.final_score));
    }
    fs::remove_dir_all(dir).ok();
}

#[::core::prelude::v1::test]
fn test_incompatible_artifact_is_rejected_and_previous_kept() {
    let dir = scratch_dir("mismatch");
    let (artifact, path) = train_and_publish(&quick_settings(), None, &dir).unwrap();
    let handle = ScorerHandle::new(LearnedScorer::from_artifact(artifact.clone()).unwrap());

    let mut raw: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
    raw["feature_names"].as_array_mut().unwrap().reverse();
    let tampered = dir.join("tampered.json");
    fs::write(&tampered, serde_json::to_vec(&raw).unwrap()).unwrap();

    assert!(matches!(handle.reload_from(&tampered), Err(ArtifactError::SchemaMismatch { .. })));
    assert_eq!(handle.current().version(), Some(artifact.version.as_str()));
    fs::remove_dir_all(dir).ok();
}

#[::core::prelude::v1::test]
fn test_learned_scorer_separates_blood_compatibility() {
    let dir = scratch_dir("signal");
    let (artifact, _) = train_and_publish(&quick_settings(), None, &dir).unwrap();
    let scorer = LearnedScorer::from_artifact(artifact).unwrap();

    let good = organ_match::core::FeatureVector {
        blood_compatible: 1.0,
        organ_match: 1.0,
        age_compatible: 1.0,
        distance_normalized: 0.1,
        urgency_weight: 1.0,
        reliability_score: 0.9,
        freshness_score: 1.0,
        compatibility_score: 0.99,
    };
    let bad = organ_match::core::FeatureVector {
        blood_compatible: 0.0,
        organ_match: 0.0,
        age_compatible: 0.0,
        compatibility_score: 0.09,
        ..good
    };

    let p = |features| match scorer.predict(features).unwrap() {
        Prediction::Learned(p) => p,
        other => panic!("expected a learned prediction, got {:?}", other),
    };
    assert!(p(&good) > p(&bad));
    fs::remove_dir_all(dir).ok();
}

fn reload_state(artifact_dir: PathBuf) -> AppState<InMemoryRegistry> {
    AppState {
        registry: Arc::new(InMemoryRegistry::new()),
        matcher: Matcher::rule_only(),
        matching: MatchingSettings::default(),
        model: ModelSettings {
            artifact_path: None,
            artifact_dir,
        },
    }
}

fn reload_request(path: &str) -> test::TestRequest {
    test::TestRequest::post()
        .uri("/api/v1/model/reload")
        .set_json(serde_json::json!({ "path": path }))
}

#[actix_web::test]
async fn test_http_reload_confined_to_artifact_dir() {
    let dir = scratch_dir("served");
    let elsewhere = scratch_dir("elsewhere");
    let (served, served_path) = train_and_publish(&quick_settings(), None, &dir).unwrap();
    let (_, foreign_path) = train_and_publish(&quick_settings(), None, &elsewhere).unwrap();

    let state = reload_state(dir.clone());
    let scorer = state.matcher.scorer().clone();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(routes::configure_routes::<InMemoryRegistry>),
    )
    .await;

    let foreign = foreign_path.to_str().unwrap();
    for rejected in ["/etc/hostname", "/definitely/not/here", "../escape.json", foreign] {
        let resp = test::call_service(&app, reload_request(rejected).to_request()).await;
        assert_eq!(resp.status(), 400, "{} was not rejected", rejected);
    }
    assert!(!scorer.current().is_learned());

    let resp = test::call_service(&app, reload_request("match-model-missing.json").to_request()).await;
    assert_eq!(resp.status(), 404);

    let name = served_path.file_name().unwrap().to_str().unwrap();
    let body: serde_json::Value = test::call_and_read_body_json(&app, reload_request(name).to_request()).await;
    assert_eq!(body["modelVersion"], served.version.as_str());
    assert_eq!(scorer.current().version(), Some(served.version.as_str()));

    fs::remove_dir_all(dir).ok();
    fs::remove_dir_all(elsewhere).ok();
}
