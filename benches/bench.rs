// Criterion benchmarks for Organ Match

use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use organ_match::config::TrainingSettings;
use organ_match::core::distance::haversine_distance;
use organ_match::ml::gbdt::{fit, BoostingParams};
use organ_match::ml::synthetic::SyntheticGenerator;
use organ_match::ml::training::train;
use organ_match::models::{ApprovalStatus, BloodGroup, DonorCandidate, Location, OrganType, PatientRequest};
use organ_match::{LearnedScorer, Matcher, RankOptions};

fn create_candidate(id: usize) -> DonorCandidate {
    let lat_offset = (id as f64 * 0.003) % 2.0;
    let lon_offset = (id as f64 * 0.002) % 2.0;
    DonorCandidate {
        donor_id: id as i64,
        organ_type: OrganType::Kidney,
        blood_group: BloodGroup::ALL[id % 8],
        age: 25 + (id % 40) as u32,
        location: Location::default().with_coordinates(18.5 + lat_offset, 73.8 + lon_offset),
        is_available: true,
        approval_status: ApprovalStatus::Approved,
        reliability_score: if id % 4 == 0 { None } else { Some(0.6) },
        registered_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days((id % 300) as i64),
    }
}

fn create_patient() -> PatientRequest {
    PatientRequest {
        organ_type: OrganType::Kidney,
        blood_group: BloodGroup::ONeg,
        age: 42,
        urgency_level: 4,
        location: Location::city("Pune", "Maharashtra").with_coordinates(18.5204, 73.8567),
    }
}

fn bench_haversine_distance(c: &mut Criterion) {
    c.bench_function("haversine_distance", |b| {
        b.iter(|| {
            haversine_distance(
                black_box(19.0760),
                black_box(72.8777),
                black_box(18.5204),
                black_box(73.8567),
            )
        });
    });
}

fn bench_score_candidates(c: &mut Criterion) {
    let matcher = Matcher::rule_only();
    let patient = create_patient();
    let options = RankOptions::new(20, 500.0).at(Utc.with_ymd_and_hms(2024, 12, 1, 0, 0, 0).unwrap());

    let settings = TrainingSettings {
        synthetic_samples: 2000,
        ..TrainingSettings::default()
    };
    let learned = train(&settings, None)
        .ok()
        .and_then(|artifact| LearnedScorer::from_artifact(artifact).ok());
    let rule_only = LearnedScorer::rule_only();

    let mut group = c.benchmark_group("score_candidates");

    for candidate_count in [10, 100, 1000, 5000].iter() {
        let candidates: Vec<DonorCandidate> = (0..*candidate_count).map(create_candidate).collect();

        group.bench_with_input(
            BenchmarkId::new("rule_only", candidate_count),
            candidate_count,
            |b, _| {
                b.iter(|| {
                    matcher.score_candidates(
                        &rule_only,
                        black_box(&patient),
                        black_box(&candidates),
                        &options,
                    )
                });
            },
        );

        if let Some(scorer) = &learned {
            group.bench_with_input(
                BenchmarkId::new("learned", candidate_count),
                candidate_count,
                |b, _| {
                    b.iter(|| {
                        matcher.score_candidates(scorer, black_box(&patient), black_box(&candidates), &options)
                    });
                },
            );
        }
    }

    group.finish();
}

fn bench_boosting_fit(c: &mut Criterion) {
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let data = match SyntheticGenerator::new() {
        Ok(generator) => generator.generate(2000, &mut rng),
        Err(_) => return,
    };
    let params = BoostingParams {
        num_rounds: 20,
        max_depth: 4,
        ..BoostingParams::default()
    };

    let mut group = c.benchmark_group("training");
    group.sample_size(10);
    group.bench_function("fit_2000_rows_20_rounds", |b| {
        b.iter(|| {
            let mut rng = ChaCha8Rng::seed_from_u64(7);
            fit(&params, (data.rows(), data.labels()), None, &mut rng)
        });
    });
    group.finish();
}

criterion_group!(benches, bench_haversine_distance, bench_score_candidates, bench_boosting_fit);

criterion_main!(benches);
