use chrono::{DateTime, Utc};

use crate::core::compatibility::{compatible_blood_groups, evaluate, passes_hard_constraints};
use crate::core::features::build_features;
use crate::core::scoring::{final_score, rule_score, HybridWeights, RuleWeights};
use crate::error::{MatchError, ValidationError};
use crate::ml::scorer::{LearnedScorer, Prediction, ScorerHandle};
use crate::models::{DonorCandidate, MatchRecord, MatchResult, PatientRequest, ProbabilitySource};
use crate::services::Registry;

/// Per-call ranking parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankOptions {
    pub max_results: usize,
    pub search_radius_km: f64,
    /// Results are persisted against this case when set
    pub case_id: Option<i64>,
    /// Instant that listing freshness is measured against
    pub evaluated_at: DateTime<Utc>,
}

impl RankOptions {
    pub fn new(max_results: usize, search_radius_km: f64) -> Self {
        Self {
            max_results,
            search_radius_km,
            case_id: None,
            evaluated_at: Utc::now(),
        }
    }

    pub fn for_case(mut self, case_id: i64) -> Self {
        self.case_id = Some(case_id);
        self
    }

    pub fn at(mut self, evaluated_at: DateTime<Utc>) -> Self {
        self.evaluated_at = evaluated_at;
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_results == 0 {
            return Err(ValidationError::NoResultsRequested);
        }
        if !self.search_radius_km.is_finite() || self.search_radius_km <= 0.0 {
            return Err(ValidationError::InvalidSearchRadius(self.search_radius_km));
        }
        Ok(())
    }
}

/// Outcome of a ranking call
#[derive(Debug, Clone, PartialEq)]
pub struct Ranking {
    pub matches: Vec<MatchResult>,
    /// Candidates returned by the registry, before radius filtering and truncation
    pub total_candidates: usize,
    /// Model that produced the learned probabilities, if any
    pub model_version: Option<String>,
}

/// Ranking orchestrator
///
/// # Pipeline Stages
/// 1. Validation of the request and options
/// 2. Registry query by organ type and compatible blood groups
/// 3. Hard constraint and search radius filtering
/// 4. Feature building, rule score and learned probability
/// 5. Hybrid scoring, ordering and truncation
/// 6. Persistence for case-bound calls
#[derive(Debug, Clone, Default)]
pub struct Matcher {
    rule_weights: RuleWeights,
    hybrid_weights: HybridWeights,
    scorer: ScorerHandle,
}

impl Matcher {
    pub fn new(scorer: ScorerHandle) -> Self {
        Self {
            rule_weights: RuleWeights::default(),
            hybrid_weights: HybridWeights::default(),
            scorer,
        }
    }

    pub fn rule_only() -> Self {
        Self::new(ScorerHandle::rule_only())
    }

    pub fn scorer(&self) -> &ScorerHandle {
        &self.scorer
    }

    /// Rank compatible donors for a patient.
    ///
    /// Fails before touching the registry on invalid input. A registry
    /// failure fails the whole call; no partial list is returned.
    pub async fn rank<R: Registry>(
        &self,
        registry: &R,
        request: &PatientRequest,
        options: &RankOptions,
    ) -> Result<Ranking, MatchError> {
        options.validate()?;
        request.validate()?;

        // One snapshot per call; a concurrent swap does not affect this ranking
        let scorer = self.scorer.current();
        let model_version = scorer.version().map(str::to_string);

        let blood_groups = compatible_blood_groups(request.blood_group);
        let candidates = registry
            .find_candidates(request.organ_type, blood_groups)
            .await?;

        let total_candidates = candidates.len();
        let matches = self.score_candidates(&scorer, request, &candidates, options);

        tracing::debug!(
            "Ranked {} of {} {} candidates for blood group {}",
            matches.len(),
            total_candidates,
            request.organ_type,
            request.blood_group
        );

        if let Some(case_id) = options.case_id {
            if !matches.is_empty() {
                let created_at = Utc::now();
                let records: Vec<MatchRecord> = matches
                    .iter()
                    .map(|m| MatchRecord::pending(case_id, m, model_version.as_deref(), created_at))
                    .collect();
                registry.record_matches(&records).await?;
                tracing::info!("Persisted {} matches for case {}", records.len(), case_id);
            }
        }

        Ok(Ranking {
            matches,
            total_candidates,
            model_version,
        })
    }

    /// Rank for a stored emergency case and persist the results against it
    pub async fn rank_case<R: Registry>(
        &self,
        registry: &R,
        case_id: i64,
        options: &RankOptions,
    ) -> Result<Ranking, MatchError> {
        options.validate()?;

        let request = registry
            .find_case(case_id)
            .await?
            .ok_or(MatchError::CaseNotFound(case_id))?;

        self.rank(registry, &request, &options.for_case(case_id)).await
    }

    /// Score, order and truncate candidates. Pure and synchronous.
    pub fn score_candidates(
        &self,
        scorer: &LearnedScorer,
        request: &PatientRequest,
        candidates: &[DonorCandidate],
        options: &RankOptions,
    ) -> Vec<MatchResult> {
        let mut results: Vec<MatchResult> = candidates
            .iter()
            .filter(|donor| passes_hard_constraints(request, donor))
            .filter_map(|donor| self.score_candidate(scorer, request, donor, options))
            .collect();

        // Highest score first; equal scores by lower donor id
        results.sort_by(|a, b| {
            b.final_score
                .total_cmp(&a.final_score)
                .then_with(|| a.donor_id.cmp(&b.donor_id))
        });

        results.truncate(options.max_results);
        results
    }

    fn score_candidate(
        &self,
        scorer: &LearnedScorer,
        request: &PatientRequest,
        donor: &DonorCandidate,
        options: &RankOptions,
    ) -> Option<MatchResult> {
        let signals = evaluate(request, donor, options.search_radius_km);
        if !signals.location.within_radius(options.search_radius_km) {
            return None;
        }

        let compatibility_score = rule_score(&signals, &self.rule_weights);
        let features = build_features(
            request,
            donor,
            &signals,
            compatibility_score,
            options.search_radius_km,
            options.evaluated_at,
        );

        let (match_probability, probability_source) = match scorer.predict(&features) {
            Ok(Prediction::Learned(p)) => (p, ProbabilitySource::Model),
            Ok(Prediction::RuleScore(p)) => (p, ProbabilitySource::RuleScore),
            Err(e) => {
                tracing::warn!(
                    "Prediction failed for donor {}, using rule score: {}",
                    donor.donor_id,
                    e
                );
                (compatibility_score, ProbabilitySource::RuleScore)
            }
        };

        Some(MatchResult {
            donor_id: donor.donor_id,
            compatibility_score,
            match_probability,
            probability_source,
            urgency_weight: features.urgency_weight,
            final_score: final_score(&features, match_probability, &self.hybrid_weights),
            blood_compatible: signals.blood_compatible,
            organ_match: signals.organ_match,
            age_compatible: signals.age_compatible,
            distance_km: signals.location.distance_km,
            features,
        })
    }
}
