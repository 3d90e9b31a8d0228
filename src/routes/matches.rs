use actix_web::{http::StatusCode, web, HttpResponse, Responder};
use validator::Validate;

use crate::core::{RankOptions, Ranking};
use crate::error::{MatchError, ValidationError};
use crate::models::{ErrorResponse, HealthResponse, PatientRequest, RankRequest, RankResponse};
use crate::routes::AppState;
use crate::services::Registry;

/// Configure ranking and health routes
pub fn configure<R: Registry + 'static>(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check::<R>))
        .route("/matches/rank", web::post().to(rank_matches::<R>));
}

/// Health check endpoint
async fn health_check<R: Registry + 'static>(state: web::Data<AppState<R>>) -> impl Responder {
    let registry_healthy = state.registry.health_check().await.unwrap_or(false);
    let status = if registry_healthy { "healthy" } else { "degraded" };

    HttpResponse::Ok().json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        model_version: state.matcher.scorer().current().version().map(str::to_string),
        timestamp: chrono::Utc::now(),
    })
}

/// Map a ranking failure to its HTTP status and JSON body
pub fn error_response(err: &MatchError) -> HttpResponse {
    let (status, error) = match err {
        MatchError::Validation(_) => (StatusCode::BAD_REQUEST, "Validation failed"),
        MatchError::CaseNotFound(_) => (StatusCode::NOT_FOUND, "Case not found"),
        MatchError::StoreUnavailable(_) if err.is_retryable() => {
            (StatusCode::SERVICE_UNAVAILABLE, "Registry unavailable")
        }
        MatchError::StoreUnavailable(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Registry error"),
    };

    HttpResponse::build(status).json(ErrorResponse {
        error: error.to_string(),
        message: err.to_string(),
        status_code: status.as_u16(),
        retryable: err.is_retryable(),
    })
}

/// Rank donors endpoint
///
/// POST /api/v1/matches/rank
///
/// Request body:
/// ```json
/// {
///   "caseId": 12,
///   "patient": {
///     "organType": "kidney",
///     "bloodGroup": "O-",
///     "age": 40,
///     "urgencyLevel": 4,
///     "location": { "city": "Pune", "state": "Maharashtra" }
///   },
///   "maxResults": 20,
///   "searchRadiusKm": 500
/// }
/// ```
///
/// Exactly one of `caseId` and `patient` must be given.
async fn rank_matches<R: Registry + 'static>(
    state: web::Data<AppState<R>>,
    req: web::Json<RankRequest>,
) -> HttpResponse {
    if let Err(errors) = req.validate() {
        tracing::info!("Validation failed for rank request: field_errors={:?}", errors);
        return HttpResponse::BadRequest().json(ErrorResponse {
            error: "Validation failed".to_string(),
            message: errors.to_string(),
            status_code: 400,
            retryable: false,
        });
    }

    let max_results = req
        .max_results
        .unwrap_or(state.matching.default_max_results)
        .min(state.matching.max_results_cap);
    let search_radius_km = req
        .search_radius_km
        .unwrap_or(state.matching.default_search_radius_km);
    let options = RankOptions::new(max_results, search_radius_km);

    let result: Result<Ranking, MatchError> = match (req.case_id, &req.patient) {
        (Some(case_id), None) => {
            tracing::info!("Ranking donors for case {}, limit {}", case_id, max_results);
            state
                .matcher
                .rank_case(state.registry.as_ref(), case_id, &options)
                .await
        }
        (None, Some(payload)) => match PatientRequest::try_from(payload) {
            Ok(patient) => {
                tracing::info!(
                    "Ranking {} donors for blood group {}, limit {}",
                    patient.organ_type,
                    patient.blood_group,
                    max_results
                );
                state
                    .matcher
                    .rank(state.registry.as_ref(), &patient, &options)
                    .await
            }
            Err(e) => Err(e.into()),
        },
        (Some(_), Some(_)) => Err(ValidationError::ConflictingTarget.into()),
        (None, None) => Err(ValidationError::MissingField("caseId or patient").into()),
    };

    match result {
        Ok(ranking) => {
            tracing::info!(
                "Returning {} matches (from {} candidates, model {:?})",
                ranking.matches.len(),
                ranking.total_candidates,
                ranking.model_version
            );

            HttpResponse::Ok().json(RankResponse {
                case_id: req.case_id,
                total_candidates: ranking.total_candidates,
                model_version: ranking.model_version,
                matches: ranking.matches.into_iter().map(Into::into).collect(),
            })
        }
        Err(e) => {
            if e.is_retryable() {
                tracing::error!("Ranking failed: {}", e);
            } else {
                tracing::info!("Ranking rejected: {}", e);
            }
            error_response(&e)
        }
    }
}
