use actix_web::{http::StatusCode, web, HttpResponse};

use crate::ml::artifact::{locate_artifact, resolve_in_dir, ArtifactError};
use crate::models::{ErrorResponse, ModelReloadRequest, ModelReloadResponse};
use crate::routes::AppState;
use crate::services::Registry;

/// Configure model management routes
pub fn configure<R: Registry + 'static>(cfg: &mut web::ServiceConfig) {
    cfg.route("/model/reload", web::post().to(reload_model::<R>));
}

fn artifact_error(err: &ArtifactError) -> HttpResponse {
    let status = match err {
        ArtifactError::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound => {
            StatusCode::NOT_FOUND
        }
        ArtifactError::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        ArtifactError::OutsideArtifactDir(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::UNPROCESSABLE_ENTITY,
    };

    HttpResponse::build(status).json(ErrorResponse {
        error: "Model reload failed".to_string(),
        message: err.to_string(),
        status_code: status.as_u16(),
        retryable: false,
    })
}

/// Swap in a new model artifact
///
/// POST /api/v1/model/reload
///
/// Optional request body:
/// ```json
/// { "path": "match-model-20240601120000-1a2b3c4d.json" }
/// ```
///
/// A requested path must name a file directly inside the model directory.
/// Without a path the configured artifact, or else the newest artifact in
/// the model directory, is loaded. On any failure the model in service is kept.
async fn reload_model<R: Registry + 'static>(
    state: web::Data<AppState<R>>,
    body: Option<web::Json<ModelReloadRequest>>,
) -> HttpResponse {
    let requested = match body.and_then(|b| b.into_inner().path) {
        Some(path) => match resolve_in_dir(&path, &state.model.artifact_dir) {
            Ok(path) => Some(path),
            Err(e) => {
                tracing::warn!("Rejected model reload request: {}", e);
                return artifact_error(&e);
            }
        },
        None => None,
    };
    let explicit = requested.or_else(|| state.model.artifact_path.clone());

    let path = match locate_artifact(explicit.as_deref(), &state.model.artifact_dir) {
        Ok(Some(path)) => path,
        Ok(None) => {
            return HttpResponse::NotFound().json(ErrorResponse {
                error: "Model reload failed".to_string(),
                message: format!("No model artifact found in {}", state.model.artifact_dir.display()),
                status_code: 404,
                retryable: false,
            });
        }
        Err(e) => return artifact_error(&e),
    };

    // Loading is file I/O plus tree validation; keep it off the worker thread
    let scorer = state.matcher.scorer().clone();
    let target = path.clone();
    let reloaded = web::block(move || scorer.reload_from(&target)).await;

    match reloaded {
        Ok(Ok(model_version)) => HttpResponse::Ok().json(ModelReloadResponse {
            model_version,
            path: path.display().to_string(),
        }),
        Ok(Err(e)) => artifact_error(&e),
        Err(e) => {
            tracing::error!("Model reload task failed: {}", e);
            HttpResponse::InternalServerError().json(ErrorResponse {
                error: "Model reload failed".to_string(),
                message: e.to_string(),
                status_code: 500,
                retryable: true,
            })
        }
    }
}
