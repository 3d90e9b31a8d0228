use actix_cors::Cors;
use actix_web::{error, http::StatusCode, middleware, web, App, HttpResponse, HttpServer};
use std::io;
use std::sync::Arc;
use tracing::{error, info, warn};

use organ_match::config::{ModelSettings, Settings};
use organ_match::ml::artifact::locate_artifact;
use organ_match::routes::{self, AppState};
use organ_match::{logging, LearnedScorer, Matcher, PostgresRegistry, ScorerHandle};

/// JSON error response for JSON payload errors
#[derive(Debug, serde::Serialize)]
pub struct JsonError {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}

impl std::fmt::Display for JsonError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error, self.message)
    }
}

impl std::error::Error for JsonError {}

impl error::ResponseError for JsonError {
    fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::BAD_REQUEST)
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(self)
    }
}

/// Handle JSON payload errors
pub fn handle_json_payload_error(err: error::JsonPayloadError, req: &actix_web::HttpRequest) -> actix_web::Error {
    tracing::info!("JSON payload error on {}: {}", req.path(), err);
    JsonError {
        error: "invalid_json".to_string(),
        message: format!("Invalid JSON: {}", err),
        status_code: 400,
    }
    .into()
}

/// Scorer to serve with at start-up. A missing or invalid artifact is not
/// fatal: ranking runs on rule scores until a valid model is reloaded.
fn startup_scorer(settings: &ModelSettings) -> LearnedScorer {
    let path = match locate_artifact(settings.artifact_path.as_deref(), &settings.artifact_dir) {
        Ok(Some(path)) => path,
        Ok(None) => {
            warn!(
                "No model artifact in {}, serving rule scores only",
                settings.artifact_dir.display()
            );
            return LearnedScorer::rule_only();
        }
        Err(e) => {
            error!("Failed to look up model artifacts: {}, serving rule scores only", e);
            return LearnedScorer::rule_only();
        }
    };

    match LearnedScorer::load(&path) {
        Ok(scorer) => scorer,
        Err(e) => {
            error!(
                "Model artifact {} rejected: {}, serving rule scores only",
                path.display(),
                e
            );
            LearnedScorer::rule_only()
        }
    }
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    // Load .env file if present
    dotenv::dotenv().ok();

    let settings = Settings::load().map_err(|e| {
        eprintln!("Configuration error: {}", e);
        io::Error::new(io::ErrorKind::InvalidInput, e)
    })?;

    logging::init(&settings.logging);
    info!("Starting organ match service...");

    let registry = PostgresRegistry::from_settings(&settings.database)
        .await
        .map_err(|e| {
            error!("Failed to connect to PostgreSQL: {}", e);
            io::Error::new(io::ErrorKind::Other, e)
        })?;

    info!(
        "PostgreSQL registry initialized (max: {} connections)",
        settings.database.max_connections.unwrap_or(10)
    );

    let scorer = startup_scorer(&settings.model);
    info!("Scorer ready (model version: {:?})", scorer.version());

    let app_state = AppState {
        registry: Arc::new(registry),
        matcher: Matcher::new(ScorerHandle::new(scorer)),
        matching: settings.matching.clone(),
        model: settings.model.clone(),
    };

    // Configure HTTP server
    let host = settings.server.host.clone();
    let port = settings.server.port;
    let workers = settings.server.workers.unwrap_or(4);

    info!("Starting HTTP server on {}:{}", host, port);

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .app_data(web::JsonConfig::default().error_handler(handle_json_payload_error))
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .configure(routes::configure_routes::<PostgresRegistry>)
    })
    .workers(workers)
    .bind((host, port))?
    .run()
    .await
}
