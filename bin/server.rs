// Dump Convert - Web Server
// REST transport over the single-worker job queue

use axum::{
    extract::{DefaultBodyLimit, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use dump_convert::{
    convert_and_load, convert_str, init_tracing, pipeline::processing_time, seeded_rng,
    Conversion, JobQueue, LoadOutcome, Settings, ShapeKind, VERSION,
};

/// Shared application state
#[derive(Clone)]
struct AppState {
    queue: Arc<JobQueue>,
    settings: Arc<Settings>,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    job_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            job_id: None,
            data: Some(data),
            error: None,
        }
    }

    fn job(job_id: String, data: T) -> Self {
        Self {
            job_id: Some(job_id),
            ..Self::ok(data)
        }
    }

    fn err(message: String) -> Self {
        Self {
            success: false,
            job_id: None,
            data: None,
            error: Some(message),
        }
    }
}

/// Any failure inside a job surfaces as 500 with the error chain
struct ApiError(anyhow::Error);

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!(error = %self.0, "request failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::<()>::err(format!("{:#}", self.0))),
        )
            .into_response()
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    pending_jobs: usize,
}

#[derive(Deserialize)]
struct ConvertParams {
    shape: ShapeKind,
    seed: Option<u64>,
}

#[derive(Deserialize)]
struct LoadParams {
    shape: ShapeKind,
    seed: Option<u64>,
    /// Name used for the backup file (defaults to "upload")
    name: Option<String>,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /health - Health check
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::ok(HealthResponse {
        status: "OK",
        version: VERSION,
        pending_jobs: state.queue.pending(),
    }))
}

/// POST /convert?shape=legacy|final[&seed=N] - body is the dump text
async fn convert(
    State(state): State<AppState>,
    Query(params): Query<ConvertParams>,
    body: String,
) -> Result<Json<ApiResponse<Conversion>>, ApiError> {
    let seed = params.seed.or(state.settings.seed);
    let shape = params.shape;

    let result = state
        .queue
        .submit(move || {
            let mut rng = seeded_rng(seed);
            Ok(convert_str(&body, shape, processing_time(), &mut rng))
        })
        .await?;

    Ok(Json(ApiResponse::job(result.job_id.to_string(), result.output)))
}

/// POST /load?shape=legacy|final[&seed=N][&name=panel.sql] - convert, load, back up
async fn load(
    State(state): State<AppState>,
    Query(params): Query<LoadParams>,
    body: String,
) -> Result<Json<ApiResponse<LoadOutcome>>, ApiError> {
    let settings = Arc::clone(&state.settings);
    let seed = params.seed.or(settings.seed);
    let shape = params.shape;
    let name = PathBuf::from(params.name.unwrap_or_else(|| "upload".to_string()));

    let result = state
        .queue
        .submit(move || {
            let mut rng = seeded_rng(seed);
            convert_and_load(
                &body,
                &name,
                shape,
                &settings.database,
                &settings.backup_dir,
                &mut rng,
            )
        })
        .await?;

    Ok(Json(ApiResponse::job(result.job_id.to_string(), result.output)))
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::from_env()?;
    init_tracing();

    println!("🌐 Dump Convert - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("✓ Database: {}", settings.database.display());
    println!("✓ Backups:  {}", settings.backup_dir.display());

    let bind = settings.bind.clone();
    let max_upload = settings.max_upload;

    let state = AppState {
        queue: Arc::new(JobQueue::start()),
        settings: Arc::new(settings),
    };

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/convert", post(convert))
        .route("/load", post(load))
        .with_state(state)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_upload))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!(addr = %bind, "server listening");

    println!("\n🚀 Server running on http://{}", bind);
    println!("   POST /convert?shape=legacy|final");
    println!("   POST /load?shape=legacy|final");
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app).await?;

    Ok(())
}
