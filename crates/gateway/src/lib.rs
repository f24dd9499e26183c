//! HTTP frontend for quizpilot.
//!
//! Accepts quiz URLs, checks the shared secret, and hands each accepted
//! request to a background run. The caller only ever learns accept/reject;
//! outcomes go to the logs and `GET /history`.
//!
//! Built on Axum.

pub mod dispatch;
pub mod history;

use axum::body::Bytes;
use axum::extract::DefaultBodyLimit;
use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use quizpilot_config::AppConfig;
use quizpilot_core::event::{DomainEvent, EventBus};
use quizpilot_core::quiz::{QuizRequest, ValidationError};
use quizpilot_tools::ChromiumRenderer;

pub use dispatch::{AgentLauncher, RunContext, RunLauncher};
pub use history::{EntryStatus, RunEntry, RunHistory};

/// Shared application state for the gateway.
pub struct GatewayState {
    pub config: Arc<AppConfig>,
    pub launcher: Arc<dyn RunLauncher>,
    pub history: Arc<RunHistory>,
    pub started_at: Instant,
}

type SharedState = Arc<GatewayState>;

/// Build the Axum router with all gateway routes.
///
/// Layers: permissive CORS, request body limit, HTTP trace logging.
pub fn build_router(state: SharedState) -> Router {
    let body_limit = state.config.gateway.max_body_bytes;
    Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/healthz", get(health_handler))
        .route("/quiz", post(quiz_handler))
        .route("/history", get(history_handler))
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Start the gateway HTTP server.
///
/// Builds the provider, renderer and event bus once; every run shares them.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let router = quizpilot_providers::build_from_config(&config);
    let provider = router
        .default()
        .ok_or_else(|| format!("provider '{}' is not configured", config.provider))?;

    let config = Arc::new(config);
    let event_bus = Arc::new(EventBus::default());
    spawn_event_logger(&event_bus);

    let context = RunContext {
        config: config.clone(),
        provider,
        renderer: Arc::new(ChromiumRenderer::new(config.browser.clone())),
        event_bus,
    };
    let history = Arc::new(RunHistory::new(config.gateway.history_limit));
    let launcher = Arc::new(AgentLauncher::new(context, history.clone()));

    let state = Arc::new(GatewayState {
        config: config.clone(),
        launcher,
        history,
        started_at: Instant::now(),
    });

    info!(
        addr = %addr,
        provider = %config.provider,
        model = config.model_for(&config.provider),
        "Gateway starting"
    );
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, build_router(state)).await?;

    Ok(())
}

/// Log submissions and run endings as they happen.
fn spawn_event_logger(event_bus: &EventBus) {
    let mut rx = event_bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => match event.as_ref() {
                    DomainEvent::SubmissionEvaluated {
                        run_id,
                        correct,
                        next_url,
                        ..
                    } => info!(
                        run_id = %run_id,
                        correct,
                        next_url = next_url.as_deref().unwrap_or("-"),
                        "Submission graded"
                    ),
                    DomainEvent::RunFinished {
                        run_id, status, steps, ..
                    } => info!(run_id = %run_id, status = %status, steps, "Run ended"),
                    _ => {}
                },
                Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "Event logger lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

// --- Errors ---

#[derive(Debug, Serialize, Deserialize)]
struct ErrorResponse {
    error: String,
}

/// A rejected request.
#[derive(Debug)]
pub enum ApiError {
    /// Malformed body or fields → 400
    BadRequest(String),
    /// Wrong secret → 403
    Forbidden(String),
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        Self::BadRequest(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
        };
        (status, Json(ErrorResponse { error })).into_response()
    }
}

// --- Handlers ---

const INDEX_HTML: &str = r#"<!doctype html>
<html>
<head><meta charset="utf-8"><title>quizpilot</title></head>
<body>
<h2>quizpilot is running</h2>
<p>Available endpoints:</p>
<ul>
  <li><b>GET /healthz</b> - health check</li>
  <li><b>POST /quiz</b> - submit a quiz URL</li>
  <li><b>GET /history</b> - accepted runs and their outcomes</li>
</ul>
</body>
</html>
"#;

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

#[derive(Serialize, Deserialize)]
struct HealthResponse {
    status: String,
    uptime_seconds: u64,
    version: String,
}

async fn health_handler(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        version: env!("CARGO_PKG_VERSION").into(),
    })
}

#[derive(Serialize, Deserialize)]
struct QuizAccepted {
    status: String,
    task_id: u64,
}

/// `POST /quiz`: reject bad bodies and secrets, otherwise dispatch and acknowledge.
async fn quiz_handler(State(state): State<SharedState>, body: Bytes) -> Result<Json<QuizAccepted>, ApiError> {
    let value: serde_json::Value =
        serde_json::from_slice(&body).map_err(|_| ApiError::from(ValidationError::InvalidJson))?;
    let request = QuizRequest::from_json(&value)?;

    let expected = state.config.secret.as_deref().unwrap_or_default();
    if expected.is_empty() || !request.secret_matches(expected) {
        warn!(url = %request.url, "Rejected quiz request with invalid secret");
        return Err(ApiError::Forbidden("Invalid secret".into()));
    }

    let task_id = state.history.record(&request.url, &request.email).await;
    info!(task_id, url = %request.url, email = %request.email, "Quiz accepted");
    state.launcher.launch(task_id, request);

    Ok(Json(QuizAccepted {
        status: "ok".into(),
        task_id,
    }))
}

#[derive(Serialize)]
struct HistoryResponse {
    count: usize,
    logs: Vec<RunEntry>,
}

async fn history_handler(State(state): State<SharedState>) -> Json<HistoryResponse> {
    let logs = state.history.snapshot().await;
    Json(HistoryResponse {
        count: logs.len(),
        logs,
    })
}
