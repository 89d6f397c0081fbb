use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::{wrappers::BroadcastStream, Stream, StreamExt};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::AppConfig;
use crate::gateway::Gateways;
use crate::pipeline::{Place, PipelineController, PipelineError, Query, Recommendation};

/// Maps pipeline failures onto HTTP statuses
pub struct ApiError(PipelineError);

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            PipelineError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            PipelineError::Busy => StatusCode::CONFLICT,
            PipelineError::Unsupported(_) => StatusCode::NOT_IMPLEMENTED,
            PipelineError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::BAD_GATEWAY,
        };
        let body = json!({ "error": self.0.to_string(), "stage": self.0.stage() });
        (status, Json(body)).into_response()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<PipelineController>,
    pub config: Arc<AppConfig>,
}

#[derive(Debug, Deserialize)]
pub struct RunRequest {
    #[serde(default)]
    pub place: Option<Place>,
    #[serde(default)]
    pub this_year: Option<i32>,
    pub day_span: i32,
}

impl RunRequest {
    fn into_query(self, controller: &PipelineController) -> Query {
        let mut query = controller.query_for(self.place, self.day_span);
        if let Some(year) = self.this_year {
            query.this_year = year;
        }
        query
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/config", get(config_handler))
        .route("/run", post(run_handler))
        .route("/run/test", post(run_test_handler))
        .route("/status", get(status_handler))
        .route("/status/stream", get(status_stream_handler))
        .route("/result", get(result_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

pub async fn run_server(config: AppConfig) -> anyhow::Result<()> {
    let controller = PipelineController::new(Gateways::from_config(&config)?, config.past_span)
        .with_status_buffer(config.status_buffer);

    let addr = format!("0.0.0.0:{}", config.server_port);
    let state = AppState {
        controller: Arc::new(controller),
        config: Arc::new(config),
    };

    info!("Recommendation server listening at http://{} (backend {})", addr, state.config.api_url);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn config_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "places_api_key": state.config.places_api_key,
        "past_span": state.config.past_span,
    }))
}

async fn run_handler(
    State(state): State<AppState>,
    Json(payload): Json<RunRequest>,
) -> Result<Json<Recommendation>, ApiError> {
    let query = payload.into_query(&state.controller);
    Ok(Json(state.controller.run(query).await?))
}

async fn run_test_handler(
    State(state): State<AppState>,
    Json(payload): Json<RunRequest>,
) -> Result<Json<Recommendation>, ApiError> {
    let query = payload.into_query(&state.controller);
    Ok(Json(state.controller.run_test(query).await?))
}

async fn status_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let status = state.controller.status();
    Json(json!({
        "status": status,
        "label": status.label(),
        "busy": state.controller.is_busy(),
    }))
}

async fn status_stream_handler(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = BroadcastStream::new(state.controller.subscribe())
        .filter_map(|msg| {
            msg.ok()
                .and_then(|event| Event::default().event("status").json_data(&event).ok())
        })
        .map(Ok::<Event, Infallible>);
    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn result_handler(State(state): State<AppState>) -> Response {
    match state.controller.last_result().await {
        Some(record) => Json(record).into_response(),
        None => (StatusCode::NOT_FOUND, Json(json!({ "error": "no completed run yet" }))).into_response(),
    }
}
