use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use homelib::store::StateStore;
use homelib::types::{ControlError, IngestError, IngestPayload, SystemSnapshot};
use homelib::weather::WeatherSource;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tower_http::cors::CorsLayer;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<StateStore>,
    pub weather: Arc<dyn WeatherSource>,
}

// Errors a handler reports back to the client. None of them touch the store.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    MalformedPayload(#[from] IngestError),
    #[error("{0}")]
    Control(#[from] ControlError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = match &self {
            ApiError::MalformedPayload(err) => json!({
                "status": "error",
                "error": err.to_string(),
            }),
            ApiError::Control(err) => json!({ "error": err.to_string() }),
        };
        (StatusCode::BAD_REQUEST, Json(body)).into_response()
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/api/update", post(update))
        .route("/api/status", get(status))
        .route("/api/device/{device}/{action}", post(control))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// Sensor node push. The body is parsed whatever the Content-Type header says.
async fn update(
    State(app): State<AppState>,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    log::info!("POST /api/update called with {} bytes", body.len());
    let payload = IngestPayload::from_slice(&body).map_err(|err| {
        log::error!("Rejected /api/update payload: {err}");
        err
    })?;
    app.store.merge_ingest(payload);
    Ok(Json(json!({ "status": "ok" })))
}

// The weather fetch runs without the store lock held, so a slow provider
// never blocks ingest or control requests.
async fn status(State(app): State<AppState>) -> Json<SystemSnapshot> {
    match app.weather.fetch().await {
        Ok(reading) => app.store.merge_outdoor(reading),
        Err(err) => log::warn!("Weather fetch failed, keeping previous outdoor values: {err}"),
    }
    Json(app.store.snapshot())
}

async fn control(
    State(app): State<AppState>,
    Path((device, action)): Path<(String, String)>,
) -> Result<Json<SystemSnapshot>, ApiError> {
    log::info!("POST /api/device/{device}/{action} called");
    let snap = app
        .store
        .apply_device_action(&device, &action)
        .map_err(|err| {
            log::warn!("Rejected device command {device}/{action}: {err}");
            err
        })?;
    Ok(Json(snap))
}
