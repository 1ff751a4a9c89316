//! Routes, handlers and error mapping.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use driftlog_core::{DriftError, Retriever, Sample, SessionSupervisor};
use driftlog_env::TokioContext;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

// Application state
#[derive(Clone)]
pub struct AppState {
    pub supervisor: SessionSupervisor<TokioContext>,
    pub retriever: Arc<Retriever>,
}

impl AppState {
    pub fn new(supervisor: SessionSupervisor<TokioContext>, retriever: Retriever) -> Self {
        Self {
            supervisor,
            retriever: Arc::new(retriever),
        }
    }
}

// API types
#[derive(Debug, Serialize, Deserialize)]
pub struct StartRequest {
    pub user_ids: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserDataResponse {
    pub user_id: String,
    pub data: Vec<Sample>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub active: bool,
    pub session_id: Option<u64>,
    pub entities: Vec<String>,
}

/// Failures a handler can return; each maps to one status code.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

impl From<DriftError> for ApiError {
    fn from(err: DriftError) -> Self {
        if !err.is_validation() {
            return Self::Internal(err.to_string());
        }
        match err {
            DriftError::EmptyInput => Self::BadRequest("User ID list cannot be empty".to_string()),
            DriftError::Validation(msg) => Self::BadRequest(msg),
            other => Self::BadRequest(other.to_string()),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/start", post(start))
        .route("/stop", post(stop))
        .route("/user/:user_id", get(get_user))
        .route("/status", get(status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn start(State(state): State<AppState>, body: Bytes) -> Result<String, ApiError> {
    let request: StartRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid request body: {e}")))?;

    info!("Received /start request for {} users", request.user_ids.len());

    let report = state.supervisor.start(request.user_ids).await?;
    Ok(format!(
        "Simulation started for {} users ({} ids skipped). Will run for approximately {:?}.\n",
        report.entities.len(),
        report.skipped,
        report.duration
    ))
}

async fn stop(State(state): State<AppState>) -> String {
    state.supervisor.stop().await;
    "All active simulations stopped.\n".to_string()
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        active: state.supervisor.is_active(),
        session_id: state.supervisor.session_id(),
        entities: state.supervisor.active_entities(),
    })
}

/// Parses an optional `[0, 1]` fraction query parameter.
fn fraction_param(params: &HashMap<String, String>, name: &str, default: f64) -> Result<f64, ApiError> {
    let Some(raw) = params.get(name).filter(|raw| !raw.is_empty()) else {
        return Ok(default);
    };
    match raw.parse::<f64>() {
        Ok(value) if (0.0..=1.0).contains(&value) => Ok(value),
        _ => Err(ApiError::BadRequest(format!(
            "Invalid '{name}' parameter. Must be a float between 0.0 and 1.0."
        ))),
    }
}

async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<UserDataResponse>, ApiError> {
    let min = fraction_param(&params, "min", 0.0)?;
    let max = fraction_param(&params, "max", 1.0)?;
    if min > max {
        return Err(ApiError::BadRequest(
            "'min' parameter cannot be greater than 'max' parameter.".to_string(),
        ));
    }

    info!("GET /user/{} request with min={:.2}, max={:.2}", user_id, min, max);

    let retriever = Arc::clone(&state.retriever);
    let id = user_id.clone();
    let data = tokio::task::spawn_blocking(move || retriever.fetch(&id, min, max))
        .await
        .map_err(|e| ApiError::Internal(format!("Retrieval task failed: {e}")))?
        .map_err(|e| {
            warn!("Error reading data for user {}: {}", user_id, e);
            ApiError::Internal(format!("Failed to retrieve data for user {user_id}: retrieval failed"))
        })?;

    if data.is_empty() {
        return Err(ApiError::NotFound(format!(
            "No data found for user {user_id} within the specified range"
        )));
    }

    Ok(Json(UserDataResponse { user_id, data }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use driftlog_core::{
        entity_key, MemorySampleStore, SampleStore, SimulationConfig, StoreError,
    };
    use std::time::Duration;
    use tower::ServiceExt;

    fn sample_at(ms: u32, dx: f64) -> Sample {
        let raw = format!(r#"{{"dx":{dx},"dy":0.0,"ts":"2024-01-01T00:00:00.{ms:03}Z"}}"#);
        Sample::decode(raw.as_bytes()).unwrap()
    }

    struct DownStore;

    impl SampleStore for DownStore {
        fn append_batch(&self, _key: &[u8], _records: &[Vec<u8>]) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("not initialized".into()))
        }

        fn read_all(&self, _key: &[u8]) -> Result<Vec<Vec<u8>>, StoreError> {
            Err(StoreError::Unavailable("not initialized".into()))
        }
    }

    fn state_with(store: Arc<dyn SampleStore>) -> AppState {
        let config = SimulationConfig {
            flush_interval: Duration::from_millis(10),
            session_duration: Duration::from_secs(5),
            ..SimulationConfig::default()
        };
        let supervisor =
            SessionSupervisor::new(Arc::new(TokioContext::new()), store.clone(), config).unwrap();
        AppState::new(supervisor, Retriever::new(store))
    }

    fn ten_sample_store() -> Arc<MemorySampleStore> {
        let store = Arc::new(MemorySampleStore::new());
        // Stored newest first
        let records: Vec<Vec<u8>> = (0..10u32)
            .rev()
            .map(|i| sample_at(i, i as f64).encode().unwrap())
            .collect();
        store.append_batch(&entity_key("u1"), &records).unwrap();
        store
    }

    async fn send(state: &AppState, method: &str, uri: &str, body: &str) -> (StatusCode, String) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_start_rejects_malformed_and_empty_bodies() {
        let state = state_with(Arc::new(MemorySampleStore::new()));

        let (status, body) = send(&state, "POST", "/start", "{not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.starts_with("Invalid request body"));

        let (status, _) = send(&state, "POST", "/start", r#"{"user_ids": []}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&state, "POST", "/start", r#"{"user_ids": [""]}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!state.supervisor.is_active());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_start_status_stop_cycle() {
        let state = state_with(Arc::new(MemorySampleStore::new()));

        let (status, body) = send(&state, "POST", "/start", r#"{"user_ids": ["a", "b"]}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("Simulation started for 2 users"));

        let (status, body) = send(&state, "GET", "/status", "").await;
        assert_eq!(status, StatusCode::OK);
        let parsed: StatusResponse = serde_json::from_str(&body).unwrap();
        assert!(parsed.active);
        assert_eq!(parsed.entities, vec!["a", "b"]);

        let (status, _) = send(&state, "POST", "/stop", "").await;
        assert_eq!(status, StatusCode::OK);
        assert!(!state.supervisor.is_active());

        // Stop is always acknowledged
        let (status, _) = send(&state, "POST", "/stop", "").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_start_reply_reports_skipped_ids() {
        let state = state_with(Arc::new(MemorySampleStore::new()));

        let (status, body) = send(&state, "POST", "/start", r#"{"user_ids": ["a", "", "a"]}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("Simulation started for 1 users"));
        assert!(body.contains("(2 ids skipped)"));
        assert_eq!(state.supervisor.active_entities(), vec!["a"]);

        state.supervisor.stop().await;
    }

    #[test]
    fn test_drift_errors_map_to_status() {
        let status = |err: DriftError| ApiError::from(err).into_response().status();

        assert_eq!(status(DriftError::EmptyInput), StatusCode::BAD_REQUEST);
        assert_eq!(status(DriftError::validation("bad window")), StatusCode::BAD_REQUEST);
        assert_eq!(
            status(DriftError::StoreUnavailable("down".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(status(DriftError::Flush("full".into())), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_get_user_windows_sorted_history() {
        let state = state_with(ten_sample_store());

        let (status, body) = send(&state, "GET", "/user/u1?min=0.2&max=0.5", "").await;
        assert_eq!(status, StatusCode::OK);

        let parsed: UserDataResponse = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed.user_id, "u1");
        let dxs: Vec<f64> = parsed.data.iter().map(|s| s.delta_x).collect();
        assert_eq!(dxs, vec![2.0, 3.0, 4.0]);
    }

    #[tokio::test]
    async fn test_get_user_defaults_to_full_range() {
        let state = state_with(ten_sample_store());
        let (status, body) = send(&state, "GET", "/user/u1", "").await;
        assert_eq!(status, StatusCode::OK);

        let parsed: UserDataResponse = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed.data.len(), 10);
        assert_eq!(parsed.data[0].delta_x, 0.0);
    }

    #[tokio::test]
    async fn test_get_user_rejects_bad_fractions() {
        let state = state_with(ten_sample_store());

        for uri in [
            "/user/u1?min=abc",
            "/user/u1?min=-0.1",
            "/user/u1?max=1.5",
            "/user/u1?min=0.6&max=0.2",
        ] {
            let (status, _) = send(&state, "GET", uri, "").await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        }
    }

    #[tokio::test]
    async fn test_get_user_empty_window_is_not_found() {
        let state = state_with(ten_sample_store());

        let (status, _) = send(&state, "GET", "/user/u1?min=0.5&max=0.5", "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&state, "GET", "/user/nobody", "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_get_user_store_failure_is_internal_error() {
        let state = state_with(Arc::new(DownStore));
        let (status, body) = send(&state, "GET", "/user/u1", "").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.contains("retrieval failed"));
    }

    #[tokio::test]
    async fn test_wrong_method_is_rejected() {
        let state = state_with(Arc::new(MemorySampleStore::new()));
        let (status, _) = send(&state, "GET", "/start", "").await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    }
}
