use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::admin::AdminState;
use crate::breaker::QueuedRequest;
use crate::circuit::{CircuitBreakerError, CircuitInfo};

#[derive(Serialize, Deserialize)]
pub struct SystemStatus {
    pub version: String,
    pub status: String,
    pub instance: String,
    pub circuit_check_enabled: bool,
    pub statistics_update_enabled: bool,
    pub mapped_circuits: usize,
}

#[derive(Debug, Deserialize)]
pub struct UriBody {
    pub uri: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ActionResult {
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub circuit: Option<String>,
}

/// Error body returned by every admin route.
pub struct ApiError(CircuitBreakerError);

impl From<CircuitBreakerError> for ApiError {
    fn from(e: CircuitBreakerError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CircuitBreakerError::NoMapping { .. } => StatusCode::NOT_FOUND,
            CircuitBreakerError::Store(_) | CircuitBreakerError::Timeout { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            CircuitBreakerError::QueueService { .. }
            | CircuitBreakerError::UnlockFailed(_)
            | CircuitBreakerError::SampleQueueUnlock(_) => StatusCode::BAD_GATEWAY,
        };
        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        status: "operational".to_string(),
        instance: state.instance.to_string(),
        circuit_check_enabled: state.breaker.is_circuit_check_enabled(),
        statistics_update_enabled: state.breaker.is_statistics_update_enabled(),
        mapped_circuits: state.breaker.mapping().len(),
    })
}

pub async fn list_circuits(State(state): State<AdminState>) -> Result<Json<Vec<CircuitInfo>>, ApiError> {
    Ok(Json(state.breaker.all_circuits().await?))
}

pub async fn get_circuit(
    State(state): State<AdminState>,
    Path(hash): Path<String>,
) -> Result<Response, ApiError> {
    match state.breaker.circuit_info(&hash).await? {
        Some(info) => Ok(Json(info).into_response()),
        None => Ok((
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": format!("unknown circuit {}", hash) })),
        )
            .into_response()),
    }
}

pub async fn close_circuit(
    State(state): State<AdminState>,
    Json(body): Json<UriBody>,
) -> Result<Json<ActionResult>, ApiError> {
    state.breaker.close_circuit(&QueuedRequest::new(&body.uri)).await?;
    Ok(Json(action("closed", &state, body.uri)))
}

pub async fn reopen_circuit(
    State(state): State<AdminState>,
    Json(body): Json<UriBody>,
) -> Result<Json<ActionResult>, ApiError> {
    state.breaker.reopen_circuit(&QueuedRequest::new(&body.uri)).await?;
    Ok(Json(action("reopened", &state, body.uri)))
}

pub async fn close_all_circuits(State(state): State<AdminState>) -> Result<Json<ActionResult>, ApiError> {
    state.breaker.close_all_circuits().await?;
    Ok(Json(ActionResult {
        action: "closed_all".to_string(),
        uri: None,
        circuit: None,
    }))
}

fn action(name: &str, state: &AdminState, uri: String) -> ActionResult {
    let circuit = state.breaker.circuit_for_uri(&uri).map(|c| c.hash().to_string());
    ActionResult {
        action: name.to_string(),
        uri: Some(uri),
        circuit,
    }
}
