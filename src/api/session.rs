//! Browser-facing session-token API.

use crate::broker::{BrokerError, CredentialBroker};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Shared state for the session API
#[derive(Clone)]
pub struct SessionAppState {
    pub broker: Arc<CredentialBroker>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct SessionTokenResponse {
    pub token: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct SessionErrorResponse {
    pub error_code: String,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream_status: Option<u16>,
}

struct SessionError(BrokerError);

impl IntoResponse for SessionError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            BrokerError::NotConfigured => StatusCode::SERVICE_UNAVAILABLE,
            BrokerError::UpstreamFailure { .. } | BrokerError::MalformedResponse => {
                StatusCode::BAD_GATEWAY
            }
            BrokerError::Storage => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let upstream_status = match &self.0 {
            BrokerError::UpstreamFailure { code, .. } => *code,
            _ => None,
        };

        let body = SessionErrorResponse {
            error_code: self.0.code().to_string(),
            detail: self.0.to_string(),
            upstream_status,
        };

        (status, Json(body)).into_response()
    }
}

pub fn create_session_router(state: SessionAppState) -> Router {
    Router::new()
        .route("/api/session-token", post(issue_session_token))
        .route("/health", get(health))
        .with_state(Arc::new(state))
}

/// POST /api/session-token - exchange the stored key for a session token
async fn issue_session_token(
    State(state): State<Arc<SessionAppState>>,
) -> Result<Json<SessionTokenResponse>, SessionError> {
    let token = state
        .broker
        .issue_session_token()
        .await
        .map_err(SessionError)?;

    Ok(Json(SessionTokenResponse {
        token: token.into_string(),
    }))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
