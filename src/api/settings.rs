//! Admin settings API.
//!
//! GET/PUT the configuration record and drive the two-phase clear. The
//! credential itself is write-only here: responses only say whether one is
//! set.

use crate::auth::authorize_admin;
use crate::settings::{
    ClearError, FormState, ModelId, SaveError, SettingsForm, SettingsService,
};
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Shared state for the settings API
#[derive(Clone)]
pub struct SettingsAppState {
    pub service: Arc<SettingsService>,
    /// Required bearer token for every settings route. None = unrestricted.
    pub admin_token: Option<String>,
}

/// One entry of the model selection list
#[derive(Serialize, Deserialize, Debug)]
pub struct ModelOption {
    pub id: String,
    pub label: String,
}

/// Non-secret view of the stored settings
#[derive(Serialize, Debug)]
pub struct SettingsView {
    pub credential_set: bool,
    pub persona_id: String,
    pub avatar_id: String,
    pub voice_id: String,
    pub model_id: String,
    pub state: FormState,
    pub complete: bool,
    pub can_save: bool,
    pub editable: HashMap<String, bool>,
    pub models: Vec<ModelOption>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct SubmitResponse {
    pub ok: bool,
    pub missing_fields: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ClearRequestResponse {
    pub pending_token: String,
    pub expires_in_seconds: i64,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct PendingTokenBody {
    pub pending_token: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct OkResponse {
    pub ok: bool,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Application error types
enum AppError {
    Unauthorized(String),
    BadRequest(String),
    InternalServerError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::InternalServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        (status, Json(ErrorResponse { error: error_message })).into_response()
    }
}

pub fn create_settings_router(state: SettingsAppState) -> Router {
    Router::new()
        .route("/api/settings", get(get_settings).put(submit_settings))
        .route("/api/settings/clear", post(request_clear))
        .route("/api/settings/clear/confirm", post(confirm_clear))
        .route("/api/settings/clear/cancel", post(cancel_clear))
        .with_state(Arc::new(state))
}

fn require_admin(state: &SettingsAppState, headers: &HeaderMap) -> Result<(), AppError> {
    authorize_admin(headers, state.admin_token.as_deref()).map_err(|e| {
        warn!(error = %e, "Settings request rejected");
        AppError::Unauthorized("Unauthorized".to_string())
    })
}

/// GET /api/settings - current settings without the credential
async fn get_settings(
    State(state): State<Arc<SettingsAppState>>,
    headers: HeaderMap,
) -> Result<Json<SettingsView>, AppError> {
    require_admin(&state, &headers)?;

    let record = state.service.current().map_err(|e| {
        warn!(error = %e, "Failed to read settings");
        AppError::InternalServerError("Failed to read settings".to_string())
    })?;

    let form = SettingsForm::from_record(&record);

    Ok(Json(SettingsView {
        credential_set: record.has_credential(),
        persona_id: record.persona_id.clone(),
        avatar_id: record.avatar_id.clone(),
        voice_id: record.voice_id.clone(),
        model_id: record.model_id.as_str().to_string(),
        state: form.state(),
        complete: record.is_complete(),
        can_save: form.can_save(),
        editable: form
            .editable_fields()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect(),
        models: ModelId::ALL
            .iter()
            .map(|m| ModelOption {
                id: m.as_str().to_string(),
                label: m.label().to_string(),
            })
            .collect(),
    }))
}

/// PUT /api/settings - validate and replace the whole record
///
/// 200 with `ok: true` when saved, 422 with the missing field labels when
/// rejected. A rejected submission writes nothing.
async fn submit_settings(
    State(state): State<Arc<SettingsAppState>>,
    headers: HeaderMap,
    Json(fields): Json<HashMap<String, String>>,
) -> Result<Response, AppError> {
    require_admin(&state, &headers)?;

    match state.service.save(&fields) {
        Ok(_) => Ok(Json(SubmitResponse {
            ok: true,
            missing_fields: Vec::new(),
        })
        .into_response()),
        Err(SaveError::Invalid(e)) => Ok((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(SubmitResponse {
                ok: false,
                missing_fields: e.missing.iter().map(|l| l.to_string()).collect(),
            }),
        )
            .into_response()),
        Err(SaveError::Storage(_)) => Err(AppError::InternalServerError(
            "Failed to store settings".to_string(),
        )),
    }
}

/// POST /api/settings/clear - start a clear-all, returns the confirmation token
async fn request_clear(
    State(state): State<Arc<SettingsAppState>>,
    headers: HeaderMap,
) -> Result<Json<ClearRequestResponse>, AppError> {
    require_admin(&state, &headers)?;

    let pending = state.service.request_clear();
    Ok(Json(ClearRequestResponse {
        pending_token: pending.token,
        expires_in_seconds: pending.expires_in_seconds,
    }))
}

/// POST /api/settings/clear/confirm - reset everything to defaults
async fn confirm_clear(
    State(state): State<Arc<SettingsAppState>>,
    headers: HeaderMap,
    Json(body): Json<PendingTokenBody>,
) -> Result<Json<OkResponse>, AppError> {
    require_admin(&state, &headers)?;

    state
        .service
        .confirm_clear(&body.pending_token)
        .map_err(|e| match e {
            ClearError::UnknownConfirmation => AppError::BadRequest(e.to_string()),
            ClearError::Storage(_) => {
                AppError::InternalServerError("Failed to clear settings".to_string())
            }
        })?;

    Ok(Json(OkResponse { ok: true }))
}

/// POST /api/settings/clear/cancel - abandon a pending clear
async fn cancel_clear(
    State(state): State<Arc<SettingsAppState>>,
    headers: HeaderMap,
    Json(body): Json<PendingTokenBody>,
) -> Result<Json<OkResponse>, AppError> {
    require_admin(&state, &headers)?;

    state.service.cancel_clear(&body.pending_token);
    Ok(Json(OkResponse { ok: true }))
}
