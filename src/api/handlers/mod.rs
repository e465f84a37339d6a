use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use crate::hooks::{HookError, HookService};
use crate::models::*;

// ============================================================
// Error Handling
// ============================================================

/// Log an internal error and return a sanitized response to the client.
/// The full error is logged server-side for debugging, but clients only
/// see a generic message to avoid leaking internal details.
fn internal_error(e: impl std::fmt::Display) -> (StatusCode, String) {
    tracing::error!("Internal error: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal server error".to_string(),
    )
}

fn hook_error(e: HookError) -> (StatusCode, String) {
    match e {
        HookError::Unauthorized => {
            tracing::warn!("Rejected unauthorized action");
            (StatusCode::FORBIDDEN, e.to_string())
        }
        HookError::MissingProject(_) => {
            tracing::warn!("Validation error: {}", e);
            (StatusCode::BAD_REQUEST, e.to_string())
        }
        HookError::Storage(e) => internal_error(e),
    }
}

fn require_toggleable(feature: &str) -> Result<(), (StatusCode, String)> {
    if is_toggleable(feature) {
        Ok(())
    } else {
        Err((
            StatusCode::NOT_FOUND,
            format!("Feature '{feature}' cannot be toggled"),
        ))
    }
}

// ============================================================
// Health
// ============================================================

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

// ============================================================
// Hooks
// ============================================================

pub async fn data_entry_form(
    State(service): State<HookService>,
    Json(hook): Json<DataEntryFormHook>,
) -> Result<Json<PageOutput>, (StatusCode, String)> {
    service.data_entry_form(hook).map(Json).map_err(hook_error)
}

pub async fn survey_page(
    State(service): State<HookService>,
    Json(hook): Json<SurveyPageHook>,
) -> Result<Json<PageOutput>, (StatusCode, String)> {
    service.survey_page(hook).map(Json).map_err(hook_error)
}

pub async fn every_page_top(
    State(service): State<HookService>,
    Json(hook): Json<EveryPageTopHook>,
) -> Result<Json<PageOutput>, (StatusCode, String)> {
    service.every_page_top(hook).map(Json).map_err(hook_error)
}

pub async fn link_check_display(
    State(service): State<HookService>,
    Json(hook): Json<LinkCheckHook>,
) -> Result<Json<Option<ModuleLink>>, (StatusCode, String)> {
    service.link_check_display(hook).map(Json).map_err(hook_error)
}

pub async fn module_ajax(
    State(service): State<HookService>,
    Path(action): Path<String>,
    Json(request): Json<AjaxRequest>,
) -> Result<Json<AjaxResponse>, (StatusCode, String)> {
    service
        .module_ajax(&action, request)
        .map(Json)
        .map_err(hook_error)
}

// ============================================================
// Toggle state
// ============================================================

pub async fn get_feature_state(
    State(service): State<HookService>,
    Path((pid, feature)): Path<(i64, String)>,
) -> Result<Json<FeatureStateResponse>, (StatusCode, String)> {
    require_toggleable(&feature)?;
    let state = service
        .db()
        .get_feature_state(pid, &feature)
        .map_err(internal_error)?;
    Ok(Json(FeatureStateResponse {
        project_id: pid,
        feature,
        state,
    }))
}

pub async fn set_feature_state(
    State(service): State<HookService>,
    Path((pid, feature)): Path<(i64, String)>,
    Json(input): Json<SetFeatureStateInput>,
) -> Result<Json<FeatureStateResponse>, (StatusCode, String)> {
    require_toggleable(&feature)?;
    let state = service
        .db()
        .set_feature_state(pid, &feature, input.state)
        .map_err(internal_error)?;
    Ok(Json(FeatureStateResponse {
        project_id: pid,
        feature,
        state,
    }))
}

// ============================================================
// Project metadata
// ============================================================

pub async fn sync_metadata(
    State(service): State<HookService>,
    Path(pid): Path<i64>,
    Json(input): Json<SyncMetadataInput>,
) -> Result<Json<ProjectInfo>, (StatusCode, String)> {
    if pid <= 0 {
        return Err((StatusCode::BAD_REQUEST, "Invalid project id".to_string()));
    }
    service
        .db()
        .sync_project_metadata(pid, input)
        .map(Json)
        .map_err(internal_error)
}

// ============================================================
// Settings
// ============================================================

pub async fn get_debug_mode(
    State(service): State<HookService>,
) -> Result<Json<DebugModeResponse>, (StatusCode, String)> {
    let enabled = service.db().debug_mode().map_err(internal_error)?;
    Ok(Json(DebugModeResponse { enabled }))
}

pub async fn set_debug_mode(
    State(service): State<HookService>,
    Json(input): Json<DebugModeResponse>,
) -> Result<Json<DebugModeResponse>, (StatusCode, String)> {
    service
        .db()
        .set_debug_mode(input.enabled)
        .map_err(internal_error)?;
    tracing::info!(enabled = input.enabled, "Debug mode updated");
    Ok(Json(input))
}
