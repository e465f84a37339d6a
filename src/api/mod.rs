mod handlers;
pub mod middleware;

use axum::{
    http::HeaderValue,
    middleware::from_fn_with_state,
    routing::{get, post, put},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::hooks::HookService;
use middleware::{auth_middleware, SecurityConfig};

/// Router without authentication (local development and tests).
pub fn create_router(service: HookService) -> Router {
    create_router_with_security(service, SecurityConfig::disabled())
}

pub fn create_router_with_security(service: HookService, security: SecurityConfig) -> Router {
    let api = Router::new()
        // Host page hooks
        .route("/hooks/data-entry-form", post(handlers::data_entry_form))
        .route("/hooks/survey-page", post(handlers::survey_page))
        .route("/hooks/every-page-top", post(handlers::every_page_top))
        .route("/hooks/link-check-display", post(handlers::link_check_display))
        // Remote actions
        .route("/ajax/{action}", post(handlers::module_ajax))
        // Toggle state
        .route(
            "/projects/{pid}/features/{feature}/state",
            get(handlers::get_feature_state),
        )
        .route(
            "/projects/{pid}/features/{feature}/state",
            put(handlers::set_feature_state),
        )
        // Project metadata
        .route("/projects/{pid}/metadata", put(handlers::sync_metadata))
        // Settings
        .route("/settings/debug-mode", get(handlers::get_debug_mode))
        .route("/settings/debug-mode", put(handlers::set_debug_mode))
        .layer(from_fn_with_state(security.clone(), auth_middleware))
        // Health
        .route("/health", get(handlers::health));

    Router::new()
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&security))
        .with_state(service)
}

fn cors_layer(security: &SecurityConfig) -> CorsLayer {
    match &security.cors_origins {
        Some(origins) => {
            let origins: Vec<HeaderValue> = origins
                .iter()
                .filter_map(|o| HeaderValue::from_str(o).ok())
                .collect();
            CorsLayer::new().allow_origin(origins)
        }
        None => CorsLayer::permissive(),
    }
}
