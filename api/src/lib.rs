//! HTTP surface of the novel game backend.
//!
//! `/creative/*` drives upload, chunk-by-chunk analysis, finalization and the
//! creative assistant; `/game/*` serves game data and save slots. Every response
//! uses the `{success, data, error}` envelope.

pub mod core;
pub mod error_handler;
pub mod middleware_layer;
pub mod routes;

use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post},
};
use tokio::signal;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

use crate::{
    core::app_state::{AppState, DEFAULT_ADDRESS, env_or},
    error_handler::AppError,
    middleware_layer::json_extractor::json_error_mapper,
    routes::{
        analysis::analysis_route::{
            continue_analysis, finalize_analysis, get_progress, start_analysis,
        },
        creative::creative_route::{
            apply_modification, chat, check_consistency, generate, history, list_custom_content,
            revert, save_custom_content, start_session, suggest_ideas, suggest_modification,
        },
        game::{
            game_route::{chapter, game_data, scene},
            save_route::{delete_save, list_saves, load_game, save_game},
        },
        projects::project_route::{health, list_projects, upload_novel},
    },
};

/// Largest accepted novel upload.
pub const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

/// Builds the API router with all endpoints.
pub fn build_router(state: AppState) -> Router {
    let creative = Router::new()
        .route(
            "/upload",
            post(upload_novel).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/project/{id}/analyze/start", post(start_analysis))
        .route("/project/{id}/analyze/continue", post(continue_analysis))
        .route("/project/{id}/analyze/finalize", post(finalize_analysis))
        .route("/project/{id}/analyze/progress", get(get_progress))
        .route("/project/{id}/session/start", post(start_session))
        .route("/session/{id}/chat", post(chat))
        .route("/session/{id}/generate", post(generate))
        .route("/session/{id}/modify", post(suggest_modification))
        .route("/session/{id}/consistency", post(check_consistency))
        .route("/session/{id}/suggest", post(suggest_ideas))
        .route("/session/{id}/apply", post(apply_modification))
        .route("/project/{id}/history", get(history))
        .route("/project/{id}/history/{log_id}/revert", post(revert))
        .route("/project/{id}/custom-content", post(save_custom_content))
        .route("/project/{id}/custom-content/list", get(list_custom_content));

    let game = Router::new()
        .route("/project/{id}", get(game_data))
        .route("/project/{id}/chapter/{chapter_id}", get(chapter))
        .route("/project/{id}/scene/{scene_id}", get(scene))
        .route("/project/{id}/save", post(save_game))
        .route("/project/{id}/load/{slot}", get(load_game))
        .route("/project/{id}/saves", get(list_saves))
        .route("/project/{id}/save/{slot}", delete(delete_save));

    Router::new()
        .route("/health", get(health))
        .route("/projects", get(list_projects))
        .nest("/creative", creative)
        .nest("/game", game)
        .layer(middleware::from_fn(json_error_mapper))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

/// Starts the server on `API_ADDRESS` with state from the environment and
/// shuts down gracefully on Ctrl+C.
pub async fn start() -> Result<(), AppError> {
    let host_url = env_or("API_ADDRESS", DEFAULT_ADDRESS);
    let state = AppState::from_env()?;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&host_url)
        .await
        .map_err(AppError::Bind)?;
    info!(address = %host_url, "novel game API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(AppError::Server)
}

/// Resolves when Ctrl+C is pressed.
async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
