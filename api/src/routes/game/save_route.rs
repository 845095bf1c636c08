use std::sync::Arc;

use axum::extract::{Json, Path, State};
use game_store::{GameSave, SaveRequest, SaveSummary};
use serde::Serialize;
use tracing::instrument;

use crate::{
    core::{
        app_state::AppState,
        http::{response_envelope::ApiResponse, user_key::UserKey},
    },
    error_handler::{AppError, AppResult},
};

#[derive(Debug, Serialize)]
pub struct Saved {
    pub save_id: i64,
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct Deleted {
    pub message: &'static str,
}

fn ensure_project(state: &AppState, project_id: i64) -> AppResult<()> {
    match state.store.find_project(project_id)? {
        Some(_) => Ok(()),
        None => Err(AppError::not_found("游戏项目不存在")),
    }
}

/// Upserts the caller's slot.
#[instrument(name = "save_game", skip(state, body), fields(user = %user.0))]
pub async fn save_game(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<i64>,
    user: UserKey,
    Json(body): Json<SaveRequest>,
) -> AppResult<ApiResponse<Saved>> {
    ensure_project(&state, project_id)?;
    let save_id = state.store.save_game(project_id, &user.0, &body)?;
    Ok(ApiResponse::success(Saved {
        save_id,
        message: "存档成功",
    }))
}

pub async fn load_game(
    State(state): State<Arc<AppState>>,
    Path((project_id, slot)): Path<(i64, i64)>,
    user: UserKey,
) -> AppResult<ApiResponse<GameSave>> {
    let save = state
        .store
        .load_game(project_id, &user.0, slot)?
        .ok_or_else(|| AppError::not_found("存档不存在"))?;
    Ok(ApiResponse::success(save))
}

pub async fn list_saves(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<i64>,
    user: UserKey,
) -> AppResult<ApiResponse<Vec<SaveSummary>>> {
    ensure_project(&state, project_id)?;
    Ok(ApiResponse::success(state.store.list_saves(project_id, &user.0)?))
}

pub async fn delete_save(
    State(state): State<Arc<AppState>>,
    Path((project_id, slot)): Path<(i64, i64)>,
    user: UserKey,
) -> AppResult<ApiResponse<Deleted>> {
    if !state.store.delete_save(project_id, &user.0, slot)? {
        return Err(AppError::not_found("存档不存在"));
    }
    Ok(ApiResponse::success(Deleted {
        message: "存档已删除",
    }))
}
