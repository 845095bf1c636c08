use std::{collections::BTreeMap, sync::Arc};

use axum::extract::{Path, State};
use novel_analysis::state::{
    CharacterRecord, Exploration, ItemCatalog, Scene, StoryChapter, StoryTree,
};
use serde::Serialize;
use serde_json::Value;

use crate::{
    core::{app_state::AppState, http::response_envelope::ApiResponse},
    error_handler::{AppError, AppResult},
};

/// Everything a player client needs to run the game.
#[derive(Debug, Serialize)]
pub struct GameData {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub world_setting: BTreeMap<String, Value>,
    pub characters: BTreeMap<String, CharacterRecord>,
    pub story_tree: StoryTree,
    pub attributes: Value,
    pub items: ItemCatalog,
    pub exploration: Exploration,
}

#[derive(Debug, Serialize)]
pub struct SceneData {
    pub chapter_id: String,
    #[serde(flatten)]
    pub scene: Scene,
}

pub async fn game_data(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<i64>,
) -> AppResult<ApiResponse<GameData>> {
    let record = state
        .store
        .find_project(project_id)?
        .ok_or_else(|| AppError::not_found("游戏项目不存在"))?;
    let game = record.state;
    Ok(ApiResponse::success(GameData {
        id: record.id,
        name: record.name,
        description: record.description,
        world_setting: game.world_setting,
        characters: game.characters,
        story_tree: game.story_tree,
        attributes: game.attributes,
        items: game.items,
        exploration: game.exploration,
    }))
}

pub async fn chapter(
    State(state): State<Arc<AppState>>,
    Path((project_id, chapter_id)): Path<(i64, String)>,
) -> AppResult<ApiResponse<StoryChapter>> {
    let record = state
        .store
        .find_project(project_id)?
        .ok_or_else(|| AppError::not_found("游戏项目不存在"))?;
    let chapter = record
        .state
        .find_chapter(&chapter_id)
        .cloned()
        .ok_or_else(|| AppError::not_found("章节不存在"))?;
    Ok(ApiResponse::success(chapter))
}

pub async fn scene(
    State(state): State<Arc<AppState>>,
    Path((project_id, scene_id)): Path<(i64, String)>,
) -> AppResult<ApiResponse<SceneData>> {
    let record = state
        .store
        .find_project(project_id)?
        .ok_or_else(|| AppError::not_found("游戏项目不存在"))?;
    let (chapter, scene) = record
        .state
        .find_scene(&scene_id)
        .ok_or_else(|| AppError::not_found("场景不存在"))?;
    Ok(ApiResponse::success(SceneData {
        chapter_id: chapter.chapter_id.clone(),
        scene: scene.clone(),
    }))
}
