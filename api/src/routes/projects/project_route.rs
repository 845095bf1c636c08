use std::{path::Path, sync::Arc};

use axum::extract::{Multipart, State};
use chrono::Utc;
use game_store::{NewProject, ProjectSummary};
use novel_analysis::{segment::count_chunks, text::decode_novel};
use serde::Serialize;
use tracing::{info, instrument};

use crate::{
    core::{app_state::AppState, http::response_envelope::ApiResponse},
    error_handler::{AppError, AppResult},
};

const DEFAULT_PROJECT_NAME: &str = "未命名游戏";

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health() -> ApiResponse<Health> {
    ApiResponse::success(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub async fn list_projects(
    State(state): State<Arc<AppState>>,
) -> AppResult<ApiResponse<Vec<ProjectSummary>>> {
    Ok(ApiResponse::success(state.store.list_projects()?))
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub project_id: i64,
    pub total_chunks: u64,
    pub message: &'static str,
}

/// Multipart upload: `name`, `description`, `chapter_mode` and the `novel` file.
///
/// The file is decoded once here so an unreadable encoding is rejected before a
/// project exists; the raw bytes are stored as uploaded.
#[instrument(name = "upload_novel", skip_all)]
pub async fn upload_novel(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> AppResult<ApiResponse<UploadResponse>> {
    let mut name = String::new();
    let mut description = String::new();
    let mut chapter_mode = false;
    let mut novel: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart.next_field().await? {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "name" => name = field.text().await?.trim().to_string(),
            "description" => description = field.text().await?,
            "chapter_mode" => {
                chapter_mode = matches!(field.text().await?.trim(), "true" | "1" | "on")
            }
            "novel" => {
                let file_name = field.file_name().unwrap_or("novel.txt").to_string();
                novel = Some((file_name, field.bytes().await?.to_vec()));
            }
            _ => {}
        }
    }

    let Some((file_name, bytes)) = novel else {
        return Err(AppError::bad_request("请上传小说文件"));
    };
    if name.is_empty() {
        name = DEFAULT_PROJECT_NAME.to_string();
    }

    let text = decode_novel(&bytes).map_err(novel_analysis::AnalysisError::from)?;
    let mut config = state.analysis.clone();
    config.chapter_mode = chapter_mode;
    let total_chunks = count_chunks(&text, config.segment_mode()) as u64;

    let path = state.novel_dir.join(stored_file_name(&file_name));
    write_upload(&path, &bytes).await?;

    let project_id = state.store.create_project(&NewProject {
        name,
        description,
        novel_path: path.to_string_lossy().into_owned(),
        chapter_mode,
    })?;
    let mut project_state = state.store.get_project(project_id)?.state;
    project_state.total_chunks = total_chunks;
    state.store.save_project_state(project_id, &project_state)?;

    info!(project_id, total_chunks, chapter_mode, bytes = bytes.len(), "novel uploaded");
    Ok(ApiResponse::success(UploadResponse {
        project_id,
        total_chunks,
        message: "小说上传成功，等待分析",
    }))
}

/// Timestamped, path-free file name.
fn stored_file_name(original: &str) -> String {
    let base = Path::new(original)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .unwrap_or("novel.txt");
    format!("{}_{}", Utc::now().format("%Y%m%d%H%M%S%3f"), base)
}

async fn write_upload(path: &Path, bytes: &[u8]) -> AppResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(AppError::Upload)?;
    }
    tokio::fs::write(path, bytes).await.map_err(AppError::Upload)
}
