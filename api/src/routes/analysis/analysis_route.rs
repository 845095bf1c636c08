use std::{path::Path, sync::Arc};

use axum::extract::{Json, Path as UrlPath, State};
use game_store::ProjectRecord;
use novel_analysis::{
    AnalysisError, AnalysisRepository, AnalysisStatus, NovelProcessor, ProgressTracker, StepOutcome,
    finalize::{FinalizeReport, finalize_design},
    processor::Pipeline,
    state::AnalysisSummary,
    text::read_novel,
};
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::{
    core::{
        app_state::AppState,
        http::{llm_overrides::LlmOverrides, response_envelope::ApiResponse},
    },
    error_handler::{AppError, AppResult},
};

#[derive(Debug, Serialize)]
pub struct StepResponse {
    pub status: AnalysisStatus,
    /// Chunks processed so far.
    pub current_chunk: u64,
    pub total_chunks: u64,
    pub progress_percent: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<u64>,
    pub cached: bool,
    /// Blank chunks passed over before the analyzed one.
    pub skipped: u64,
    /// Set when the step reached a review milestone.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review_checkpoint: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct ProgressResponse {
    pub status: AnalysisStatus,
    pub progress: u64,
    pub total_chunks: u64,
    pub summary: AnalysisSummary,
}

fn project_or_404(state: &AppState, project_id: i64) -> AppResult<ProjectRecord> {
    state
        .store
        .find_project(project_id)?
        .ok_or_else(|| AppError::not_found("项目不存在"))
}

/// Marks the project as processing and analyzes the first pending chunk.
#[instrument(name = "analyze_start", skip(state, body))]
pub async fn start_analysis(
    State(state): State<Arc<AppState>>,
    UrlPath(project_id): UrlPath<i64>,
    Json(body): Json<LlmOverrides>,
) -> AppResult<ApiResponse<StepResponse>> {
    step(&state, project_id, body, true).await.map(ApiResponse::success)
}

/// Analyzes the next pending chunk.
#[instrument(name = "analyze_continue", skip(state, body))]
pub async fn continue_analysis(
    State(state): State<Arc<AppState>>,
    UrlPath(project_id): UrlPath<i64>,
    Json(body): Json<LlmOverrides>,
) -> AppResult<ApiResponse<StepResponse>> {
    step(&state, project_id, body, false).await.map(ApiResponse::success)
}

/// One chunk step. Blank chunks are passed over until a chunk is analyzed or the
/// novel is exhausted. A failed chunk is not skipped: the project is marked failed
/// and the next call retries it.
async fn step(
    state: &AppState,
    project_id: i64,
    body: LlmOverrides,
    start: bool,
) -> AppResult<StepResponse> {
    let record = project_or_404(state, project_id)?;
    let oracle = state.oracle(body.api_provider.as_deref(), body.api_key)?;
    let text = read_novel(Path::new(&record.novel_path))?;

    let mut config = state.analysis.clone();
    config.chapter_mode = record.chapter_mode;
    config.auto_approve = false;

    let deps = Pipeline {
        oracle: &oracle,
        repo: &*state.store,
        prompts: &*state.prompts,
        cancel: CancellationToken::new(),
    };
    let mut tracker = ProgressTracker::new(record.state.total_chunks);
    tracker
        .set_review_milestone(config.review_interval)
        .map_err(AnalysisError::from)?;
    let mut processor =
        NovelProcessor::open(project_id, text, record.state, deps, config, tracker)?;
    // A finished project keeps its status; anything else is processing again.
    if processor.next_index() < processor.total_chunks() {
        processor.begin()?;
    }

    let mut skipped = 0;
    let outcome = loop {
        match processor.process_next().await? {
            StepOutcome::Skipped { .. } => skipped += 1,
            other => break other,
        }
    };

    let mut response = StepResponse {
        status: processor.state().analysis_status,
        current_chunk: processor.state().analysis_progress,
        total_chunks: processor.total_chunks(),
        progress_percent: processor.state().progress_percent(),
        chunk_index: None,
        cached: false,
        skipped,
        review_checkpoint: None,
        analysis_result: None,
        message: None,
    };

    match outcome {
        StepOutcome::Processed {
            index,
            cached,
            checkpoint,
        } => {
            response.chunk_index = Some(index);
            response.cached = cached;
            response.review_checkpoint = checkpoint
                .filter(|cp| cp.awaiting_review)
                .map(|cp| cp.processed);
            response.analysis_result = state.store.cached_result(project_id, index)?;
        }
        StepOutcome::Failed { index, message } => {
            return Err(AppError::ChunkFailed { index, message });
        }
        StepOutcome::Exhausted => {
            response.message = Some("小说分析已完成");
        }
        StepOutcome::Skipped { .. } | StepOutcome::Cancelled => {}
    }
    if start {
        info!(project_id, total = response.total_chunks, "analysis started");
    }
    Ok(response)
}

#[instrument(name = "analyze_progress", skip(state))]
pub async fn get_progress(
    State(state): State<Arc<AppState>>,
    UrlPath(project_id): UrlPath<i64>,
) -> AppResult<ApiResponse<ProgressResponse>> {
    let record = project_or_404(&state, project_id)?;
    Ok(ApiResponse::success(ProgressResponse {
        status: record.state.analysis_status,
        progress: record.state.analysis_progress,
        total_chunks: record.state.total_chunks,
        summary: record.state.summary(),
    }))
}

/// Runs the five design passes over the accumulated project.
#[instrument(name = "analyze_finalize", skip(state, body))]
pub async fn finalize_analysis(
    State(state): State<Arc<AppState>>,
    UrlPath(project_id): UrlPath<i64>,
    Json(body): Json<LlmOverrides>,
) -> AppResult<ApiResponse<FinalizeReport>> {
    let record = project_or_404(&state, project_id)?;
    let oracle = state.oracle(body.api_provider.as_deref(), body.api_key)?;
    let deps = Pipeline {
        oracle: &oracle,
        repo: &*state.store,
        prompts: &*state.prompts,
        cancel: CancellationToken::new(),
    };
    let mut project = record.state;
    let report =
        finalize_design(project_id, &deps, &mut project, state.analysis.oracle_timeout).await?;
    Ok(ApiResponse::success(report))
}
