use std::sync::Arc;

use axum::extract::{Json, Path, Query, State};
use game_store::{CreativeSession, CustomContent, ModificationLog, NewModificationLog};
use novel_analysis::{
    ProjectState, SharedOracle,
    creative::CreativeAgent,
    edit::{self, OP_REVERT},
    prompts::PromptKind,
};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, instrument};

use crate::{
    core::{
        app_state::{AppState, CREATIVE_TEMPERATURE},
        http::{llm_overrides::LlmOverrides, response_envelope::ApiResponse},
    },
    error_handler::{AppError, AppResult},
    routes::creative::creative_request::{
        ApplyRequest, ChatRequest, ConsistencyRequest, CustomContentQuery, CustomContentRequest,
        GenerateRequest, HistoryQuery, ModifyRequest, SuggestRequest,
    },
};

#[derive(Debug, Serialize)]
pub struct SessionStarted {
    pub session_id: i64,
    pub provider: String,
}

#[derive(Debug, Serialize)]
pub struct ChatReply {
    pub response: String,
}

#[derive(Debug, Serialize)]
pub struct GeneratedContent {
    pub generated_content: String,
}

#[derive(Debug, Serialize)]
pub struct CustomContentSaved {
    pub content_id: i64,
    pub created: bool,
}

#[derive(Debug, Serialize)]
pub struct ModificationApplied {
    pub message: &'static str,
    pub log_id: i64,
    pub old_value: Value,
}

#[derive(Debug, Serialize)]
pub struct HistoryEntry {
    pub id: i64,
    pub operation_type: String,
    pub target_path: String,
    pub description: String,
    pub created_at: String,
}

impl From<ModificationLog> for HistoryEntry {
    fn from(log: ModificationLog) -> Self {
        Self {
            id: log.id,
            operation_type: log.operation_type,
            target_path: log.target_path,
            description: log.description,
            created_at: log.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Reverted {
    pub message: &'static str,
    pub log_id: i64,
}

fn session_or_404(state: &AppState, session_id: i64) -> AppResult<CreativeSession> {
    state
        .store
        .find_session(session_id)?
        .ok_or_else(|| AppError::not_found("会话不存在"))
}

fn project_state(state: &AppState, project_id: i64) -> AppResult<ProjectState> {
    Ok(state
        .store
        .find_project(project_id)?
        .ok_or_else(|| AppError::not_found("项目不存在"))?
        .state)
}

/// Creative client for a stored session: the session's provider, the request's key
/// (or the environment's) and the creative temperature.
fn session_client(
    state: &AppState,
    session: &CreativeSession,
    api_key: Option<String>,
) -> AppResult<SharedOracle> {
    let config = state
        .llm_config(Some(&session.provider), api_key)?
        .with_temperature(CREATIVE_TEMPERATURE);
    Ok(state.oracle_for(config)?)
}

/// One assistant call made on behalf of a session.
enum Turn<'r> {
    Chat(&'r str),
    Generate {
        content_type: &'r str,
        requirements: &'r str,
    },
    Modify {
        target_path: &'r str,
        modification: &'r str,
    },
    Consistency(&'r Value),
    Suggest,
}

/// Runs `turn` on the session's conversation and persists the grown history.
async fn session_turn(
    state: &AppState,
    session_id: i64,
    api_key: Option<String>,
    turn: Turn<'_>,
) -> AppResult<String> {
    let session = session_or_404(state, session_id)?;
    let game = project_state(state, session.project_id)?;
    let client = session_client(state, &session, api_key)?;

    let mut agent = CreativeAgent::new(&client, state.prompts.get(PromptKind::CreativeAssistant))
        .with_history(session.history)
        .with_timeout(state.analysis.oracle_timeout);
    let game = Some(&game);
    let reply = match turn {
        Turn::Chat(message) => agent.chat(message, game).await?,
        Turn::Generate {
            content_type,
            requirements,
        } => agent.generate_content(content_type, requirements, game).await?,
        Turn::Modify {
            target_path,
            modification,
        } => agent.modify_content(target_path, modification, game).await?,
        Turn::Consistency(content) => agent.check_consistency(content, game).await?,
        Turn::Suggest => agent.suggest_ideas(game).await?,
    };
    state
        .store
        .update_session_history(session_id, agent.history())?;
    Ok(reply)
}

/// Opens a creative session. The credentials are validated now but not stored;
/// later calls carry their own key or use the server's.
#[instrument(name = "session_start", skip(state, body))]
pub async fn start_session(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<i64>,
    Json(body): Json<LlmOverrides>,
) -> AppResult<ApiResponse<SessionStarted>> {
    project_state(&state, project_id)?;
    let config = state.llm_config(body.api_provider.as_deref(), body.api_key)?;
    let provider = config.provider.to_string();
    state.oracle_for(config)?;
    let session_id = state.store.create_session(project_id, &provider)?;
    info!(project_id, session_id, %provider, "creative session started");
    Ok(ApiResponse::success(SessionStarted {
        session_id,
        provider,
    }))
}

#[instrument(name = "session_chat", skip(state, body))]
pub async fn chat(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<i64>,
    Json(body): Json<ChatRequest>,
) -> AppResult<ApiResponse<ChatReply>> {
    if body.message.trim().is_empty() {
        return Err(AppError::bad_request("消息不能为空"));
    }
    let response = session_turn(&state, session_id, body.api_key, Turn::Chat(&body.message)).await?;

    Ok(ApiResponse::success(ChatReply { response }))
}

#[instrument(name = "session_generate", skip(state, body))]
pub async fn generate(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<i64>,
    Json(body): Json<GenerateRequest>,
) -> AppResult<ApiResponse<GeneratedContent>> {
    if body.content_type.trim().is_empty() {
        return Err(AppError::bad_request("内容类型不能为空"));
    }
    let turn = Turn::Generate {
        content_type: &body.content_type,
        requirements: &body.requirements,
    };
    let generated_content = session_turn(&state, session_id, body.api_key, turn).await?;

    Ok(ApiResponse::success(GeneratedContent { generated_content }))
}

/// Asks the assistant to rework the value at `target_path`. Nothing is written;
/// the author applies the result through `/apply`.
#[instrument(name = "session_modify", skip(state, body))]
pub async fn suggest_modification(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<i64>,
    Json(body): Json<ModifyRequest>,
) -> AppResult<ApiResponse<ChatReply>> {
    if body.target_path.trim().is_empty() {
        return Err(AppError::bad_request("修改目标不能为空"));
    }
    let turn = Turn::Modify {
        target_path: &body.target_path,
        modification: &body.modification,
    };
    let response = session_turn(&state, session_id, body.api_key, turn).await?;
    Ok(ApiResponse::success(ChatReply { response }))
}

#[instrument(name = "session_consistency", skip(state, body))]
pub async fn check_consistency(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<i64>,
    Json(body): Json<ConsistencyRequest>,
) -> AppResult<ApiResponse<ChatReply>> {
    if body.new_content.is_null() {
        return Err(AppError::bad_request("待检查内容不能为空"));
    }
    let turn = Turn::Consistency(&body.new_content);
    let response = session_turn(&state, session_id, body.api_key, turn).await?;
    Ok(ApiResponse::success(ChatReply { response }))
}

#[instrument(name = "session_suggest", skip(state, body))]
pub async fn suggest_ideas(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<i64>,
    Json(body): Json<SuggestRequest>,
) -> AppResult<ApiResponse<ChatReply>> {
    let response = session_turn(&state, session_id, body.api_key, Turn::Suggest).await?;
    Ok(ApiResponse::success(ChatReply { response }))
}

/// Creates or updates the entry keyed by `(content_type, content_id)`.
#[instrument(name = "custom_content_save", skip(state, body))]
pub async fn save_custom_content(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<i64>,
    Json(body): Json<CustomContentRequest>,
) -> AppResult<ApiResponse<CustomContentSaved>> {
    project_state(&state, project_id)?;
    let content = body.into_new()?;
    let (content_id, created) = state.store.save_custom_content(project_id, &content)?;
    Ok(ApiResponse::success(CustomContentSaved {
        content_id,
        created,
    }))
}

pub async fn list_custom_content(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<i64>,
    Query(query): Query<CustomContentQuery>,
) -> AppResult<ApiResponse<Vec<CustomContent>>> {
    project_state(&state, project_id)?;
    let content_type = query.content_type.as_deref().filter(|t| !t.trim().is_empty());
    Ok(ApiResponse::success(
        state.store.list_custom_content(project_id, content_type)?,
    ))
}

/// Writes one dotted-path change and records it in the modification log.
#[instrument(name = "session_apply", skip(state, body))]
pub async fn apply_modification(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<i64>,
    Json(body): Json<ApplyRequest>,
) -> AppResult<ApiResponse<ModificationApplied>> {
    let session = session_or_404(&state, session_id)?;
    let current = project_state(&state, session.project_id)?;
    let m = body.modification;

    let applied = edit::apply(&current, &m.target_path, m.new_value.clone())
        .map_err(novel_analysis::AnalysisError::from)?;
    let log_id = state.store.apply_modification(
        session.project_id,
        &applied.state,
        &NewModificationLog {
            session_id: Some(session_id),
            operation_type: m.operation_type,
            target_path: m.target_path,
            old_value: applied.old_value.clone(),
            new_value: m.new_value,
            description: m.description,
        },
    )?;

    Ok(ApiResponse::success(ModificationApplied {
        message: "修改已应用",
        log_id,
        old_value: applied.old_value,
    }))
}

/// Latest modifications of a project, newest first.
pub async fn history(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<i64>,
    Query(query): Query<HistoryQuery>,
) -> AppResult<ApiResponse<Vec<HistoryEntry>>> {
    project_state(&state, project_id)?;
    let logs = state.store.list_logs(project_id, query.limit)?;
    Ok(ApiResponse::success(
        logs.into_iter().map(HistoryEntry::from).collect(),
    ))
}

/// Restores the value a logged modification replaced and logs the reversal.
///
/// A modification that created its target (old value `null`) has nothing to
/// restore; the reversal is still logged.
#[instrument(name = "history_revert", skip(state))]
pub async fn revert(
    State(state): State<Arc<AppState>>,
    Path((project_id, log_id)): Path<(i64, i64)>,
) -> AppResult<ApiResponse<Reverted>> {
    let log = state
        .store
        .find_log(project_id, log_id)?
        .ok_or_else(|| AppError::not_found("修改记录不存在"))?;
    let current = project_state(&state, project_id)?;

    let next = if log.old_value.is_null() {
        current
    } else {
        edit::apply(&current, &log.target_path, log.old_value.clone())
            .map_err(novel_analysis::AnalysisError::from)?
            .state
    };

    let revert_id = state.store.apply_modification(
        project_id,
        &next,
        &NewModificationLog {
            session_id: log.session_id,
            operation_type: OP_REVERT.to_string(),
            target_path: log.target_path.clone(),
            old_value: log.new_value,
            new_value: log.old_value,
            description: format!("撤销修改: {}", log.description),
        },
    )?;

    Ok(ApiResponse::success(Reverted {
        message: "修改已撤销",
        log_id: revert_id,
    }))
}
