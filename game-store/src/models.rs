//! Row types returned by [`crate::Store`].

use ai_llm_service::ChatMessage;
use novel_analysis::{AnalysisStatus, ProjectState};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Default owner of saves made without a user key.
pub const ANONYMOUS_USER: &str = "anonymous";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProject {
    pub name: String,
    pub description: String,
    pub novel_path: String,
    pub chapter_mode: bool,
}

/// Full project row including the game design.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectRecord {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub novel_path: String,
    pub chapter_mode: bool,
    pub created_at: String,
    pub updated_at: String,
    pub state: ProjectState,
}

/// Listing entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectSummary {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub analysis_status: AnalysisStatus,
    pub analysis_progress: u64,
    pub total_chunks: u64,
    pub created_at: String,
}

/// Player state written to a slot. Missing fields take their empty defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveRequest {
    #[serde(default)]
    pub slot: i64,
    #[serde(default)]
    pub save_name: Option<String>,
    #[serde(default)]
    pub current_chapter: String,
    #[serde(default)]
    pub current_scene: String,
    #[serde(default)]
    pub current_node: String,
    #[serde(default = "empty_object")]
    pub attributes: Value,
    #[serde(default = "empty_array")]
    pub inventory: Value,
    #[serde(default = "empty_array")]
    pub flags: Value,
    #[serde(default = "empty_object")]
    pub relationships: Value,
    #[serde(default = "empty_object")]
    pub exploration: Value,
    #[serde(default)]
    pub play_time: i64,
}

impl SaveRequest {
    pub fn save_name_or_default(&self) -> String {
        match self.save_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("存档 {}", self.slot),
        }
    }
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

fn empty_array() -> Value {
    Value::Array(Vec::new())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GameSave {
    pub id: i64,
    pub slot: i64,
    pub save_name: String,
    pub current_chapter: String,
    pub current_scene: String,
    pub current_node: String,
    pub attributes: Value,
    pub inventory: Value,
    pub flags: Value,
    pub relationships: Value,
    pub exploration: Value,
    pub play_time: i64,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SaveSummary {
    pub slot: i64,
    pub save_name: String,
    pub current_chapter: String,
    pub play_time: i64,
    pub updated_at: String,
}

/// Creative chat session. API keys are never stored; only the provider name is.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreativeSession {
    pub id: i64,
    pub project_id: i64,
    pub provider: String,
    pub history: Vec<ChatMessage>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewModificationLog {
    pub session_id: Option<i64>,
    pub operation_type: String,
    pub target_path: String,
    pub old_value: Value,
    pub new_value: Value,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModificationLog {
    pub id: i64,
    pub project_id: i64,
    pub session_id: Option<i64>,
    pub operation_type: String,
    pub target_path: String,
    pub old_value: Value,
    pub new_value: Value,
    pub description: String,
    pub created_at: String,
}

/// Author-defined content (quests, items, scenes) kept beside the generated design.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCustomContent {
    pub content_type: String,
    pub content_id: String,
    pub content_data: Value,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomContent {
    pub id: i64,
    pub content_type: String,
    pub content_id: String,
    pub content_data: Value,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}
