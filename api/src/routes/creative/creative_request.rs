use game_store::NewCustomContent;
use novel_analysis::edit::Modification;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error_handler::{AppError, AppResult};

const CONTENT_TYPE_MAX_CHARS: usize = 50;
const CONTENT_ID_MAX_CHARS: usize = 100;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    #[serde(default)]
    pub content_type: String,
    #[serde(default)]
    pub requirements: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ModifyRequest {
    #[serde(default)]
    pub target_path: String,
    #[serde(default)]
    pub modification: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ConsistencyRequest {
    #[serde(default)]
    pub new_content: Value,
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SuggestRequest {
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CustomContentRequest {
    #[serde(default)]
    pub content_type: String,
    #[serde(default)]
    pub content_id: String,
    #[serde(default = "empty_object")]
    pub content_data: Value,
    #[serde(default = "active")]
    pub is_active: bool,
}

impl CustomContentRequest {
    pub fn into_new(self) -> AppResult<NewCustomContent> {
        let content_type = self.content_type.trim();
        let content_id = self.content_id.trim();
        if content_type.is_empty() || content_id.is_empty() {
            return Err(AppError::bad_request("内容类型和内容ID不能为空"));
        }
        if content_type.chars().count() > CONTENT_TYPE_MAX_CHARS
            || content_id.chars().count() > CONTENT_ID_MAX_CHARS
        {
            return Err(AppError::bad_request("内容类型或内容ID过长"));
        }
        Ok(NewCustomContent {
            content_type: content_type.to_string(),
            content_id: content_id.to_string(),
            content_data: self.content_data,
            is_active: self.is_active,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct CustomContentQuery {
    #[serde(rename = "type", default)]
    pub content_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApplyRequest {
    pub modification: Modification,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    50
}

fn empty_object() -> Value {
    json!({})
}

fn active() -> bool {
    true
}
