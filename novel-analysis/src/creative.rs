//! Chat assistant for creative mode.
//!
//! Every turn sends `[system prompt, game context?, ...history, user]`. The history
//! keeps the latest [`MAX_HISTORY`] messages and can be persisted by the caller.

use std::time::Duration;

use ai_llm_service::ChatMessage;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
    error::Result,
    oracle::{LlmOracle, call_guarded},
    state::ProjectState,
};

/// Messages (user and assistant) kept between turns.
pub const MAX_HISTORY: usize = 20;
const WORLD_SETTING_CHARS: usize = 2000;

pub struct CreativeAgent<'a, O> {
    oracle: &'a O,
    system_prompt: String,
    history: Vec<ChatMessage>,
    timeout: Duration,
    cancel: CancellationToken,
}

impl<'a, O: LlmOracle> CreativeAgent<'a, O> {
    pub fn new(oracle: &'a O, system_prompt: impl Into<String>) -> Self {
        Self {
            oracle,
            system_prompt: system_prompt.into(),
            history: Vec::new(),
            timeout: Duration::from_secs(120),
            cancel: CancellationToken::new(),
        }
    }

    /// Continues a persisted conversation.
    pub fn with_history(mut self, mut history: Vec<ChatMessage>) -> Self {
        trim_history(&mut history);
        self.history = history;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn into_history(self) -> Vec<ChatMessage> {
        self.history
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// One chat turn. The exchange is appended to the history only when the call succeeds.
    pub async fn chat(&mut self, message: &str, game: Option<&ProjectState>) -> Result<String> {
        let mut messages = Vec::with_capacity(self.history.len() + 1);
        if let Some(state) = game {
            messages.push(ChatMessage::system(game_context_message(state)));
        }
        messages.extend(self.history.iter().cloned());

        let reply = call_guarded(
            self.oracle,
            &self.cancel,
            self.timeout,
            &self.system_prompt,
            &messages,
            message,
        )
        .await?;

        self.history.push(ChatMessage::user(message));
        self.history.push(ChatMessage::assistant(reply.clone()));
        trim_history(&mut self.history);
        debug!(history = self.history.len(), "creative turn done");
        Ok(reply)
    }

    /// Asks for ready-to-use JSON content of `content_type`.
    pub async fn generate_content(
        &mut self,
        content_type: &str,
        requirements: &str,
        game: Option<&ProjectState>,
    ) -> Result<String> {
        let prompt = format!(
            "请根据以下要求生成游戏内容：\n\n内容类型：{content_type}\n具体要求：{requirements}\n\n请以JSON格式输出，确保格式正确可以直接使用。"
        );
        self.chat(&prompt, game).await
    }

    /// Asks for a modified JSON value at `target_path` plus an explanation.
    pub async fn modify_content(
        &mut self,
        target_path: &str,
        modification: &str,
        game: Option<&ProjectState>,
    ) -> Result<String> {
        let prompt = format!(
            "请修改以下游戏内容：\n\n修改目标：{target_path}\n修改要求：{modification}\n\n请输出修改后的JSON数据，以及修改说明。"
        );
        self.chat(&prompt, game).await
    }

    /// Reviews `new_content` against the existing world, characters, logic and balance.
    pub async fn check_consistency(
        &mut self,
        new_content: &serde_json::Value,
        game: Option<&ProjectState>,
    ) -> Result<String> {
        let prompt = format!(
            "请检查以下新内容与现有游戏的一致性：\n\n新内容：{new_content}\n\n请检查：\n1. 世界观一致性\n2. 角色行为一致性\n3. 逻辑一致性\n4. 数值平衡\n\n输出检查结果和建议。"
        );
        self.chat(&prompt, game).await
    }

    pub async fn suggest_ideas(&mut self, game: Option<&ProjectState>) -> Result<String> {
        self.chat(SUGGEST_PROMPT, game).await
    }
}

const SUGGEST_PROMPT: &str = "根据当前游戏内容，请提供一些创意建议：\n\n1. 可以扩展的剧情方向\n2. 可以添加的新角色\n3. 可以设计的支线任务\n4. 可以改进的系统\n\n请以结构化的方式输出建议。";

/// Context system message: world setting (first 2000 characters of its JSON),
/// character count and chapter count.
pub fn game_context_message(state: &ProjectState) -> String {
    let world = serde_json::to_string(&state.world_setting).unwrap_or_else(|_| "{}".into());
    let world: String = world.chars().take(WORLD_SETTING_CHARS).collect();
    format!(
        "当前游戏数据上下文：\n- 世界观：{world}\n- 角色数量：{}\n- 章节数量：{}",
        state.characters.len(),
        state.story_tree.chapters.len()
    )
}

fn trim_history(history: &mut Vec<ChatMessage>) {
    if history.len() > MAX_HISTORY {
        history.drain(..history.len() - MAX_HISTORY);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::oracle::testing::ScriptedOracle;

    #[tokio::test]
    async fn history_is_capped() {
        let oracle = ScriptedOracle::answering("好的");
        let mut agent = CreativeAgent::new(&oracle, "助手");
        for i in 0..15 {
            agent.chat(&format!("第{i}轮"), None).await.unwrap();
        }
        assert_eq!(agent.history().len(), MAX_HISTORY);
        assert_eq!(agent.history()[0].content, "第5轮");
    }

    #[tokio::test]
    async fn failed_turn_leaves_history_alone() {
        let oracle = ScriptedOracle::default();
        let mut agent = CreativeAgent::new(&oracle, "助手");
        assert!(agent.chat("你好", None).await.is_err());
        assert!(agent.history().is_empty());
    }

    #[tokio::test]
    async fn generate_content_wraps_requirements() {
        let oracle = ScriptedOracle::answering("{\"name\": \"新角色\"}");
        let mut agent = CreativeAgent::new(&oracle, "助手");
        let reply = agent
            .generate_content("角色", "一位隐世炼药师", Some(&ProjectState::new()))
            .await
            .unwrap();
        assert!(reply.contains("新角色"));
        let sent = &oracle.user_messages()[0];
        assert!(sent.contains("内容类型：角色"));
        assert!(sent.contains("具体要求：一位隐世炼药师"));
    }

    #[tokio::test]
    async fn editing_helpers_share_the_conversation() {
        let oracle = ScriptedOracle::answering("建议如下");
        let mut agent = CreativeAgent::new(&oracle, "助手");
        let game = ProjectState::new();

        agent
            .modify_content("characters.char_001.性格", "更加沉稳", Some(&game))
            .await
            .unwrap();
        agent
            .check_consistency(&json!({"名称": "玄重尺"}), Some(&game))
            .await
            .unwrap();
        agent.suggest_ideas(Some(&game)).await.unwrap();

        let sent = oracle.user_messages();
        assert!(sent[0].contains("修改目标：characters.char_001.性格"));
        assert!(sent[0].contains("修改要求：更加沉稳"));
        assert!(sent[1].contains(r#"新内容：{"名称":"玄重尺"}"#));
        assert!(sent[1].contains("4. 数值平衡"));
        assert!(sent[2].starts_with("根据当前游戏内容"));
        assert_eq!(agent.history().len(), 6);
    }

    #[test]
    fn context_message_truncates_world_setting() {
        let mut state = ProjectState::new();
        state
            .world_setting
            .insert("长设定".into(), json!("字".repeat(3000)));
        let msg = game_context_message(&state);
        assert!(msg.starts_with("当前游戏数据上下文：\n- 世界观：{"));
        assert!(msg.ends_with("- 角色数量：0\n- 章节数量：0"));
        let world_line = msg.lines().nth(1).unwrap();
        assert_eq!(world_line.chars().count(), "- 世界观：".chars().count() + 2000);
    }
}
