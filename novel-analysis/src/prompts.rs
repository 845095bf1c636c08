//! System prompts for every oracle role.
//!
//! Built-in prompts are compiled in. A prompt directory may override any of them with a
//! Markdown file named after the role (`01-小说分析器.md`, …); missing files fall back
//! to the built-in text.

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use tracing::{debug, info};

use crate::error::AnalysisError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptKind {
    NovelAnalyzer,
    WorldExtractor,
    CharacterAnalyzer,
    StoryDesigner,
    ConvergenceDesigner,
    AttributeDesigner,
    ItemDesigner,
    ExplorationDesigner,
    CreativeAssistant,
}

impl PromptKind {
    pub const ALL: [PromptKind; 9] = [
        PromptKind::NovelAnalyzer,
        PromptKind::WorldExtractor,
        PromptKind::CharacterAnalyzer,
        PromptKind::StoryDesigner,
        PromptKind::ConvergenceDesigner,
        PromptKind::AttributeDesigner,
        PromptKind::ItemDesigner,
        PromptKind::ExplorationDesigner,
        PromptKind::CreativeAssistant,
    ];

    pub fn file_name(self) -> &'static str {
        match self {
            PromptKind::NovelAnalyzer => "01-小说分析器.md",
            PromptKind::WorldExtractor => "02-世界观提取器.md",
            PromptKind::CharacterAnalyzer => "03-角色分析器.md",
            PromptKind::StoryDesigner => "04-剧情设计器.md",
            PromptKind::ConvergenceDesigner => "05-世界线收束设计.md",
            PromptKind::AttributeDesigner => "06-属性系统设计.md",
            PromptKind::ItemDesigner => "07-物品道具设计.md",
            PromptKind::ExplorationDesigner => "08-探索系统设计.md",
            PromptKind::CreativeAssistant => "09-创造模式助手.md",
        }
    }

    fn builtin(self) -> &'static str {
        match self {
            PromptKind::NovelAnalyzer => NOVEL_ANALYZER,
            PromptKind::WorldExtractor => WORLD_EXTRACTOR,
            PromptKind::CharacterAnalyzer => CHARACTER_ANALYZER,
            PromptKind::StoryDesigner => STORY_DESIGNER,
            PromptKind::ConvergenceDesigner => CONVERGENCE_DESIGNER,
            PromptKind::AttributeDesigner => ATTRIBUTE_DESIGNER,
            PromptKind::ItemDesigner => ITEM_DESIGNER,
            PromptKind::ExplorationDesigner => EXPLORATION_DESIGNER,
            PromptKind::CreativeAssistant => CREATIVE_ASSISTANT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PromptCatalog {
    prompts: HashMap<PromptKind, String>,
    source: Option<PathBuf>,
}

impl Default for PromptCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PromptCatalog {
    pub fn builtin() -> Self {
        Self {
            prompts: PromptKind::ALL
                .iter()
                .map(|k| (*k, k.builtin().to_string()))
                .collect(),
            source: None,
        }
    }

    /// Built-ins overridden by the non-empty files found in `dir`.
    pub fn load(dir: &Path) -> Result<Self, AnalysisError> {
        let mut catalog = Self::builtin();
        let mut overridden = 0usize;
        for kind in PromptKind::ALL {
            let path = dir.join(kind.file_name());
            if !path.is_file() {
                continue;
            }
            let text = fs::read_to_string(&path).map_err(|source| AnalysisError::Io {
                path: path.clone(),
                source,
            })?;
            if text.trim().is_empty() {
                debug!(file = %path.display(), "empty prompt override ignored");
                continue;
            }
            catalog.prompts.insert(kind, text);
            overridden += 1;
        }
        info!(dir = %dir.display(), overridden, "prompt catalog loaded");
        catalog.source = Some(dir.to_path_buf());
        Ok(catalog)
    }

    /// [`PromptCatalog::load`] when a directory is configured, built-ins otherwise.
    pub fn from_dir(dir: Option<&Path>) -> Result<Self, AnalysisError> {
        match dir {
            Some(dir) => Self::load(dir),
            None => Ok(Self::builtin()),
        }
    }

    pub fn get(&self, kind: PromptKind) -> &str {
        self.prompts
            .get(&kind)
            .map(String::as_str)
            .unwrap_or_else(|| kind.builtin())
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }
}

/* ------------------------------------------------------------------------- */
/* Built-in prompts                                                          */
/* ------------------------------------------------------------------------- */

const NOVEL_ANALYZER: &str = r#"你是一名小说分析专家，负责把小说逐段拆解为可以改编成文字冒险游戏的素材。

输入是一个 JSON 对象：
- 片段序号：当前片段在全书中的序号（从 0 开始）
- 片段内容：本片段原文
- 累积上下文：已识别角色、已知世界观元素、前文摘要、当前剧情阶段、片段摘要列表

只输出一个 JSON 对象，不要输出任何解释文字，格式如下：
{
  "新发现": {
    "新角色": [{"名称": "", "首次描述": "", "重要程度预估": "主要/次要/龙套", "与主角关系": ""}],
    "新地点": [{"名称": "", "描述": "", "类型": ""}],
    "新物品": [{"名称": "", "描述": "", "功能": "", "稀有度预估": ""}],
    "新设定": [{"类型": "力量体系/地理/势力/历史/规则/其他", "内容": ""}]
  },
  "片段摘要": {
    "核心事件": "一句话概括",
    "详细描述": "",
    "剧情重要性": "日常/铺垫/核心剧情/高潮",
    "角色动态": [{"角色": "", "变化": ""}]
  },
  "游戏化潜力": {
    "可作为选择点": false,
    "选择点建议": "",
    "属性相关": []
  }
}

已在累积上下文中出现的角色不要重复列入新角色。没有新内容的字段输出空数组。"#;

const WORLD_EXTRACTOR: &str = r#"你是世界观设定整理师。输入包含当前世界观和新发现的设定，任务类型为增量更新。

请把新设定归入合适的类别，与当前世界观合并后只输出变化的部分，格式为 JSON 对象：
键为类别名称（如 力量体系、地理、势力、历史、规则），值为设定条目数组或对象。
不要删除或改写已有设定，不要输出 JSON 以外的内容。"#;

const CHARACTER_ANALYZER: &str = r#"你是角色分析师。输入包含当前角色库和最近的角色动态，任务类型为更新角色。

输出一个 JSON 对象，键为角色 ID（如 char_001）或角色名称，值为需要更新的字段：
{"char_001": {"name": "", "description": "", "importance": "", "relationship": "", "性格": "", "能力": ""}}
只输出有变化的角色，不要输出 JSON 以外的内容。"#;

const STORY_DESIGNER: &str = r#"你是文字冒险游戏的剧情设计师。输入包含世界观、角色库和章节总结。

请把小说剧情设计为可游玩的剧情树，只输出 JSON：
{
  "chapters": [
    {
      "chapter_id": "ch_001",
      "title": "",
      "scenes": [
        {
          "scene_id": "sc_001",
          "name": "",
          "location": "",
          "nodes": [
            {"type": "narration", "node_id": "n_001", "text": "", "next": "n_002"},
            {"type": "dialogue", "node_id": "n_002", "speaker": "", "text": "", "next": "n_003"},
            {"type": "choice", "node_id": "n_003", "prompt": "", "options": [{"text": "", "next_node": "", "effects": {}}]}
          ]
        }
      ]
    }
  ]
}
保持原著主线，在关键节点设计有意义的分支选择。"#;

const CONVERGENCE_DESIGNER: &str = r#"你是世界线收束设计师。输入是剧情设计。

请设计分支如何收束回主线：列出关键收束点、各分支的偏离程度、收束条件和结局变体，以 JSON 输出。"#;

const ATTRIBUTE_DESIGNER: &str = r#"你是游戏数值策划。输入包含世界观和角色库。

请根据小说的力量体系设计玩家属性系统，以 JSON 输出：基础属性、派生属性、等级或境界划分、成长规则和属性对剧情选择的影响。"#;

const ITEM_DESIGNER: &str = r#"你是游戏道具策划。输入包含世界观和小说中出现的物品。

请以 JSON 输出道具系统：{"items": [{"item_id": "item_001", "name": "", "description": "", "function": "", "rarity": ""}]}，可附加获取途径和使用效果。"#;

const EXPLORATION_DESIGNER: &str = r#"你是探索系统设计师。输入包含世界观和剧情设计。

请以 JSON 输出可探索区域：{"areas": [{"area_id": "area_001", "name": "", "description": "", "type": ""}]}，可附加区域之间的连接、解锁条件和可发现的事件。"#;

const CREATIVE_ASSISTANT: &str =
    "你是一个游戏内容创作助手，帮助玩家在创造模式下设计和修改游戏内容。";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_overrides_individual_prompts() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("04-剧情设计器.md"), "自定义剧情提示").unwrap();
        fs::write(dir.path().join("01-小说分析器.md"), "  \n").unwrap();

        let catalog = PromptCatalog::load(dir.path()).unwrap();
        assert_eq!(catalog.get(PromptKind::StoryDesigner), "自定义剧情提示");
        assert_eq!(catalog.get(PromptKind::NovelAnalyzer), NOVEL_ANALYZER);
        assert_eq!(catalog.source(), Some(dir.path()));
    }

    #[test]
    fn builtin_analyzer_names_every_recognized_key() {
        let prompt = PromptCatalog::builtin();
        let text = prompt.get(PromptKind::NovelAnalyzer);
        for key in ["新发现", "片段摘要", "游戏化潜力", "角色动态", "可作为选择点"] {
            assert!(text.contains(key), "{key}");
        }
    }
}
