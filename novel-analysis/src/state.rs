//! Durable game design of one project.
//!
//! Every top-level field is stored as its own JSON document. Collections only grow
//! during analysis: merges append or fill in, they never remove entries.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Top-level fields that may be read and replaced through dotted paths.
pub const DOCUMENT_FIELDS: [&str; 6] = [
    "world_setting",
    "characters",
    "story_tree",
    "attributes",
    "items",
    "exploration",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    #[default]
    Pending,
    Processing,
    Paused,
    Completed,
    Failed,
}

impl AnalysisStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AnalysisStatus::Pending => "pending",
            AnalysisStatus::Processing => "processing",
            AnalysisStatus::Paused => "paused",
            AnalysisStatus::Completed => "completed",
            AnalysisStatus::Failed => "failed",
        }
    }

    /// Unknown spellings map to `Pending`.
    pub fn parse(s: &str) -> Self {
        match s {
            "processing" | "analyzing" => AnalysisStatus::Processing,
            "paused" => AnalysisStatus::Paused,
            "completed" => AnalysisStatus::Completed,
            "failed" => AnalysisStatus::Failed,
            _ => AnalysisStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CharacterRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub importance: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationship: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemRecord {
    #[serde(default)]
    pub item_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rarity: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemCatalog {
    #[serde(default)]
    pub items: Vec<ItemRecord>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AreaRecord {
    #[serde(default)]
    pub area_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<Value>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Exploration {
    #[serde(default)]
    pub areas: Vec<AreaRecord>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A place in the novel where the player could branch, found during analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoicePoint {
    pub chunk_index: u64,
    #[serde(default)]
    pub suggestion: Option<Value>,
    #[serde(default)]
    pub attributes: Vec<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceOption {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_node: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effects: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StoryNode {
    Dialogue {
        node_id: String,
        speaker: String,
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        next: Option<String>,
    },
    Narration {
        node_id: String,
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        next: Option<String>,
    },
    Choice {
        node_id: String,
        #[serde(default)]
        prompt: String,
        options: Vec<ChoiceOption>,
    },
}

impl StoryNode {
    pub fn node_id(&self) -> &str {
        match self {
            StoryNode::Dialogue { node_id, .. }
            | StoryNode::Narration { node_id, .. }
            | StoryNode::Choice { node_id, .. } => node_id,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub scene_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub nodes: Vec<StoryNode>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoryChapter {
    pub chapter_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub scenes: Vec<Scene>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Chapters → scenes → nodes, plus the raw choice points collected during analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoryTree {
    #[serde(default)]
    pub choice_points: Vec<ChoicePoint>,
    #[serde(default)]
    pub chapters: Vec<StoryChapter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub convergence: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectState {
    #[serde(default)]
    pub world_setting: BTreeMap<String, Value>,
    #[serde(default)]
    pub characters: BTreeMap<String, CharacterRecord>,
    #[serde(default)]
    pub story_tree: StoryTree,
    #[serde(default = "empty_object")]
    pub attributes: Value,
    #[serde(default)]
    pub items: ItemCatalog,
    #[serde(default)]
    pub exploration: Exploration,
    /// Chunks processed so far; the single source of truth for resume.
    #[serde(default)]
    pub analysis_progress: u64,
    #[serde(default)]
    pub total_chunks: u64,
    #[serde(default)]
    pub analysis_status: AnalysisStatus,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

/// Progress overview returned to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisSummary {
    pub total_chunks: u64,
    pub analyzed_chunks: u64,
    pub progress_percent: f64,
    pub status: AnalysisStatus,
    pub characters_found: usize,
    pub world_setting_categories: Vec<String>,
    pub choice_points_found: usize,
}

impl ProjectState {
    pub fn new() -> Self {
        Self {
            attributes: empty_object(),
            ..Self::default()
        }
    }

    pub fn find_chapter(&self, chapter_id: &str) -> Option<&StoryChapter> {
        self.story_tree
            .chapters
            .iter()
            .find(|c| c.chapter_id == chapter_id)
    }

    /// Scene by id together with the chapter that contains it.
    pub fn find_scene(&self, scene_id: &str) -> Option<(&StoryChapter, &Scene)> {
        self.story_tree.chapters.iter().find_map(|chapter| {
            chapter
                .scenes
                .iter()
                .find(|s| s.scene_id == scene_id)
                .map(|scene| (chapter, scene))
        })
    }

    pub fn character_id_by_name(&self, name: &str) -> Option<&str> {
        let name = name.trim();
        self.characters
            .iter()
            .find(|(_, rec)| rec.name.as_deref().map(str::trim) == Some(name))
            .map(|(id, _)| id.as_str())
    }

    pub fn progress_percent(&self) -> f64 {
        if self.total_chunks == 0 {
            return 0.0;
        }
        let pct = self.analysis_progress as f64 / self.total_chunks as f64 * 100.0;
        (pct * 100.0).round() / 100.0
    }

    pub fn summary(&self) -> AnalysisSummary {
        AnalysisSummary {
            total_chunks: self.total_chunks,
            analyzed_chunks: self.analysis_progress,
            progress_percent: self.progress_percent(),
            status: self.analysis_status,
            characters_found: self.characters.len(),
            world_setting_categories: self.world_setting.keys().cloned().collect(),
            choice_points_found: self.story_tree.choice_points.len(),
        }
    }

    /// The editable part of the project as one JSON object keyed by [`DOCUMENT_FIELDS`].
    pub fn to_document(&self) -> Value {
        let mut doc = Map::new();
        doc.insert("world_setting".into(), to_value(&self.world_setting));
        doc.insert("characters".into(), to_value(&self.characters));
        doc.insert("story_tree".into(), to_value(&self.story_tree));
        doc.insert("attributes".into(), self.attributes.clone());
        doc.insert("items".into(), to_value(&self.items));
        doc.insert("exploration".into(), to_value(&self.exploration));
        Value::Object(doc)
    }

    /// Rebuilds the editable fields from a document; progress and status are kept.
    pub fn with_document(&self, doc: Value) -> Result<Self, serde_json::Error> {
        #[derive(Deserialize)]
        struct Document {
            #[serde(default)]
            world_setting: BTreeMap<String, Value>,
            #[serde(default)]
            characters: BTreeMap<String, CharacterRecord>,
            #[serde(default)]
            story_tree: StoryTree,
            #[serde(default = "empty_object")]
            attributes: Value,
            #[serde(default)]
            items: ItemCatalog,
            #[serde(default)]
            exploration: Exploration,
        }

        let d: Document = serde_json::from_value(doc)?;
        Ok(Self {
            world_setting: d.world_setting,
            characters: d.characters,
            story_tree: d.story_tree,
            attributes: d.attributes,
            items: d.items,
            exploration: d.exploration,
            ..self.clone()
        })
    }
}

fn to_value<T: Serialize>(v: &T) -> Value {
    // Plain data maps with string keys always serialize.
    serde_json::to_value(v).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn with_story() -> ProjectState {
        let mut state = ProjectState::new();
        state.story_tree = serde_json::from_value(json!({
            "chapters": [{
                "chapter_id": "ch_001",
                "title": "陨落的天才",
                "scenes": [{
                    "scene_id": "sc_001",
                    "name": "测验",
                    "location": "萧家",
                    "nodes": [
                        { "type": "narration", "node_id": "n1", "text": "测验开始", "next": "n2" },
                        { "type": "dialogue", "node_id": "n2", "speaker": "萧炎", "text": "……" },
                        { "type": "choice", "node_id": "n3", "options": [{ "text": "隐忍" }, { "text": "反驳", "effects": { "声望": -1 } }] }
                    ]
                }]
            }]
        }))
        .unwrap();
        state
    }

    #[test]
    fn chapter_and_scene_lookup() {
        let state = with_story();
        assert_eq!(state.find_chapter("ch_001").unwrap().title, "陨落的天才");
        assert!(state.find_chapter("ch_404").is_none());
        let (chapter, scene) = state.find_scene("sc_001").unwrap();
        assert_eq!(chapter.chapter_id, "ch_001");
        assert_eq!(scene.nodes[2].node_id(), "n3");
    }

    #[test]
    fn document_round_trip_keeps_progress() {
        let mut state = with_story();
        state.analysis_progress = 7;
        state.analysis_status = AnalysisStatus::Paused;
        let doc = state.to_document();
        assert!(doc.get("analysis_progress").is_none());
        let back = state.with_document(doc).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn summary_percent_is_rounded() {
        let mut state = ProjectState::new();
        state.total_chunks = 3;
        state.analysis_progress = 1;
        assert_eq!(state.summary().progress_percent, 33.33);
        assert_eq!(AnalysisStatus::parse("analyzing"), AnalysisStatus::Processing);
    }
}
