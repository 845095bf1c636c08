//! Turns the accumulated design into playable systems.
//!
//! Five oracle passes run in order, each fed with what the previous ones produced:
//! story tree, world-line convergence, attributes, items, exploration. A pass whose
//! reply is not usable JSON leaves its field as it was.

use std::time::Duration;

use serde::Serialize;
use serde_json::{Value, json};
use tracing::{info, instrument, warn};

use crate::{
    discovery::OracleReply,
    error::{AnalysisError, OracleError, Result},
    merge::{area_id, item_id},
    oracle::{LlmOracle, call_guarded},
    processor::Pipeline,
    prompts::PromptKind,
    repository::AnalysisRepository,
    state::{AnalysisStatus, Exploration, ItemCatalog, ProjectState, StoryTree},
};

/// Chunk summaries handed to the story designer.
pub const STORY_SUMMARY_LIMIT: usize = 100;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FinalizeReport {
    pub characters_count: usize,
    pub world_setting_keys: Vec<String>,
    pub has_story_tree: bool,
    pub has_attributes: bool,
    pub has_items: bool,
    pub has_exploration: bool,
    /// Passes that failed; their fields were left untouched.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<String>,
}

impl FinalizeReport {
    fn of(state: &ProjectState, failures: Vec<String>) -> Self {
        Self {
            characters_count: state.characters.len(),
            world_setting_keys: state.world_setting.keys().cloned().collect(),
            has_story_tree: !state.story_tree.chapters.is_empty(),
            has_attributes: match &state.attributes {
                Value::Object(map) => !map.is_empty(),
                Value::Null => false,
                _ => true,
            },
            has_items: !state.items.items.is_empty(),
            has_exploration: !state.exploration.areas.is_empty(),
            failures,
        }
    }
}

struct Designer<'p, 'a, O, R> {
    deps: &'p Pipeline<'a, O, R>,
    timeout: Duration,
    failures: Vec<String>,
}

impl<O: LlmOracle, R: AnalysisRepository> Designer<'_, '_, O, R> {
    /// Structured reply of one pass. Transport failures are recorded and yield `None`;
    /// cancellation aborts the whole finalize.
    async fn ask(&mut self, kind: PromptKind, user: Value) -> Result<Option<Value>> {
        let reply = call_guarded(
            self.deps.oracle,
            &self.deps.cancel,
            self.timeout,
            self.deps.prompts.get(kind),
            &[],
            &user.to_string(),
        )
        .await;
        match reply {
            Ok(text) => {
                let value = OracleReply::parse(&text).structured();
                if value.is_none() {
                    warn!(pass = kind.file_name(), "design reply is not JSON, field kept");
                }
                Ok(value)
            }
            Err(OracleError::Cancelled) => Err(OracleError::Cancelled.into()),
            Err(err) => {
                warn!(pass = kind.file_name(), %err, "design pass failed");
                self.failures.push(format!("{}: {err}", kind.file_name()));
                Ok(None)
            }
        }
    }

    fn reject(&mut self, kind: PromptKind, err: serde_json::Error) {
        warn!(pass = kind.file_name(), %err, "design reply has an unexpected shape, field kept");
        self.failures.push(format!("{}: {err}", kind.file_name()));
    }
}

/// Runs the five design passes and marks the project completed.
#[instrument(skip_all, fields(project_id = project_id))]
pub async fn finalize_design<O, R>(
    project_id: i64,
    deps: &Pipeline<'_, O, R>,
    state: &mut ProjectState,
    timeout: Duration,
) -> Result<FinalizeReport>
where
    O: LlmOracle,
    R: AnalysisRepository,
{
    let summaries = recent_chunk_summaries(project_id, deps.repo)?;
    let mut designer = Designer {
        deps,
        timeout,
        failures: Vec::new(),
    };

    // Story tree; choice points gathered during analysis always survive.
    let story = designer
        .ask(
            PromptKind::StoryDesigner,
            json!({
                "任务类型": "详细设计",
                "世界观": state.world_setting,
                "角色库": state.characters,
                "章节总结": summaries,
            }),
        )
        .await?;
    if let Some(value) = story {
        match serde_json::from_value::<StoryTree>(value) {
            Ok(mut tree) => {
                tree.choice_points = std::mem::take(&mut state.story_tree.choice_points);
                if tree.convergence.is_none() {
                    tree.convergence = state.story_tree.convergence.take();
                }
                state.story_tree = tree;
            }
            Err(err) => designer.reject(PromptKind::StoryDesigner, err),
        }
    }
    let story_design = json!({
        "chapters": state.story_tree.chapters,
    });

    if let Some(convergence) = designer
        .ask(PromptKind::ConvergenceDesigner, json!({ "剧情设计": story_design }))
        .await?
    {
        state.story_tree.convergence = Some(convergence);
    }

    if let Some(attributes) = designer
        .ask(
            PromptKind::AttributeDesigner,
            json!({ "世界观": state.world_setting, "角色库": state.characters }),
        )
        .await?
    {
        state.attributes = attributes;
    }

    if let Some(value) = designer
        .ask(
            PromptKind::ItemDesigner,
            json!({ "世界观": state.world_setting, "小说中的物品": state.items.items }),
        )
        .await?
    {
        match serde_json::from_value::<ItemCatalog>(value) {
            Ok(mut catalog) => {
                if catalog.items.is_empty() {
                    catalog.items = std::mem::take(&mut state.items.items);
                }
                for (i, item) in catalog.items.iter_mut().enumerate() {
                    if item.item_id.is_empty() {
                        item.item_id = item_id(i + 1);
                    }
                }
                state.items = catalog;
            }
            Err(err) => designer.reject(PromptKind::ItemDesigner, err),
        }
    }

    if let Some(value) = designer
        .ask(
            PromptKind::ExplorationDesigner,
            json!({ "世界观": state.world_setting, "剧情设计": story_design }),
        )
        .await?
    {
        match serde_json::from_value::<Exploration>(value) {
            Ok(mut exploration) => {
                if exploration.areas.is_empty() {
                    exploration.areas = std::mem::take(&mut state.exploration.areas);
                }
                for (i, area) in exploration.areas.iter_mut().enumerate() {
                    if area.area_id.is_empty() {
                        area.area_id = area_id(i + 1);
                    }
                }
                state.exploration = exploration;
            }
            Err(err) => designer.reject(PromptKind::ExplorationDesigner, err),
        }
    }

    state.analysis_status = AnalysisStatus::Completed;
    state.analysis_progress = state.total_chunks.max(state.analysis_progress);
    deps.repo
        .save_project(project_id, state)
        .map_err(AnalysisError::repository)?;

    let report = FinalizeReport::of(state, designer.failures);
    info!(
        project_id,
        characters = report.characters_count,
        chapters = state.story_tree.chapters.len(),
        failures = report.failures.len(),
        "game design finalized"
    );
    Ok(report)
}

/// `片段摘要` of the latest cached chunks, oldest first.
fn recent_chunk_summaries<R: AnalysisRepository>(project_id: i64, repo: &R) -> Result<Vec<Value>> {
    let cached = repo
        .cached_results(project_id, u64::MAX)
        .map_err(AnalysisError::repository)?;
    let mut summaries: Vec<Value> = cached
        .into_iter()
        .filter_map(|(_, v)| v.get("片段摘要").filter(|s| s.is_object()).cloned())
        .collect();
    let excess = summaries.len().saturating_sub(STORY_SUMMARY_LIMIT);
    summaries.drain(..excess);
    Ok(summaries)
}

#[cfg(test)]
mod tests {
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::oracle::testing::ScriptedOracle;
    use crate::prompts::PromptCatalog;
    use crate::repository::testing::MemoryRepository;
    use crate::state::{AreaRecord, ChoicePoint, ItemRecord};

    fn seeded_state() -> ProjectState {
        let mut state = ProjectState::new();
        state.total_chunks = 12;
        state.analysis_progress = 12;
        state.story_tree.choice_points.push(ChoicePoint {
            chunk_index: 3,
            suggestion: Some(json!("隐忍或反抗")),
            attributes: vec![],
        });
        state.items.items.push(ItemRecord {
            item_id: "item_001".into(),
            name: Some("纳戒".into()),
            ..ItemRecord::default()
        });
        state.exploration.areas.push(AreaRecord {
            area_id: "area_001".into(),
            name: Some("萧家".into()),
            ..AreaRecord::default()
        });
        state
    }

    #[tokio::test]
    async fn passes_run_in_order_and_keep_unusable_fields() {
        let story = json!({
            "chapters": [{ "chapter_id": "ch_001", "title": "退婚", "scenes": [] }]
        });
        let oracle = ScriptedOracle::new([
            story.to_string(),
            json!({ "收束点": ["三年之约"] }).to_string(),
            json!({ "基础属性": ["斗气"] }).to_string(),
            "道具设计稍后给出".to_string(),
            json!({ "areas": [] }).to_string(),
        ]);
        let repo = MemoryRepository::new();
        repo.store_result(1, 0, "…", &json!({ "片段摘要": { "核心事件": "退婚" } }))
            .unwrap();
        let prompts = PromptCatalog::builtin();
        let deps = Pipeline {
            oracle: &oracle,
            repo: &repo,
            prompts: &prompts,
            cancel: CancellationToken::new(),
        };

        let mut state = seeded_state();
        let report = finalize_design(1, &deps, &mut state, Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(state.analysis_status, AnalysisStatus::Completed);
        assert_eq!(state.story_tree.chapters[0].title, "退婚");
        assert_eq!(state.story_tree.choice_points.len(), 1);
        assert_eq!(
            state.story_tree.convergence,
            Some(json!({ "收束点": ["三年之约"] }))
        );
        assert_eq!(state.attributes["基础属性"][0], "斗气");
        assert_eq!(state.items.items[0].name.as_deref(), Some("纳戒"));
        assert_eq!(state.exploration.areas[0].area_id, "area_001");
        assert!(report.has_story_tree && report.has_attributes && report.has_items);
        assert!(report.failures.is_empty());

        let calls = oracle.user_messages();
        assert_eq!(calls.len(), 5);
        assert!(calls[0].contains("详细设计") && calls[0].contains("退婚"));
        assert!(calls[1].contains("剧情设计"));
        assert!(calls[3].contains("小说中的物品"));
        assert_eq!(repo.project(1).unwrap(), state);
    }

    #[tokio::test]
    async fn transport_failures_are_reported_not_fatal() {
        let oracle = ScriptedOracle::default();
        let repo = MemoryRepository::new();
        let prompts = PromptCatalog::builtin();
        let deps = Pipeline {
            oracle: &oracle,
            repo: &repo,
            prompts: &prompts,
            cancel: CancellationToken::new(),
        };
        let mut state = seeded_state();
        let report = finalize_design(1, &deps, &mut state, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(report.failures.len(), 5);
        assert_eq!(state.analysis_status, AnalysisStatus::Completed);
        assert!(!report.has_story_tree);
        assert!(report.has_exploration);
    }

    #[tokio::test]
    async fn cancellation_aborts() {
        let oracle = ScriptedOracle::answering("{}");
        let repo = MemoryRepository::new();
        let prompts = PromptCatalog::builtin();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let deps = Pipeline {
            oracle: &oracle,
            repo: &repo,
            prompts: &prompts,
            cancel,
        };
        let mut state = seeded_state();
        let err = finalize_design(1, &deps, &mut state, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Oracle(OracleError::Cancelled)));
        assert!(repo.project(1).is_none());
    }
}
