//! Folding chunk analyses into the durable [`ProjectState`].
//!
//! Ids are derived from collection sizes (`char_{len+1:03}`), moving past ids that are
//! already taken (creative edits may add entries out of sequence). This is only sound
//! while a single worker writes a project. Two concurrent runs against one project
//! can hand out the same id.

use serde_json::{Map, Value};
use tracing::debug;

use crate::discovery::{ChunkAnalysis, SettingFact};
use crate::state::{AreaRecord, CharacterRecord, ChoicePoint, ItemRecord, ProjectState};

/// What one merge added.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub characters_added: usize,
    pub facts_added: usize,
    pub items_added: usize,
    pub areas_added: usize,
    pub choice_point_added: bool,
}

impl MergeOutcome {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

pub fn character_id(n: usize) -> String {
    format!("char_{n:03}")
}

pub fn item_id(n: usize) -> String {
    format!("item_{n:03}")
}

pub fn area_id(n: usize) -> String {
    format!("area_{n:03}")
}

/// First id from `len + 1` upwards that `taken` rejects.
fn free_id(len: usize, make: fn(usize) -> String, taken: impl Fn(&str) -> bool) -> String {
    (len + 1..)
        .map(make)
        .find(|id| !taken(id.as_str()))
        .unwrap_or_else(|| make(len + 1))
}

fn next_character_id(state: &ProjectState) -> String {
    free_id(state.characters.len(), character_id, |id| {
        state.characters.contains_key(id)
    })
}

fn next_item_id(state: &ProjectState) -> String {
    free_id(state.items.items.len(), item_id, |id| {
        state.items.items.iter().any(|i| i.item_id == id)
    })
}

fn next_area_id(state: &ProjectState) -> String {
    free_id(state.exploration.areas.len(), area_id, |id| {
        state.exploration.areas.iter().any(|a| a.area_id == id)
    })
}

/// Merges one chunk's discoveries and gamification hints.
///
/// Without `新发现` the chunk adds nothing but a possible choice point.
pub fn merge_analysis(
    state: &mut ProjectState,
    analysis: &ChunkAnalysis,
    chunk_index: u64,
) -> MergeOutcome {
    let mut outcome = MergeOutcome::default();

    if let Some(found) = &analysis.discoveries {
        for candidate in &found.characters {
            let name = candidate
                .name
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty());
            if let Some(name) = name {
                if state.character_id_by_name(name).is_some() {
                    continue;
                }
            }
            let id = next_character_id(state);
            state.characters.insert(
                id,
                CharacterRecord {
                    name: name.map(str::to_string),
                    description: candidate.first_description.clone(),
                    importance: candidate.importance.clone(),
                    relationship: candidate.relation_to_protagonist.clone(),
                    extra: candidate.extra.clone(),
                },
            );
            outcome.characters_added += 1;
        }

        for fact in &found.settings {
            if add_setting_fact(state, fact) {
                outcome.facts_added += 1;
            }
        }

        for item in &found.items {
            let id = next_item_id(state);
            state.items.items.push(ItemRecord {
                item_id: id,
                name: item.name.clone(),
                description: item.description.clone(),
                function: item.function.clone(),
                rarity: item.rarity.clone(),
                extra: item.extra.clone(),
            });
            outcome.items_added += 1;
        }

        for location in &found.locations {
            let id = next_area_id(state);
            state.exploration.areas.push(AreaRecord {
                area_id: id,
                name: location.name.clone(),
                description: location.description.clone(),
                kind: location.kind.clone(),
                extra: location.extra.clone(),
            });
            outcome.areas_added += 1;
        }
    }

    if let Some(potential) = analysis.potential.as_ref().filter(|p| p.is_choice_point) {
        state.story_tree.choice_points.push(ChoicePoint {
            chunk_index,
            suggestion: potential.suggestion.clone(),
            attributes: potential.related_attributes.clone(),
        });
        outcome.choice_point_added = true;
    }

    debug!(chunk = chunk_index, ?outcome, "merged chunk analysis");
    outcome
}

/// Adds a fact to its category unless an identical one is already there.
/// Facts without content are ignored.
fn add_setting_fact(state: &mut ProjectState, fact: &SettingFact) -> bool {
    let Some(content) = fact.content.clone().filter(|c| !c.is_null()) else {
        return false;
    };
    let category = fact.category_or_default().to_string();
    push_unique(state.world_setting.entry(category).or_insert(Value::Null), content)
}

/// Appends `value` to the list at `slot`, wrapping a scalar into a list first.
fn push_unique(slot: &mut Value, value: Value) -> bool {
    if !slot.is_array() {
        let previous = slot.take();
        *slot = Value::Array(if previous.is_null() {
            Vec::new()
        } else {
            vec![previous]
        });
    }
    let Value::Array(list) = slot else {
        return false;
    };
    // serde_json maps are ordered by key, so `to_string` is canonical.
    let key = value.to_string();
    if list.iter().any(|v| v.to_string() == key) {
        return false;
    }
    list.push(value);
    true
}

/// Merges the world-setting extractor's output (category → facts).
///
/// Lists are appended with the same dedup as chunk facts; objects are extended;
/// unseen categories are inserted as is. Returns the number of entries changed.
pub fn merge_world_setting(state: &mut ProjectState, update: Value) -> usize {
    let Value::Object(update) = update else {
        return 0;
    };
    let mut changed = 0;
    for (category, incoming) in update {
        if incoming.is_null() {
            continue;
        }
        match state.world_setting.get_mut(&category) {
            None => {
                state.world_setting.insert(category, incoming);
                changed += 1;
            }
            Some(Value::Object(existing)) => {
                if let Value::Object(incoming) = incoming {
                    for (k, v) in incoming {
                        if existing.get(&k) != Some(&v) {
                            existing.insert(k, v);
                            changed += 1;
                        }
                    }
                }
            }
            Some(existing) => match incoming {
                Value::Array(values) => {
                    for v in values {
                        if push_unique(existing, v) {
                            changed += 1;
                        }
                    }
                }
                Value::Object(_) => {}
                scalar => {
                    if push_unique(existing, scalar) {
                        changed += 1;
                    }
                }
            },
        }
    }
    changed
}

/// Merges the character analyzer's output, keyed by character id or by name.
///
/// Known characters get their fields overwritten; unknown ones get a fresh id.
pub fn merge_character_profiles(state: &mut ProjectState, update: Value) -> usize {
    let Value::Object(update) = update else {
        return 0;
    };
    let mut changed = 0;
    for (key, profile) in update {
        let Value::Object(mut fields) = profile else {
            continue;
        };
        let display_name = take_string(&mut fields, &["name", "名称"]).unwrap_or_else(|| {
            if key.starts_with("char_") {
                String::new()
            } else {
                key.clone()
            }
        });

        let id = if state.characters.contains_key(&key) {
            key.clone()
        } else if let Some(id) = state.character_id_by_name(&key) {
            id.to_string()
        } else if let Some(id) = state.character_id_by_name(&display_name) {
            id.to_string()
        } else {
            let id = next_character_id(state);
            state.characters.insert(
                id.clone(),
                CharacterRecord {
                    name: Some(display_name.clone()).filter(|n| !n.is_empty()),
                    ..CharacterRecord::default()
                },
            );
            id
        };

        if let Some(record) = state.characters.get_mut(&id) {
            apply_profile(record, fields);
            changed += 1;
        }
    }
    changed
}

fn take_string(fields: &mut Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match fields.remove(*k) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    })
}

fn apply_profile(record: &mut CharacterRecord, fields: Map<String, Value>) {
    for (key, value) in fields {
        match key.as_str() {
            "description" | "描述" => record.description = Some(value),
            "importance" | "重要程度" => record.importance = Some(value),
            "relationship" | "与主角关系" => record.relationship = Some(value),
            _ => {
                record.extra.insert(key, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn analysis(v: Value) -> ChunkAnalysis {
        ChunkAnalysis::from_value(&v).unwrap()
    }

    #[test]
    fn same_character_twice_yields_one_id() {
        let mut state = ProjectState::new();
        let a = analysis(json!({ "新发现": { "新角色": [{ "名称": "张三" }] } }));
        merge_analysis(&mut state, &a, 0);
        let again = analysis(json!({ "新发现": { "新角色": [{ "名称": " 张三 " }] } }));
        let outcome = merge_analysis(&mut state, &again, 1);

        assert_eq!(outcome.characters_added, 0);
        assert_eq!(state.characters.len(), 1);
        assert_eq!(state.character_id_by_name("张三"), Some("char_001"));
    }

    #[test]
    fn nameless_candidates_are_appended() {
        let mut state = ProjectState::new();
        let a = analysis(json!({ "新发现": { "新角色": [{ "首次描述": "黑袍人" }, {}] } }));
        merge_analysis(&mut state, &a, 0);
        assert_eq!(
            state.characters.keys().collect::<Vec<_>>(),
            vec!["char_001", "char_002"]
        );
    }

    #[test]
    fn facts_are_grouped_and_deduplicated() {
        let mut state = ProjectState::new();
        let a = analysis(json!({
            "新发现": { "新设定": [
                { "类型": "力量体系", "内容": "斗之气九段" },
                { "类型": "力量体系", "内容": "斗之气九段" },
                { "内容": { "名称": "加玛帝国" } },
                { "类型": "势力" }
            ] }
        }));
        let outcome = merge_analysis(&mut state, &a, 3);
        assert_eq!(outcome.facts_added, 2);
        assert_eq!(state.world_setting["力量体系"], json!(["斗之气九段"]));
        assert_eq!(state.world_setting["其他"], json!([{ "名称": "加玛帝国" }]));
        assert!(!state.world_setting.contains_key("势力"));
    }

    #[test]
    fn items_areas_and_choice_points() {
        let mut state = ProjectState::new();
        let a = analysis(json!({
            "新发现": {
                "新物品": [{ "名称": "纳戒" }, { "名称": "玄重尺" }],
                "新地点": [{ "名称": "魔兽山脉", "类型": "野外" }]
            },
            "游戏化潜力": { "可作为选择点": true, "选择点建议": "拜师或离开" }
        }));
        let outcome = merge_analysis(&mut state, &a, 7);
        assert_eq!(outcome.items_added, 2);
        assert_eq!(state.items.items[1].item_id, "item_002");
        assert_eq!(state.exploration.areas[0].area_id, "area_001");
        assert_eq!(state.story_tree.choice_points[0].chunk_index, 7);
        assert!(state.story_tree.chapters.is_empty());

        let quiet = analysis(json!({ "游戏化潜力": { "可作为选择点": false } }));
        assert!(merge_analysis(&mut state, &quiet, 8).is_empty());
    }

    #[test]
    fn world_setting_update_merges_by_shape() {
        let mut state = ProjectState::new();
        state.world_setting.insert("力量体系".into(), json!(["斗之气"]));
        state.world_setting.insert("地理".into(), json!({ "大陆": "斗气大陆" }));
        state.world_setting.insert("纪年".into(), json!("未知"));

        let changed = merge_world_setting(
            &mut state,
            json!({
                "力量体系": ["斗之气", "斗者"],
                "地理": { "帝国": "加玛" },
                "纪年": "斗气纪元",
                "势力": ["云岚宗"]
            }),
        );
        assert_eq!(changed, 4);
        assert_eq!(state.world_setting["力量体系"], json!(["斗之气", "斗者"]));
        assert_eq!(state.world_setting["地理"]["帝国"], "加玛");
        assert_eq!(state.world_setting["纪年"], json!(["未知", "斗气纪元"]));
        assert_eq!(merge_world_setting(&mut state, json!("oops")), 0);
    }

    #[test]
    fn character_profiles_match_by_id_then_name() {
        let mut state = ProjectState::new();
        let a = analysis(json!({ "新发现": { "新角色": [{ "名称": "萧炎" }] } }));
        merge_analysis(&mut state, &a, 0);

        let changed = merge_character_profiles(
            &mut state,
            json!({
                "char_001": { "描述": "少年天才", "性格": "坚韧" },
                "药老": { "与主角关系": "师父" }
            }),
        );
        assert_eq!(changed, 2);
        let xiao = &state.characters["char_001"];
        assert_eq!(xiao.description, Some(json!("少年天才")));
        assert_eq!(xiao.extra["性格"], "坚韧");
        assert_eq!(state.character_id_by_name("药老"), Some("char_002"));
        assert_eq!(state.characters["char_002"].relationship, Some(json!("师父")));
    }

    #[test]
    fn taken_ids_are_never_reused() {
        let mut state = ProjectState::new();
        merge_analysis(
            &mut state,
            &analysis(json!({ "新发现": { "新角色": [{ "名称": "萧炎" }] } })),
            0,
        );
        state = crate::edit::apply(&state, "characters.char_003", json!({ "name": "药老" }))
            .unwrap()
            .state;
        state.items.items.push(ItemRecord {
            item_id: "item_001".into(),
            ..ItemRecord::default()
        });
        state.items.items.push(ItemRecord {
            item_id: "item_003".into(),
            ..ItemRecord::default()
        });

        merge_analysis(
            &mut state,
            &analysis(json!({ "新发现": {
                "新角色": [{ "名称": "萧薰儿" }],
                "新物品": [{ "名称": "纳戒" }]
            } })),
            1,
        );
        merge_character_profiles(&mut state, json!({ "纳兰嫣然": { "描述": "云岚宗弟子" } }));

        let names: Vec<_> = state
            .characters
            .values()
            .filter_map(|c| c.name.as_deref())
            .collect();
        assert_eq!(names, vec!["萧炎", "药老", "萧薰儿", "纳兰嫣然"]);
        assert_eq!(state.character_id_by_name("药老"), Some("char_003"));
        assert_eq!(state.character_id_by_name("萧薰儿"), Some("char_004"));
        assert_eq!(state.character_id_by_name("纳兰嫣然"), Some("char_005"));
        assert_eq!(state.items.items[2].item_id, "item_004");
    }
}
