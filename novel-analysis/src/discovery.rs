//! Typed view of the extraction oracle's reply.
//!
//! The oracle is asked for a JSON object with three recognized keys:
//!
//! ```json
//! {
//!   "新发现":   { "新角色": [...], "新地点": [...], "新物品": [...], "新设定": [...] },
//!   "片段摘要": { "核心事件": "...", "详细描述": "...", "剧情重要性": "...", "角色动态": [...] },
//!   "游戏化潜力": { "可作为选择点": true, "选择点建议": "...", "属性相关": [...] }
//! }
//! ```
//!
//! A reply that is not JSON is kept verbatim as `{"raw_response": text}` and contributes
//! nothing. A JSON reply whose recognized keys have the wrong shape is a [`ShapeError`].

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value, json};

use crate::error::ShapeError;

pub const RAW_RESPONSE_KEY: &str = "raw_response";

/* ------------------------------------------------------------------------- */
/* Raw reply                                                                 */
/* ------------------------------------------------------------------------- */

/// Oracle reply before schema validation.
#[derive(Debug, Clone, PartialEq)]
pub enum OracleReply {
    /// A JSON object.
    Structured(Value),
    /// Anything else, kept verbatim.
    Raw(String),
}

impl OracleReply {
    /// Parses reply text. A surrounding Markdown code fence is tolerated.
    pub fn parse(text: &str) -> Self {
        let body = strip_code_fence(text);
        match serde_json::from_str::<Value>(body) {
            Ok(v @ Value::Object(_)) => OracleReply::Structured(v),
            _ => OracleReply::Raw(text.to_string()),
        }
    }

    /// Recovers a reply from its cached form.
    pub fn from_cached(value: Value) -> Self {
        match value.get(RAW_RESPONSE_KEY).and_then(Value::as_str) {
            Some(raw) => OracleReply::Raw(raw.to_string()),
            None => OracleReply::Structured(value),
        }
    }

    /// The form stored in the analysis cache.
    pub fn into_value(self) -> Value {
        match self {
            OracleReply::Structured(v) => v,
            OracleReply::Raw(text) => json!({ RAW_RESPONSE_KEY: text }),
        }
    }

    pub fn structured(self) -> Option<Value> {
        match self {
            OracleReply::Structured(v) => Some(v),
            OracleReply::Raw(_) => None,
        }
    }
}

fn strip_code_fence(text: &str) -> &str {
    let t = text.trim();
    let Some(rest) = t.strip_prefix("```") else {
        return t;
    };
    let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric());
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/* ------------------------------------------------------------------------- */
/* Schema                                                                    */
/* ------------------------------------------------------------------------- */

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CharacterCandidate {
    #[serde(rename = "名称", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "首次描述", default, skip_serializing_if = "Option::is_none")]
    pub first_description: Option<Value>,
    #[serde(rename = "重要程度预估", default, skip_serializing_if = "Option::is_none")]
    pub importance: Option<Value>,
    #[serde(rename = "与主角关系", default, skip_serializing_if = "Option::is_none")]
    pub relation_to_protagonist: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocationCandidate {
    #[serde(rename = "名称", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "描述", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<Value>,
    #[serde(rename = "类型", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemCandidate {
    #[serde(rename = "名称", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "描述", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<Value>,
    #[serde(rename = "功能", default, skip_serializing_if = "Option::is_none")]
    pub function: Option<Value>,
    #[serde(rename = "稀有度预估", default, skip_serializing_if = "Option::is_none")]
    pub rarity: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A world-setting fact such as a power system rule or a faction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingFact {
    #[serde(rename = "类型", default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(rename = "内容", default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SettingFact {
    /// Category with the `其他` fallback.
    pub fn category_or_default(&self) -> &str {
        match self.category.as_deref().map(str::trim) {
            Some(c) if !c.is_empty() => c,
            _ => "其他",
        }
    }

    /// Content rendered as text; non-string content uses its JSON form.
    pub fn content_text(&self) -> Option<String> {
        match self.content.as_ref()? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewDiscoveries {
    #[serde(rename = "新角色", default, deserialize_with = "null_as_default")]
    pub characters: Vec<CharacterCandidate>,
    #[serde(rename = "新地点", default, deserialize_with = "null_as_default")]
    pub locations: Vec<LocationCandidate>,
    #[serde(rename = "新物品", default, deserialize_with = "null_as_default")]
    pub items: Vec<ItemCandidate>,
    #[serde(rename = "新设定", default, deserialize_with = "null_as_default")]
    pub settings: Vec<SettingFact>,
}

/// Per-chunk plot summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkSummary {
    #[serde(rename = "核心事件", default, skip_serializing_if = "Option::is_none")]
    pub core_event: Option<String>,
    #[serde(rename = "详细描述", default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(rename = "剧情重要性", default, skip_serializing_if = "Option::is_none")]
    pub importance: Option<String>,
    #[serde(rename = "角色动态", default, deserialize_with = "null_as_default")]
    pub character_dynamics: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChunkSummary {
    /// `核心剧情` and `高潮` chunks feed the key-event list of chapter summaries.
    pub fn is_key_event(&self) -> bool {
        matches!(self.importance.as_deref(), Some("核心剧情") | Some("高潮"))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GamePotential {
    #[serde(rename = "可作为选择点", default, deserialize_with = "lenient_bool")]
    pub is_choice_point: bool,
    #[serde(rename = "选择点建议", default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<Value>,
    #[serde(rename = "属性相关", default, deserialize_with = "null_as_default")]
    pub related_attributes: Vec<Value>,
}

/// Validated analysis of one chunk. Every part is optional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkAnalysis {
    pub discoveries: Option<NewDiscoveries>,
    pub summary: Option<ChunkSummary>,
    pub potential: Option<GamePotential>,
}

/// One discovery, borrowed from a [`ChunkAnalysis`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Discovery<'a> {
    Character(&'a CharacterCandidate),
    Location(&'a LocationCandidate),
    Item(&'a ItemCandidate),
    SettingFact(&'a SettingFact),
    Summary(&'a ChunkSummary),
}

impl ChunkAnalysis {
    /// Validates the recognized keys of a cached or fresh reply.
    ///
    /// `{"raw_response": ...}` and objects without recognized keys are empty analyses.
    ///
    /// # Errors
    /// [`ShapeError`] when the value is not an object or a recognized key has the
    /// wrong shape.
    pub fn from_value(value: &Value) -> Result<Self, ShapeError> {
        let obj = value
            .as_object()
            .ok_or_else(|| ShapeError::new("$", "analysis is not a JSON object"))?;
        if obj.contains_key(RAW_RESPONSE_KEY) {
            return Ok(Self::default());
        }
        Ok(Self {
            discoveries: field(obj, "新发现")?,
            summary: field(obj, "片段摘要")?,
            potential: field(obj, "游戏化潜力")?,
        })
    }

    /// All discoveries in a stable order: characters, locations, items, setting facts,
    /// then the summary.
    pub fn discoveries(&self) -> Vec<Discovery<'_>> {
        let mut out = Vec::new();
        if let Some(d) = &self.discoveries {
            out.extend(d.characters.iter().map(Discovery::Character));
            out.extend(d.locations.iter().map(Discovery::Location));
            out.extend(d.items.iter().map(Discovery::Item));
            out.extend(d.settings.iter().map(Discovery::SettingFact));
        }
        if let Some(s) = &self.summary {
            out.push(Discovery::Summary(s));
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.discoveries.is_none() && self.summary.is_none() && self.potential.is_none()
    }
}

fn field<T>(obj: &Map<String, Value>, key: &str) -> Result<Option<T>, ShapeError>
where
    T: for<'de> Deserialize<'de>,
{
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => serde_json::from_value(v.clone())
            .map(Some)
            .map_err(|e| ShapeError::new(key, e.to_string())),
    }
}

fn null_as_default<'de, D, T>(de: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(de)?.unwrap_or_default())
}

/// Accepts `true`/`false` as well as the string spellings LLMs tend to use.
fn lenient_bool<'de, D>(de: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(de)? {
        Value::Bool(b) => Ok(b),
        Value::Null => Ok(false),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "是" => Ok(true),
            "false" | "no" | "否" | "" => Ok(false),
            other => Err(serde::de::Error::custom(format!(
                "expected a boolean, got `{other}`"
            ))),
        },
        other => Err(serde::de::Error::custom(format!(
            "expected a boolean, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_json_reply_becomes_raw_passthrough() {
        let reply = OracleReply::parse("抱歉，我无法分析。");
        assert_eq!(
            reply.clone().into_value(),
            json!({ "raw_response": "抱歉，我无法分析。" })
        );
        let analysis = ChunkAnalysis::from_value(&reply.into_value()).unwrap();
        assert!(analysis.is_empty());
    }

    #[test]
    fn fenced_json_is_accepted() {
        let reply = OracleReply::parse("```json\n{\"片段摘要\": {\"核心事件\": \"退婚\"}}\n```");
        let v = reply.structured().unwrap();
        let analysis = ChunkAnalysis::from_value(&v).unwrap();
        assert_eq!(
            analysis.summary.unwrap().core_event.as_deref(),
            Some("退婚")
        );
    }

    #[test]
    fn wrong_shape_is_a_shape_error() {
        let err = ChunkAnalysis::from_value(&json!({ "新发现": { "新角色": "张三" } })).unwrap_err();
        assert_eq!(err.path, "新发现");
        assert!(ChunkAnalysis::from_value(&json!([1, 2])).is_err());
    }

    #[test]
    fn discoveries_are_ordered_and_nulls_tolerated() {
        let v = json!({
            "新发现": {
                "新设定": [{ "类型": "力量体系", "内容": "斗之气九段" }],
                "新角色": [{ "名称": "萧炎" }],
                "新物品": null
            },
            "片段摘要": { "核心事件": "测验", "剧情重要性": "核心剧情" },
            "游戏化潜力": { "可作为选择点": "是", "选择点建议": "是否隐忍" }
        });
        let analysis = ChunkAnalysis::from_value(&v).unwrap();
        let kinds: Vec<&str> = analysis
            .discoveries()
            .iter()
            .map(|d| match d {
                Discovery::Character(_) => "character",
                Discovery::Location(_) => "location",
                Discovery::Item(_) => "item",
                Discovery::SettingFact(_) => "setting",
                Discovery::Summary(_) => "summary",
            })
            .collect();
        assert_eq!(kinds, vec!["character", "setting", "summary"]);
        assert!(analysis.potential.unwrap().is_choice_point);
        assert!(analysis.summary.unwrap().is_key_event());
    }

    #[test]
    fn cached_raw_reply_round_trips() {
        let cached = OracleReply::parse("not json").into_value();
        assert_eq!(OracleReply::from_cached(cached), OracleReply::Raw("not json".into()));
    }
}
