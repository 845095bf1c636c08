//! Dotted-path access to the editable part of a project.
//!
//! A path starts with one of [`EDITABLE_ROOTS`] and continues with object keys or
//! list indices, e.g. `world_setting.力量体系.0` or `story_tree.chapters.0.title`.
//! Writes create missing intermediate objects; the edited document must still
//! deserialize into a [`ProjectState`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{error::PathError, state::DOCUMENT_FIELDS, state::ProjectState};

pub const EDITABLE_ROOTS: [&str; 6] = DOCUMENT_FIELDS;

pub const OP_UPDATE: &str = "update";
pub const OP_REVERT: &str = "revert";

/// A requested change, as received from the creative session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Modification {
    #[serde(default = "default_operation")]
    pub operation_type: String,
    pub target_path: String,
    pub new_value: Value,
    #[serde(default)]
    pub description: String,
}

fn default_operation() -> String {
    OP_UPDATE.to_string()
}

/// Result of [`apply`]: the new state and the value the path held before.
#[derive(Debug, Clone, PartialEq)]
pub struct Applied {
    pub state: ProjectState,
    pub old_value: Value,
}

fn segments(path: &str) -> Result<Vec<&str>, PathError> {
    let parts: Vec<&str> = path.split('.').map(str::trim).collect();
    match parts.first() {
        None => Err(PathError::Empty),
        Some(root) if root.is_empty() => Err(PathError::Empty),
        Some(root) if !EDITABLE_ROOTS.contains(root) => Err(PathError::UnknownRoot((*root).into())),
        Some(_) => Ok(parts),
    }
}

fn parse_index(path: &str, segment: &str) -> Result<usize, PathError> {
    segment.parse().map_err(|_| PathError::InvalidIndex {
        path: path.into(),
        segment: segment.into(),
    })
}

/// Value at `path`, `None` when any part of it is missing.
pub fn get_path<'v>(doc: &'v Value, path: &str) -> Result<Option<&'v Value>, PathError> {
    let mut current = doc;
    for segment in segments(path)? {
        current = match current {
            Value::Object(map) => match map.get(segment) {
                Some(v) => v,
                None => return Ok(None),
            },
            Value::Array(list) => match list.get(parse_index(path, segment)?) {
                Some(v) => v,
                None => return Ok(None),
            },
            _ => return Ok(None),
        };
    }
    Ok(Some(current))
}

/// Writes `value` at `path` and returns the previous value, if any.
///
/// A list index equal to the list length appends.
pub fn set_path(doc: &mut Value, path: &str, value: Value) -> Result<Option<Value>, PathError> {
    let parts = segments(path)?;
    let (last, parents) = parts.split_last().ok_or(PathError::Empty)?;

    let mut current = doc;
    for segment in parents {
        if current.is_null() {
            *current = Value::Object(Map::new());
        }
        current = match current {
            Value::Object(map) => map
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new())),
            Value::Array(list) => {
                let index = parse_index(path, segment)?;
                let len = list.len();
                list.get_mut(index).ok_or_else(|| PathError::InvalidIndex {
                    path: path.into(),
                    segment: format!("{segment} (len {len})"),
                })?
            }
            _ => {
                return Err(PathError::NotContainer {
                    path: path.into(),
                    segment: segment.to_string(),
                });
            }
        };
    }

    if current.is_null() {
        *current = Value::Object(Map::new());
    }
    match current {
        Value::Object(map) => Ok(map.insert(last.to_string(), value)),
        Value::Array(list) => {
            let index = parse_index(path, last)?;
            if index == list.len() {
                list.push(value);
                Ok(None)
            } else if let Some(slot) = list.get_mut(index) {
                Ok(Some(std::mem::replace(slot, value)))
            } else {
                Err(PathError::InvalidIndex {
                    path: path.into(),
                    segment: last.to_string(),
                })
            }
        }
        _ => Err(PathError::NotContainer {
            path: path.into(),
            segment: last.to_string(),
        }),
    }
}

/// Applies one write to a copy of `state`. The copy is only returned when it is still a
/// valid project; progress and status are carried over unchanged.
pub fn apply(state: &ProjectState, path: &str, value: Value) -> Result<Applied, PathError> {
    let mut doc = state.to_document();
    let old_value = set_path(&mut doc, path, value)?.unwrap_or(Value::Null);
    let state = state.with_document(doc)?;
    Ok(Applied { state, old_value })
}
