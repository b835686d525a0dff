//! Node and edge types relayed between collaborators

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Canvas position of a node
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A mind-map node
///
/// `data` is opaque to the sync layer. Any extra fields sent by the editor
/// (render type, style, dimensions) are kept in `extra` and relayed verbatim.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Node {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub data: Value,

    #[serde(default)]
    pub position: Position,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Node {
    /// Create a node with a payload at the origin
    pub fn new(id: impl Into<String>, data: Value) -> Self {
        Self {
            id: id.into(),
            data,
            ..Default::default()
        }
    }

    /// Builder-style position setter
    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.position = Position::new(x, y);
        self
    }
}

/// A directed edge between two nodes
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Edge {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub source: String,

    #[serde(default)]
    pub target: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Edge {
    pub fn new(id: impl Into<String>, source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            ..Default::default()
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Shallow-merge a partial update into a serializable value.
///
/// Top-level keys of `updates` overwrite the same keys of `target`; the id is
/// never changed by an update.
pub(crate) fn merge_updates<T>(target: &T, updates: &Value) -> Option<T>
where
    T: Serialize + serde::de::DeserializeOwned,
{
    let Value::Object(patch) = updates else {
        return None;
    };
    let mut current = serde_json::to_value(target).ok()?;
    let object = current.as_object_mut()?;
    for (key, value) in patch {
        if key == "id" {
            continue;
        }
        object.insert(key.clone(), value.clone());
    }
    serde_json::from_value(current).ok()
}
