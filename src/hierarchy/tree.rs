//! Ordered key/value trees accepted by ingestion.

use std::path::Path;

use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TreeError {
    #[error("tree root must be a JSON object, got {0}")]
    NotAnObject(&'static str),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Value side of a tree entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeValue {
    Branch(Tree),
    /// Terminal payload text.
    Leaf(String),
}

/// Insertion-ordered mapping from labels to subtrees or payloads.
///
/// Keys are unique among siblings. Re-inserting a key replaces its value
/// but keeps its original position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tree {
    entries: Vec<(String, TreeValue)>,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: TreeValue) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Builder form of [`Tree::insert`] for a leaf.
    pub fn leaf(mut self, key: impl Into<String>, payload: impl Into<String>) -> Self {
        self.insert(key, TreeValue::Leaf(payload.into()));
        self
    }

    /// Builder form of [`Tree::insert`] for a subtree.
    pub fn branch(mut self, key: impl Into<String>, subtree: Tree) -> Self {
        self.insert(key, TreeValue::Branch(subtree));
        self
    }

    pub fn entries(&self) -> &[(String, TreeValue)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum nesting depth: 0 for an empty tree, 1 for a flat one.
    pub fn depth(&self) -> usize {
        self.entries
            .iter()
            .map(|(_, value)| match value {
                TreeValue::Leaf(_) => 1,
                TreeValue::Branch(sub) => 1 + sub.depth(),
            })
            .max()
            .unwrap_or(0)
    }

    /// Total number of entries at every depth.
    pub fn node_count(&self) -> usize {
        self.entries
            .iter()
            .map(|(_, value)| match value {
                TreeValue::Leaf(_) => 1,
                TreeValue::Branch(sub) => 1 + sub.node_count(),
            })
            .sum()
    }

    /// Convert a JSON object. Nested objects become branches; strings are
    /// kept verbatim and every other value becomes its compact JSON text.
    pub fn from_json_value(value: &Value) -> Result<Self, TreeError> {
        match value {
            Value::Object(map) => Ok(Self::from_map(map)),
            other => Err(TreeError::NotAnObject(json_type(other))),
        }
    }

    fn from_map(map: &Map<String, Value>) -> Self {
        let mut tree = Self::new();
        for (key, value) in map {
            let value = match value {
                Value::Object(child) => TreeValue::Branch(Self::from_map(child)),
                Value::String(s) => TreeValue::Leaf(s.clone()),
                other => TreeValue::Leaf(other.to_string()),
            };
            tree.insert(key.clone(), value);
        }
        tree
    }

    pub fn from_json_str(text: &str) -> Result<Self, TreeError> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_json_value(&value)
    }

    pub fn from_path(path: &Path) -> Result<Self, TreeError> {
        let text = std::fs::read_to_string(path).map_err(|source| TreeError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn to_json_value(&self) -> Value {
        let map = self
            .entries
            .iter()
            .map(|(key, value)| {
                let value = match value {
                    TreeValue::Branch(sub) => sub.to_json_value(),
                    TreeValue::Leaf(s) => Value::String(s.clone()),
                };
                (key.clone(), value)
            })
            .collect();
        Value::Object(map)
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
