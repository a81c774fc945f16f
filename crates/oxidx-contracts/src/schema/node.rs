use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::DEFAULT_KIND;

/// One node of the canonical component tree handed to the brain.
///
/// Keys other than `type_name`, `id`, `props` and `children` (for example
/// `style`) ride along in `extra` and are serialized back flat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentNode {
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub props: Map<String, Value>,
    #[serde(default)]
    pub children: Vec<ComponentNode>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ComponentNode {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            id: None,
            props: Map::new(),
            children: Vec::new(),
            extra: Map::new(),
        }
    }

    /// Builds a node from a sanitized value. Only non-mappings are rejected;
    /// a missing or non-string kind becomes [`DEFAULT_KIND`], ill-typed
    /// `props` become empty and non-mapping children are dropped.
    pub fn from_value(value: &Value) -> Option<Self> {
        let map = value.as_object()?;
        let mut node = Self::new(
            map.get("type_name")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|kind| !kind.is_empty())
                .unwrap_or(DEFAULT_KIND),
        );
        for (key, value) in map {
            match (key.as_str(), value) {
                ("type_name", _) => {}
                ("id", Value::String(id)) => node.id = Some(id.clone()),
                ("props", Value::Object(props)) => node.props = props.clone(),
                ("props", _) => {}
                ("children", Value::Array(items)) => {
                    node.children = items.iter().filter_map(Self::from_value).collect();
                }
                ("children", _) => {}
                _ => {
                    node.extra.insert(key.clone(), value.clone());
                }
            }
        }
        Some(node)
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| Value::Object(Map::new()))
    }

    /// Kinds used anywhere in the tree, depth-first, root first.
    pub fn kinds(&self) -> Vec<&str> {
        let mut out = vec![self.type_name.as_str()];
        for child in &self.children {
            out.extend(child.kinds());
        }
        out
    }

    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(Self::node_count).sum::<usize>()
    }

    /// `type_name` values that [`ComponentNode::from_value`] replaces with
    /// [`DEFAULT_KIND`] because they are not a non-blank string, depth-first.
    pub fn coerced_kinds(value: &Value) -> Vec<Value> {
        let Some(map) = value.as_object() else {
            return Vec::new();
        };
        let mut out = Vec::new();
        match map.get("type_name") {
            Some(Value::String(kind)) if !kind.trim().is_empty() => {}
            Some(other) => out.push(other.clone()),
            None => {}
        }
        if let Some(Value::Array(items)) = map.get("children") {
            for item in items {
                out.extend(Self::coerced_kinds(item));
            }
        }
        out
    }
}

/// Name for a view the model forgot to name, e.g. `AutoView_3fa9c1`.
pub fn default_view_name() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("AutoView_{}", &id[..6])
}
