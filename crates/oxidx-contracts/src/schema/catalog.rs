use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{ComponentNode, DEFAULT_KINDS, GENERATE_TOOL};

/// A tool as advertised by the brain's `tools/list` reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "inputSchema", default)]
    pub input_schema: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogSource {
    /// Read from the brain's own tool schema.
    Synchronized,
    Fallback { reason: String },
}

/// Ordered set of component kinds the model may use.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentCatalog {
    kinds: IndexSet<String>,
    source: CatalogSource,
}

impl ComponentCatalog {
    pub fn fallback(reason: impl Into<String>) -> Self {
        Self {
            kinds: DEFAULT_KINDS.iter().map(|kind| kind.to_string()).collect(),
            source: CatalogSource::Fallback {
                reason: reason.into(),
            },
        }
    }

    pub fn kinds(&self) -> Vec<&str> {
        self.kinds.iter().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.kinds.contains(kind)
    }

    pub fn source(&self) -> &CatalogSource {
        &self.source
    }

    pub fn is_synchronized(&self) -> bool {
        self.source == CatalogSource::Synchronized
    }

    /// Kinds used by `node` that the catalog does not list, first use order.
    pub fn unknown_kinds(&self, node: &ComponentNode) -> Vec<String> {
        let mut unknown: IndexSet<String> = IndexSet::new();
        for kind in node.kinds() {
            if !self.contains(kind) {
                unknown.insert(kind.to_string());
            }
        }
        unknown.into_iter().collect()
    }

    /// Function descriptor offered to the model, with `type_name` limited to
    /// this catalog.
    pub fn tool_definition(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": GENERATE_TOOL,
                "description": "Generates Rust UI code.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "view_name": {"type": "string"},
                        "type_name": {"type": "string", "enum": self.kinds()},
                        "props": {"type": "object"},
                        "children": {"type": "array", "items": {"type": "object"}},
                    },
                    "required": ["view_name", "type_name"],
                },
            },
        })
    }
}

/// Derives the catalog from the first advertised tool, falling back to
/// [`DEFAULT_KINDS`] whenever the kind enumeration cannot be found.
pub fn resolve_catalog(tools: &[ToolDescriptor]) -> ComponentCatalog {
    let Some(first) = tools.first() else {
        return ComponentCatalog::fallback("brain advertised no tools");
    };

    let properties = first.input_schema.get("properties");
    let top_level = properties.and_then(|props| props.get("type_name"));
    let nested = properties
        .and_then(|props| props.get("schema"))
        .and_then(|schema| schema.get("properties"))
        .and_then(|props| props.get("type_name"));

    let Some(values) = top_level
        .or(nested)
        .and_then(|property| property.get("enum"))
        .and_then(Value::as_array)
    else {
        return ComponentCatalog::fallback(format!(
            "tool `{}` has no type_name enumeration",
            first.name
        ));
    };

    let kinds: IndexSet<String> = values
        .iter()
        .filter_map(Value::as_str)
        .map(str::trim)
        .filter(|kind| !kind.is_empty())
        .map(str::to_string)
        .collect();
    if kinds.is_empty() {
        return ComponentCatalog::fallback(format!(
            "tool `{}` has an empty type_name enumeration",
            first.name
        ));
    }

    ComponentCatalog {
        kinds,
        source: CatalogSource::Synchronized,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::{resolve_catalog, CatalogSource, ComponentCatalog, ToolDescriptor};
    use crate::schema::{ComponentNode, DEFAULT_KINDS};

    fn descriptor(input_schema: Value) -> ToolDescriptor {
        ToolDescriptor {
            name: "generate_oxid_ui".to_string(),
            description: None,
            input_schema,
        }
    }

    #[test]
    fn reads_top_level_enumeration() {
        let catalog = resolve_catalog(&[descriptor(json!({
            "properties": {"type_name": {"enum": ["VStack", "Slider", "VStack", 3, " "]}}
        }))]);
        assert!(catalog.is_synchronized());
        assert_eq!(catalog.kinds(), vec!["VStack", "Slider"]);
    }

    #[test]
    fn reads_enumeration_nested_under_schema_argument() {
        let catalog = resolve_catalog(&[descriptor(json!({
            "type": "object",
            "properties": {
                "view_name": {"type": "string"},
                "schema": {
                    "type": "object",
                    "properties": {"type_name": {"type": "string", "enum": ["Grid", "Toggle"]}}
                }
            }
        }))]);
        assert_eq!(catalog.source(), &CatalogSource::Synchronized);
        assert_eq!(catalog.kinds(), vec!["Grid", "Toggle"]);
    }

    #[test]
    fn falls_back_when_enumeration_is_missing() {
        let catalog = resolve_catalog(&[descriptor(json!({
            "properties": {"type_name": {"type": "string"}}
        }))]);
        assert!(!catalog.is_synchronized());
        assert_eq!(catalog.len(), DEFAULT_KINDS.len());
        assert_eq!(catalog.kinds(), DEFAULT_KINDS.to_vec());
    }

    #[test]
    fn falls_back_without_tools_or_with_empty_enumeration() {
        assert_eq!(resolve_catalog(&[]).kinds(), DEFAULT_KINDS.to_vec());

        let catalog = resolve_catalog(&[descriptor(json!({
            "properties": {"type_name": {"enum": []}}
        }))]);
        assert!(matches!(catalog.source(), CatalogSource::Fallback { .. }));
        assert_eq!(catalog.kinds(), DEFAULT_KINDS.to_vec());
    }

    #[test]
    fn only_the_first_descriptor_is_consulted() {
        let catalog = resolve_catalog(&[
            descriptor(Value::Null),
            descriptor(json!({"properties": {"type_name": {"enum": ["Modal"]}}})),
        ]);
        assert!(!catalog.is_synchronized());
    }

    #[test]
    fn tool_definition_enumerates_exactly_the_catalog() {
        let catalog = ComponentCatalog::fallback("test");
        let definition = catalog.tool_definition();
        assert_eq!(definition["function"]["name"], json!("generate_oxid_ui"));
        assert_eq!(
            definition["function"]["parameters"]["properties"]["type_name"]["enum"],
            json!(DEFAULT_KINDS)
        );
        assert_eq!(
            definition["function"]["parameters"]["required"],
            json!(["view_name", "type_name"])
        );
    }

    #[test]
    fn reports_unknown_kinds_once() {
        let catalog = ComponentCatalog::fallback("test");
        let tree = ComponentNode::from_value(&json!({
            "type_name": "VStack",
            "children": [
                {"type_name": "Slider"},
                {"type_name": "Button"},
                {"type_name": "Slider"},
            ]
        }))
        .expect("mapping");
        assert_eq!(catalog.unknown_kinds(&tree), vec!["Slider".to_string()]);
    }

    #[test]
    fn descriptors_deserialize_from_tools_list() -> anyhow::Result<()> {
        let parsed: ToolDescriptor = serde_json::from_value(json!({
            "name": "generate_oxid_ui",
            "description": "Generate Rust UI code",
            "inputSchema": {"type": "object"}
        }))?;
        assert_eq!(parsed.name, "generate_oxid_ui");
        assert_eq!(parsed.input_schema, json!({"type": "object"}));
        Ok(())
    }
}
