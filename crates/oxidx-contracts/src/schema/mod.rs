//! Component trees as the brain expects them, and the lenient path from
//! model output to a canonical tree.

mod catalog;
mod extract;
mod node;
mod sanitize;

pub use catalog::{resolve_catalog, CatalogSource, ComponentCatalog, ToolDescriptor};
pub use extract::{extract_json_object, tool_arguments_from_text};
pub use node::{default_view_name, ComponentNode};
pub use sanitize::sanitize;

/// Kind injected wherever a node has content but no kind.
pub const DEFAULT_KIND: &str = "VStack";

/// Name of the brain tool that turns a component tree into source code.
pub const GENERATE_TOOL: &str = "generate_oxid_ui";

/// Catalog used when the brain does not publish its own.
pub const DEFAULT_KINDS: &[&str] = &[
    "VStack", "HStack", "ZStack", "Button", "Label", "Input", "Image", "Chart",
];
