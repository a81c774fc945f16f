use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use oxidx_contracts::events::EventWriter;
use oxidx_contracts::history::{
    ChatMessage, ConversationHistory, ToolCall, DEFAULT_HISTORY_LIMIT,
};
use oxidx_contracts::schema::{
    default_view_name, resolve_catalog, sanitize, tool_arguments_from_text, CatalogSource,
    ComponentCatalog, ComponentNode, DEFAULT_KIND, GENERATE_TOOL,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::artifacts::{ArtifactStore, SavedArtifact};
use crate::brain::{BrainClient, ToolResult, TOOL_ERROR_PREFIX};
use crate::model::ChatModel;
use crate::preview::{NoPreview, PreviewLaunch, PreviewLauncher};

pub const SYSTEM_PROMPT: &str = r#"You are an expert OxidX UI builder. Use the generate_oxid_ui tool.

EXAMPLE OF CORRECT JSON OUTPUT:
{
  "view_name": "LoginScreen",
  "type_name": "VStack",
  "props": { "spacing": 20, "padding": 20 },
  "children": [
    { "type_name": "Label", "props": { "text": "Welcome Back", "font_size": 24 } },
    { "type_name": "Input", "props": { "placeholder": "Username" } },
    { "type_name": "Chart", "props": { "title": "Sales Data" } },
    { "type_name": "Button", "props": { "label": "Sign In", "variant": "primary" } }
  ]
}

RULES:
1. Always include 'children' array with components.
2. Never output empty VStacks unless requested.
3. Use 'Input' for text fields.
"#;

/// Id stamped on every event of one console session, e.g.
/// `20261018T091502-3fa9c1d2`.
pub fn new_session_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", Utc::now().format("%Y%m%dT%H%M%S"), &suffix[..8])
}

/// One `generate_oxid_ui` call that reached the brain.
#[derive(Debug, Clone)]
pub struct ToolDispatch {
    pub view_name: String,
    pub tree: ComponentNode,
    pub result: ToolResult,
    pub unknown_kinds: Vec<String>,
    /// Non-string `type_name` values that were replaced by the default kind.
    pub coerced_kinds: Vec<Value>,
    pub artifact: Option<SavedArtifact>,
    pub preview: Option<PreviewLaunch>,
    /// Save or preview failures; they never abort the turn.
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum TurnOutcome {
    /// The model answered in prose, or none of its calls could be dispatched.
    Reply(String),
    Generated(Vec<ToolDispatch>),
}

/// A design conversation bound to one brain process.
pub struct Session {
    brain: BrainClient,
    catalog: ComponentCatalog,
    history: ConversationHistory,
    model: Box<dyn ChatModel>,
    artifacts: ArtifactStore,
    preview: Box<dyn PreviewLauncher>,
    events: EventWriter,
    turns: u64,
}

impl Session {
    /// Resolves the catalog from the brain's handshake. Artifacts default to
    /// the working directory, previews are off until configured.
    pub fn new(
        brain: BrainClient,
        model: Box<dyn ChatModel>,
        events: EventWriter,
    ) -> Result<Self> {
        let catalog = resolve_catalog(brain.tools());
        let session = Self {
            brain,
            catalog,
            history: ConversationHistory::new(SYSTEM_PROMPT, DEFAULT_HISTORY_LIMIT),
            model,
            artifacts: ArtifactStore::new("."),
            preview: Box::new(NoPreview),
            events,
            turns: 0,
        };

        session.events.emit_json(
            "session_started",
            json!({"model": session.model.name(), "brain_pid": session.brain.pid()}),
        )?;
        let tool_names: Vec<&str> = session
            .brain
            .tools()
            .iter()
            .map(|tool| tool.name.as_str())
            .collect();
        session.events.emit_json(
            "brain_handshake",
            json!({
                "state": format!("{:?}", session.brain.state()),
                "pid": session.brain.pid(),
                "server_info": session.brain.server_info(),
                "tools": tool_names,
                "warnings": session.brain.handshake_warnings(),
            }),
        )?;
        let reason = match session.catalog.source() {
            CatalogSource::Synchronized => Value::Null,
            CatalogSource::Fallback { reason } => Value::String(reason.clone()),
        };
        session.events.emit_json(
            "catalog_resolved",
            json!({
                "synchronized": session.catalog.is_synchronized(),
                "kinds": session.catalog.kinds(),
                "reason": reason,
            }),
        )?;
        Ok(session)
    }

    pub fn with_artifacts(mut self, artifacts: ArtifactStore) -> Self {
        self.artifacts = artifacts;
        self
    }

    pub fn with_preview(mut self, preview: Box<dyn PreviewLauncher>) -> Self {
        self.preview = preview;
        self
    }

    pub fn with_history_limit(mut self, max_messages: usize) -> Self {
        self.history = ConversationHistory::new(SYSTEM_PROMPT, max_messages);
        self
    }

    pub fn catalog(&self) -> &ComponentCatalog {
        &self.catalog
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    pub fn brain(&self) -> &BrainClient {
        &self.brain
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    pub fn events(&self) -> &EventWriter {
        &self.events
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    pub fn set_model(&mut self, model: &str) {
        self.model.set_name(model);
    }

    /// Forgets the conversation except the system prompt.
    pub fn reset(&mut self) -> Result<usize> {
        let dropped = self.history.reset();
        self.events.emit_json(
            "history_truncated",
            json!({"dropped": dropped, "reason": "reset"}),
        )?;
        Ok(dropped)
    }

    /// Sanitizes a tree saved on disk and shows it in the viewer.
    pub fn preview_file(&self, path: &Path) -> Result<Option<PreviewLaunch>> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read preview tree {}", path.display()))?;
        let value: Value = serde_json::from_str(&raw)
            .with_context(|| format!("parse preview tree {}", path.display()))?;
        let Some(tree) = ComponentNode::from_value(&sanitize(value)) else {
            bail!("{} does not hold a component tree", path.display());
        };
        let launched = self.preview.launch(&tree)?;
        if let Some(launch) = &launched {
            self.events.emit_json(
                "preview_launched",
                json!({"pid": launch.pid, "tree_path": launch.tree_path, "source": path}),
            )?;
        }
        Ok(launched)
    }

    /// Runs one user turn through the model and, when it asks for one, the
    /// brain.
    pub fn handle_turn(&mut self, user_text: &str) -> Result<TurnOutcome> {
        self.turns += 1;
        let dropped = self.history.begin_turn(user_text);
        if dropped > 0 {
            self.events.emit_json(
                "history_truncated",
                json!({"dropped": dropped, "reason": "limit"}),
            )?;
        }
        self.events.emit_json(
            "turn_started",
            json!({
                "turn": self.turns,
                "model": self.model.name(),
                "prompt_chars": user_text.chars().count(),
                "history_len": self.history.len(),
            }),
        )?;

        let tools = [self.catalog.tool_definition()];
        let reply = self
            .model
            .chat(self.history.messages(), &tools)
            .with_context(|| format!("model {} failed", self.model.name()))?;

        let (calls, from_text) = if reply.tool_calls.is_empty() {
            let calls: Vec<ToolCall> = tool_arguments_from_text(&reply.content)
                .map(|args| ToolCall::new(GENERATE_TOOL, Value::Object(args)))
                .into_iter()
                .collect();
            (calls, true)
        } else {
            (reply.tool_calls.clone(), false)
        };
        self.events.emit_json(
            "model_reply",
            json!({
                "turn": self.turns,
                "content_chars": reply.content.chars().count(),
                "tool_calls": calls.len(),
                "extracted_from_text": from_text && !calls.is_empty(),
            }),
        )?;

        let mut dispatches = Vec::new();
        for call in calls {
            if call.function.name != GENERATE_TOOL {
                self.skip_call(&call.function.name, "unknown tool")?;
                continue;
            }
            let Some(prepared) = prepare_arguments(call.function.arguments) else {
                self.skip_call(&call.function.name, "arguments are not a mapping")?;
                continue;
            };
            dispatches.push(self.dispatch(prepared)?);
        }

        if dispatches.is_empty() {
            let content = reply.content.clone();
            self.history.push(reply);
            return Ok(TurnOutcome::Reply(content));
        }
        self.history.push(reply);
        for dispatch in &dispatches {
            self.history.push(ChatMessage::tool(dispatch.result.text()));
        }
        Ok(TurnOutcome::Generated(dispatches))
    }

    /// Records the end of the session and stops the brain.
    pub fn finish(mut self) -> Result<()> {
        self.brain.shutdown();
        self.events.emit_json(
            "session_finished",
            json!({"turns": self.turns, "history_len": self.history.len()}),
        )?;
        Ok(())
    }

    fn skip_call(&self, name: &str, reason: &str) -> Result<()> {
        self.events.emit_json(
            "tool_call_skipped",
            json!({"turn": self.turns, "name": name, "reason": reason}),
        )?;
        Ok(())
    }

    fn dispatch(&mut self, prepared: PreparedCall) -> Result<ToolDispatch> {
        let PreparedCall {
            view_name,
            tree,
            coerced_kinds,
        } = prepared;
        let unknown_kinds = self.catalog.unknown_kinds(&tree);
        if !unknown_kinds.is_empty() || !coerced_kinds.is_empty() {
            self.events.emit_json(
                "catalog_mismatch",
                json!({
                    "view_name": view_name,
                    "unknown_kinds": unknown_kinds,
                    "coerced_kinds": coerced_kinds,
                }),
            )?;
        }

        // A broken brain connection becomes this call's result.
        let arguments = json!({"view_name": view_name, "schema": tree.to_value()});
        let (result, transport_error) = match self.brain.call_tool(GENERATE_TOOL, arguments) {
            Ok(result) => (result, None),
            Err(err) => {
                let message = format!("{err:#}");
                (
                    ToolResult::Error(format!("{TOOL_ERROR_PREFIX} {message}")),
                    Some(message),
                )
            }
        };
        self.events.emit_json(
            "tool_result",
            json!({
                "view_name": view_name,
                "kind": result.kind(),
                "chars": result.text().chars().count(),
                "nodes": tree.node_count(),
                "transport_error": transport_error,
            }),
        )?;

        let mut dispatch = ToolDispatch {
            view_name,
            tree,
            result,
            unknown_kinds,
            coerced_kinds,
            artifact: None,
            preview: None,
            warnings: Vec::new(),
        };
        if !dispatch.result.is_code() {
            return Ok(dispatch);
        }
        let code = dispatch.result.text().to_string();

        match self.artifacts.save_code(&dispatch.view_name, &code) {
            Ok(saved) => {
                self.events.emit_json(
                    "artifact_saved",
                    json!({
                        "view_name": saved.view_name,
                        "path": saved.path,
                        "sha256": saved.sha256,
                        "bytes": saved.bytes,
                        "changed_lines": saved.changed_lines,
                    }),
                )?;
                dispatch.artifact = Some(saved);
            }
            Err(err) => {
                let message = format!("{err:#}");
                self.events.emit_json(
                    "artifact_failed",
                    json!({"view_name": dispatch.view_name, "error": message}),
                )?;
                dispatch.warnings.push(message);
            }
        }

        match self.preview.launch(&dispatch.tree) {
            Ok(Some(launch)) => {
                self.events.emit_json(
                    "preview_launched",
                    json!({
                        "view_name": dispatch.view_name,
                        "pid": launch.pid,
                        "tree_path": launch.tree_path,
                    }),
                )?;
                dispatch.preview = Some(launch);
            }
            Ok(None) => {}
            Err(err) => {
                let message = format!("{err:#}");
                self.events.emit_json(
                    "preview_failed",
                    json!({"view_name": dispatch.view_name, "error": message}),
                )?;
                dispatch.warnings.push(message);
            }
        }
        Ok(dispatch)
    }
}

struct PreparedCall {
    view_name: String,
    tree: ComponentNode,
    coerced_kinds: Vec<Value>,
}

/// Sanitized tree plus its view name, or `None` when the arguments do not
/// describe a mapping at all.
fn prepare_arguments(arguments: Value) -> Option<PreparedCall> {
    let Value::Object(mut args) = sanitize(arguments) else {
        return None;
    };
    args.entry("type_name")
        .or_insert_with(|| Value::String(DEFAULT_KIND.to_string()));
    let view_name = match args.remove("view_name") {
        Some(Value::String(name)) if !name.trim().is_empty() => name.trim().to_string(),
        _ => default_view_name(),
    };
    let args = Value::Object(args);
    let coerced_kinds = ComponentNode::coerced_kinds(&args);
    let tree =
        ComponentNode::from_value(&args).unwrap_or_else(|| ComponentNode::new(DEFAULT_KIND));
    Some(PreparedCall {
        view_name,
        tree,
        coerced_kinds,
    })
}
