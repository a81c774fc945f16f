use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{Cursor, Write};
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use oxidx_contracts::history::ChatMessage;
use oxidx_contracts::schema::ComponentNode;
use serde_json::{json, Value};

use crate::brain::BrainClient;
use crate::model::ChatModel;
use crate::preview::{PreviewLaunch, PreviewLauncher};

/// Write half of an in-memory brain; clones share the same bytes.
#[derive(Clone, Default)]
pub(crate) struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    /// Every JSON line written so far.
    pub(crate) fn lines(&self) -> Vec<Value> {
        let bytes = self.0.lock().map(|guard| guard.clone()).unwrap_or_default();
        String::from_utf8_lossy(&bytes)
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    }

    pub(crate) fn tool_calls(&self) -> Vec<Value> {
        self.lines()
            .into_iter()
            .filter(|line| line["method"] == json!("tools/call"))
            .collect()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0
            .lock()
            .map_err(|_| std::io::Error::other("shared buffer poisoned"))?
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

pub(crate) fn script(replies: &[Value]) -> Cursor<Vec<u8>> {
    let mut out = String::new();
    for reply in replies {
        out.push_str(&reply.to_string());
        out.push('\n');
    }
    Cursor::new(out.into_bytes())
}

pub(crate) fn initialize_reply() -> Value {
    json!({"jsonrpc": "2.0", "id": 1, "result": {
        "protocolVersion": "2024-11-05",
        "capabilities": {"tools": {}},
        "serverInfo": {"name": "oxidx-mcp", "version": "0.1.0"}
    }})
}

pub(crate) fn tools_list_reply(kinds: Option<&[&str]>) -> Value {
    let mut schema = json!({"type": "object", "properties": {"type_name": {"type": "string"}}});
    if let Some(kinds) = kinds {
        schema["properties"]["type_name"]["enum"] = json!(kinds);
    }
    json!({"jsonrpc": "2.0", "id": 2, "result": {"tools": [{
        "name": "generate_oxid_ui",
        "inputSchema": {
            "type": "object",
            "properties": {"view_name": {"type": "string"}, "schema": schema},
            "required": ["view_name", "schema"]
        }
    }]}})
}

pub(crate) fn code_reply(code: &str) -> Value {
    json!({"jsonrpc": "2.0", "id": 3, "result": {"content": [{"type": "text", "text": code}]}})
}

/// Brain that completes the handshake and then answers tool calls in order.
pub(crate) fn scripted_brain(
    kinds: Option<&[&str]>,
    tool_replies: &[Value],
) -> (BrainClient, SharedBuffer) {
    let mut replies = vec![initialize_reply(), tools_list_reply(kinds)];
    replies.extend_from_slice(tool_replies);
    let sink = SharedBuffer::default();
    let client = BrainClient::from_streams(script(&replies), sink.clone());
    (client, sink)
}

/// Like [`scripted_brain`] without an advertised enum, with raw `trailing`
/// text after the tool replies.
pub(crate) fn scripted_brain_with_lines(
    tool_replies: &[Value],
    trailing: &str,
) -> (BrainClient, SharedBuffer) {
    let mut replies = vec![initialize_reply(), tools_list_reply(None)];
    replies.extend_from_slice(tool_replies);
    let mut bytes = script(&replies).into_inner();
    bytes.extend_from_slice(trailing.as_bytes());
    let sink = SharedBuffer::default();
    let client = BrainClient::from_streams(Cursor::new(bytes), sink.clone());
    (client, sink)
}

/// Every `chat` call the scripted model received: transcript and tools.
pub(crate) type SeenRequests = Rc<RefCell<Vec<(Vec<ChatMessage>, Vec<Value>)>>>;

pub(crate) struct ScriptedModel {
    name: String,
    replies: RefCell<VecDeque<ChatMessage>>,
    seen: SeenRequests,
}

impl ScriptedModel {
    pub(crate) fn new(replies: Vec<ChatMessage>) -> (Self, SeenRequests) {
        let seen = SeenRequests::default();
        let model = Self {
            name: "scripted".to_string(),
            replies: RefCell::new(replies.into()),
            seen: seen.clone(),
        };
        (model, seen)
    }
}

impl ChatModel for ScriptedModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, model: &str) {
        self.name = model.to_string();
    }

    fn chat(&self, messages: &[ChatMessage], tools: &[Value]) -> Result<ChatMessage> {
        self.seen
            .borrow_mut()
            .push((messages.to_vec(), tools.to_vec()));
        self.replies
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("scripted model has no reply left"))
    }
}

/// Records trees instead of launching anything; optionally fails every launch.
pub(crate) struct RecordingPreview {
    pub(crate) launched: Rc<RefCell<Vec<ComponentNode>>>,
    pub(crate) fail: bool,
}

impl RecordingPreview {
    pub(crate) fn new() -> (Self, Rc<RefCell<Vec<ComponentNode>>>) {
        let launched = Rc::new(RefCell::new(Vec::new()));
        (
            Self {
                launched: launched.clone(),
                fail: false,
            },
            launched,
        )
    }
}

impl PreviewLauncher for RecordingPreview {
    fn launch(&self, tree: &ComponentNode) -> Result<Option<PreviewLaunch>> {
        if self.fail {
            return Err(anyhow!("viewer exploded"));
        }
        self.launched.borrow_mut().push(tree.clone());
        Ok(Some(PreviewLaunch {
            pid: 4242,
            tree_path: std::env::temp_dir().join("recorded_preview.json"),
        }))
    }
}
