use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};

use anyhow::{anyhow, bail, Context, Result};
use oxidx_contracts::schema::ToolDescriptor;
use serde_json::{json, Value};

use crate::transport::JsonLineFramer;

pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const CLIENT_NAME: &str = "oxidx-magic";
pub const TOOL_ERROR_PREFIX: &str = "Error:";

const INITIALIZE_ID: u64 = 1;
const TOOLS_LIST_ID: u64 = 2;
// Every tool call reuses one id: calls are strictly one at a time and each
// reply is the next line on stdout.
const TOOLS_CALL_ID: u64 = 3;

type BrainReader = Box<dyn BufRead + Send>;
type BrainWriter = Box<dyn Write + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrainState {
    Unstarted,
    Started,
    Handshaking,
    Ready,
    AwaitingToolResult,
    Terminated,
}

/// What a `tools/call` produced. Failures reported by the brain are values,
/// not errors: callers show them and feed them back to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolResult {
    /// Generated source text.
    Code(String),
    /// `"Error: ..."` from an error object or an `isError` result.
    Error(String),
    /// The whole reply, stringified, when it had no text content.
    Raw(String),
}

impl ToolResult {
    pub fn text(&self) -> &str {
        match self {
            ToolResult::Code(text) | ToolResult::Error(text) | ToolResult::Raw(text) => text,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ToolResult::Error(_))
    }

    pub fn is_code(&self) -> bool {
        matches!(self, ToolResult::Code(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ToolResult::Code(_) => "code",
            ToolResult::Error(_) => "error",
            ToolResult::Raw(_) => "raw",
        }
    }
}

/// Executable plus arguments used to start the brain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrainCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl BrainCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Splits a shell-style command line, e.g. `"target/release/oxidx-mcp --quiet"`.
    pub fn parse(command_line: &str) -> Result<Self> {
        let mut parts = shell_words::split(command_line)
            .with_context(|| format!("invalid brain command: {command_line}"))?
            .into_iter();
        let Some(program) = parts.next().filter(|value| !value.is_empty()) else {
            bail!("brain command is empty");
        };
        Ok(Self {
            program: PathBuf::from(program),
            args: parts.collect(),
        })
    }
}

/// Synchronous JSON-RPC client for the code-generation subprocess.
pub struct BrainClient {
    framer: Option<JsonLineFramer<BrainReader, BrainWriter>>,
    child: Option<Child>,
    state: BrainState,
    server_info: Option<Value>,
    tools: Vec<ToolDescriptor>,
    handshake_warnings: Vec<String>,
}

impl BrainClient {
    /// Launches the brain and performs the handshake. Failing to launch the
    /// executable is the one unrecoverable error of a session.
    pub fn spawn(command: &BrainCommand) -> Result<Self> {
        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .with_context(|| {
                format!(
                    "cannot launch brain executable {}",
                    command.program.display()
                )
            })?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("brain stdout was not captured"))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("brain stdin was not captured"))?;

        let mut client = Self::unstarted();
        client.attach(Box::new(BufReader::new(stdout)), Box::new(stdin));
        client.child = Some(child);
        client.handshake();
        Ok(client)
    }

    /// Runs the same handshake over already connected streams.
    pub fn from_streams(
        reader: impl BufRead + Send + 'static,
        writer: impl Write + Send + 'static,
    ) -> Self {
        let mut client = Self::unstarted();
        client.attach(Box::new(reader), Box::new(writer));
        client.handshake();
        client
    }

    fn unstarted() -> Self {
        Self {
            framer: None,
            child: None,
            state: BrainState::Unstarted,
            server_info: None,
            tools: Vec::new(),
            handshake_warnings: Vec::new(),
        }
    }

    fn attach(&mut self, reader: BrainReader, writer: BrainWriter) {
        self.framer = Some(JsonLineFramer::new(reader, writer));
        self.state = BrainState::Started;
    }

    pub fn state(&self) -> BrainState {
        self.state
    }

    pub fn tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    pub fn server_info(&self) -> Option<&Value> {
        self.server_info.as_ref()
    }

    /// Why the handshake fell short, if it did; empty after a clean one.
    pub fn handshake_warnings(&self) -> &[String] {
        &self.handshake_warnings
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    /// `initialize`, `notifications/initialized`, `tools/list`. Never fails:
    /// anything unexpected leaves the tool list empty and is noted in
    /// [`BrainClient::handshake_warnings`].
    fn handshake(&mut self) {
        self.state = BrainState::Handshaking;

        let initialize = json!({
            "jsonrpc": "2.0",
            "id": INITIALIZE_ID,
            "method": "initialize",
            "params": {
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": {"name": CLIENT_NAME, "version": env!("CARGO_PKG_VERSION")},
            },
        });
        match self.request(&initialize) {
            Ok(Some(reply)) => {
                self.server_info = reply
                    .get("result")
                    .and_then(|result| result.get("serverInfo"))
                    .cloned();
            }
            Ok(None) => self.warn("brain closed its output before answering initialize"),
            Err(err) => self.warn(format!("initialize failed: {err:#}")),
        }

        let initialized = json!({"jsonrpc": "2.0", "method": "notifications/initialized"});
        if let Err(err) = self.framer_mut().and_then(|framer| framer.send(&initialized)) {
            self.warn(format!("initialized notification failed: {err:#}"));
        }

        let list = json!({"jsonrpc": "2.0", "id": TOOLS_LIST_ID, "method": "tools/list"});
        match self.request(&list) {
            Ok(Some(reply)) => {
                let (tools, skipped) = parse_tools(&reply);
                if tools.is_empty() {
                    self.warn("tools/list reply carried no usable tools");
                } else if skipped > 0 {
                    self.warn(format!("skipped {skipped} malformed tool descriptor(s)"));
                }
                self.tools = tools;
            }
            Ok(None) => self.warn("brain closed its output before answering tools/list"),
            Err(err) => self.warn(format!("tools/list failed: {err:#}")),
        }

        self.state = BrainState::Ready;
    }

    /// Invokes a brain tool and waits for its single reply line.
    ///
    /// Transport failures are errors; everything the brain itself reports is
    /// a [`ToolResult`].
    pub fn call_tool(&mut self, name: &str, arguments: Value) -> Result<ToolResult> {
        if self.state == BrainState::Terminated {
            bail!("brain connection is closed");
        }
        let request = json!({
            "jsonrpc": "2.0",
            "id": TOOLS_CALL_ID,
            "method": "tools/call",
            "params": {"name": name, "arguments": arguments},
        });

        self.state = BrainState::AwaitingToolResult;
        let reply = self.request(&request);
        self.state = BrainState::Ready;
        let reply = reply.with_context(|| format!("tools/call {name}"))?;
        Ok(interpret_tool_reply(reply.unwrap_or_else(|| json!({}))))
    }

    /// Closes the brain's stdin and reaps the process.
    pub fn shutdown(&mut self) {
        self.framer = None;
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        self.state = BrainState::Terminated;
    }

    fn request(&mut self, message: &Value) -> Result<Option<Value>> {
        let framer = self.framer_mut()?;
        framer.send(message)?;
        framer.receive()
    }

    fn framer_mut(&mut self) -> Result<&mut JsonLineFramer<BrainReader, BrainWriter>> {
        self.framer
            .as_mut()
            .ok_or_else(|| anyhow!("brain connection is closed"))
    }

    fn warn(&mut self, message: impl Into<String>) {
        self.handshake_warnings.push(message.into());
    }
}

impl Drop for BrainClient {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn parse_tools(reply: &Value) -> (Vec<ToolDescriptor>, usize) {
    let Some(items) = reply
        .get("result")
        .and_then(|result| result.get("tools"))
        .and_then(Value::as_array)
    else {
        return (Vec::new(), 0);
    };
    let mut tools = Vec::new();
    let mut skipped = 0;
    for item in items {
        match serde_json::from_value::<ToolDescriptor>(item.clone()) {
            Ok(tool) => tools.push(tool),
            Err(_) => skipped += 1,
        }
    }
    (tools, skipped)
}

fn interpret_tool_reply(reply: Value) -> ToolResult {
    if let Some(error) = reply.get("error").filter(|error| !error.is_null()) {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return ToolResult::Error(format!("{TOOL_ERROR_PREFIX} {message}"));
    }

    let result = reply.get("result");
    let text = result
        .and_then(|result| result.get("content"))
        .and_then(|content| content.get(0))
        .and_then(|first| first.get("text"))
        .and_then(Value::as_str);
    let Some(text) = text else {
        return ToolResult::Raw(reply.to_string());
    };

    let flagged = result
        .and_then(|result| result.get("isError"))
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if flagged {
        if text.trim_start().starts_with(TOOL_ERROR_PREFIX) {
            ToolResult::Error(text.to_string())
        } else {
            ToolResult::Error(format!("{TOOL_ERROR_PREFIX} {text}"))
        }
    } else {
        ToolResult::Code(text.to_string())
    }
}
