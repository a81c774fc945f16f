use std::env;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use oxidx_contracts::history::{ChatMessage, ToolCall};
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Value};

pub const DEFAULT_MODEL: &str = "llama3.2";
pub const DEFAULT_OLLAMA_HOST: &str = "http://localhost:11434";

/// The conversational model behind the console: given the transcript and
/// the tools it may call, it answers with one assistant message that carries
/// either tool calls or plain text.
pub trait ChatModel {
    fn name(&self) -> &str;
    fn set_name(&mut self, model: &str);
    fn chat(&self, messages: &[ChatMessage], tools: &[Value]) -> Result<ChatMessage>;
}

/// Ollama's non-streaming `/api/chat` endpoint.
pub struct OllamaChatModel {
    api_base: String,
    model: String,
    http: HttpClient,
}

impl OllamaChatModel {
    pub fn new(api_base: Option<String>, model: impl Into<String>) -> Result<Self> {
        let api_base = api_base
            .or_else(|| env::var("OLLAMA_HOST").ok())
            .map(|value| normalize_host(&value))
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_OLLAMA_HOST.to_string());
        let http = HttpClient::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(None)
            .build()
            .context("build Ollama HTTP client")?;
        Ok(Self {
            api_base,
            model: model.into(),
            http,
        })
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn endpoint(&self) -> String {
        format!("{}/api/chat", self.api_base)
    }
}

impl ChatModel for OllamaChatModel {
    fn name(&self) -> &str {
        &self.model
    }

    fn set_name(&mut self, model: &str) {
        self.model = model.to_string();
    }

    fn chat(&self, messages: &[ChatMessage], tools: &[Value]) -> Result<ChatMessage> {
        let endpoint = self.endpoint();
        let payload = json!({
            "model": self.model,
            "messages": messages,
            "tools": tools,
            "stream": false,
        });
        let response = self
            .http
            .post(&endpoint)
            .json(&payload)
            .send()
            .with_context(|| format!("Ollama request failed ({endpoint})"))?;
        let status = response.status();
        let body = response
            .text()
            .context("Ollama response body read failed")?;
        if !status.is_success() {
            bail!(
                "Ollama request failed ({}): {}",
                status.as_u16(),
                truncate_text(&body, 512)
            );
        }
        let parsed: Value =
            serde_json::from_str(&body).context("Ollama returned invalid JSON payload")?;
        parse_chat_reply(&parsed)
    }
}

/// Reads `message` out of an `/api/chat` reply, tolerating `null` or missing
/// `content`/`tool_calls` and calls whose arguments arrive as strings.
pub fn parse_chat_reply(payload: &Value) -> Result<ChatMessage> {
    if let Some(error) = payload.get("error").and_then(Value::as_str) {
        bail!("Ollama error: {error}");
    }
    let Some(message) = payload.get("message").and_then(Value::as_object) else {
        bail!("Ollama reply has no message");
    };

    let mut reply = ChatMessage::assistant(
        message
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or_default(),
    );
    if let Some(role) = message
        .get("role")
        .and_then(Value::as_str)
        .filter(|role| !role.is_empty())
    {
        reply.role = role.to_string();
    }
    if let Some(calls) = message.get("tool_calls").and_then(Value::as_array) {
        for call in calls {
            let function = call.get("function").unwrap_or(call);
            let Some(name) = function.get("name").and_then(Value::as_str) else {
                continue;
            };
            let arguments = function.get("arguments").cloned().unwrap_or(Value::Null);
            reply.tool_calls.push(ToolCall::new(name, arguments));
        }
    }
    Ok(reply)
}

fn normalize_host(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() || trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    }
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
