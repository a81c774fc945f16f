use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const ROLE_SYSTEM: &str = "system";
pub const ROLE_USER: &str = "user";
pub const ROLE_ASSISTANT: &str = "assistant";
pub const ROLE_TOOL: &str = "tool";

/// History length past which a new turn starts from the system prompt alone.
pub const DEFAULT_HISTORY_LIMIT: usize = 6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolFunction {
    pub name: String,
    /// Usually a mapping; some models send a JSON-encoded string instead.
    #[serde(default)]
    pub arguments: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub function: ToolFunction,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            function: ToolFunction {
                name: name.into(),
                arguments,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
}

impl ChatMessage {
    fn with_role(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(ROLE_SYSTEM, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(ROLE_USER, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(ROLE_ASSISTANT, content)
    }

    pub fn tool(content: impl Into<String>) -> Self {
        Self::with_role(ROLE_TOOL, content)
    }
}

/// Role-tagged transcript that never grows past its limit for long: the
/// system message always stays first and is all that survives a truncation.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationHistory {
    messages: Vec<ChatMessage>,
    max_messages: usize,
}

impl ConversationHistory {
    pub fn new(system_prompt: impl Into<String>, max_messages: usize) -> Self {
        Self {
            messages: vec![ChatMessage::system(system_prompt)],
            max_messages,
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn max_messages(&self) -> usize {
        self.max_messages
    }

    /// Starts a turn: drops everything but the system message once the
    /// limit is exceeded, then records the user's text. Returns how many
    /// messages were dropped.
    pub fn begin_turn(&mut self, user_text: impl Into<String>) -> usize {
        let dropped = if self.messages.len() > self.max_messages {
            self.reset()
        } else {
            0
        };
        self.messages.push(ChatMessage::user(user_text));
        dropped
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    /// Keeps only the system message; returns how many messages were dropped.
    pub fn reset(&mut self) -> usize {
        let dropped = self.messages.len().saturating_sub(1);
        self.messages.truncate(1);
        dropped
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{ChatMessage, ConversationHistory, ToolCall, ROLE_SYSTEM, ROLE_TOOL, ROLE_USER};

    #[test]
    fn history_starts_with_system_prompt() {
        let history = ConversationHistory::new("be helpful", 6);
        assert_eq!(history.len(), 1);
        assert_eq!(history.messages()[0].role, ROLE_SYSTEM);
        assert_eq!(history.messages()[0].content, "be helpful");
    }

    #[test]
    fn begin_turn_truncates_only_past_the_limit() {
        let mut history = ConversationHistory::new("sys", 4);
        for turn in 0..3 {
            assert_eq!(history.begin_turn(format!("turn {turn}")), 0);
        }
        assert_eq!(history.len(), 4);

        // At the limit, not past it: nothing dropped yet.
        assert_eq!(history.begin_turn("turn 3"), 0);
        assert_eq!(history.len(), 5);

        assert_eq!(history.begin_turn("turn 4"), 4);
        let roles: Vec<&str> = history.messages().iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec![ROLE_SYSTEM, ROLE_USER]);
        assert_eq!(history.messages()[1].content, "turn 4");
    }

    #[test]
    fn reset_keeps_system_message() {
        let mut history = ConversationHistory::new("sys", 6);
        history.begin_turn("hello");
        history.push(ChatMessage::tool("code"));
        assert_eq!(history.reset(), 2);
        assert_eq!(history.len(), 1);
        assert_eq!(history.reset(), 0);
    }

    #[test]
    fn messages_serialize_like_the_chat_api() -> anyhow::Result<()> {
        let mut reply = ChatMessage::assistant("");
        reply
            .tool_calls
            .push(ToolCall::new("generate_oxid_ui", json!({"view_name": "A"})));
        assert_eq!(
            serde_json::to_value(&reply)?,
            json!({
                "role": "assistant",
                "content": "",
                "tool_calls": [{"function": {"name": "generate_oxid_ui", "arguments": {"view_name": "A"}}}]
            })
        );
        assert_eq!(
            serde_json::to_value(ChatMessage::tool("ok"))?,
            json!({"role": ROLE_TOOL, "content": "ok"})
        );

        let parsed: ChatMessage = serde_json::from_value(json!({"role": "assistant"}))?;
        assert!(parsed.tool_calls.is_empty());
        assert_eq!(parsed.content, "");
        Ok(())
    }
}
