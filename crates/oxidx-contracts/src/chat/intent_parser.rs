use std::collections::BTreeMap;

use serde_json::Value;

use super::command_registry::{
    CommandSpec, EXIT_WORDS, NO_ARG_COMMANDS, RAW_ARG_COMMANDS, SINGLE_PATH_COMMANDS,
};

/// What a single console line asks the session to do.
#[derive(Debug, Clone, PartialEq)]
pub struct Intent {
    pub action: String,
    pub raw: String,
    pub prompt: Option<String>,
    pub command_args: BTreeMap<String, Value>,
}

impl Intent {
    fn new(action: &str, raw: &str) -> Self {
        Self {
            action: action.to_string(),
            raw: raw.to_string(),
            prompt: None,
            command_args: BTreeMap::new(),
        }
    }
}

fn find_action(command: &str, specs: &[CommandSpec]) -> Option<&'static str> {
    specs
        .iter()
        .find(|spec| spec.command == command)
        .map(|spec| spec.action)
}

fn parse_single_path_arg(arg: &str) -> String {
    if arg.trim().is_empty() {
        return String::new();
    }
    let parts: Vec<String> = match shell_words::split(arg) {
        Ok(parts) => parts.into_iter().filter(|value| !value.is_empty()).collect(),
        Err(_) => arg.split_whitespace().map(str::to_string).collect(),
    };
    parts.join(" ")
}

pub fn parse_intent(text: &str) -> Intent {
    let raw_trimmed = text.trim();
    if raw_trimmed.is_empty() {
        return Intent::new("noop", text);
    }

    let lowered = raw_trimmed.to_ascii_lowercase();
    if EXIT_WORDS.iter().any(|word| *word == lowered) {
        return Intent::new("exit", text);
    }

    if let Some(slash_tail) = raw_trimmed.strip_prefix('/') {
        let command_len = slash_tail
            .chars()
            .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
            .count();
        if command_len > 0 {
            let command = slash_tail[..command_len].to_ascii_lowercase();
            let arg = slash_tail[command_len..].trim();

            if let Some(action) = find_action(&command, NO_ARG_COMMANDS) {
                return Intent::new(action, text);
            }

            if let Some(action) = find_action(&command, RAW_ARG_COMMANDS) {
                let mut intent = Intent::new(action, text);
                intent
                    .command_args
                    .insert("model".to_string(), Value::String(arg.to_string()));
                return intent;
            }

            if let Some(action) = find_action(&command, SINGLE_PATH_COMMANDS) {
                let mut intent = Intent::new(action, text);
                intent.command_args.insert(
                    "path".to_string(),
                    Value::String(parse_single_path_arg(arg)),
                );
                return intent;
            }

            let mut intent = Intent::new("unknown", text);
            intent
                .command_args
                .insert("command".to_string(), Value::String(command));
            intent
                .command_args
                .insert("arg".to_string(), Value::String(arg.to_string()));
            return intent;
        }
    }

    let mut intent = Intent::new("design", text);
    intent.prompt = Some(raw_trimmed.to_string());
    intent
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::parse_intent;

    #[test]
    fn blank_lines_are_noop() {
        assert_eq!(parse_intent("   ").action, "noop");
        assert_eq!(parse_intent("").action, "noop");
    }

    #[test]
    fn exit_words_and_commands() {
        assert_eq!(parse_intent("exit").action, "exit");
        assert_eq!(parse_intent("  Salir ").action, "exit");
        assert_eq!(parse_intent("/quit").action, "exit");
        assert_eq!(parse_intent("/exit").action, "exit");
    }

    #[test]
    fn no_arg_commands() {
        assert_eq!(parse_intent("/help").action, "help");
        assert_eq!(parse_intent("/reset").action, "reset");
        assert_eq!(parse_intent("/TOOLS").action, "show_catalog");
    }

    #[test]
    fn model_command_keeps_raw_argument() {
        let intent = parse_intent("/model qwen2.5-coder:7b");
        assert_eq!(intent.action, "set_model");
        assert_eq!(intent.command_args["model"], json!("qwen2.5-coder:7b"));
    }

    #[test]
    fn preview_command_accepts_quoted_path() {
        let intent = parse_intent("/preview \"/tmp/my views/login.json\"");
        assert_eq!(intent.action, "preview");
        assert_eq!(intent.command_args["path"], json!("/tmp/my views/login.json"));

        let bare = parse_intent("/preview login.json");
        assert_eq!(bare.command_args["path"], json!("login.json"));
    }

    #[test]
    fn unknown_command() {
        let intent = parse_intent("/magic foo bar");
        assert_eq!(intent.action, "unknown");
        assert_eq!(intent.command_args["command"], json!("magic"));
        assert_eq!(intent.command_args["arg"], json!("foo bar"));
    }

    #[test]
    fn free_text_is_a_design_prompt() {
        let intent = parse_intent("  a login form with a chart  ");
        assert_eq!(intent.action, "design");
        assert_eq!(intent.prompt.as_deref(), Some("a login form with a chart"));
    }

    #[test]
    fn lone_slash_is_a_design_prompt() {
        assert_eq!(parse_intent("/ ").action, "design");
    }
}
