mod command_registry;
mod intent_parser;

pub use command_registry::{CHAT_HELP_COMMANDS, EXIT_WORDS};
pub use intent_parser::{parse_intent, Intent};
