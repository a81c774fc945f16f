#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub action: &'static str,
}

pub(crate) const NO_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "help",
        action: "help",
    },
    CommandSpec {
        command: "reset",
        action: "reset",
    },
    CommandSpec {
        command: "tools",
        action: "show_catalog",
    },
    CommandSpec {
        command: "exit",
        action: "exit",
    },
    CommandSpec {
        command: "quit",
        action: "exit",
    },
];

pub(crate) const RAW_ARG_COMMANDS: &[CommandSpec] = &[CommandSpec {
    command: "model",
    action: "set_model",
}];

pub(crate) const SINGLE_PATH_COMMANDS: &[CommandSpec] = &[CommandSpec {
    command: "preview",
    action: "preview",
}];

/// Bare words that end the console session.
pub const EXIT_WORDS: &[&str] = &["exit", "quit", "salir"];

pub const CHAT_HELP_COMMANDS: &[&str] = &[
    "/help",
    "/reset",
    "/tools",
    "/model",
    "/preview",
    "/exit",
];
