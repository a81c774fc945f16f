use std::env;
use std::fs;
use std::io::{self, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use oxidx_contracts::chat::{parse_intent, CHAT_HELP_COMMANDS};
use oxidx_contracts::events::EventWriter;
use oxidx_contracts::history::DEFAULT_HISTORY_LIMIT;
use oxidx_contracts::schema::{resolve_catalog, sanitize, tool_arguments_from_text, CatalogSource};
use oxidx_engine::{
    new_session_id, ArtifactStore, BrainClient, BrainCommand, DetachedViewer, NoPreview,
    OllamaChatModel, PreviewLauncher, Session, ToolDispatch, ToolResult, TurnOutcome,
    DEFAULT_MODEL,
};
use serde_json::{json, Value};

const DEFAULT_BRAIN: &str = "target/release/oxidx-mcp";
const DEFAULT_VIEWER: &str = "target/debug/oxidx-viewer";
const CODE_PREVIEW_CHARS: usize = 200;

#[derive(Debug, Parser)]
#[command(
    name = "oxidx-magic",
    version,
    about = "Describe a UI in words, get OxidX Rust code back"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Interactive design console.
    Chat(ChatArgs),
    /// Runs a single prompt and exits.
    Run(RunArgs),
    /// Prints the component catalog the brain advertises.
    Catalog(CatalogArgs),
    /// Normalizes a component tree (or model output) from a file or stdin.
    Sanitize(SanitizeArgs),
}

#[derive(Debug, Args)]
struct SessionArgs {
    /// Brain command line [env: OXIDX_BRAIN]
    #[arg(long)]
    brain: Option<String>,
    /// Viewer executable [env: OXIDX_VIEWER]
    #[arg(long)]
    viewer: Option<PathBuf>,
    /// Ollama model [env: OXIDX_MODEL]
    #[arg(long)]
    model: Option<String>,
    /// Ollama base URL [env: OLLAMA_HOST]
    #[arg(long)]
    ollama_host: Option<String>,
    #[arg(long, default_value = ".")]
    out: PathBuf,
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long, default_value_t = DEFAULT_HISTORY_LIMIT)]
    history_limit: usize,
    #[arg(long)]
    no_preview: bool,
}

#[derive(Debug, Parser)]
struct ChatArgs {
    #[command(flatten)]
    session: SessionArgs,
}

#[derive(Debug, Parser)]
struct RunArgs {
    #[arg(long)]
    prompt: String,
    #[command(flatten)]
    session: SessionArgs,
}

#[derive(Debug, Parser)]
struct CatalogArgs {
    /// Brain command line [env: OXIDX_BRAIN]
    #[arg(long)]
    brain: Option<String>,
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Parser)]
struct SanitizeArgs {
    /// JSON file to read; stdin when omitted or `-`.
    input: Option<PathBuf>,
    /// Treat the input as a model reply and extract the tool arguments first.
    #[arg(long)]
    extract: bool,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("oxidx-magic error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Chat(args) => {
            run_chat(args)?;
            Ok(0)
        }
        Command::Run(args) => run_once(args),
        Command::Catalog(args) => run_catalog(args),
        Command::Sanitize(args) => run_sanitize(args),
    }
}

fn run_chat(args: ChatArgs) -> Result<()> {
    let mut session = open_session(&args.session)?;
    print_session_banner(&session);

    let stdin = io::stdin();
    let mut line = String::new();
    println!("OxidX Magic console started. Type /help for commands.");

    loop {
        print!("\nDescribe your UI: ");
        io::stdout().flush()?;

        line.clear();
        let read = match stdin.read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            break;
        }

        let intent = parse_intent(line.trim_end_matches(['\n', '\r']));
        match intent.action.as_str() {
            "noop" => continue,
            "exit" => break,
            "help" => {
                println!("Commands: {}", CHAT_HELP_COMMANDS.join(" "));
            }
            "reset" => {
                let dropped = session.reset()?;
                println!("Conversation reset ({dropped} message(s) dropped).");
            }
            "show_catalog" => {
                println!("{}", describe_catalog_source(session.catalog().source()));
                println!("{}", session.catalog().kinds().join(", "));
            }
            "set_model" => {
                let current = session.model_name().to_string();
                let model =
                    value_as_non_empty_string(intent.command_args.get("model")).unwrap_or(current);
                session.set_model(&model);
                println!("Model set to {model}");
            }
            "preview" => {
                let Some(path) = value_as_non_empty_string(intent.command_args.get("path")) else {
                    println!("/preview requires a path");
                    continue;
                };
                match session.preview_file(Path::new(&path)) {
                    Ok(Some(launch)) => println!("Preview launched (pid {}).", launch.pid),
                    Ok(None) => println!("Preview is disabled."),
                    Err(err) => println!("Preview failed: {err:#}"),
                }
            }
            "unknown" => {
                let command = value_as_non_empty_string(intent.command_args.get("command"))
                    .unwrap_or_default();
                println!("Unknown command: /{command}. Type /help for commands.");
            }
            _ => {
                let Some(prompt) = intent.prompt.as_deref() else {
                    continue;
                };
                println!("Designing...");
                match session.handle_turn(prompt) {
                    Ok(outcome) => print_outcome(&outcome),
                    Err(err) => println!("Turn failed: {err:#}"),
                }
            }
        }
    }

    session.finish()?;
    Ok(())
}

fn run_once(args: RunArgs) -> Result<i32> {
    let mut session = open_session(&args.session)?;
    let outcome = session.handle_turn(&args.prompt);
    session.finish()?;
    let outcome = outcome?;
    print_outcome(&outcome);
    let failed = match &outcome {
        TurnOutcome::Reply(_) => false,
        TurnOutcome::Generated(dispatches) => dispatches
            .iter()
            .any(|dispatch| dispatch.result.is_error()),
    };
    Ok(if failed { 1 } else { 0 })
}

fn run_catalog(args: CatalogArgs) -> Result<i32> {
    let command = brain_command(args.brain.as_deref())?;
    let mut brain = BrainClient::spawn(&command)?;
    let catalog = resolve_catalog(brain.tools());
    if args.json {
        let reason = match catalog.source() {
            CatalogSource::Synchronized => Value::Null,
            CatalogSource::Fallback { reason } => Value::String(reason.clone()),
        };
        let payload = json!({
            "synchronized": catalog.is_synchronized(),
            "reason": reason,
            "kinds": catalog.kinds(),
            "tools": brain.tools(),
            "warnings": brain.handshake_warnings(),
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        println!("{}", describe_catalog_source(catalog.source()));
        for kind in catalog.kinds() {
            println!("  {kind}");
        }
        for warning in brain.handshake_warnings() {
            eprintln!("warning: {warning}");
        }
    }
    brain.shutdown();
    Ok(0)
}

fn run_sanitize(args: SanitizeArgs) -> Result<i32> {
    let raw = match args.input.as_deref() {
        Some(path) if path != Path::new("-") => fs::read_to_string(path)
            .with_context(|| format!("read {}", path.display()))?,
        _ => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("read stdin")?;
            buffer
        }
    };

    let value = if args.extract {
        match tool_arguments_from_text(&raw) {
            Some(arguments) => Value::Object(arguments),
            None => {
                eprintln!("no JSON object found in input");
                return Ok(2);
            }
        }
    } else {
        serde_json::from_str(&raw).context("input is not JSON")?
    };
    println!("{}", serde_json::to_string_pretty(&sanitize(value))?);
    Ok(0)
}

fn open_session(args: &SessionArgs) -> Result<Session> {
    let command = brain_command(args.brain.as_deref())?;
    let brain = BrainClient::spawn(&command)?;

    let model_name = args
        .model
        .clone()
        .or_else(|| non_empty_env("OXIDX_MODEL"))
        .unwrap_or_else(|| DEFAULT_MODEL.to_string());
    let model = OllamaChatModel::new(args.ollama_host.clone(), model_name)?;

    let events_path = args
        .events
        .clone()
        .unwrap_or_else(|| args.out.join("events.jsonl"));
    let events = EventWriter::new(events_path, new_session_id());

    let preview: Box<dyn PreviewLauncher> = if args.no_preview {
        Box::new(NoPreview)
    } else {
        let viewer = args
            .viewer
            .clone()
            .or_else(|| non_empty_env("OXIDX_VIEWER").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_VIEWER));
        Box::new(DetachedViewer::new(viewer))
    };

    Ok(Session::new(brain, Box::new(model), events)?
        .with_artifacts(ArtifactStore::new(&args.out))
        .with_preview(preview)
        .with_history_limit(args.history_limit))
}

fn brain_command(flag: Option<&str>) -> Result<BrainCommand> {
    let command_line = flag
        .map(str::to_string)
        .or_else(|| non_empty_env("OXIDX_BRAIN"))
        .unwrap_or_else(|| DEFAULT_BRAIN.to_string());
    if command_line.trim().is_empty() {
        bail!("--brain must not be empty");
    }
    BrainCommand::parse(&command_line)
}

fn print_session_banner(session: &Session) {
    let brain = session.brain();
    match brain.pid() {
        Some(pid) => println!("Brain connected (pid {pid})."),
        None => println!("Brain connected."),
    }
    for warning in brain.handshake_warnings() {
        println!("  handshake: {warning}");
    }
    println!(
        "{} Kinds: {}",
        describe_catalog_source(session.catalog().source()),
        session.catalog().kinds().join(", ")
    );
    println!("Model: {}", session.model_name());
    if let Some(path) = session.events().path() {
        println!("Events: {}", path.display());
    }
}

fn describe_catalog_source(source: &CatalogSource) -> String {
    match source {
        CatalogSource::Synchronized => "Catalog synchronized with the brain.".to_string(),
        CatalogSource::Fallback { reason } => format!("Using the default catalog ({reason})."),
    }
}

fn print_outcome(outcome: &TurnOutcome) {
    match outcome {
        TurnOutcome::Reply(text) => println!("{text}"),
        TurnOutcome::Generated(dispatches) => {
            for dispatch in dispatches {
                print_dispatch(dispatch);
            }
        }
    }
}

fn print_dispatch(dispatch: &ToolDispatch) {
    println!("Generating {}...", dispatch.view_name);
    if !dispatch.unknown_kinds.is_empty() {
        println!(
            "  kinds outside the catalog: {}",
            dispatch.unknown_kinds.join(", ")
        );
    }
    if !dispatch.coerced_kinds.is_empty() {
        let kinds: Vec<String> = dispatch.coerced_kinds.iter().map(Value::to_string).collect();
        println!("  kinds replaced by the default: {}", kinds.join(", "));
    }
    match &dispatch.result {
        ToolResult::Code(code) => {
            if let Some(saved) = &dispatch.artifact {
                match saved.changed_lines {
                    Some(changed) => println!(
                        "Saved {} ({changed} line(s) changed).",
                        saved.path.display()
                    ),
                    None => println!("Saved {}.", saved.path.display()),
                }
            }
            if let Some(launch) = &dispatch.preview {
                println!("Preview launched (pid {}).", launch.pid);
            }
            for warning in &dispatch.warnings {
                println!("  warning: {warning}");
            }
            println!("{}", "=".repeat(50));
            println!("{}...", clamp_text(code, CODE_PREVIEW_CHARS));
            println!("{}", "=".repeat(50));
        }
        ToolResult::Error(message) => println!("{message}"),
        ToolResult::Raw(raw) => println!("Brain replied without code: {raw}"),
    }
}

fn clamp_text(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

fn value_as_non_empty_string(value: Option<&Value>) -> Option<String> {
    let raw = value
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default();
    if raw.is_empty() {
        None
    } else {
        Some(raw.to_string())
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use serde_json::json;

    use super::{brain_command, clamp_text, value_as_non_empty_string, Cli, Command};

    #[test]
    fn chat_flags_parse_with_defaults() {
        let cli = Cli::parse_from(["oxidx-magic", "chat", "--no-preview"]);
        let Command::Chat(args) = cli.command else {
            panic!("expected chat");
        };
        assert!(args.session.no_preview);
        assert_eq!(args.session.history_limit, 6);
        assert_eq!(args.session.out, std::path::PathBuf::from("."));
        assert!(args.session.events.is_none());
    }

    #[test]
    fn run_requires_a_prompt() {
        assert!(Cli::try_parse_from(["oxidx-magic", "run"]).is_err());
        let cli = Cli::parse_from([
            "oxidx-magic",
            "run",
            "--prompt",
            "a login screen",
            "--brain",
            "./oxidx-mcp --quiet",
            "--history-limit",
            "10",
        ]);
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.prompt, "a login screen");
        assert_eq!(args.session.history_limit, 10);
        assert_eq!(args.session.brain.as_deref(), Some("./oxidx-mcp --quiet"));
    }

    #[test]
    fn brain_flag_wins_and_is_split() -> anyhow::Result<()> {
        let command = brain_command(Some("/opt/oxidx-mcp --log debug"))?;
        assert_eq!(command.program, std::path::PathBuf::from("/opt/oxidx-mcp"));
        assert_eq!(command.args, vec!["--log", "debug"]);
        assert!(brain_command(Some("  ")).is_err());
        Ok(())
    }

    #[test]
    fn helpers_trim_and_clamp() {
        assert_eq!(clamp_text("abcdef", 3), "abc");
        assert_eq!(clamp_text("añb", 10), "añb");
        assert_eq!(
            value_as_non_empty_string(Some(&json!("  qwen2.5 "))),
            Some("qwen2.5".to_string())
        );
        assert_eq!(value_as_non_empty_string(Some(&json!(""))), None);
        assert_eq!(value_as_non_empty_string(Some(&json!(3))), None);
    }
}
