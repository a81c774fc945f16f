//! Everything that talks to the outside world: the brain subprocess, the
//! chat model, the filesystem and the preview viewer.

pub mod artifacts;
pub mod brain;
pub mod model;
pub mod preview;
pub mod session;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use artifacts::{ArtifactStore, SavedArtifact};
pub use brain::{BrainClient, BrainCommand, BrainState, ToolResult};
pub use model::{ChatModel, OllamaChatModel, DEFAULT_MODEL, DEFAULT_OLLAMA_HOST};
pub use preview::{DetachedViewer, NoPreview, PreviewLaunch, PreviewLauncher};
pub use session::{new_session_id, Session, ToolDispatch, TurnOutcome, SYSTEM_PROMPT};
pub use transport::JsonLineFramer;
