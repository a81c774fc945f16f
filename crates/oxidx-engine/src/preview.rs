use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{Context, Result};
use oxidx_contracts::schema::ComponentNode;

pub const PREVIEW_FILE_NAME: &str = "oxidx_preview.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewLaunch {
    pub pid: u32,
    pub tree_path: PathBuf,
}

/// Shows a component tree somewhere. Launches are fire-and-forget: nothing
/// waits for the preview to start, finish or fail after spawning.
pub trait PreviewLauncher {
    fn launch(&self, tree: &ComponentNode) -> Result<Option<PreviewLaunch>>;
}

/// Preview disabled.
pub struct NoPreview;

impl PreviewLauncher for NoPreview {
    fn launch(&self, _tree: &ComponentNode) -> Result<Option<PreviewLaunch>> {
        Ok(None)
    }
}

/// Runs the viewer binary on a fixed-name JSON file, detached from this
/// process group.
pub struct DetachedViewer {
    program: PathBuf,
    tree_path: PathBuf,
}

impl DetachedViewer {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self::with_tree_path(program, env::temp_dir().join(PREVIEW_FILE_NAME))
    }

    pub fn with_tree_path(program: impl Into<PathBuf>, tree_path: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            tree_path: tree_path.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn tree_path(&self) -> &Path {
        &self.tree_path
    }
}

impl PreviewLauncher for DetachedViewer {
    fn launch(&self, tree: &ComponentNode) -> Result<Option<PreviewLaunch>> {
        let pretty = serde_json::to_string_pretty(tree).context("serialize preview tree")?;
        fs::write(&self.tree_path, pretty)
            .with_context(|| format!("write preview tree {}", self.tree_path.display()))?;

        let mut command = Command::new(&self.program);
        command
            .arg(&self.tree_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }
        let child = command
            .spawn()
            .with_context(|| format!("launch viewer {}", self.program.display()))?;

        Ok(Some(PreviewLaunch {
            pid: child.id(),
            tree_path: self.tree_path.clone(),
        }))
    }
}
