//! Where plan files live.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::debug;

use crate::error::{StateError, StateResult};

/// Text storage addressed by workspace-relative paths.
pub trait Workspace {
    fn write_text(&self, path: &str, contents: &str) -> StateResult<()>;

    fn read_text(&self, path: &str) -> StateResult<String>;
}

impl<T: Workspace + ?Sized> Workspace for &T {
    fn write_text(&self, path: &str, contents: &str) -> StateResult<()> {
        (**self).write_text(path, contents)
    }

    fn read_text(&self, path: &str) -> StateResult<String> {
        (**self).read_text(path)
    }
}

/// A local directory. Parent directories are created on write.
#[derive(Debug, Clone)]
pub struct DirWorkspace {
    root: PathBuf,
}

impl DirWorkspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }
}

impl Workspace for DirWorkspace {
    fn write_text(&self, path: &str, contents: &str) -> StateResult<()> {
        let target = self.resolve(path);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StateError::Write(format!("{}: {e}", parent.display())))?;
        }
        std::fs::write(&target, contents)
            .map_err(|e| StateError::Write(format!("{}: {e}", target.display())))?;
        debug!(path = ?target, bytes = contents.len(), "file written");
        Ok(())
    }

    fn read_text(&self, path: &str) -> StateResult<String> {
        let target = self.resolve(path);
        std::fs::read_to_string(&target)
            .map_err(|e| StateError::Read(format!("{}: {e}", target.display())))
    }
}

/// Ephemeral in-memory workspace (for testing).
#[derive(Debug, Default)]
pub struct MemoryWorkspace {
    files: Mutex<HashMap<String, String>>,
}

impl MemoryWorkspace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn files(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .files
            .lock()
            .map(|f| f.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }
}

impl Workspace for MemoryWorkspace {
    fn write_text(&self, path: &str, contents: &str) -> StateResult<()> {
        let mut files = self
            .files
            .lock()
            .map_err(|e| StateError::Write(e.to_string()))?;
        files.insert(path.to_string(), contents.to_string());
        Ok(())
    }

    fn read_text(&self, path: &str) -> StateResult<String> {
        let files = self
            .files
            .lock()
            .map_err(|e| StateError::Read(e.to_string()))?;
        files
            .get(path)
            .cloned()
            .ok_or_else(|| StateError::Read(format!("{path}: no such file")))
    }
}
