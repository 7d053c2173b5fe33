//! Workspace boundary enforcement and scoped push/pop guards for the two
//! process-global resources the engine mutates: the current working
//! directory and the environment block. Both guards are
//! `Drop`-based so the push is undone on every exit path, including a panic
//! unwinding through the engine.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Confines file writes to the project root under repair.
#[derive(Debug, Clone)]
pub struct WorkspaceGuard {
    workspace_root: PathBuf,
}

#[derive(Error, Debug)]
pub enum SafetyError {
    #[error("path is outside workspace: {path} (workspace: {workspace})")]
    OutsideWorkspace { path: PathBuf, workspace: PathBuf },

    #[error("failed to canonicalize path: {0}")]
    Canonicalize(#[from] std::io::Error),
}

impl WorkspaceGuard {
    /// Create a new workspace guard with the given root.
    ///
    /// The workspace root will be canonicalized to handle symlinks correctly.
    pub fn new(workspace_root: impl AsRef<Path>) -> Result<Self, SafetyError> {
        let workspace_root = workspace_root.as_ref().canonicalize()?;
        Ok(Self { workspace_root })
    }

    /// Check if a path is safe to edit.
    ///
    /// Returns the canonicalized absolute path if safe.
    ///
    /// Note: this performs canonicalization at validation time. For maximum
    /// TOCTOU safety, callers should re-validate immediately before write
    /// operations in adversarial environments; see [`Self::revalidate`].
    pub fn validate_path(&self, path: impl AsRef<Path>) -> Result<PathBuf, SafetyError> {
        let path = path.as_ref();
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace_root.join(path)
        };
        let canonical = absolute.canonicalize()?;
        self.check_canonical(&canonical)?;
        Ok(canonical)
    }

    /// Re-validate a previously-validated canonical path immediately before
    /// a write, to close the TOCTOU window.
    pub fn revalidate(&self, path: &Path) -> Result<PathBuf, SafetyError> {
        let canonical = path.canonicalize()?;
        self.check_canonical(&canonical)?;
        Ok(canonical)
    }

    fn check_canonical(&self, canonical: &Path) -> Result<(), SafetyError> {
        if !canonical.starts_with(&self.workspace_root) {
            return Err(SafetyError::OutsideWorkspace {
                path: canonical.to_path_buf(),
                workspace: self.workspace_root.clone(),
            });
        }
        Ok(())
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }
}

/// Pushes the process's current directory to `target` on construction and
/// pops it back on drop, regardless of how the scope is exited: scoped
/// acquisition of the working-directory context with a guaranteed pop on
/// every exit path, including failure.
pub struct ScopedWorkdir {
    previous: PathBuf,
}

impl ScopedWorkdir {
    pub fn enter(target: &Path) -> std::io::Result<Self> {
        let previous = std::env::current_dir()?;
        std::env::set_current_dir(target)?;
        Ok(ScopedWorkdir { previous })
    }
}

impl Drop for ScopedWorkdir {
    fn drop(&mut self) {
        let _ = std::env::set_current_dir(&self.previous);
    }
}

/// Sets a block of process environment variables on construction and
/// restores their prior values (or removes them if previously unset) on
/// drop. Mirrors the original `f1x` `InEnvironment` RAII guard used to scope
/// the six `F1X_*` dispatch variables to a single test execution.
pub struct ScopedEnv {
    previous: Vec<(String, Option<String>)>,
}

impl ScopedEnv {
    pub fn set(vars: &[(String, String)]) -> Self {
        let previous = vars
            .iter()
            .map(|(key, _)| (key.clone(), std::env::var(key).ok()))
            .collect();
        for (key, value) in vars {
            std::env::set_var(key, value);
        }
        ScopedEnv { previous }
    }
}

impl Drop for ScopedEnv {
    fn drop(&mut self) {
        for (key, previous) in &self.previous {
            match previous {
                Some(value) => std::env::set_var(key, value),
                None => std::env::remove_var(key),
            }
        }
    }
}
