//! Native Runtime Implementation
//!
//! Wraps `std::fs` and `walkdir` so that resolution code stays behind the
//! `Runtime` trait. Blocking calls run on tokio's blocking pool.

// NativeRuntime is the one place that is allowed to touch std::fs
#![allow(clippy::disallowed_methods)]

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::task;
use walkdir::WalkDir;

use super::{
    FileMetadata, Runtime, RuntimeError, RuntimeResult, compile_pattern, glob_match_options,
    relative_pattern_path,
};

/// Native filesystem Runtime implementation using `std::fs`.
///
/// # Example
///
/// ```rust,no_run
/// use pzlr_graph::{NativeRuntime, Runtime};
/// use std::path::Path;
///
/// # async fn example() -> pzlr_graph::RuntimeResult<()> {
/// let runtime = NativeRuntime::new();
/// let manifests = runtime.glob(Path::new("src"), "**/b-*/index.js").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct NativeRuntime;

impl NativeRuntime {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NativeRuntime {
    fn default() -> Self {
        Self::new()
    }
}

fn io_error(path: &Path, action: &str, e: std::io::Error) -> RuntimeError {
    if e.kind() == std::io::ErrorKind::NotFound {
        RuntimeError::FileNotFound(path.to_path_buf())
    } else {
        RuntimeError::Io(format!("Failed to {action} {}: {e}", path.display()))
    }
}

fn join_error(e: task::JoinError) -> RuntimeError {
    RuntimeError::Other(format!("Task join error: {e}"))
}

#[async_trait]
impl Runtime for NativeRuntime {
    async fn read_file(&self, path: &Path) -> RuntimeResult<Vec<u8>> {
        let path = path.to_path_buf();

        task::spawn_blocking(move || std::fs::read(&path).map_err(|e| io_error(&path, "read", e)))
            .await
            .map_err(join_error)?
    }

    async fn write_file(&self, path: &Path, content: &[u8]) -> RuntimeResult<()> {
        let path = path.to_path_buf();
        let content = content.to_vec();

        task::spawn_blocking(move || {
            std::fs::write(&path, content).map_err(|e| io_error(&path, "write", e))
        })
        .await
        .map_err(join_error)?
    }

    async fn rename(&self, from: &Path, to: &Path) -> RuntimeResult<()> {
        let from = from.to_path_buf();
        let to = to.to_path_buf();

        task::spawn_blocking(move || {
            std::fs::rename(&from, &to).map_err(|e| io_error(&from, "rename", e))
        })
        .await
        .map_err(join_error)?
    }

    async fn create_dir_all(&self, path: &Path) -> RuntimeResult<()> {
        let path = path.to_path_buf();

        task::spawn_blocking(move || {
            std::fs::create_dir_all(&path).map_err(|e| io_error(&path, "create directory", e))
        })
        .await
        .map_err(join_error)?
    }

    async fn metadata(&self, path: &Path) -> RuntimeResult<FileMetadata> {
        let path = path.to_path_buf();

        task::spawn_blocking(move || {
            let metadata =
                std::fs::metadata(&path).map_err(|e| io_error(&path, "get metadata for", e))?;

            let modified = metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_millis() as u64);

            Ok(FileMetadata {
                size: metadata.len(),
                is_dir: metadata.is_dir(),
                is_file: metadata.is_file(),
                modified,
            })
        })
        .await
        .map_err(join_error)?
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    async fn glob(&self, root: &Path, pattern: &str) -> RuntimeResult<Vec<PathBuf>> {
        let root = root.to_path_buf();
        let pattern = compile_pattern(pattern)?;

        task::spawn_blocking(move || {
            if !root.is_dir() {
                return Ok(Vec::new());
            }

            let options = glob_match_options();
            let mut matches = Vec::new();

            for entry in WalkDir::new(&root)
                .follow_links(true)
                .sort_by_file_name()
                .into_iter()
            {
                let entry = match entry {
                    Ok(entry) => entry,
                    // Dangling symlinks and unreadable folders are not part of any layer
                    Err(e) => {
                        tracing::debug!(error = %e, "skipping unreadable path during glob");
                        continue;
                    }
                };

                if !entry.file_type().is_file() {
                    continue;
                }

                let Some(relative) = relative_pattern_path(&root, entry.path()) else {
                    continue;
                };

                if pattern.matches_with(&relative, options) {
                    matches.push(entry.into_path());
                }
            }

            matches.sort();
            Ok(matches)
        })
        .await
        .map_err(join_error)?
    }

    fn get_cwd(&self) -> RuntimeResult<PathBuf> {
        std::env::current_dir().map_err(|e| {
            RuntimeError::Io(format!("Failed to get current working directory: {e}"))
        })
    }
}
