//! Filesystem runtime abstraction
//!
//! This module defines the `Runtime` trait through which the resolver, the
//! block graph and the lock file touch the filesystem. Production code uses
//! [`native::NativeRuntime`]; tests use the in-memory `TestRuntime`.

pub mod native;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Result type for runtime operations
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Errors that can occur during runtime operations
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// File not found
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(String),

    /// Glob pattern could not be compiled
    #[error("Invalid glob pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// Other runtime error
    #[error("Runtime error: {0}")]
    Other(String),
}

/// File metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    /// File size in bytes
    pub size: u64,
    /// Whether this is a directory
    pub is_dir: bool,
    /// Whether this is a file
    pub is_file: bool,
    /// Last modified timestamp (milliseconds since epoch)
    pub modified: Option<u64>,
}

/// Platform runtime trait
///
/// All suspension points of a resolution pass are calls on this trait:
/// file reads, stats and directory globs.
#[async_trait]
pub trait Runtime: Send + Sync + std::fmt::Debug {
    /// Read a file from the filesystem
    async fn read_file(&self, path: &Path) -> RuntimeResult<Vec<u8>>;

    /// Write a file to the filesystem
    async fn write_file(&self, path: &Path, content: &[u8]) -> RuntimeResult<()>;

    /// Atomically replace `to` with `from`
    async fn rename(&self, from: &Path, to: &Path) -> RuntimeResult<()>;

    /// Create a directory and its parents
    async fn create_dir_all(&self, path: &Path) -> RuntimeResult<()>;

    /// Get file metadata
    async fn metadata(&self, path: &Path) -> RuntimeResult<FileMetadata>;

    /// Check if a path exists
    fn exists(&self, path: &Path) -> bool;

    /// Files under `root` whose path relative to `root` matches `pattern`.
    ///
    /// `**/` matches zero or more directories and `*` never crosses a path
    /// separator. Results are absolute (joined onto `root`) and sorted. A
    /// missing root yields an empty list.
    async fn glob(&self, root: &Path, pattern: &str) -> RuntimeResult<Vec<PathBuf>>;

    /// Get the current working directory
    fn get_cwd(&self) -> RuntimeResult<PathBuf>;

    /// Read a file as UTF-8 text
    async fn read_to_string(&self, path: &Path) -> RuntimeResult<String> {
        let bytes = self.read_file(path).await?;
        String::from_utf8(bytes)
            .map_err(|e| RuntimeError::Io(format!("{} is not valid UTF-8: {e}", path.display())))
    }
}

/// Options shared by every glob implementation.
pub(crate) fn glob_match_options() -> glob::MatchOptions {
    glob::MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    }
}

/// Compile a relative glob pattern.
pub(crate) fn compile_pattern(pattern: &str) -> RuntimeResult<glob::Pattern> {
    glob::Pattern::new(pattern).map_err(|e| RuntimeError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

/// Relative path with `/` separators, the form patterns are matched against.
pub(crate) fn relative_pattern_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<_> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect();
    Some(parts.join("/"))
}
