//! In-memory runtime for tests.
//!
//! Files live in a sorted map guarded by a `parking_lot::RwLock`. Every write
//! advances a virtual clock that is reported as the modification time, so tests
//! can observe mtime-sensitive caches without sleeping.

use async_trait::async_trait;
use parking_lot::RwLock;
use path_clean::PathClean;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use super::{
    FileMetadata, Runtime, RuntimeError, RuntimeResult, compile_pattern, glob_match_options,
    relative_pattern_path,
};

#[derive(Debug, Clone)]
struct MemoryFile {
    content: Vec<u8>,
    modified: u64,
}

/// In-memory filesystem implementing [`Runtime`].
///
/// ```rust,ignore
/// use pzlr_graph::test_utils::TestRuntime;
///
/// let runtime = TestRuntime::new("/project");
/// runtime.add_file("src/components/b-foo/index.js", "package('b-foo');");
/// assert!(runtime.has_file("/project/src/components/b-foo/index.js"));
/// ```
#[derive(Debug, Clone)]
pub struct TestRuntime {
    cwd: PathBuf,
    files: Arc<RwLock<BTreeMap<PathBuf, MemoryFile>>>,
    clock: Arc<AtomicU64>,
    reads: Arc<AtomicUsize>,
}

impl TestRuntime {
    /// Create an empty filesystem; relative paths are resolved against `cwd`.
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: cwd.into(),
            files: Arc::new(RwLock::new(BTreeMap::new())),
            clock: Arc::new(AtomicU64::new(1)),
            reads: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn absolute(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf().clean()
        } else {
            self.cwd.join(path).clean()
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::SeqCst)
    }

    /// Add or replace a file.
    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        let path = self.absolute(path.as_ref());
        let modified = self.tick();
        self.files.write().insert(
            path,
            MemoryFile {
                content: content.into(),
                modified,
            },
        );
    }

    /// Bump the modification time of a file without changing its content.
    pub fn touch(&self, path: impl AsRef<Path>) {
        let path = self.absolute(path.as_ref());
        let modified = self.tick();
        if let Some(file) = self.files.write().get_mut(&path) {
            file.modified = modified;
        }
    }

    pub fn remove(&self, path: impl AsRef<Path>) {
        let path = self.absolute(path.as_ref());
        self.files.write().remove(&path);
    }

    pub fn has_file(&self, path: impl AsRef<Path>) -> bool {
        let path = self.absolute(path.as_ref());
        self.files.read().contains_key(&path)
    }

    /// Content of a file as text, if present.
    pub fn file_text(&self, path: impl AsRef<Path>) -> Option<String> {
        let path = self.absolute(path.as_ref());
        self.files
            .read()
            .get(&path)
            .map(|f| String::from_utf8_lossy(&f.content).into_owned())
    }

    /// Number of `read_file` calls served so far.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.files
            .read()
            .keys()
            .any(|file| file != path && file.starts_with(path))
    }
}

#[async_trait]
impl Runtime for TestRuntime {
    async fn read_file(&self, path: &Path) -> RuntimeResult<Vec<u8>> {
        let path = self.absolute(path);
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.files
            .read()
            .get(&path)
            .map(|f| f.content.clone())
            .ok_or(RuntimeError::FileNotFound(path))
    }

    async fn write_file(&self, path: &Path, content: &[u8]) -> RuntimeResult<()> {
        self.add_file(path, content.to_vec());
        Ok(())
    }

    async fn rename(&self, from: &Path, to: &Path) -> RuntimeResult<()> {
        let from = self.absolute(from);
        let to = self.absolute(to);
        let mut files = self.files.write();
        let file = files
            .remove(&from)
            .ok_or_else(|| RuntimeError::FileNotFound(from.clone()))?;
        files.insert(to, file);
        Ok(())
    }

    async fn create_dir_all(&self, _path: &Path) -> RuntimeResult<()> {
        Ok(())
    }

    async fn metadata(&self, path: &Path) -> RuntimeResult<FileMetadata> {
        let path = self.absolute(path);
        if let Some(file) = self.files.read().get(&path) {
            return Ok(FileMetadata {
                size: file.content.len() as u64,
                is_dir: false,
                is_file: true,
                modified: Some(file.modified),
            });
        }

        if self.is_dir(&path) {
            return Ok(FileMetadata {
                size: 0,
                is_dir: true,
                is_file: false,
                modified: None,
            });
        }

        Err(RuntimeError::FileNotFound(path))
    }

    fn exists(&self, path: &Path) -> bool {
        let path = self.absolute(path);
        self.files.read().contains_key(&path) || self.is_dir(&path)
    }

    async fn glob(&self, root: &Path, pattern: &str) -> RuntimeResult<Vec<PathBuf>> {
        let root = self.absolute(root);
        let pattern = compile_pattern(pattern)?;
        let options = glob_match_options();

        let matches = self
            .files
            .read()
            .keys()
            .filter(|path| {
                relative_pattern_path(&root, path)
                    .is_some_and(|relative| pattern.matches_with(&relative, options))
            })
            .cloned()
            .collect();

        Ok(matches)
    }

    fn get_cwd(&self) -> RuntimeResult<PathBuf> {
        Ok(self.cwd.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_touch_advances_mtime() {
        let runtime = TestRuntime::new("/p");
        runtime.add_file("a.js", "x");
        let before = runtime.metadata(Path::new("a.js")).await.unwrap();

        runtime.touch("a.js");
        let after = runtime.metadata(Path::new("a.js")).await.unwrap();

        assert!(after.modified > before.modified);
        assert_eq!(after.size, 1);
    }

    #[tokio::test]
    async fn test_directories_exist_implicitly() {
        let runtime = TestRuntime::new("/p");
        runtime.add_file("src/components/b-foo/index.js", "");

        assert!(runtime.exists(Path::new("/p/src/components")));
        assert!(
            runtime
                .metadata(Path::new("/p/src"))
                .await
                .unwrap()
                .is_dir
        );
        assert!(!runtime.exists(Path::new("/p/lib")));
    }

    #[tokio::test]
    async fn test_glob_is_rooted() {
        let runtime = TestRuntime::new("/p");
        runtime.add_file("src/b-foo/index.js", "");
        runtime.add_file("other/b-bar/index.js", "");

        let found = runtime
            .glob(Path::new("/p/src"), "**/b-*/index.js")
            .await
            .unwrap();

        assert_eq!(found, vec![PathBuf::from("/p/src/b-foo/index.js")]);
    }
}
