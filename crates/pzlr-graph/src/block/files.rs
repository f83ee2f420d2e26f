//! Modification-time keyed file content cache.

use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::runtime::{Runtime, RuntimeResult};

/// File content together with the modification time it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSnapshot {
    pub modified: Option<u64>,
    pub content: Arc<str>,
}

type Slot = Arc<Mutex<Option<FileSnapshot>>>;

/// Process-local cache of manifest contents.
///
/// Each path has its own async mutex: concurrent readers of one path wait for
/// a single read instead of repeating it. Files without a modification time
/// are reread on every access.
#[derive(Debug, Clone, Default)]
pub struct FileCache {
    slots: Arc<DashMap<PathBuf, Slot>>,
}

impl FileCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn read(&self, runtime: &dyn Runtime, path: &Path) -> RuntimeResult<FileSnapshot> {
        let slot = self
            .slots
            .entry(path.to_path_buf())
            .or_default()
            .value()
            .clone();

        let mut guard = slot.lock().await;
        let modified = runtime.metadata(path).await?.modified;

        if let Some(cached) = guard.as_ref() {
            if modified.is_some() && cached.modified == modified {
                return Ok(cached.clone());
            }
        }

        let content: Arc<str> = runtime.read_to_string(path).await?.into();
        tracing::trace!(path = %path.display(), "file cache miss");

        let snapshot = FileSnapshot { modified, content };
        *guard = Some(snapshot.clone());
        Ok(snapshot)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn clear(&self) {
        self.slots.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestRuntime;

    #[tokio::test]
    async fn unchanged_files_are_read_once() {
        let runtime = TestRuntime::new("/p");
        runtime.add_file("a.js", "one");
        let cache = FileCache::new();

        let first = cache.read(&runtime, Path::new("/p/a.js")).await.unwrap();
        let second = cache.read(&runtime, Path::new("/p/a.js")).await.unwrap();

        assert_eq!(&*first.content, "one");
        assert_eq!(first, second);
        assert_eq!(runtime.read_count(), 1);
    }

    #[tokio::test]
    async fn touched_files_are_reread() {
        let runtime = TestRuntime::new("/p");
        runtime.add_file("a.js", "one");
        let cache = FileCache::new();
        cache.read(&runtime, Path::new("/p/a.js")).await.unwrap();

        runtime.add_file("a.js", "two");
        let snapshot = cache.read(&runtime, Path::new("/p/a.js")).await.unwrap();

        assert_eq!(&*snapshot.content, "two");
        assert_eq!(runtime.read_count(), 2);
    }

    #[tokio::test]
    async fn concurrent_reads_share_one_read() {
        let runtime = TestRuntime::new("/p");
        runtime.add_file("a.js", "one");
        let cache = FileCache::new();
        let path = Path::new("/p/a.js");

        let (a, b) = tokio::join!(cache.read(&runtime, path), cache.read(&runtime, path));

        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(runtime.read_count(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn missing_files_are_errors() {
        let runtime = TestRuntime::new("/p");
        let cache = FileCache::new();
        assert!(cache.read(&runtime, Path::new("/p/none.js")).await.is_err());
    }
}
