//! Project hash guarding the graph lock.
//!
//! The hash is a BLAKE3 digest of everything a resolved graph depends on:
//! 1. Lock format version and lock prefix
//! 2. Every component manifest of every layer (path, mtime, content hash)
//! 3. The paths of the project layer's component asset files
//! 4. A caller supplied JSON value

use blake3::Hasher;
use futures::future::try_join_all;
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::block_name::type_code_class;
use crate::error::Result;
use crate::resolve::{ProjectLayout, manifest_patterns};
use crate::runtime::Runtime;

/// Bumped whenever the lock record layout changes.
pub(crate) const LOCK_FORMAT_VERSION: u32 = 1;

/// Extensions of the project asset files that take part in the hash.
const ASSET_EXTENSIONS: &[&str] = &["js", "ts", "styl", "ss", "ess"];

/// Hex encoded project hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProjectHash(String);

impl ProjectHash {
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_hex(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compute the hash of the project's current component sources.
///
/// Entries directories and `tmp` folders are not part of the component graph
/// and are left out.
pub async fn compute_project_hash(
    runtime: &dyn Runtime,
    layout: &ProjectLayout,
    extra: Option<&serde_json::Value>,
) -> Result<ProjectHash> {
    let mut hasher = Hasher::new();

    hasher.update(&LOCK_FORMAT_VERSION.to_le_bytes());
    hasher.update(layout.config().lock_prefix.as_bytes());
    hasher.update(b"\0");

    hash_manifests(&mut hasher, runtime, layout).await?;
    hash_project_files(&mut hasher, runtime, layout).await?;

    if let Some(extra) = extra {
        hasher.update(b"extra\0");
        hasher.update(serde_json::to_string(extra)?.as_bytes());
    }

    let hash = ProjectHash(hasher.finalize().to_hex().to_string());
    tracing::debug!(hash = %hash, "project hash computed");
    Ok(hash)
}

/// Path relative to the project root with `/` separators.
fn project_relative(layout: &ProjectLayout, path: &Path) -> String {
    let relative = path.strip_prefix(layout.cwd()).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

async fn hash_manifests(
    hasher: &mut Hasher,
    runtime: &dyn Runtime,
    layout: &ProjectLayout,
) -> Result<()> {
    let patterns = manifest_patterns();

    let mut manifests: BTreeSet<PathBuf> = BTreeSet::new();
    for root in layout.search_roots() {
        for pattern in &patterns {
            manifests.extend(
                runtime
                    .glob(root, pattern)
                    .await?
                    .into_iter()
                    .filter(|path| !layout.is_ignored(path)),
            );
        }
    }

    let digests = try_join_all(manifests.iter().map(|path| async move {
        let modified = runtime.metadata(path).await?.modified;
        let content = runtime.read_file(path).await?;
        Ok::<_, crate::runtime::RuntimeError>((modified, blake3::hash(&content)))
    }))
    .await?;

    for (path, (modified, digest)) in manifests.iter().zip(digests) {
        hasher.update(project_relative(layout, path).as_bytes());
        hasher.update(b"\0");
        hasher.update(&modified.unwrap_or_default().to_le_bytes());
        hasher.update(digest.as_bytes());
    }

    Ok(())
}

async fn hash_project_files(
    hasher: &mut Hasher,
    runtime: &dyn Runtime,
    layout: &ProjectLayout,
) -> Result<()> {
    let types = type_code_class();
    let patterns = [format!("**/{types}-*/*"), format!("**/{types}-*.*")];
    let root = &layout.project().search_root;

    let mut files: BTreeSet<String> = BTreeSet::new();
    for pattern in &patterns {
        files.extend(
            runtime
                .glob(root, pattern)
                .await?
                .into_iter()
                .filter(|path| !layout.is_ignored(path))
                .filter(|path| {
                    path.extension()
                        .and_then(|ext| ext.to_str())
                        .is_some_and(|ext| ASSET_EXTENSIONS.contains(&ext))
                })
                .map(|path| project_relative(layout, &path)),
        );
    }

    hasher.update(b"files\0");
    for file in files {
        hasher.update(file.as_bytes());
        hasher.update(b"\0");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestRuntime;
    use pzlr_config::PzlrConfig;
    use serde_json::json;

    fn fixture() -> (TestRuntime, ProjectLayout) {
        let runtime = TestRuntime::new("/p");
        runtime.add_file("src/components/b-a/index.js", "package('b-a');");
        runtime.add_file("src/components/b-a/b-a.ts", "");
        runtime.add_file(
            "node_modules/core/src/components/i-base/index.js",
            "package('i-base');",
        );

        let config = PzlrConfig::from_value(json!({"dependencies": ["core"]})).unwrap();
        let layout = ProjectLayout::with_layer_configs("/p", &config, vec![None]);
        (runtime, layout)
    }

    #[tokio::test]
    async fn unchanged_sources_hash_identically() {
        let (runtime, layout) = fixture();

        let first = compute_project_hash(&runtime, &layout, None).await.unwrap();
        let second = compute_project_hash(&runtime, &layout, None).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.as_hex().len(), 64);
    }

    #[tokio::test]
    async fn touching_a_dependency_manifest_changes_the_hash() {
        let (runtime, layout) = fixture();
        let before = compute_project_hash(&runtime, &layout, None).await.unwrap();

        runtime.touch("node_modules/core/src/components/i-base/index.js");

        let after = compute_project_hash(&runtime, &layout, None).await.unwrap();
        assert_ne!(before, after);
    }

    #[tokio::test]
    async fn new_project_assets_change_the_hash() {
        let (runtime, layout) = fixture();
        let before = compute_project_hash(&runtime, &layout, None).await.unwrap();

        runtime.add_file("src/components/b-a/b-a.styl", "");

        let after = compute_project_hash(&runtime, &layout, None).await.unwrap();
        assert_ne!(before, after);
    }

    #[tokio::test]
    async fn entries_and_tmp_files_are_ignored() {
        let (runtime, layout) = fixture();
        let before = compute_project_hash(&runtime, &layout, None).await.unwrap();

        runtime.add_file("src/entries/p-index/index.js", "");
        runtime.add_file("src/components/tmp/b-x/index.js", "package('b-x');");

        let after = compute_project_hash(&runtime, &layout, None).await.unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn extra_value_takes_part() {
        let (runtime, layout) = fixture();

        let plain = compute_project_hash(&runtime, &layout, None).await.unwrap();
        let extra = compute_project_hash(&runtime, &layout, Some(&json!({"mode": "prod"})))
            .await
            .unwrap();

        assert_ne!(plain, extra);
    }

    #[tokio::test]
    async fn flattened_manifests_take_part() {
        let (runtime, layout) = fixture();
        runtime.add_file("src/components/base/v-row.index.js", "package('v-row');");
        let before = compute_project_hash(&runtime, &layout, None).await.unwrap();

        runtime.add_file(
            "src/components/base/v-row.index.js",
            "package('v-row').libs('x');",
        );

        let after = compute_project_hash(&runtime, &layout, None).await.unwrap();
        assert_ne!(before, after);
    }

    #[tokio::test]
    async fn flattened_assets_take_part() {
        let (runtime, layout) = fixture();
        runtime.add_file("src/components/base/v-row.index.js", "package('v-row');");
        let before = compute_project_hash(&runtime, &layout, None).await.unwrap();

        runtime.add_file("src/components/base/v-row.styl", "");

        let after = compute_project_hash(&runtime, &layout, None).await.unwrap();
        assert_ne!(before, after);
    }
}
