//! Persisted, hash-guarded snapshot of the resolved block graph.
//!
//! A lock file stores every block of a full [`BlockGraph::get_all`] pass
//! together with the [`ProjectHash`] of the sources it was computed from:
//!
//! ```json
//! {"hash": "…", "data": {"%data": "%data:Map", "%data:Map": [["b-a", {…}]]}}
//! ```
//!
//! Paths inside block records are stored relative to the lock file's
//! directory, so a lock stays valid when the project is moved. Library and
//! dependency names are stored verbatim.

pub mod codec;
pub mod hash;

pub use codec::{MapEnvelope, SetEnvelope};
pub use hash::{ProjectHash, compute_project_hash};

use path_clean::PathClean;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crate::block::{Block, BlockGraph, BlockMap, ViewMemo};
use crate::declaration::Declaration;
use crate::error::Result;
use crate::runtime::{Runtime, RuntimeError};

/// File name of the lock, after the configured prefix.
pub const LOCK_FILE_NAME: &str = "components-lock.json";

/// Location of the lock file of the project at `cwd`.
pub fn lock_path(cwd: &Path, prefix: &str) -> PathBuf {
    cwd.join(format!("{prefix}{LOCK_FILE_NAME}"))
}

/// Reasons a lock file cannot be used. Never escapes this module: an
/// unusable lock is an absent lock.
#[derive(Debug, thiserror::Error)]
enum LockError {
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("malformed lock file: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("record \"{key}\" holds block \"{name}\"")]
    MismatchedRecord { key: String, name: String },
}

/// A loaded lock file.
#[derive(Debug, Clone)]
pub struct Lock {
    pub hash: ProjectHash,
    pub blocks: BlockMap,
}

#[derive(Debug, Serialize, Deserialize)]
struct LockFile {
    hash: String,
    data: MapEnvelope<LockedBlock>,
}

/// On-disk form of a [`Block`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LockedBlock {
    declaration: Declaration,
    manifest: String,
    dir: String,
    layer: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    logic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tpl: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    etpl: Option<String>,
    #[serde(default)]
    styles: SetEnvelope<String>,
}

impl LockedBlock {
    fn from_block(block: &Block, base: &Path) -> Self {
        let relative = |path: &Path| relative_path(base, path);
        Self {
            declaration: block.declaration.clone(),
            manifest: relative(&block.manifest),
            dir: relative(&block.dir),
            layer: block.layer,
            logic: block.logic.as_deref().map(relative),
            tpl: block.tpl.as_deref().map(relative),
            etpl: block.etpl.as_deref().map(relative),
            styles: SetEnvelope(block.styles.iter().map(|p| relative(p.as_path())).collect()),
        }
    }

    fn into_block(self, base: &Path) -> Block {
        let absolute = |path: String| base.join(path).clean();
        Block {
            declaration: self.declaration,
            manifest: absolute(self.manifest),
            dir: absolute(self.dir),
            layer: self.layer,
            logic: self.logic.map(absolute),
            tpl: self.tpl.map(absolute),
            etpl: self.etpl.map(absolute),
            styles: self.styles.0.into_iter().map(absolute).collect(),
            views: ViewMemo::default(),
        }
    }
}

/// `path` relative to `base`, with `/` separators. Paths outside `base` climb
/// with `..`; paths on another root are kept absolute.
fn relative_path(base: &Path, path: &Path) -> String {
    let base: Vec<Component<'_>> = base.components().collect();
    let target: Vec<Component<'_>> = path.components().collect();

    let shared = base
        .iter()
        .zip(&target)
        .take_while(|(a, b)| a == b)
        .count();

    let rooted = |c: &Component<'_>| matches!(c, Component::Prefix(_) | Component::RootDir);
    if shared == 0 && target.first().is_some_and(rooted) {
        return path.to_string_lossy().replace('\\', "/");
    }

    let mut parts: Vec<String> = vec!["..".to_string(); base.len() - shared];
    parts.extend(
        target[shared..]
            .iter()
            .map(|c| c.as_os_str().to_string_lossy().into_owned()),
    );
    parts.join("/")
}

fn lock_dir(path: &Path) -> &Path {
    path.parent().unwrap_or_else(|| Path::new(""))
}

async fn read_lock(runtime: &dyn Runtime, path: &Path) -> std::result::Result<Lock, LockError> {
    let text = runtime.read_to_string(path).await?;
    let file: LockFile = serde_json::from_str(&text)?;
    let base = lock_dir(path);

    let mut blocks = BlockMap::new();
    for (key, record) in file.data.0 {
        let block = record.into_block(base);
        if block.name() != key {
            return Err(LockError::MismatchedRecord {
                key,
                name: block.name().to_string(),
            });
        }
        blocks.insert(Arc::new(block));
    }

    Ok(Lock {
        hash: ProjectHash::from_hex(file.hash),
        blocks,
    })
}

/// Read the lock file at `path`.
///
/// A missing, unreadable or malformed lock is reported as `None`.
pub async fn load_lock(runtime: &dyn Runtime, path: &Path) -> Option<Lock> {
    if !runtime.exists(path) {
        tracing::debug!(path = %path.display(), "no graph lock");
        return None;
    }

    match read_lock(runtime, path).await {
        Ok(lock) => Some(lock),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unusable graph lock");
            None
        }
    }
}

/// Write `blocks` and their `hash` to `path`.
///
/// The lock is written to a temporary sibling first and then renamed over
/// `path`, so readers never observe a partially written file.
pub async fn save_lock(
    runtime: &dyn Runtime,
    path: &Path,
    hash: &ProjectHash,
    blocks: &BlockMap,
) -> Result<()> {
    let base = lock_dir(path);
    let file = LockFile {
        hash: hash.as_hex().to_string(),
        data: MapEnvelope(
            blocks
                .iter()
                .map(|(name, block)| (name.to_string(), LockedBlock::from_block(block, base)))
                .collect(),
        ),
    };

    let bytes = serde_json::to_vec_pretty(&file)?;

    runtime.create_dir_all(base).await?;
    let temp_path = path.with_extension("tmp");
    runtime.write_file(&temp_path, &bytes).await?;
    runtime.rename(&temp_path, path).await?;

    tracing::debug!(path = %path.display(), blocks = blocks.len(), "graph lock written");
    Ok(())
}

/// [`BlockGraph::get_all`] behind the project's lock file.
#[derive(Debug)]
pub struct GraphCache {
    graph: Arc<BlockGraph>,
    path: PathBuf,
    extra: Option<serde_json::Value>,
}

impl GraphCache {
    pub fn new(graph: Arc<BlockGraph>) -> Self {
        let layout = graph.layout();
        let path = lock_path(layout.cwd(), &layout.config().lock_prefix);
        Self {
            graph,
            path,
            extra: None,
        }
    }

    /// Include `extra` in the project hash, e.g. build flags that change
    /// which graph is valid.
    pub fn with_extra(mut self, extra: serde_json::Value) -> Self {
        self.extra = Some(extra);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn graph(&self) -> &Arc<BlockGraph> {
        &self.graph
    }

    pub async fn hash(&self) -> Result<ProjectHash> {
        compute_project_hash(self.runtime(), self.graph.layout(), self.extra.as_ref()).await
    }

    fn runtime(&self) -> &dyn Runtime {
        self.graph.resolver().runtime().as_ref()
    }

    /// Every block of the project.
    ///
    /// Returns the locked graph when its hash matches the current sources;
    /// otherwise resolves every block and writes a new lock once resolution
    /// has fully succeeded.
    pub async fn get_all(&self) -> Result<BlockMap> {
        let hash = self.hash().await?;

        match load_lock(self.runtime(), &self.path).await {
            Some(lock) if lock.hash == hash => {
                tracing::info!(blocks = lock.blocks.len(), "graph lock is up to date");
                return Ok(lock.blocks);
            }
            Some(_) => tracing::info!("graph lock is stale, resolving blocks"),
            None => tracing::info!("resolving blocks"),
        }

        let blocks = self.graph.get_all(None).await?;
        save_lock(self.runtime(), &self.path, &hash, &blocks).await?;
        Ok(blocks)
    }
}
