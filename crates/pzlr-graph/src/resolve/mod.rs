//! Layered block resolution.
//!
//! A name is looked up layer by layer, highest priority first. Within a layer
//! an exact path is tried before a recursive glob, so a component may sit at
//! any depth below the layer root (`components/form/b-input/index.js`) or use
//! the flattened `b-input.index.js` manifest form.

pub mod layout;

pub use layout::{Layer, NODE_MODULES, ProjectLayout};

use dashmap::DashMap;
use path_clean::PathClean;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::runtime::Runtime;

/// Logical extension that maps onto a layer's source language.
pub const LOGIC_EXTENSION: &str = ".logic";

/// Manifest file name of a component folder.
pub const MANIFEST_FILE: &str = "index.js";

/// Glob patterns matching every component manifest: `b-foo/index.js` and the
/// flattened `b-foo.index.js`.
pub(crate) fn manifest_patterns() -> [String; 2] {
    let types = crate::block_name::type_code_class();
    [
        format!("**/{types}-*/{MANIFEST_FILE}"),
        format!("**/{types}-*.{MANIFEST_FILE}"),
    ]
}

/// Where the search for a name starts.
#[derive(Debug, Clone, Copy, Default)]
pub enum LayerHint<'a> {
    /// Search every layer.
    #[default]
    All,
    /// Start at the given layer index; the returned location reports the
    /// matching layer so override chains can keep walking.
    Skip(usize),
    /// The file performing the lookup. Required for `@super/` references,
    /// which search the layers below the one containing this file.
    Context(&'a Path),
}

/// A resolved name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    /// Block directory for bare names, file path for extension-qualified names.
    pub path: PathBuf,
    /// Index of the layer that satisfied the lookup, `None` for a
    /// synthesized path.
    pub layer: Option<usize>,
    /// True if nothing exists on disk and `path` is a best guess.
    pub synthesized: bool,
}

impl Location {
    /// Layer to continue from when walking an override chain.
    pub fn from_layer(&self) -> Option<usize> {
        self.layer.map(|l| l + 1)
    }
}

/// A file found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Hit {
    /// Manifest file for bare names, the file itself otherwise.
    file: PathBuf,
    /// Directory the component lives in (bare names only).
    dir: Option<PathBuf>,
    layer: usize,
}

#[derive(Debug, Clone)]
struct CachedLookup {
    at: Instant,
    hit: Option<Hit>,
}

/// Resolves block names against the ranked layers of a [`ProjectLayout`].
#[derive(Debug, Clone)]
pub struct Resolver {
    runtime: Arc<dyn Runtime>,
    layout: Arc<ProjectLayout>,
    cache: Arc<DashMap<(String, usize, Option<usize>), CachedLookup>>,
    ttl: Duration,
}

fn has_magic(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}

/// Extension of the last path segment, with its leading dot.
fn extension(name: &str) -> Option<&str> {
    let file = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let dot = file.rfind('.').filter(|&i| i > 0)?;
    Some(&file[dot..])
}

impl Resolver {
    pub fn new(runtime: Arc<dyn Runtime>, layout: Arc<ProjectLayout>) -> Self {
        let ttl = Duration::from_millis(layout.config().resolve_cache_ttl_ms);
        Self {
            runtime,
            layout,
            cache: Arc::new(DashMap::new()),
            ttl,
        }
    }

    pub fn layout(&self) -> &Arc<ProjectLayout> {
        &self.layout
    }

    pub fn runtime(&self) -> &Arc<dyn Runtime> {
        &self.runtime
    }

    /// Drop every memoized lookup.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// The project block directory, where unresolved bare names are placed.
    pub fn block_root(&self) -> &Path {
        &self.layout.project().block_dir
    }

    /// Path of an entry file, or the entries directory for an empty name.
    pub fn entry(&self, name: &str) -> PathBuf {
        let dir = &self.layout.project().entries_dir;
        if name.is_empty() {
            dir.clone()
        } else {
            dir.join(format!("{name}.js")).clean()
        }
    }

    /// Resolve `name` to a block directory (bare names) or a file
    /// (extension-qualified names such as `b-foo.styl` or `b-foo.logic`).
    ///
    /// Bare names without a layer skip that exist nowhere resolve to a
    /// synthesized path under the project block directory; everything else
    /// that exists nowhere resolves to `None`.
    pub async fn resolve_block(&self, name: &str, hint: LayerHint<'_>) -> Result<Option<Location>> {
        if name.is_empty() {
            return Ok(Some(Location {
                path: self.block_root().to_path_buf(),
                layer: Some(0),
                synthesized: false,
            }));
        }

        let (name, start, qualified) = self.plan(name, hint)?;
        if let Some(hit) = self.lookup(name, start, qualified).await? {
            let path = hit.dir.unwrap_or(hit.file);
            return Ok(Some(Location {
                path,
                layer: Some(hit.layer),
                synthesized: false,
            }));
        }

        let fallback = extension(name).is_none()
            && qualified.is_none()
            && !matches!(hint, LayerHint::Skip(n) if n > 0);

        if fallback {
            tracing::debug!(name, "block not found, synthesizing path");
            return Ok(Some(Location {
                path: self.block_root().join(name),
                layer: None,
                synthesized: true,
            }));
        }

        Ok(None)
    }

    /// Resolve a bare block name to its manifest file.
    pub async fn resolve_manifest(
        &self,
        name: &str,
        hint: LayerHint<'_>,
    ) -> Result<Option<Location>> {
        let (name, start, qualified) = self.plan(name, hint)?;
        Ok(self
            .lookup(name, start, qualified)
            .await?
            .map(|hit| Location {
                path: hit.file,
                layer: Some(hit.layer),
                synthesized: false,
            }))
    }

    /// Like [`resolve_block`](Self::resolve_block) without the fallback.
    pub async fn find(&self, name: &str, hint: LayerHint<'_>) -> Result<Option<Location>> {
        Ok(self
            .resolve_block(name, hint)
            .await?
            .filter(|location| !location.synthesized))
    }

    /// Strip markers from `name` and pick the first layer to search.
    ///
    /// Returns the name as searched, the start layer, and the layer a
    /// layer-qualified name is bound to.
    fn plan<'n>(
        &self,
        name: &'n str,
        hint: LayerHint<'_>,
    ) -> Result<(&'n str, usize, Option<usize>)> {
        let config = self.layout.config();

        if let Some(stripped) = config.strip_super(name) {
            let LayerHint::Context(context) = hint else {
                return Err(Error::AmbiguousContext {
                    name: name.to_string(),
                });
            };

            let start = self
                .layout
                .layer_by_path(context)
                .map_or(1, |layer| layer.index + 1);

            return Ok((stripped, start, None));
        }

        for layer in self.layout.dependencies() {
            let qualified = name
                .strip_prefix(layer.src.as_str())
                .and_then(|rest| rest.strip_prefix('/'));

            if let Some(rest) = qualified {
                return Ok((rest, layer.index, Some(layer.index)));
            }
        }

        let start = match hint {
            LayerHint::Skip(n) => n,
            LayerHint::All | LayerHint::Context(_) => 0,
        };

        Ok((name, start, None))
    }

    async fn lookup(&self, name: &str, start: usize, only: Option<usize>) -> Result<Option<Hit>> {
        let key = (name.to_string(), start, only);
        if !self.ttl.is_zero() {
            if let Some(cached) = self.cache.get(&key) {
                if cached.at.elapsed() < self.ttl {
                    return Ok(cached.hit.clone());
                }
            }
        }

        let hit = self.search(name, start, only).await?;

        if !self.ttl.is_zero() {
            self.cache.insert(
                key,
                CachedLookup {
                    at: Instant::now(),
                    hit: hit.clone(),
                },
            );
        }

        Ok(hit)
    }

    async fn search(&self, name: &str, start: usize, only: Option<usize>) -> Result<Option<Hit>> {
        let requested = extension(name);
        let layers = self.layout.layers();
        let end = only.map_or(layers.len(), |i| i + 1);

        for layer in layers.iter().take(end).skip(start) {
            if let Some(hit) = self.search_layer(layer, name, requested).await? {
                tracing::debug!(
                    name,
                    layer = layer.index,
                    path = %hit.file.display(),
                    "resolved"
                );
                return Ok(Some(hit));
            }
        }

        Ok(None)
    }

    async fn search_layer(
        &self,
        layer: &Layer,
        name: &str,
        requested: Option<&str>,
    ) -> Result<Option<Hit>> {
        let root = &layer.search_root;

        let Some(ext) = requested else {
            let file = format!("{name}/{MANIFEST_FILE}");

            if !has_magic(&file) {
                let manifest = root.join(&file);
                if self.runtime.exists(&manifest) {
                    return Ok(Some(Hit {
                        dir: Some(root.join(name)),
                        file: manifest,
                        layer: layer.index,
                    }));
                }
            }

            for pattern in [format!("**/{file}"), format!("**/{name}.{MANIFEST_FILE}")] {
                let found = self.runtime.glob(root, &pattern).await?;
                if let Some(manifest) = found.into_iter().next() {
                    return Ok(Some(Hit {
                        dir: manifest.parent().map(Path::to_path_buf),
                        file: manifest,
                        layer: layer.index,
                    }));
                }
            }

            return Ok(None);
        };

        let file = match name.strip_suffix(LOGIC_EXTENSION) {
            Some(stem) => format!("{stem}.{}", layer.project_type.logic_extension()),
            None => name.to_string(),
        };

        let concrete = extension(&file).unwrap_or(ext);
        if layer.excludes(ext) || layer.excludes(concrete) {
            return Ok(None);
        }

        if !has_magic(&file) {
            let path = root.join(&file);
            if self.runtime.exists(&path) {
                return Ok(Some(Hit {
                    file: path,
                    dir: None,
                    layer: layer.index,
                }));
            }
        }

        let found = self.runtime.glob(root, &format!("**/{file}")).await?;
        Ok(found.into_iter().next().map(|file| Hit {
            file,
            dir: None,
            layer: layer.index,
        }))
    }
}

/// Returns true if `url` names a package rather than a path.
pub fn is_node_module(url: &str) -> bool {
    !url.is_empty() && !Path::new(url).is_absolute() && !url.starts_with(['.', '/', '\\'])
}
