//! Block loading and dependency graph queries.
//!
//! [`BlockGraph`] turns names into [`Block`]s through the [`Resolver`],
//! folding mixin chains on load, and answers per-block questions: parent,
//! full dependency list, libraries and the runtime closure. Every query
//! accepts an optional [`BlockMap`] to look blocks up in before touching the
//! filesystem.

use dashmap::DashMap;
use futures::future::try_join_all;
use futures::{StreamExt, TryStreamExt};
use indexmap::{IndexMap, IndexSet};
use std::collections::BTreeSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{Block, BlockMap, FileCache, RuntimeDependencies, RuntimeUnit, ViewMemo, views_of};
use crate::block_name::is_block_name;
use crate::declaration::{Declaration, DeclarationParser};
use crate::error::{Error, Result};
use crate::resolve::{LayerHint, MANIFEST_FILE, ProjectLayout, Resolver, manifest_patterns};
use crate::runtime::Runtime;

/// Options of [`BlockGraph::get_dependencies`] and [`BlockGraph::get_libs`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DependencyOptions<'a> {
    /// Only the block's own declaration, ignoring its parent chain.
    pub only_own: bool,
    /// Blocks to use instead of resolving names from the filesystem.
    pub cache: Option<&'a BlockMap>,
}

/// Folded declaration of a manifest plus the files it was built from.
#[derive(Debug, Clone)]
struct CachedDeclaration {
    fingerprint: Vec<(PathBuf, Option<u64>)>,
    declaration: Declaration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visit {
    ParentOnly,
    Direct,
}

/// Loads blocks and computes their dependency graphs.
#[derive(Debug)]
pub struct BlockGraph {
    resolver: Resolver,
    files: FileCache,
    parser: DeclarationParser,
    declarations: DashMap<PathBuf, CachedDeclaration>,
    parallel_jobs: Option<usize>,
}

impl BlockGraph {
    pub fn new(resolver: Resolver) -> Self {
        let parallel_jobs = resolver.layout().config().settings.parallel_jobs;
        Self {
            resolver,
            files: FileCache::new(),
            parser: DeclarationParser::new(),
            declarations: DashMap::new(),
            parallel_jobs,
        }
    }

    /// Limit the number of blocks loaded concurrently; `None` is unbounded.
    pub fn with_parallel_jobs(mut self, jobs: Option<usize>) -> Self {
        self.parallel_jobs = jobs.filter(|&n| n > 0);
        self
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub fn layout(&self) -> &ProjectLayout {
        self.resolver.layout()
    }

    fn runtime(&self) -> &dyn Runtime {
        self.resolver.runtime().as_ref()
    }

    /// Drop every in-process cache.
    pub fn clear_cache(&self) {
        self.files.clear();
        self.declarations.clear();
        self.resolver.clear_cache();
    }

    /// Load the block `name` resolves to.
    pub async fn get(&self, name: &str) -> Result<Arc<Block>> {
        let name = normalize(name);
        let location = self
            .resolver
            .resolve_manifest(name, LayerHint::All)
            .await?
            .ok_or_else(|| Error::not_found(name))?;

        self.load(location.path, location.layer.unwrap_or(0)).await
    }

    /// Load the named blocks, or every block of every layer when `names` is
    /// `None`.
    ///
    /// Discovery keeps the first block of each name in layer order, so a
    /// project component shadows a same-named component of a dependency.
    pub async fn get_all(&self, names: Option<&[String]>) -> Result<BlockMap> {
        let blocks = match names {
            Some(names) => self.join(names.iter().map(|name| self.get(name))).await?,
            None => {
                let manifests = self.discover().await?;
                self.join(
                    manifests
                        .into_iter()
                        .map(|(manifest, layer)| self.load(manifest, layer)),
                )
                .await?
            }
        };

        let map: BlockMap = blocks.into_iter().collect();
        tracing::info!(blocks = map.len(), "blocks loaded");
        Ok(map)
    }

    async fn join<F>(&self, futures: impl Iterator<Item = F>) -> Result<Vec<Arc<Block>>>
    where
        F: Future<Output = Result<Arc<Block>>>,
    {
        match self.parallel_jobs {
            None => try_join_all(futures).await,
            Some(jobs) => {
                futures::stream::iter(futures)
                    .buffered(jobs)
                    .try_collect()
                    .await
            }
        }
    }

    /// Manifests of every component in every layer, first occurrence of each
    /// name wins.
    async fn discover(&self) -> Result<Vec<(PathBuf, usize)>> {
        let patterns = manifest_patterns();

        let layout = self.layout();
        let mut found: IndexMap<String, (PathBuf, usize)> = IndexMap::new();

        for layer in layout.layers() {
            for pattern in &patterns {
                let manifests = self.runtime().glob(&layer.search_root, pattern).await?;

                for manifest in manifests {
                    if layout.is_ignored(&manifest) {
                        continue;
                    }

                    let Some(name) = manifest_block_name(&manifest) else {
                        continue;
                    };

                    if !is_block_name(&name) {
                        tracing::warn!(
                            path = %manifest.display(),
                            "skipping component with an invalid name"
                        );
                        continue;
                    }

                    found.entry(name).or_insert((manifest, layer.index));
                }
            }
        }

        tracing::debug!(components = found.len(), "components discovered");
        Ok(found.into_values().collect())
    }

    /// Build the block whose manifest is `manifest`, found in `layer`.
    async fn load(&self, manifest: PathBuf, layer: usize) -> Result<Arc<Block>> {
        let declaration = self.declaration(&manifest, layer).await?;
        let name = declaration.name().to_string();

        let dir = manifest
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| manifest.clone());

        let logic = self.asset(&format!("{name}.logic")).await?;
        let tpl = self.asset(&format!("{name}.ss")).await?;
        let etpl = self.asset(&format!("{name}.ess")).await?;

        let mut styles: BTreeSet<PathBuf> = BTreeSet::new();
        if let Some(main) = self.asset(&format!("{name}.styl")).await? {
            styles.insert(main);
        }
        let styles_excluded = self
            .layout()
            .layer(layer)
            .is_some_and(|l| l.excludes(".styl"));
        if !styles_excluded {
            styles.extend(self.runtime().glob(&dir, &format!("{name}_*.styl")).await?);
        }

        Ok(Arc::new(Block {
            declaration,
            manifest,
            dir,
            layer,
            logic,
            tpl,
            etpl,
            styles: styles.into_iter().collect(),
            views: ViewMemo::default(),
        }))
    }

    async fn asset(&self, name: &str) -> Result<Option<PathBuf>> {
        Ok(self
            .resolver
            .find(name, LayerHint::All)
            .await?
            .map(|location| location.path))
    }

    async fn read_declaration(&self, manifest: &Path) -> Result<(Declaration, Option<u64>)> {
        let snapshot = self.files.read(self.runtime(), manifest).await?;
        let declaration = self
            .parser
            .parse(&snapshot.content)
            .map_err(|source| Error::Declaration {
                path: manifest.to_path_buf(),
                source,
            })?;
        Ok((declaration, snapshot.modified))
    }

    async fn is_fresh(&self, fingerprint: &[(PathBuf, Option<u64>)]) -> bool {
        for (path, modified) in fingerprint {
            if modified.is_none() {
                return false;
            }
            match self.runtime().metadata(path).await {
                Ok(meta) if meta.modified == *modified => {}
                _ => return false,
            }
        }
        true
    }

    /// The declaration of `manifest` with its mixin chain folded in.
    ///
    /// A mixin absorbs the same-named declaration of each following layer
    /// until a non-mixin declaration is absorbed or no further layer defines
    /// the name. Every step starts past the previous match, so the walk
    /// visits each layer at most once.
    async fn declaration(&self, manifest: &Path, layer: usize) -> Result<Declaration> {
        let cached = self.declarations.get(manifest).map(|entry| entry.clone());
        if let Some(cached) = cached {
            if self.is_fresh(&cached.fingerprint).await {
                return Ok(cached.declaration);
            }
        }

        let (mut declaration, modified) = self.read_declaration(manifest).await?;
        let mut fingerprint = vec![(manifest.to_path_buf(), modified)];

        let mut next = layer + 1;
        let mut is_mixin = declaration.is_mixin();
        for _ in 0..self.layout().layers().len() {
            if !is_mixin {
                break;
            }

            let Some(location) = self
                .resolver
                .resolve_manifest(declaration.name(), LayerHint::Skip(next))
                .await?
            else {
                break;
            };

            let (ancestor, modified) = self.read_declaration(&location.path).await?;
            tracing::debug!(
                name = declaration.name(),
                layer = location.layer,
                "folding mixin ancestor"
            );

            declaration.absorb(&ancestor);
            fingerprint.push((location.path.clone(), modified));
            is_mixin = ancestor.is_mixin();
            next = location.from_layer().unwrap_or(usize::MAX);
        }

        self.declarations.insert(
            manifest.to_path_buf(),
            CachedDeclaration {
                fingerprint,
                declaration: declaration.clone(),
            },
        );

        Ok(declaration)
    }

    /// Block named `name`, taken from `cache` when present there.
    pub(crate) async fn lookup(
        &self,
        name: &str,
        cache: Option<&BlockMap>,
    ) -> Result<Arc<Block>> {
        if let Some(block) = cache.and_then(|map| map.get(normalize(name))) {
            return Ok(block.clone());
        }
        self.get(name).await
    }

    pub async fn get_parent(
        &self,
        block: &Block,
        cache: Option<&BlockMap>,
    ) -> Result<Option<Arc<Block>>> {
        match block.parent() {
            Some(parent) => Ok(Some(self.lookup(parent, cache).await?)),
            None => Ok(None),
        }
    }

    /// Ancestors of `block`, nearest first.
    async fn ancestors(&self, block: &Block, cache: Option<&BlockMap>) -> Result<Vec<Arc<Block>>> {
        let mut chain = vec![block.name().to_string()];
        let mut ancestors: Vec<Arc<Block>> = Vec::new();

        let mut parent = self.get_parent(block, cache).await?;
        while let Some(current) = parent {
            if chain.iter().any(|name| name == current.name()) {
                chain.push(current.name().to_string());
                return Err(Error::ParentCycle { chain });
            }
            chain.push(current.name().to_string());
            parent = self.get_parent(&current, cache).await?;
            ancestors.push(current);
        }

        Ok(ancestors)
    }

    /// Dependency names of `block`; with the parent chain, the most distant
    /// ancestor's come first. Duplicates keep their first position.
    pub async fn dependency_names(
        &self,
        block: &Block,
        options: DependencyOptions<'_>,
    ) -> Result<Arc<Vec<String>>> {
        if options.only_own {
            let own: IndexSet<&String> = block.dependencies().iter().collect();
            return Ok(Arc::new(own.into_iter().cloned().collect()));
        }

        let views = views_of(options.cache, block);
        if let Some(hit) = views.and_then(|v| v.dependencies.get(block.name())) {
            return Ok(hit.clone());
        }

        let ancestors = self.ancestors(block, options.cache).await?;
        let names: IndexSet<String> = ancestors
            .iter()
            .rev()
            .flat_map(|ancestor| ancestor.dependencies().iter().cloned())
            .chain(block.dependencies().iter().cloned())
            .collect();
        let names = Arc::new(names.into_iter().collect::<Vec<_>>());

        if let Some(views) = views {
            views
                .dependencies
                .insert(block.name().to_string(), names.clone());
        }

        Ok(names)
    }

    /// Dependencies of `block` resolved to blocks.
    pub async fn get_dependencies(
        &self,
        block: &Block,
        options: DependencyOptions<'_>,
    ) -> Result<BlockMap> {
        let names = self.dependency_names(block, options).await?;
        let blocks = self
            .join(names.iter().map(|name| self.lookup(name, options.cache)))
            .await?;
        Ok(blocks.into_iter().collect())
    }

    /// Libraries of `block`, ancestors' first unless `only_own` is set.
    pub async fn get_libs(
        &self,
        block: &Block,
        options: DependencyOptions<'_>,
    ) -> Result<Arc<IndexSet<String>>> {
        if options.only_own {
            return Ok(Arc::new(block.libs().iter().cloned().collect()));
        }

        let views = views_of(options.cache, block);
        if let Some(hit) = views.and_then(|v| v.libs.get(block.name())) {
            return Ok(hit.clone());
        }

        let ancestors = self.ancestors(block, options.cache).await?;
        let libs: Arc<IndexSet<String>> = Arc::new(
            ancestors
                .iter()
                .rev()
                .flat_map(|ancestor| ancestor.libs().iter().cloned())
                .chain(block.libs().iter().cloned())
                .collect(),
        );

        if let Some(views) = views {
            views.libs.insert(block.name().to_string(), libs.clone());
        }

        Ok(libs)
    }

    /// Everything needed to run `block`.
    ///
    /// The closure is collected depth first. Dependencies are direct edges;
    /// a parent reached only through parent edges is recorded in `parents`
    /// until some direct edge to it is found, at which point it is promoted.
    /// A name that resolves to no block aborts the whole computation.
    pub async fn get_runtime_dependencies(
        &self,
        block: &Arc<Block>,
        cache: Option<&BlockMap>,
    ) -> Result<Arc<RuntimeDependencies>> {
        let views = views_of(cache, block);
        if let Some(hit) = views.and_then(|v| v.runtime.get(block.name())) {
            return Ok(hit.clone());
        }

        let mut visits: IndexMap<String, (Arc<Block>, Visit)> = IndexMap::new();
        let mut libs = IndexSet::new();

        enum Step {
            Resolved(Arc<Block>, Visit),
            Named(String, Visit),
        }

        let mut stack = vec![Step::Resolved(block.clone(), Visit::Direct)];
        while let Some(step) = stack.pop() {
            let (current, visit) = match step {
                Step::Resolved(block, visit) => (block, visit),
                Step::Named(name, visit) => (self.lookup(&name, cache).await?, visit),
            };

            if let Some((_, state)) = visits.get_mut(current.name()) {
                if visit == Visit::Direct {
                    *state = Visit::Direct;
                }
                continue;
            }

            libs.extend(current.libs().iter().cloned());

            if let Some(parent) = current.parent() {
                stack.push(Step::Named(parent.to_string(), Visit::ParentOnly));
            }
            for dependency in current.dependencies().iter().rev() {
                stack.push(Step::Named(dependency.clone(), Visit::Direct));
            }

            visits.insert(current.name().to_string(), (current, visit));
        }

        let mut result = RuntimeDependencies {
            libs,
            ..Default::default()
        };
        for (name, (block, visit)) in visits {
            if visit == Visit::ParentOnly {
                result.parents.insert(name.clone(), block.clone());
            }
            result.runtime.insert(name, RuntimeUnit::Block(block));
        }

        let result = Arc::new(result);
        if let Some(views) = views {
            views
                .runtime
                .insert(block.name().to_string(), result.clone());
        }

        Ok(result)
    }
}

/// `@b-foo` refers to `b-foo`.
fn normalize(name: &str) -> &str {
    match name.strip_prefix('@') {
        Some(rest) if is_block_name(rest) => rest,
        _ => name,
    }
}

/// Component name implied by a manifest path: the folder of an `index.js`,
/// or the stem of a `<name>.index.js`.
fn manifest_block_name(manifest: &Path) -> Option<String> {
    let file = manifest.file_name()?.to_str()?;
    if file == MANIFEST_FILE {
        return Some(manifest.parent()?.file_name()?.to_str()?.to_string());
    }
    file.strip_suffix(&format!(".{MANIFEST_FILE}"))
        .map(str::to_string)
}
