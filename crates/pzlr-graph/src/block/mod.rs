//! Resolved components and their dependency views.

pub mod files;
pub mod graph;

pub use files::{FileCache, FileSnapshot};
pub use graph::{BlockGraph, DependencyOptions};

use dashmap::DashMap;
use indexmap::{IndexMap, IndexSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::block_name::BlockType;
use crate::declaration::Declaration;

/// A component: its (mixin-folded) declaration plus the files it owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub(crate) declaration: Declaration,
    pub(crate) manifest: PathBuf,
    pub(crate) dir: PathBuf,
    pub(crate) layer: usize,
    pub(crate) logic: Option<PathBuf>,
    pub(crate) tpl: Option<PathBuf>,
    pub(crate) etpl: Option<PathBuf>,
    pub(crate) styles: Vec<PathBuf>,
    pub(crate) views: ViewMemo,
}

impl Block {
    pub fn name(&self) -> &str {
        self.declaration.name()
    }

    pub fn block_type(&self) -> BlockType {
        self.declaration.block_type()
    }

    pub fn parent(&self) -> Option<&str> {
        self.declaration.parent()
    }

    pub fn is_mixin(&self) -> bool {
        self.declaration.is_mixin()
    }

    pub fn dependencies(&self) -> &[String] {
        self.declaration.dependencies()
    }

    pub fn libs(&self) -> &[String] {
        self.declaration.libs()
    }

    pub fn declaration(&self) -> &Declaration {
        &self.declaration
    }

    /// The `index.js` (or `<name>.index.js`) file the declaration was read from.
    pub fn manifest(&self) -> &Path {
        &self.manifest
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Index of the layer the manifest was found in.
    pub fn layer(&self) -> usize {
        self.layer
    }

    pub fn logic(&self) -> Option<&Path> {
        self.logic.as_deref()
    }

    pub fn tpl(&self) -> Option<&Path> {
        self.tpl.as_deref()
    }

    pub fn etpl(&self) -> Option<&Path> {
        self.etpl.as_deref()
    }

    pub fn styles(&self) -> &[PathBuf] {
        &self.styles
    }
}

/// Derived views computed against one [`BlockMap`].
#[derive(Debug, Default)]
pub(crate) struct Views {
    pub(crate) dependencies: DashMap<String, Arc<Vec<String>>>,
    pub(crate) libs: DashMap<String, Arc<IndexSet<String>>>,
    pub(crate) runtime: DashMap<String, Arc<RuntimeDependencies>>,
}

/// Views of a block resolved against the filesystem, owned by the block
/// instance. Not part of equality.
#[derive(Debug, Clone, Default)]
pub(crate) struct ViewMemo(Arc<Views>);

impl PartialEq for ViewMemo {
    fn eq(&self, _: &Self) -> bool {
        true
    }
}

impl Eq for ViewMemo {}

/// Memo table for the views of `block`.
///
/// Against a map, the map owns the memo and only its stored instances have
/// one. Without a map, each block instance owns its own.
pub(crate) fn views_of<'a>(cache: Option<&'a BlockMap>, block: &'a Block) -> Option<&'a Views> {
    match cache {
        Some(map) => map.views_for(block),
        None => Some(block.views.0.as_ref()),
    }
}

/// Name-keyed set of blocks.
///
/// Views derived from the blocks of a map (full dependency lists, library
/// sets, runtime closures) are memoized per map and discarded on mutation.
#[derive(Debug, Clone, Default)]
pub struct BlockMap {
    blocks: IndexMap<String, Arc<Block>>,
    views: Arc<Views>,
}

impl BlockMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a block under its name. An existing block of the same name is
    /// kept and `false` is returned.
    pub fn insert(&mut self, block: Arc<Block>) -> bool {
        if self.blocks.contains_key(block.name()) {
            return false;
        }
        self.views = Arc::default();
        self.blocks.insert(block.name().to_string(), block);
        true
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Block>> {
        self.blocks.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.blocks.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.blocks.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<Block>)> {
        self.blocks.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn values(&self) -> impl Iterator<Item = &Arc<Block>> {
        self.blocks.values()
    }

    /// Memo table for `block`, if `block` is the instance stored in this map.
    pub(crate) fn views_for(&self, block: &Block) -> Option<&Views> {
        self.blocks
            .get(block.name())
            .filter(|stored| std::ptr::eq(stored.as_ref(), block))
            .map(|_| self.views.as_ref())
    }
}

impl FromIterator<Arc<Block>> for BlockMap {
    fn from_iter<I: IntoIterator<Item = Arc<Block>>>(iter: I) -> Self {
        let mut map = BlockMap::new();
        for block in iter {
            map.insert(block);
        }
        map
    }
}

impl<'a> IntoIterator for &'a BlockMap {
    type Item = (&'a String, &'a Arc<Block>);
    type IntoIter = indexmap::map::Iter<'a, String, Arc<Block>>;

    fn into_iter(self) -> Self::IntoIter {
        self.blocks.iter()
    }
}

/// Member of a runtime closure: a block, or an opaque module specifier
/// imported by an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeUnit {
    Block(Arc<Block>),
    Module(String),
}

impl RuntimeUnit {
    pub fn as_block(&self) -> Option<&Arc<Block>> {
        match self {
            RuntimeUnit::Block(block) => Some(block),
            RuntimeUnit::Module(_) => None,
        }
    }
}

/// Everything needed to run a block or an entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeDependencies {
    /// Transitive closure, in discovery order, including the root itself.
    pub runtime: IndexMap<String, RuntimeUnit>,
    /// Members of `runtime` present only as ancestors of other members.
    pub parents: IndexMap<String, Arc<Block>>,
    /// Libraries of every member.
    pub libs: IndexSet<String>,
}

impl RuntimeDependencies {
    /// Names in `runtime` reached through at least one dependency edge.
    pub fn direct(&self) -> impl Iterator<Item = &str> {
        self.runtime
            .keys()
            .filter(|name| !self.parents.contains_key(*name))
            .map(String::as_str)
    }

    pub fn is_parent_only(&self, name: &str) -> bool {
        self.parents.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(name: &str) -> Arc<Block> {
        Arc::new(Block {
            declaration: Declaration::parse(&format!("package('{name}')")).unwrap(),
            manifest: PathBuf::from(format!("/p/{name}/index.js")),
            dir: PathBuf::from(format!("/p/{name}")),
            layer: 0,
            logic: None,
            tpl: None,
            etpl: None,
            styles: Vec::new(),
            views: ViewMemo::default(),
        })
    }

    #[test]
    fn first_insert_wins() {
        let first = block("b-a");
        let mut map = BlockMap::new();
        assert!(map.insert(first.clone()));
        assert!(!map.insert(block("b-a")));
        assert!(Arc::ptr_eq(map.get("b-a").unwrap(), &first));
    }

    #[test]
    fn views_only_for_stored_instances() {
        let stored = block("b-a");
        let map: BlockMap = [stored.clone()].into_iter().collect();

        assert!(map.views_for(&stored).is_some());
        assert!(map.views_for(&block("b-a")).is_none());
        assert!(map.views_for(&block("b-b")).is_none());
    }

    #[test]
    fn standalone_blocks_own_their_views() {
        let stored = block("b-a");
        let other = block("b-a");

        views_of(None, &stored)
            .unwrap()
            .libs
            .insert("b-a".to_string(), Arc::default());

        assert!(views_of(None, &stored).unwrap().libs.contains_key("b-a"));
        assert!(views_of(None, &other).unwrap().libs.is_empty());
        assert_eq!(stored, other);

        let map: BlockMap = [stored.clone()].into_iter().collect();
        assert!(views_of(Some(&map), &stored).unwrap().libs.is_empty());
        assert!(views_of(Some(&map), &other).is_none());
    }

    #[test]
    fn insert_discards_views() {
        let stored = block("b-a");
        let mut map: BlockMap = [stored.clone()].into_iter().collect();
        map.views_for(&stored)
            .unwrap()
            .libs
            .insert("b-a".to_string(), Arc::default());

        map.insert(block("b-b"));

        assert!(map.views_for(&stored).unwrap().libs.is_empty());
    }

    #[test]
    fn direct_excludes_parent_only_units() {
        let mut deps = RuntimeDependencies::default();
        let a = block("b-a");
        let base = block("i-base");
        deps.runtime
            .insert("b-a".to_string(), RuntimeUnit::Block(a));
        deps.runtime
            .insert("i-base".to_string(), RuntimeUnit::Block(base.clone()));
        deps.runtime
            .insert("lodash".to_string(), RuntimeUnit::Module("lodash".to_string()));
        deps.parents.insert("i-base".to_string(), base);

        assert_eq!(deps.direct().collect::<Vec<_>>(), ["b-a", "lodash"]);
        assert!(deps.is_parent_only("i-base"));
    }
}
