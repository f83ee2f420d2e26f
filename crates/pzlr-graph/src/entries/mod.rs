//! Bundler entry points and their import graphs.
//!
//! An entry is a `<entries dir>/<name>.js` file made of static
//! `import '<specifier>';` lines. Two kinds of imports exist:
//!
//! - foundation imports (`./p-base` or a path inside a dependency's entries
//!   directory) are other entries; their imports are inlined in place
//! - everything else is a component (when the basename is a block name) or
//!   an opaque module
//!
//! [`BuildConfig`] collects every entry of the project and derives the entry
//! ancestry that [`chunks`] uses to split shared units into common chunks.

pub mod chunks;

pub use chunks::{ChunkUnit, UnionEntryPoints, common_name, get_union_entry_points};

use indexmap::{IndexMap, IndexSet};
use path_clean::PathClean;
use regex::Regex;
use rustc_hash::FxHashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use tokio::sync::OnceCell;

use crate::block::{BlockGraph, BlockMap, RuntimeDependencies, RuntimeUnit};
use crate::block_name::is_block_name;
use crate::error::Result;
use crate::resolve::{MANIFEST_FILE, ProjectLayout, is_node_module};

static IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^import\s+(?:'([^']*)'|"([^"]*)")"#).expect("import regex")
});

/// Specifiers of the top-of-line static imports in `source`, one per line.
pub fn import_specifiers(source: &str) -> Vec<String> {
    source
        .split(['\n', '\r'])
        .filter_map(|line| {
            let captures = IMPORT.captures(line)?;
            captures
                .get(1)
                .or_else(|| captures.get(2))
                .map(|m| m.as_str().to_string())
        })
        .collect()
}

/// Returns true if `url` names another entry rather than a component or
/// module: a `./` import, or a path inside a dependency's entries directory.
pub fn is_foundation_import(layout: &ProjectLayout, url: &str) -> bool {
    if url.starts_with("./") {
        return true;
    }

    is_node_module(url)
        && layout.entry_dependencies().iter().any(|dir| {
            url.strip_prefix(dir.as_str())
                .is_some_and(|rest| rest.is_empty() || rest.starts_with(['/', '\\']))
        })
}

/// Entries `source` is built on top of, in import order.
pub fn get_entry_parents(layout: &ProjectLayout, source: &str) -> IndexSet<String> {
    import_specifiers(source)
        .into_iter()
        .filter(|url| is_foundation_import(layout, url))
        .map(|url| match url.strip_prefix("./") {
            Some(rest) => rest.to_string(),
            None => url,
        })
        .collect()
}

/// File a foundation import refers to: `<url>.js`, or `<url>/index.js` when
/// that does not exist.
fn foundation_file(graph: &BlockGraph, dir: &Path, url: &str) -> PathBuf {
    let base = if is_node_module(url) {
        graph.layout().lib_dir()
    } else {
        dir
    };

    let file = base.join(format!("{url}.js")).clean();
    if graph.resolver().runtime().exists(&file) {
        file
    } else {
        base.join(url).join(MANIFEST_FILE).clean()
    }
}

/// Imports of the entry in `dir` with the given `source`, foundation
/// imports inlined recursively.
///
/// Module specifiers are kept as written; other paths are joined onto the
/// directory of the file that imports them. A foundation file is inlined at
/// most once.
pub async fn get_entry_imports(
    graph: &BlockGraph,
    dir: &Path,
    source: &str,
) -> Result<Vec<String>> {
    struct Frame {
        dir: PathBuf,
        imports: std::vec::IntoIter<String>,
    }

    let runtime = graph.resolver().runtime();
    let layout = graph.layout();

    let mut imports = Vec::new();
    let mut inlined: FxHashSet<PathBuf> = FxHashSet::default();
    let mut stack = vec![Frame {
        dir: dir.to_path_buf(),
        imports: import_specifiers(source).into_iter(),
    }];

    while let Some(frame) = stack.last_mut() {
        let Some(url) = frame.imports.next() else {
            stack.pop();
            continue;
        };
        let dir = frame.dir.clone();

        if !is_foundation_import(layout, &url) {
            if is_node_module(&url) {
                imports.push(url);
            } else {
                imports.push(dir.join(&url).clean().to_string_lossy().into_owned());
            }
            continue;
        }

        let file = foundation_file(graph, &dir, &url);
        if !inlined.insert(file.clone()) {
            continue;
        }

        tracing::trace!(file = %file.display(), "inlining foundation import");
        let source = runtime.read_to_string(&file).await?;
        stack.push(Frame {
            dir: file.parent().map(Path::to_path_buf).unwrap_or_default(),
            imports: import_specifiers(&source).into_iter(),
        });
    }

    Ok(imports)
}

/// Runtime closure of an entry: the closures of every imported component
/// merged, plus every non-component import as an opaque module.
///
/// A unit that is a direct member of any merged closure is never reported
/// as parent-only.
pub async fn get_entry_runtime_dependencies(
    graph: &BlockGraph,
    dir: &Path,
    source: &str,
    cache: Option<&BlockMap>,
) -> Result<RuntimeDependencies> {
    let mut deps = RuntimeDependencies::default();
    let mut direct: FxHashSet<String> = FxHashSet::default();

    for import in get_entry_imports(graph, dir, source).await? {
        let name = Path::new(&import)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or_default();

        if !is_block_name(name) {
            deps.runtime
                .insert(import.clone(), RuntimeUnit::Module(import));
            continue;
        }

        let block = graph.lookup(name, cache).await?;
        let closure = graph.get_runtime_dependencies(&block, cache).await?;

        direct.extend(closure.direct().map(str::to_string));
        deps.runtime.extend(
            closure
                .runtime
                .iter()
                .map(|(name, unit)| (name.clone(), unit.clone())),
        );
        deps.parents.extend(
            closure
                .parents
                .iter()
                .map(|(name, block)| (name.clone(), block.clone())),
        );
        deps.parents.retain(|name, _| !direct.contains(name));
        deps.libs.extend(closure.libs.iter().cloned());
    }

    Ok(deps)
}

/// One file of the project entries directory.
#[derive(Debug)]
pub struct Entry {
    name: String,
    path: PathBuf,
    graph: Arc<BlockGraph>,
    source: OnceCell<Arc<str>>,
}

impl Entry {
    pub fn new(graph: Arc<BlockGraph>, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            name,
            path,
            graph,
            source: OnceCell::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new(""))
    }

    /// File content, read on first use.
    pub async fn source(&self) -> Result<Arc<str>> {
        let source = self
            .source
            .get_or_try_init(|| async {
                let runtime = self.graph.resolver().runtime();
                Ok::<_, crate::Error>(Arc::from(runtime.read_to_string(&self.path).await?))
            })
            .await?;
        Ok(source.clone())
    }

    pub async fn parents(&self) -> Result<IndexSet<String>> {
        Ok(get_entry_parents(self.graph.layout(), &self.source().await?))
    }

    /// The first entry this one is built on top of.
    pub async fn parent(&self) -> Result<Option<String>> {
        Ok(self.parents().await?.into_iter().next())
    }

    pub async fn imports(&self) -> Result<Vec<String>> {
        get_entry_imports(&self.graph, self.dir(), &self.source().await?).await
    }

    pub async fn runtime_dependencies(
        &self,
        cache: Option<&BlockMap>,
    ) -> Result<RuntimeDependencies> {
        get_entry_runtime_dependencies(&self.graph, self.dir(), &self.source().await?, cache).await
    }
}

/// Entry name to ordered set of entry names.
pub type EntrySets = IndexMap<String, IndexSet<String>>;

/// Every entry of a project plus the relations between them.
#[derive(Debug)]
pub struct BuildConfig {
    graph: Arc<BlockGraph>,
    entries: IndexMap<String, Arc<Entry>>,
    dependencies: OnceCell<Arc<EntrySets>>,
    commons: OnceCell<Arc<EntrySets>>,
}

/// Collect the `*.js` files of the project entries directory, by name.
pub async fn get_build_config(graph: Arc<BlockGraph>) -> Result<BuildConfig> {
    let dir = graph.resolver().entry("");
    let files = graph.resolver().runtime().glob(&dir, "*.js").await?;

    let mut entries: Vec<Arc<Entry>> = files
        .into_iter()
        .map(|path| Arc::new(Entry::new(graph.clone(), path)))
        .collect();
    entries.sort_by(|a, b| a.name.cmp(&b.name));

    tracing::debug!(entries = entries.len(), dir = %dir.display(), "entries collected");
    Ok(BuildConfig::new(
        graph,
        entries.into_iter().map(|e| (e.name.clone(), e)).collect(),
    ))
}

impl BuildConfig {
    pub fn new(graph: Arc<BlockGraph>, entries: IndexMap<String, Arc<Entry>>) -> Self {
        Self {
            graph,
            entries,
            dependencies: OnceCell::new(),
            commons: OnceCell::new(),
        }
    }

    pub fn graph(&self) -> &Arc<BlockGraph> {
        &self.graph
    }

    pub fn entries(&self) -> &IndexMap<String, Arc<Entry>> {
        &self.entries
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Entry>> {
        self.entries.get(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// A build config of the entries matching `predicate`.
    pub fn filter(&self, predicate: impl Fn(&str, &Entry) -> bool) -> BuildConfig {
        let entries = self
            .entries
            .iter()
            .filter(|(name, entry)| predicate(name, entry))
            .map(|(name, entry)| (name.clone(), entry.clone()))
            .collect();
        BuildConfig::new(self.graph.clone(), entries)
    }

    /// Each entry's ancestry: the most distant ancestors first and the entry
    /// itself last.
    ///
    /// Parents that are not entries of this config are listed but not
    /// expanded further.
    pub async fn dependencies(&self) -> Result<Arc<EntrySets>> {
        let deps = self
            .dependencies
            .get_or_try_init(|| async {
                let mut parents: IndexMap<&str, Vec<String>> = IndexMap::new();
                for (name, entry) in &self.entries {
                    parents.insert(name.as_str(), entry.parents().await?.into_iter().collect());
                }

                let sets = self
                    .entries
                    .keys()
                    .map(|name| (name.clone(), ancestry(name, &parents)))
                    .collect();
                Ok::<_, crate::Error>(Arc::new(sets))
            })
            .await?;
        Ok(deps.clone())
    }

    /// Every foundation entry mapped to the entries whose ancestry contains
    /// it. Only first parents are considered foundations.
    pub async fn commons(&self) -> Result<Arc<EntrySets>> {
        let commons = self
            .commons
            .get_or_try_init(|| async {
                let dependencies = self.dependencies().await?;
                let mut commons = EntrySets::new();

                for entry in self.entries.values() {
                    let Some(parent) = entry.parent().await? else {
                        continue;
                    };
                    if commons.contains_key(&parent) {
                        continue;
                    }

                    let users = dependencies
                        .iter()
                        .filter(|(_, line)| line.contains(&parent))
                        .map(|(name, _)| name.clone())
                        .collect();
                    commons.insert(parent, users);
                }

                Ok::<_, crate::Error>(Arc::new(commons))
            })
            .await?;
        Ok(commons.clone())
    }

    pub async fn union_entry_points(&self, cache: Option<&BlockMap>) -> Result<UnionEntryPoints> {
        get_union_entry_points(self, cache).await
    }
}

/// Ancestry of `name`: each parent is placed before everything collected so
/// far, last parent first, so the first parent's line ends up in front.
fn ancestry(name: &str, parents: &IndexMap<&str, Vec<String>>) -> IndexSet<String> {
    fn down(
        name: &str,
        parents: &IndexMap<&str, Vec<String>>,
        path: &mut Vec<String>,
        mut set: Vec<String>,
    ) -> Vec<String> {
        if path.iter().any(|n| n == name) {
            return set;
        }

        set.retain(|n| n != name);
        set.insert(0, name.to_string());

        path.push(name.to_string());
        if let Some(direct) = parents.get(name) {
            for parent in direct.iter().rev() {
                set = down(parent, parents, path, set);
            }
        }
        path.pop();
        set
    }

    down(name, parents, &mut Vec::new(), Vec::new())
        .into_iter()
        .collect()
}
