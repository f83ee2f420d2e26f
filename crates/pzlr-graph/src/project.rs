//! One-stop handle on a project: configuration, layout, resolver and graph.

use pzlr_config::{ConfigDiscovery, PzlrConfig};
use std::path::PathBuf;
use std::sync::Arc;

use crate::block::{Block, BlockGraph, BlockMap};
use crate::entries::{BuildConfig, UnionEntryPoints, get_build_config};
use crate::error::Result;
use crate::lock::GraphCache;
use crate::resolve::{LayerHint, Location, ProjectLayout, Resolver};
use crate::runtime::Runtime;
use crate::runtime::native::NativeRuntime;

/// A project rooted at a directory with a `.pzlrrc`.
///
/// ```rust,no_run
/// use pzlr_graph::Project;
///
/// # #[tokio::main]
/// # async fn main() -> pzlr_graph::Result<()> {
/// let project = Project::open(".")?;
/// let blocks = project.graph_cache().get_all().await?;
/// for (name, block) in &blocks {
///     println!("{name}: {}", block.dir().display());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Project {
    graph: Arc<BlockGraph>,
}

impl Project {
    /// Open the project at `cwd` on the native filesystem, loading its
    /// `.pzlrrc` with environment overrides.
    pub fn open(cwd: impl Into<PathBuf>) -> Result<Self> {
        let cwd = cwd.into();
        let config = ConfigDiscovery::new(&cwd).load()?;
        let layout = ProjectLayout::from_config(cwd, &config)?;
        Ok(Self::from_layout(Arc::new(NativeRuntime::new()), layout))
    }

    /// Open a project through `runtime` with an already loaded configuration.
    pub async fn load(
        runtime: Arc<dyn Runtime>,
        cwd: impl Into<PathBuf>,
        config: &PzlrConfig,
    ) -> Result<Self> {
        let layout = ProjectLayout::load(runtime.as_ref(), cwd, config).await?;
        Ok(Self::from_layout(runtime, layout))
    }

    pub fn from_layout(runtime: Arc<dyn Runtime>, layout: ProjectLayout) -> Self {
        let resolver = Resolver::new(runtime, Arc::new(layout));
        Self {
            graph: Arc::new(BlockGraph::new(resolver)),
        }
    }

    pub fn layout(&self) -> &ProjectLayout {
        self.graph.layout()
    }

    pub fn resolver(&self) -> &Resolver {
        self.graph.resolver()
    }

    pub fn graph(&self) -> &Arc<BlockGraph> {
        &self.graph
    }

    pub async fn resolve_block(&self, name: &str, hint: LayerHint<'_>) -> Result<Option<Location>> {
        self.resolver().resolve_block(name, hint).await
    }

    pub async fn block(&self, name: &str) -> Result<Arc<Block>> {
        self.graph.get(name).await
    }

    /// The named blocks, or every block when `names` is `None`. Bypasses the
    /// lock file; see [`Project::graph_cache`].
    pub async fn blocks(&self, names: Option<&[String]>) -> Result<BlockMap> {
        self.graph.get_all(names).await
    }

    pub fn graph_cache(&self) -> GraphCache {
        GraphCache::new(self.graph.clone())
    }

    pub async fn build_config(&self) -> Result<BuildConfig> {
        get_build_config(self.graph.clone()).await
    }

    pub async fn union_entry_points(&self, cache: Option<&BlockMap>) -> Result<UnionEntryPoints> {
        self.build_config().await?.union_entry_points(cache).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestRuntime;
    use serde_json::json;

    #[tokio::test]
    async fn load_reads_dependency_layers_through_the_runtime() {
        let runtime = TestRuntime::new("/p");
        runtime.add_file(
            "node_modules/core/.pzlrrc",
            r#"{"sourceDir": "lib", "blockDir": "blocks"}"#,
        );
        runtime.add_file("node_modules/core/lib/blocks/i-base/index.js", "package('i-base');");
        let config = PzlrConfig::from_value(json!({"dependencies": ["core"]})).unwrap();

        let project = Project::load(Arc::new(runtime), "/p", &config).await.unwrap();
        let block = project.block("i-base").await.unwrap();

        assert_eq!(block.layer(), 1);
        assert_eq!(
            block.dir(),
            std::path::Path::new("/p/node_modules/core/lib/blocks/i-base")
        );
    }

    #[test]
    fn open_uses_the_native_filesystem() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".pzlrrc"), r#"{"projectName": "demo"}"#).unwrap();

        let project = Project::open(dir.path()).unwrap();

        assert_eq!(project.layout().config().project_name, "demo");
        assert_eq!(project.layout().layers().len(), 1);
    }
}
