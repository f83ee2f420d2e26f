//! Ranked source layers of a project.
//!
//! Layer 0 is the project itself; every configured dependency package adds one
//! layer below it, in configuration order.

use path_clean::PathClean;
use pzlr_config::{CONFIG_FILE, ConfigDiscovery, PzlrConfig, ProjectType, validate_schema};
use rustc_hash::FxHashSet;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::runtime::{Runtime, RuntimeError};

/// Directory dependency packages are installed into.
pub const NODE_MODULES: &str = "node_modules";

/// One ranked source root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layer {
    /// Position in the search order, 0 being the project.
    pub index: usize,
    /// Project name for layer 0, package path (`@v4fire/client`) otherwise.
    pub src: String,
    /// Root that block lookups are performed under.
    pub search_root: PathBuf,
    pub source_dir: PathBuf,
    pub block_dir: PathBuf,
    pub server_dir: PathBuf,
    pub entries_dir: PathBuf,
    /// Extensions (with leading dot) this layer must never serve.
    pub exclude: FxHashSet<String>,
    pub project_type: ProjectType,
}

impl Layer {
    pub fn is_project(&self) -> bool {
        self.index == 0
    }

    pub fn excludes(&self, extension: &str) -> bool {
        self.exclude.contains(extension)
    }

    /// True if `path` lies inside this layer's sources.
    pub fn contains(&self, path: &Path) -> bool {
        path.starts_with(&self.source_dir) || path.starts_with(&self.search_root)
    }
}

/// The ordered layer list plus the directories derived from configuration.
#[derive(Debug, Clone)]
pub struct ProjectLayout {
    cwd: PathBuf,
    lib_dir: PathBuf,
    config: PzlrConfig,
    layers: Vec<Layer>,
    entry_dependencies: Vec<String>,
}

impl ProjectLayout {
    /// Build the layout, reading each dependency's `.pzlrrc` from disk.
    pub fn from_config(cwd: impl Into<PathBuf>, config: &PzlrConfig) -> Result<Self> {
        let cwd = cwd.into();
        let lib_dir = cwd.join(NODE_MODULES);

        let layer_configs = unique_sources(config)
            .into_iter()
            .map(|src| ConfigDiscovery::new(lib_dir.join(src)).load_layer())
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self::with_layer_configs(cwd, config, layer_configs))
    }

    /// Build the layout, reading each dependency's `.pzlrrc` through `runtime`.
    pub async fn load(
        runtime: &dyn Runtime,
        cwd: impl Into<PathBuf>,
        config: &PzlrConfig,
    ) -> Result<Self> {
        let cwd = cwd.into();
        let lib_dir = cwd.join(NODE_MODULES);

        let mut layer_configs = Vec::new();
        for src in unique_sources(config) {
            let path = lib_dir.join(src).join(CONFIG_FILE);
            let layer_config = match runtime.read_to_string(&path).await {
                Ok(text) => {
                    let value = serde_json::from_str(&text)?;
                    let layer_config = PzlrConfig::from_value(value)?;
                    validate_schema(&layer_config)?;
                    Some(layer_config)
                }
                Err(RuntimeError::FileNotFound(_)) => None,
                Err(e) => return Err(e.into()),
            };
            layer_configs.push(layer_config);
        }

        Ok(Self::with_layer_configs(cwd, config, layer_configs))
    }

    /// Build the layout from already loaded dependency configurations.
    ///
    /// `layer_configs` follows the deduplicated dependency order; `None`
    /// entries reuse the project configuration.
    pub fn with_layer_configs(
        cwd: impl Into<PathBuf>,
        config: &PzlrConfig,
        layer_configs: Vec<Option<PzlrConfig>>,
    ) -> Self {
        let cwd = cwd.into().clean();
        let lib_dir = cwd.join(NODE_MODULES);

        let source_dir = cwd.join(&config.source_dir).clean();
        let mut layers = vec![Layer {
            index: 0,
            src: config.project_name.clone(),
            search_root: source_dir.clone(),
            block_dir: source_dir.join(&config.block_dir),
            server_dir: cwd.join(&config.server_dir),
            entries_dir: source_dir.join(&config.entries_dir),
            source_dir,
            exclude: FxHashSet::default(),
            project_type: config.project_type,
        }];

        let mut entry_dependencies = Vec::new();
        let mut seen = FxHashSet::default();
        let dependencies = config
            .dependencies
            .iter()
            .filter(|dep| seen.insert(dep.src().to_string()));

        for (dependency, layer_config) in dependencies.zip(layer_configs) {
            let src = dependency.src();
            let layer_config = layer_config.as_ref().unwrap_or(config);

            let package_dir = lib_dir.join(src);
            let source_dir = package_dir.join(&layer_config.source_dir).clean();
            let block_dir = source_dir.join(&layer_config.block_dir);

            entry_dependencies.push(format!(
                "{src}/{}/{}",
                layer_config.source_dir.trim_matches('/'),
                layer_config.entries_dir.trim_matches('/')
            ));

            layers.push(Layer {
                index: layers.len(),
                src: src.to_string(),
                search_root: block_dir.clone(),
                server_dir: source_dir.join(&layer_config.server_dir),
                entries_dir: source_dir.join(&layer_config.entries_dir),
                block_dir,
                source_dir,
                exclude: dependency.excluded_extensions().into_iter().collect(),
                project_type: layer_config.project_type,
            });
        }

        tracing::debug!(
            layers = layers.len(),
            cwd = %cwd.display(),
            "project layout resolved"
        );

        Self {
            cwd,
            lib_dir,
            config: config.clone(),
            layers,
            entry_dependencies,
        }
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// The `node_modules` directory dependency layers live in.
    pub fn lib_dir(&self) -> &Path {
        &self.lib_dir
    }

    pub fn config(&self) -> &PzlrConfig {
        &self.config
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layer(&self, index: usize) -> Option<&Layer> {
        self.layers.get(index)
    }

    pub fn project(&self) -> &Layer {
        &self.layers[0]
    }

    /// Dependency layers, highest priority first.
    pub fn dependencies(&self) -> &[Layer] {
        &self.layers[1..]
    }

    /// Import specifier prefixes of the dependency entries directories
    /// (`@v4fire/client/src/entries`).
    pub fn entry_dependencies(&self) -> &[String] {
        &self.entry_dependencies
    }

    /// Root of every layer, in search order.
    pub fn search_roots(&self) -> impl Iterator<Item = &Path> {
        self.layers.iter().map(|l| l.search_root.as_path())
    }

    /// The layer whose sources contain `path`.
    ///
    /// Dependency layers are checked first since they are installed inside
    /// the project directory.
    pub fn layer_by_path(&self, path: &Path) -> Option<&Layer> {
        let path = if path.is_absolute() {
            path.to_path_buf().clean()
        } else {
            self.cwd.join(path).clean()
        };

        self.dependencies()
            .iter()
            .find(|layer| layer.contains(&path))
            .or_else(|| {
                (path.starts_with(&self.cwd) && !path.starts_with(&self.lib_dir))
                    .then(|| self.project())
            })
    }

    /// Paths that never hold components: entries directories and `tmp`
    /// folders below a layer root.
    pub fn is_ignored(&self, path: &Path) -> bool {
        if self.layers.iter().any(|l| path.starts_with(&l.entries_dir)) {
            return true;
        }

        let relative = self
            .layers
            .iter()
            .find_map(|l| path.strip_prefix(&l.search_root).ok())
            .unwrap_or(path);

        relative.components().any(|c| c.as_os_str() == "tmp")
    }
}

fn unique_sources(config: &PzlrConfig) -> Vec<&str> {
    let mut seen = FxHashSet::default();
    config
        .dependencies
        .iter()
        .map(|dep| dep.src())
        .filter(|src| seen.insert(*src))
        .collect()
}
