//! High-level configuration structure for a pzlr project.
//!
//! This module provides the main `PzlrConfig` struct. For file discovery, see
//! the `discovery` module.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ConfigError, Result as ConfigResult};
use crate::settings::GlobalSettings;

/// Name of the per-project (and per-dependency-package) configuration file.
pub const CONFIG_FILE: &str = ".pzlrrc";

/// Source language of a layer. Decides which extension the logical
/// `.logic` asset maps onto inside that layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectType {
    #[default]
    Ts,
    Js,
    Static,
}

impl ProjectType {
    /// Concrete extension (without dot) of logic files in a layer of this type.
    pub fn logic_extension(self) -> &'static str {
        match self {
            ProjectType::Ts => "ts",
            ProjectType::Js | ProjectType::Static => "js",
        }
    }
}

/// A dependency package providing an overridable layer of base components.
///
/// Either a bare package path (`"@v4fire/client"`) or a detailed record with
/// file extensions the layer must never serve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependencySpec {
    Package(String),
    Detailed {
        src: String,
        #[serde(default)]
        exclude: Vec<String>,
    },
}

impl DependencySpec {
    /// Package path of the dependency, relative to `node_modules`.
    pub fn src(&self) -> &str {
        match self {
            DependencySpec::Package(src) => src,
            DependencySpec::Detailed { src, .. } => src,
        }
    }

    /// Excluded extensions, normalized to carry a leading dot.
    pub fn excluded_extensions(&self) -> Vec<String> {
        match self {
            DependencySpec::Package(_) => Vec::new(),
            DependencySpec::Detailed { exclude, .. } => exclude
                .iter()
                .map(|ext| {
                    if ext.starts_with('.') {
                        ext.clone()
                    } else {
                        format!(".{ext}")
                    }
                })
                .collect(),
        }
    }
}

fn default_super() -> String {
    "@super".to_string()
}

fn default_source_dir() -> String {
    "src".to_string()
}

fn default_block_dir() -> String {
    "components".to_string()
}

fn default_server_dir() -> String {
    "server".to_string()
}

fn default_entries_dir() -> String {
    "entries".to_string()
}

fn default_resolve_cache_ttl_ms() -> u64 {
    1000
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PzlrConfig {
    /// Token marking a reference to the same component one layer down
    /// (`@super/b-foo`).
    #[serde(rename = "super", default = "default_super")]
    pub super_alias: String,

    #[serde(default = "default_source_dir")]
    pub source_dir: String,

    #[serde(default = "default_block_dir")]
    pub block_dir: String,

    #[serde(default = "default_server_dir")]
    pub server_dir: String,

    #[serde(default = "default_entries_dir")]
    pub entries_dir: String,

    #[serde(default)]
    pub project_type: ProjectType,

    #[serde(default)]
    pub project_name: String,

    /// Ranked dependency layers, highest priority first.
    #[serde(default)]
    pub dependencies: Vec<DependencySpec>,

    /// Prefix of the components lock file name.
    #[serde(default)]
    pub lock_prefix: String,

    /// Lifetime of memoized name lookups inside the resolver.
    #[serde(default = "default_resolve_cache_ttl_ms")]
    pub resolve_cache_ttl_ms: u64,

    #[serde(default)]
    pub settings: GlobalSettings,
}

impl Default for PzlrConfig {
    fn default() -> Self {
        Self {
            super_alias: default_super(),
            source_dir: default_source_dir(),
            block_dir: default_block_dir(),
            server_dir: default_server_dir(),
            entries_dir: default_entries_dir(),
            project_type: ProjectType::default(),
            project_name: String::new(),
            dependencies: Vec::new(),
            lock_prefix: String::new(),
            resolve_cache_ttl_ms: default_resolve_cache_ttl_ms(),
            settings: GlobalSettings::default(),
        }
    }
}

impl PzlrConfig {
    /// Create from serde_json::Value (for programmatic config)
    ///
    /// # Example
    ///
    /// ```
    /// use pzlr_config::PzlrConfig;
    /// use serde_json::json;
    ///
    /// let config = PzlrConfig::from_value(json!({
    ///     "projectType": "js",
    ///     "dependencies": ["@v4fire/client"]
    /// }))
    /// .unwrap();
    ///
    /// assert_eq!(config.dependencies[0].src(), "@v4fire/client");
    /// assert_eq!(config.block_dir, "components");
    /// ```
    pub fn from_value(value: Value) -> ConfigResult<Self> {
        serde_json::from_value(value).map_err(|e| ConfigError::InvalidValue {
            field: "config".to_string(),
            hint: Some(e.to_string()),
        })
    }

    /// Convert to serde_json::Value
    pub fn to_value(&self) -> ConfigResult<Value> {
        serde_json::to_value(self).map_err(|e| ConfigError::InvalidValue {
            field: "config".to_string(),
            hint: Some(e.to_string()),
        })
    }

    /// Returns the remainder of `name` when it starts with the escape token
    /// followed by a path separator.
    pub fn strip_super<'a>(&self, name: &'a str) -> Option<&'a str> {
        let rest = name.strip_prefix(self.super_alias.as_str())?;
        rest.strip_prefix('/').or_else(|| rest.strip_prefix('\\'))
    }

    /// True if `name` is an ancestor-layer reference (`@super/b-foo`).
    pub fn is_super_reference(&self, name: &str) -> bool {
        self.strip_super(name).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn from_value_reads_camel_case_keys() {
        let config = PzlrConfig::from_value(json!({
            "sourceDir": "source",
            "blockDir": "blocks",
            "lockPrefix": "ci-"
        }))
        .unwrap();

        assert_eq!(config.source_dir, "source");
        assert_eq!(config.block_dir, "blocks");
        assert_eq!(config.lock_prefix, "ci-");
        assert_eq!(config.entries_dir, "entries");
    }

    #[test]
    fn dependency_specs_accept_both_shapes() {
        let config = PzlrConfig::from_value(json!({
            "dependencies": [
                "@v4fire/core",
                {"src": "@v4fire/client", "exclude": ["styl", ".ss"]}
            ]
        }))
        .unwrap();

        assert_eq!(config.dependencies.len(), 2);
        assert!(config.dependencies[0].excluded_extensions().is_empty());
        assert_eq!(
            config.dependencies[1].excluded_extensions(),
            vec![".styl".to_string(), ".ss".to_string()]
        );
    }

    #[test]
    fn super_alias_uses_the_super_key() {
        let config = PzlrConfig::from_value(json!({"super": "@up"})).unwrap();
        assert_eq!(config.super_alias, "@up");
        assert_eq!(config.strip_super("@up/b-foo"), Some("b-foo"));

        let value = config.to_value().unwrap();
        assert_eq!(value["super"], json!("@up"));
        assert!(value.get("superAlias").is_none());
    }

    #[test]
    fn super_references_need_a_separator() {
        let config = PzlrConfig::default();
        assert_eq!(config.strip_super("@super/b-foo"), Some("b-foo"));
        assert_eq!(config.strip_super("@super\\b-foo"), Some("b-foo"));
        assert_eq!(config.strip_super("@superb-foo"), None);
        assert!(!config.is_super_reference("b-foo"));
    }

    #[test]
    fn logic_extension_follows_project_type() {
        assert_eq!(ProjectType::Ts.logic_extension(), "ts");
        assert_eq!(ProjectType::Js.logic_extension(), "js");
        assert_eq!(ProjectType::Static.logic_extension(), "js");
    }

    #[test]
    fn to_value_round_trips() {
        let config = PzlrConfig {
            project_name: "demo".to_string(),
            ..PzlrConfig::default()
        };

        let value = config.to_value().unwrap();
        assert_eq!(value["projectName"], json!("demo"));
        assert_eq!(PzlrConfig::from_value(value).unwrap(), config);
    }
}
