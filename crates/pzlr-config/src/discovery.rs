//! File-based config discovery
//!
//! Handles finding and loading `.pzlrrc` files for the project and for each
//! dependency package.

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format as _, Json, Serialized},
};

use crate::config::{CONFIG_FILE, PzlrConfig};
use crate::error::{ConfigError, Result};
use crate::validation::validate_schema;

/// Prefix of environment variables that override project configuration
/// (`PZLR_LOCK_PREFIX`, `PZLR_SETTINGS__LOG_LEVEL`, ...).
pub const ENV_PREFIX: &str = "PZLR_";

/// File-based configuration discovery
///
/// # Example
///
/// ```no_run
/// use pzlr_config::ConfigDiscovery;
///
/// let discovery = ConfigDiscovery::new(".");
/// let config = discovery.load().unwrap();
/// ```
pub struct ConfigDiscovery {
    root: PathBuf,
}

impl ConfigDiscovery {
    /// Create a new config discovery with a root directory
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Find `.pzlrrc` in the root directory
    pub fn find(&self) -> Option<PathBuf> {
        let path = self.root.join(CONFIG_FILE);
        path.is_file().then_some(path)
    }

    /// Load the project configuration.
    ///
    /// Sources, lowest priority first: defaults, `.pzlrrc`, `PZLR_*`
    /// environment variables. A missing `.pzlrrc` only produces a warning.
    pub fn load(&self) -> Result<PzlrConfig> {
        let mut figment = Figment::new().merge(Serialized::defaults(PzlrConfig::default()));

        match self.find() {
            Some(path) => figment = figment.merge(Json::file(path)),
            None => tracing::warn!(root = %self.root.display(), "{CONFIG_FILE} doesn't exist"),
        }

        figment = figment.merge(
            Env::prefixed(ENV_PREFIX)
                .lowercase(false)
                .map(|key| env_key_to_camel_case(key.as_str()).into())
                .split("__"),
        );
        let config = extract(figment)?;
        validate_schema(&config)?;
        Ok(config)
    }

    /// Load the configuration of a dependency package.
    ///
    /// Returns `None` when the package ships no `.pzlrrc`. Environment
    /// overrides are not applied: they target the consuming project only.
    pub fn load_layer(&self) -> Result<Option<PzlrConfig>> {
        let Some(path) = self.find() else {
            return Ok(None);
        };

        let figment = Figment::new()
            .merge(Serialized::defaults(PzlrConfig::default()))
            .merge(Json::file(path));

        let config = extract(figment)?;
        validate_schema(&config)?;
        Ok(Some(config))
    }

    /// Load a required configuration file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::NotFound` if the root has no `.pzlrrc`.
    pub fn load_required(&self) -> Result<PzlrConfig> {
        if self.find().is_none() {
            return Err(ConfigError::NotFound(self.root.clone()));
        }
        self.load()
    }
}

fn extract(figment: Figment) -> Result<PzlrConfig> {
    figment.extract().map_err(|e| ConfigError::InvalidValue {
        field: CONFIG_FILE.to_string(),
        hint: Some(format!("{CONFIG_FILE} should be a valid JSON: {e}")),
    })
}

/// Maps `SETTINGS__LOG_LEVEL` onto `settings__logLevel`; `__` still
/// separates nesting levels afterwards.
fn env_key_to_camel_case(key: &str) -> String {
    key.split("__")
        .map(|segment| {
            let mut out = String::with_capacity(segment.len());
            for (i, word) in segment.split('_').filter(|w| !w.is_empty()).enumerate() {
                let word = word.to_ascii_lowercase();
                if i == 0 {
                    out.push_str(&word);
                } else {
                    let mut chars = word.chars();
                    if let Some(first) = chars.next() {
                        out.push(first.to_ascii_uppercase());
                        out.push_str(chars.as_str());
                    }
                }
            }
            out
        })
        .collect::<Vec<_>>()
        .join("__")
}

/// Discover and load config from the current directory (convenience function)
pub fn discover() -> Result<PzlrConfig> {
    let root = std::env::current_dir()?;
    ConfigDiscovery::new(&root).load()
}
