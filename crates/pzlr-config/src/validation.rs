//! Schema validation for loaded configuration.
//!
//! Catches values that would make layer resolution meaningless before any
//! filesystem work starts.

use std::collections::HashSet;

use crate::config::PzlrConfig;
use crate::error::{ConfigError, Result};

/// Trait for pluggable config validation strategies
pub trait ConfigValidator {
    fn validate(&self, config: &PzlrConfig) -> Result<()>;
}

/// Schema-only validation (no filesystem checks)
///
/// # Example
///
/// ```
/// use pzlr_config::{ConfigValidator, PzlrConfig, SchemaValidator};
///
/// SchemaValidator.validate(&PzlrConfig::default()).unwrap();
/// ```
pub struct SchemaValidator;

impl ConfigValidator for SchemaValidator {
    fn validate(&self, config: &PzlrConfig) -> Result<()> {
        if config.super_alias.trim().is_empty() {
            return Err(ConfigError::SchemaValidation {
                message: "the `super` token cannot be empty".to_string(),
                hint: Some("Use the default \"@super\" or another non-empty marker".to_string()),
            });
        }

        for (field, value) in [
            ("sourceDir", &config.source_dir),
            ("blockDir", &config.block_dir),
            ("entriesDir", &config.entries_dir),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::SchemaValidation {
                    message: format!("`{field}` cannot be empty"),
                    hint: None,
                });
            }
        }

        let mut seen = HashSet::new();
        for dependency in &config.dependencies {
            let src = dependency.src();
            if src.trim().is_empty() {
                return Err(ConfigError::SchemaValidation {
                    message: "dependency package names cannot be empty".to_string(),
                    hint: Some("Remove empty strings from the 'dependencies' array".to_string()),
                });
            }

            if !seen.insert(src) {
                tracing::warn!(dependency = src, "dependency listed twice, first entry wins");
            }

            if dependency
                .excluded_extensions()
                .iter()
                .any(|ext| ext.len() < 2)
            {
                return Err(ConfigError::SchemaValidation {
                    message: format!("dependency `{src}` excludes an empty extension"),
                    hint: Some("Write extensions as \".styl\" or \"styl\"".to_string()),
                });
            }
        }

        if config.settings.parallel_jobs == Some(0) {
            return Err(ConfigError::SchemaValidation {
                message: "settings.parallelJobs must be at least 1".to_string(),
                hint: Some("Omit the field for unbounded concurrency".to_string()),
            });
        }

        Ok(())
    }
}

/// Convenience function for schema-only validation
pub fn validate_schema(config: &PzlrConfig) -> Result<()> {
    SchemaValidator.validate(config)
}
