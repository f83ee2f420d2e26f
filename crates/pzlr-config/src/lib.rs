//! # pzlr-config
//!
//! Configuration for layered component projects: the project's own
//! `.pzlrrc`, the ranked list of dependency packages that provide base
//! components, and process-level settings.

pub mod config;
pub mod discovery;
pub mod error;
pub mod settings;
pub mod validation;

pub use config::*;
pub use error::*;
pub use settings::*;

pub use discovery::{ConfigDiscovery, ENV_PREFIX, discover};
pub use validation::{ConfigValidator, SchemaValidator, validate_schema};
