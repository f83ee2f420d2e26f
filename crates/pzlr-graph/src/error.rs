use std::path::PathBuf;

use crate::declaration::DeclarationError;
use crate::runtime::RuntimeError;

/// Error types for graph operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed declaration text or a record that fails the name grammar.
    #[error("Invalid declaration in {}: {source}", path.display())]
    Declaration {
        path: PathBuf,
        #[source]
        source: DeclarationError,
    },

    /// A referenced component has no resolvable manifest in any layer.
    #[error("Block \"{name}\" not found")]
    BlockNotFound { name: String },

    /// An ancestor-layer reference was resolved without the file doing the escaping.
    #[error("\"{name}\" escapes to an ancestor layer but no context path was given")]
    AmbiguousContext { name: String },

    /// `a extends b extends ... extends a`
    #[error("Parent cycle detected: {}", chain.join(" -> "))]
    ParentCycle { chain: Vec<String> },

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("Configuration error: {0}")]
    Config(#[from] pzlr_config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn not_found(name: impl Into<String>) -> Self {
        Error::BlockNotFound { name: name.into() }
    }
}

/// Result type alias for graph operations.
pub type Result<T> = std::result::Result<T, Error>;
