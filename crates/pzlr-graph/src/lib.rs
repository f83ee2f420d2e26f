//! # pzlr-graph
//!
//! Layered component resolution and build-graph computation.
//!
//! A project is a stack of source layers: the project's own sources on top,
//! then each configured dependency package in priority order. Every layer
//! contributes components (blocks) laid out as `<type>-<name>/index.js`
//! manifests. This crate resolves names across those layers, folds mixin
//! overrides, builds dependency and runtime closures, persists the result
//! behind a content hash, and turns entry points into shared chunk plans.
//!
//! ## Overview
//!
//! - **Declarations**: the `package('b-foo').extends('b-bar')` DSL is parsed
//!   by an explicit parser with a per-source cache, never evaluated.
//! - **Resolution**: exact matches first, glob fallback, layer skipping for
//!   override chains and `@super` escapes relative to a context file.
//! - **Graphs**: own/full dependency and library sets, and the runtime
//!   closure with direct-edge precedence over parent-only units.
//! - **Lock file**: a hash-guarded snapshot that skips re-resolution while
//!   manifests are unchanged.
//! - **Entries**: import scanning, foundation inlining and common chunk
//!   extraction across entry points.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐    ┌────────────────┐
//! │  PzlrConfig  │───▶│ ProjectLayout  │  layers 0..n
//! └──────────────┘    └───────┬────────┘
//!                             │
//!                             ▼
//!  ┌─────────┐        ┌────────────────┐
//!  │ Runtime │◀───────│    Resolver    │  name -> Location
//!  └─────────┘        └───────┬────────┘
//!                             │
//!                             ▼
//!                     ┌────────────────┐      ┌────────────┐
//!                     │   BlockGraph   │◀─────│ GraphCache │  lock file
//!                     └───────┬────────┘      └────────────┘
//!                             │
//!                             ▼
//!                     ┌────────────────┐
//!                     │  BuildConfig   │  entries -> common chunks
//!                     └────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pzlr_graph::Project;
//!
//! # #[tokio::main]
//! # async fn main() -> pzlr_graph::Result<()> {
//! let project = Project::open(".")?;
//!
//! let button = project.block("b-button").await?;
//! let closure = project
//!     .graph()
//!     .get_runtime_dependencies(&button, None)
//!     .await?;
//! println!("{} runtime units", closure.runtime.len());
//!
//! let plan = project.union_entry_points(None).await?;
//! for (entry, deps) in &plan.dependencies {
//!     println!("{entry}: {deps:?}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Filesystem Access
//!
//! All reads go through the [`Runtime`] trait. [`NativeRuntime`] backs it
//! with `std::fs`; tests use the in-memory `TestRuntime` (feature
//! `test-utils`), whose virtual clock makes mtime-sensitive caches
//! deterministic.
//!
//! ## Logging
//!
//! The crate only emits `tracing` events. Enable the `logging` feature for
//! [`logging::init_logging`] and friends.

pub mod block;
pub mod block_name;
pub mod declaration;
pub mod entries;
pub mod error;
pub mod lock;
pub mod project;
pub mod resolve;
pub mod runtime;

#[cfg(feature = "logging")]
pub mod logging;

pub use pzlr_config;

pub use block::{
    Block, BlockGraph, BlockMap, DependencyOptions, RuntimeDependencies, RuntimeUnit,
};
pub use block_name::{BlockType, is_block_name, is_block_reference};
pub use declaration::{Declaration, DeclarationError, DeclarationParser, DeclarationRecord};
pub use entries::{
    BuildConfig, ChunkUnit, Entry, EntrySets, UnionEntryPoints, get_build_config,
    get_union_entry_points,
};
pub use error::{Error, Result};
pub use lock::{GraphCache, Lock, ProjectHash, compute_project_hash, load_lock, save_lock};
pub use project::Project;
pub use resolve::{Layer, LayerHint, Location, ProjectLayout, Resolver, is_node_module};

#[cfg(feature = "logging")]
pub use logging::{
    LogFormat, LogLevel, init_logging, init_logging_from_env, init_logging_from_settings,
};

// Re-export runtime types
pub use runtime::{FileMetadata, Runtime, RuntimeError, RuntimeResult};
pub use runtime::native::NativeRuntime;

// Test utilities (available in test builds)
#[cfg(any(test, feature = "test-utils"))]
pub use runtime::test_utils::TestRuntime;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils {
    pub use super::runtime::test_utils::*;
}

#[cfg(test)]
mod tests;
