//! Cross-module scenarios over in-memory projects.

mod graph_tests;
mod property_tests;

use crate::block::BlockGraph;
use crate::resolve::{ProjectLayout, Resolver};
use crate::test_utils::TestRuntime;
use pzlr_config::PzlrConfig;
use std::sync::Arc;

/// Graph over `runtime` rooted at `/p`. Dependency layers reuse the
/// project configuration.
fn graph(runtime: &TestRuntime, config: serde_json::Value) -> Arc<BlockGraph> {
    graph_at("/p", runtime, config)
}

fn graph_at(cwd: &str, runtime: &TestRuntime, config: serde_json::Value) -> Arc<BlockGraph> {
    let config = PzlrConfig::from_value(config).unwrap();
    let layout =
        ProjectLayout::with_layer_configs(cwd, &config, vec![None; config.dependencies.len()]);
    let resolver = Resolver::new(Arc::new(runtime.clone()), Arc::new(layout));
    Arc::new(BlockGraph::new(resolver))
}

fn names<'a>(iter: impl IntoIterator<Item = &'a String>) -> Vec<&'a str> {
    iter.into_iter().map(String::as_str).collect()
}
