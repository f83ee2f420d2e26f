use super::{graph, names};
use crate::block::DependencyOptions;
use crate::error::Error;
use crate::resolve::LayerHint;
use crate::test_utils::TestRuntime;
use serde_json::json;
use std::path::PathBuf;

const OWN: DependencyOptions<'static> = DependencyOptions {
    only_own: true,
    cache: None,
};

fn chain() -> TestRuntime {
    let runtime = TestRuntime::new("/p");
    for leaf in ["b-a1", "b-b1", "b-c1", "b-shared"] {
        runtime.add_file(
            format!("src/components/{leaf}/index.js"),
            format!("package('{leaf}');"),
        );
    }
    runtime.add_file(
        "src/components/i-c/index.js",
        "package('i-c').dependencies('b-c1', 'b-shared').libs('lodash');",
    );
    runtime.add_file(
        "src/components/i-b/index.js",
        "package('i-b').extends('i-c').dependencies(['b-b1', 'b-shared']).libs('jquery', 'lodash');",
    );
    runtime.add_file(
        "src/components/b-a/index.js",
        "package('b-a').extends('i-b').dependencies('b-a1', 'b-b1', 'b-a1').libs('moment');",
    );
    runtime
}

#[tokio::test]
async fn own_dependencies_ignore_the_parent_chain() {
    let runtime = chain();
    let graph = graph(&runtime, json!({}));
    let block = graph.get("b-a").await.unwrap();

    let own = graph.get_dependencies(&block, OWN).await.unwrap();
    assert_eq!(own.names().collect::<Vec<_>>(), ["b-a1", "b-b1"]);

    let libs = graph.get_libs(&block, OWN).await.unwrap();
    assert_eq!(names(libs.iter()), ["moment"]);
}

#[tokio::test]
async fn ancestors_come_before_descendants() {
    let runtime = chain();
    let graph = graph(&runtime, json!({}));
    let block = graph.get("b-a").await.unwrap();

    let full = graph
        .dependency_names(&block, DependencyOptions::default())
        .await
        .unwrap();
    assert_eq!(names(full.iter()), ["b-c1", "b-shared", "b-b1", "b-a1"]);

    let blocks = graph
        .get_dependencies(&block, DependencyOptions::default())
        .await
        .unwrap();
    assert_eq!(blocks.len(), 4);

    let libs = graph
        .get_libs(&block, DependencyOptions::default())
        .await
        .unwrap();
    assert_eq!(names(libs.iter()), ["lodash", "jquery", "moment"]);
}

#[tokio::test]
async fn a_direct_edge_promotes_an_ancestor() {
    let runtime = TestRuntime::new("/p");
    runtime.add_file("src/components/i-base/index.js", "package('i-base').libs('core');");
    runtime.add_file(
        "src/components/b-root/index.js",
        "package('b-root').dependencies('b-a', 'b-b');",
    );
    runtime.add_file("src/components/b-a/index.js", "package('b-a').extends('i-base');");
    runtime.add_file(
        "src/components/b-b/index.js",
        "package('b-b').dependencies('i-base').libs('extra');",
    );
    runtime.add_file("src/components/b-lone/index.js", "package('b-lone').extends('i-base');");
    let graph = graph(&runtime, json!({}));

    let root = graph.get("b-root").await.unwrap();
    let closure = graph.get_runtime_dependencies(&root, None).await.unwrap();
    assert_eq!(
        names(closure.runtime.keys()),
        ["b-root", "b-a", "i-base", "b-b"]
    );
    assert!(closure.parents.is_empty());
    assert_eq!(names(closure.libs.iter()), ["core", "extra"]);

    let lone = graph.get("b-lone").await.unwrap();
    let closure = graph.get_runtime_dependencies(&lone, None).await.unwrap();
    assert_eq!(names(closure.parents.keys()), ["i-base"]);
    assert_eq!(closure.direct().collect::<Vec<_>>(), ["b-lone"]);
}

#[tokio::test]
async fn mixins_fold_once_per_layer() {
    let runtime = TestRuntime::new("/p");
    runtime.add_file(
        "src/components/b-foo/index.js",
        "package('b-foo').mixin().dependencies('b-a');",
    );
    runtime.add_file(
        "node_modules/one/src/components/b-foo/index.js",
        "package('b-foo').mixin().dependencies('b-b').libs('x');",
    );
    runtime.add_file(
        "node_modules/two/src/components/b-foo/index.js",
        "package('b-foo').extends('i-base').dependencies('b-a', 'b-c');",
    );
    runtime.add_file(
        "node_modules/three/src/components/b-foo/index.js",
        "package('b-foo').libs('never');",
    );
    let graph = graph(&runtime, json!({"dependencies": ["one", "two", "three"]}));

    let reads = runtime.read_count();
    let block = graph.get("b-foo").await.unwrap();

    assert_eq!(runtime.read_count() - reads, 3);
    assert_eq!(block.layer(), 0);
    assert_eq!(block.parent(), Some("i-base"));
    assert_eq!(block.dependencies(), ["b-a", "b-b", "b-c"]);
    assert_eq!(block.libs(), ["x"]);
}

#[tokio::test]
async fn a_mixin_without_a_base_stands_alone() {
    let runtime = TestRuntime::new("/p");
    runtime.add_file(
        "node_modules/one/src/components/b-solo/index.js",
        "package('b-solo').mixin().libs('x');",
    );
    let graph = graph(&runtime, json!({"dependencies": ["one"]}));

    let block = graph.get("b-solo").await.unwrap();

    assert_eq!(block.layer(), 1);
    assert!(block.is_mixin());
    assert_eq!(block.parent(), None);
    assert_eq!(block.libs(), ["x"]);
}

#[tokio::test]
async fn skipping_layers_walks_the_override_chain() {
    let runtime = TestRuntime::new("/p");
    runtime.add_file("src/components/b-foo/index.js", "package('b-foo');");
    runtime.add_file(
        "node_modules/one/src/components/b-foo/index.js",
        "package('b-foo');",
    );
    let graph = graph(&runtime, json!({"dependencies": ["one"]}));
    let resolver = graph.resolver();

    let top = resolver
        .resolve_block("b-foo", LayerHint::All)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(top.path, PathBuf::from("/p/src/components/b-foo"));

    let below = resolver
        .resolve_block("b-foo", LayerHint::Skip(1))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        below.path,
        PathBuf::from("/p/node_modules/one/src/components/b-foo")
    );

    let next = below.from_layer().unwrap();
    assert_eq!(
        resolver
            .resolve_block("b-foo", LayerHint::Skip(next))
            .await
            .unwrap(),
        None
    );
}

#[tokio::test]
async fn a_missing_dependency_aborts_the_closure() {
    let runtime = TestRuntime::new("/p");
    runtime.add_file(
        "src/components/b-a/index.js",
        "package('b-a').dependencies('b-b');",
    );
    runtime.add_file(
        "src/components/b-b/index.js",
        "package('b-b').dependencies('b-missing');",
    );
    let graph = graph(&runtime, json!({}));
    let block = graph.get("b-a").await.unwrap();

    let err = graph.get_runtime_dependencies(&block, None).await.unwrap_err();

    assert!(matches!(err, Error::BlockNotFound { ref name } if name == "b-missing"));
}

#[tokio::test]
async fn parent_cycles_are_reported() {
    let runtime = TestRuntime::new("/p");
    runtime.add_file("src/components/b-a/index.js", "package('b-a').extends('b-b');");
    runtime.add_file("src/components/b-b/index.js", "package('b-b').extends('b-a');");
    let graph = graph(&runtime, json!({}));
    let block = graph.get("b-a").await.unwrap();

    let err = graph
        .dependency_names(&block, DependencyOptions::default())
        .await
        .unwrap_err();
    match err {
        Error::ParentCycle { chain } => assert_eq!(chain, ["b-a", "b-b", "b-a"]),
        other => panic!("unexpected error: {other}"),
    }

    let closure = graph.get_runtime_dependencies(&block, None).await.unwrap();
    assert_eq!(names(closure.runtime.keys()), ["b-a", "b-b"]);
}

#[tokio::test]
async fn project_blocks_shadow_dependency_blocks() {
    let runtime = TestRuntime::new("/p");
    runtime.add_file("src/components/b-foo/index.js", "package('b-foo');");
    runtime.add_file("src/components/b-foo/b-foo.styl", "");
    runtime.add_file("src/components/b-foo/b-foo_dark.styl", "");
    runtime.add_file(
        "node_modules/one/src/components/b-foo/index.js",
        "package('b-foo').libs('old');",
    );
    runtime.add_file(
        "node_modules/one/src/components/b-bar/index.js",
        "package('b-bar');",
    );
    let graph = graph(&runtime, json!({"dependencies": ["one"]}));

    let blocks = graph.get_all(None).await.unwrap();

    assert_eq!(blocks.len(), 2);
    let foo = blocks.get("b-foo").unwrap();
    assert_eq!(foo.layer(), 0);
    assert!(foo.libs().is_empty());
    assert_eq!(
        foo.styles(),
        [
            PathBuf::from("/p/src/components/b-foo/b-foo.styl"),
            PathBuf::from("/p/src/components/b-foo/b-foo_dark.styl"),
        ]
    );
    assert_eq!(blocks.get("b-bar").unwrap().layer(), 1);
}

#[tokio::test]
async fn a_block_map_replaces_the_filesystem() {
    let runtime = chain();
    let graph = graph(&runtime, json!({}));
    let blocks = graph.get_all(None).await.unwrap();
    for name in blocks.names() {
        runtime.remove(format!("src/components/{name}/index.js"));
    }
    graph.clear_cache();

    let block = blocks.get("b-a").unwrap();
    let closure = graph
        .get_runtime_dependencies(block, Some(&blocks))
        .await
        .unwrap();
    assert_eq!(closure.runtime.len(), 7);

    let again = graph
        .get_runtime_dependencies(block, Some(&blocks))
        .await
        .unwrap();
    assert!(std::sync::Arc::ptr_eq(&closure, &again));
}

#[tokio::test]
async fn a_standalone_block_memoizes_its_views() {
    let runtime = chain();
    let graph = graph(&runtime, json!({}));
    let block = graph.get("b-a").await.unwrap();

    let closure = graph.get_runtime_dependencies(&block, None).await.unwrap();
    let again = graph.get_runtime_dependencies(&block, None).await.unwrap();
    assert!(std::sync::Arc::ptr_eq(&closure, &again));

    let full = DependencyOptions::default();
    let libs = graph.get_libs(&block, full).await.unwrap();
    assert!(std::sync::Arc::ptr_eq(
        &libs,
        &graph.get_libs(&block, full).await.unwrap()
    ));

    // A fresh instance starts with an empty memo.
    let reloaded = graph.get("b-a").await.unwrap();
    let fresh = graph.get_runtime_dependencies(&reloaded, None).await.unwrap();
    assert!(!std::sync::Arc::ptr_eq(&closure, &fresh));
    assert_eq!(closure, fresh);
}
