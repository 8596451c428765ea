mod context_tests;
mod gc_tests;

use std::sync::Arc;

use indexmap::IndexMap;

use crate::test_utils::MockProject;
use crate::{DeltaResult, Graph, GraphInput, MixedOutput, Module, TraversalOptions};

/// Sorted keys of a module map.
pub(crate) fn keys<T>(modules: &IndexMap<String, Module<T>>) -> Vec<&str> {
    let mut keys: Vec<&str> = modules.keys().map(String::as_str).collect();
    keys.sort_unstable();
    keys
}

/// Sorted deleted paths of a delta.
pub(crate) fn deleted<T>(delta: &DeltaResult<T>) -> Vec<&str> {
    let mut deleted: Vec<&str> = delta.deleted.iter().map(String::as_str).collect();
    deleted.sort_unstable();
    deleted
}

pub(crate) fn assert_consistent(graph: &Graph, lazy: bool) {
    let violations = graph.check_invariants(lazy);
    assert!(violations.is_empty(), "graph invariants violated: {violations:#?}");
}

/// `/bundle -> /foo -> {/bar, /baz}`
pub(crate) fn basic_project() -> Arc<MockProject> {
    let project = Arc::new(MockProject::new());
    project.add_file("/bundle", &["/foo"]);
    project.add_file("/foo", &["/bar", "/baz"]);
    project.add_file("/bar", &[]);
    project.add_file("/baz", &[]);
    project
}

pub(crate) async fn build(options: &TraversalOptions<MixedOutput>) -> Graph {
    let mut graph = Graph::new(GraphInput::new(["/bundle"]));
    graph
        .initial_traverse(options)
        .await
        .expect("initial traversal should succeed");
    assert_consistent(&graph, options.lazy);
    graph
}
