//! Cycle collection.

use std::sync::Arc;

use super::{assert_consistent, build, deleted, keys};
use crate::test_utils::MockProject;
use crate::{AsyncDependencyType, NodeColor, TransformResultDependency};

/// `/bundle -> /foo -> /bar -> /baz -> /foo`
fn cyclic_project() -> Arc<MockProject> {
    let project = Arc::new(MockProject::new());
    project.add_file("/bundle", &["/foo"]);
    project.add_file("/foo", &["/bar"]);
    project.add_file("/bar", &["/baz"]);
    project.add_file("/baz", &["/foo"]);
    project
}

#[tokio::test]
async fn unreachable_cycle_is_collected() {
    let project = cyclic_project();
    let options = project.options().build();
    let mut graph = build(&options).await;

    project.remove_dependency("/bundle", "/foo");
    let delta = graph.traverse(["/bundle"], &options).await.unwrap();

    assert_eq!(keys(&delta.modified), vec!["/bundle"]);
    assert_eq!(deleted(&delta), vec!["/bar", "/baz", "/foo"]);
    assert_eq!(graph.len(), 1);
    assert!(graph.color_of("/foo").is_none());
    assert_consistent(&graph, false);
}

#[tokio::test]
async fn cycle_with_external_reference_survives() {
    let project = cyclic_project();
    project.add_file("/bundle", &["/foo", "/bar"]);
    let options = project.options().build();
    let mut graph = build(&options).await;

    project.remove_dependency("/bundle", "/foo");
    let delta = graph.traverse(["/bundle"], &options).await.unwrap();

    assert_eq!(keys(&delta.modified), vec!["/bundle"]);
    assert!(delta.deleted.is_empty());
    for path in ["/foo", "/bar", "/baz"] {
        assert_eq!(graph.color_of(path), Some(NodeColor::Black), "{path}");
    }
    assert_eq!(
        graph.get("/foo").unwrap().inverse_dependencies.iter().collect::<Vec<_>>(),
        vec!["/baz"]
    );
    assert_consistent(&graph, false);

    // now cut the remaining external edge
    project.remove_dependency("/bundle", "/bar");
    let delta = graph.traverse(["/bundle"], &options).await.unwrap();
    assert_eq!(deleted(&delta), vec!["/bar", "/baz", "/foo"]);
    assert_consistent(&graph, false);
}

#[tokio::test]
async fn cycle_through_an_entry_point_survives() {
    let project = Arc::new(MockProject::new());
    project.add_file("/bundle", &["/foo"]);
    project.add_file("/foo", &["/bundle"]);
    let options = project.options().build();
    let mut graph = build(&options).await;

    project.touch("/foo");
    let delta = graph.traverse(["/foo"], &options).await.unwrap();
    assert_eq!(keys(&delta.modified), vec!["/foo"]);
    assert!(delta.deleted.is_empty());

    project.remove_dependency("/foo", "/bundle");
    let delta = graph.traverse(["/foo"], &options).await.unwrap();
    assert!(delta.deleted.is_empty());
    assert!(graph.contains("/bundle"));
    assert_consistent(&graph, false);
}

#[tokio::test]
async fn self_referencing_module_is_collected() {
    let project = Arc::new(MockProject::new());
    project.add_file("/bundle", &["/foo"]);
    project.add_file("/foo", &["/foo"]);
    let options = project.options().build();
    let mut graph = build(&options).await;
    assert_eq!(graph.get("/foo").unwrap().inverse_dependencies.len(), 2);

    project.remove_dependency("/bundle", "/foo");
    let delta = graph.traverse(["/bundle"], &options).await.unwrap();
    assert_eq!(deleted(&delta), vec!["/foo"]);
    assert_consistent(&graph, false);
}

#[tokio::test]
async fn cycle_with_a_weak_leaf_is_collected() {
    let project = cyclic_project();
    project.add_file("/weak", &[]);
    project.add_dependency(
        "/baz",
        TransformResultDependency::new("/weak").with_async_type(AsyncDependencyType::Weak),
    );
    let options = project.options().build();
    let mut graph = build(&options).await;
    assert!(!graph.contains("/weak"));

    project.remove_dependency("/bundle", "/foo");
    let delta = graph.traverse(["/bundle"], &options).await.unwrap();
    assert_eq!(deleted(&delta), vec!["/bar", "/baz", "/foo"]);
    assert_consistent(&graph, false);
}

#[tokio::test]
async fn cycle_with_an_async_leaf_is_collected_when_not_lazy() {
    let project = cyclic_project();
    project.add_file("/async", &[]);
    project.add_dependency(
        "/baz",
        TransformResultDependency::new("/async").with_async_type(AsyncDependencyType::Async),
    );
    let options = project.options().build();
    let mut graph = build(&options).await;
    assert!(graph.contains("/async"));

    project.remove_dependency("/bundle", "/foo");
    let delta = graph.traverse(["/bundle"], &options).await.unwrap();
    assert_eq!(deleted(&delta), vec!["/async", "/bar", "/baz", "/foo"]);
    assert_consistent(&graph, false);
}

#[tokio::test]
async fn releasing_a_chain_frees_it_without_collection() {
    let project = Arc::new(MockProject::new());
    project.add_file("/bundle", &["/a"]);
    project.add_file("/a", &["/b"]);
    project.add_file("/b", &["/c"]);
    project.add_file("/c", &[]);
    let options = project.options().build();
    let mut graph = build(&options).await;

    project.remove_dependency("/bundle", "/a");
    let delta = graph.traverse(["/bundle"], &options).await.unwrap();
    assert_eq!(deleted(&delta), vec!["/a", "/b", "/c"]);
    assert_eq!(graph.len(), 1);
    assert_consistent(&graph, false);
}

#[tokio::test]
async fn diamond_keeps_shared_child_until_last_parent_goes() {
    let project = Arc::new(MockProject::new());
    project.add_file("/bundle", &["/left", "/right"]);
    project.add_file("/left", &["/shared"]);
    project.add_file("/right", &["/shared"]);
    project.add_file("/shared", &[]);
    let options = project.options().build();
    let mut graph = build(&options).await;

    project.remove_dependency("/bundle", "/left");
    let delta = graph.traverse(["/bundle"], &options).await.unwrap();
    assert_eq!(deleted(&delta), vec!["/left"]);
    assert!(graph.contains("/shared"));
    assert_consistent(&graph, false);

    project.remove_dependency("/bundle", "/right");
    let delta = graph.traverse(["/bundle"], &options).await.unwrap();
    assert_eq!(deleted(&delta), vec!["/right", "/shared"]);
    assert_consistent(&graph, false);
}

/// `/bundle -> {/a, /b}`, both importing `/x -> /y`
fn shared_chain_project() -> Arc<MockProject> {
    let project = Arc::new(MockProject::new());
    project.add_file("/bundle", &["/a", "/b"]);
    project.add_file("/a", &["/x"]);
    project.add_file("/b", &["/x"]);
    project.add_file("/x", &["/y"]);
    project.add_file("/y", &[]);
    project
}

#[tokio::test]
async fn queued_root_losing_its_last_reference_is_freed() {
    let project = shared_chain_project();
    let options = project.options().build();
    let mut graph = build(&options).await;

    project.remove_dependency("/a", "/x");
    project.remove_dependency("/b", "/x");
    let delta = graph.traverse(["/a", "/b"], &options).await.unwrap();

    assert_eq!(keys(&delta.modified), vec!["/a", "/b"]);
    assert_eq!(deleted(&delta), vec!["/x", "/y"]);
    assert!(graph.color_of("/x").is_none());
    assert_consistent(&graph, false);
}

#[tokio::test]
async fn queued_root_referenced_again_keeps_its_dependencies() {
    let project = shared_chain_project();
    let options = project.options().build();
    let mut graph = build(&options).await;

    // /x is queued by /a, released by /b and imported again under a new key
    project.remove_dependency("/a", "/x");
    project.set_dependencies("/b", vec![TransformResultDependency::new("/x").with_key("k2")]);
    let delta = graph.traverse(["/a", "/b"], &options).await.unwrap();

    assert!(delta.added.is_empty());
    assert!(delta.deleted.is_empty());
    assert_eq!(keys(&delta.modified), vec!["/a", "/b", "/x", "/y"]);

    let x = graph.get("/x").unwrap();
    assert_eq!(x.resolved_targets().collect::<Vec<_>>(), vec!["/y"]);
    assert_eq!(x.inverse_dependencies.iter().collect::<Vec<_>>(), vec!["/b"]);
    assert_eq!(
        graph.get("/y").unwrap().inverse_dependencies.iter().collect::<Vec<_>>(),
        vec!["/x"]
    );
    assert_consistent(&graph, false);
}

#[tokio::test]
async fn released_module_does_not_reference_its_new_dependencies() {
    let project = Arc::new(MockProject::new());
    project.add_file("/bundle", &["/a"]);
    project.add_file("/a", &["/c"]);
    project.add_file("/c", &["/c"]);
    project.add_file("/d", &[]);
    let options = project.options().build();
    let mut graph = build(&options).await;

    // /c only keeps itself alive once /a is done, then drops the self import
    project.add_file("/a", &[]);
    project.add_file("/c", &["/d"]);
    let delta = graph.traverse(["/a", "/c"], &options).await.unwrap();

    assert_eq!(keys(&delta.modified), vec!["/a"]);
    assert_eq!(deleted(&delta), vec!["/c"]);
    assert!(delta.added.is_empty());
    assert!(!graph.contains("/d"));
    assert_eq!(project.transform_count("/d"), 0);
    assert_consistent(&graph, false);
}
