//! `require.context` dependencies and their virtual modules.

use std::sync::Arc;

use rustc_hash::FxHashSet;

use super::{assert_consistent, build, deleted, keys};
use crate::test_utils::MockProject;
use crate::{
    ContextFilter, ContextMode, GraphError, RequireContextParams, TransformResultDependency,
    derive_absolute_path_from_context,
};

fn params(pattern: &str) -> RequireContextParams {
    RequireContextParams {
        recursive: true,
        filter: ContextFilter::new(pattern, ""),
        mode: ContextMode::Sync,
    }
}

fn context_import(key: &str, pattern: &str) -> TransformResultDependency {
    TransformResultDependency::new("./ctx")
        .with_key(key)
        .with_context(params(pattern))
}

/// `/bundle` holds two contexts over `/ctx`, one of them narrowed to
/// `/ctx/narrow`.
fn context_project() -> Arc<MockProject> {
    let project = Arc::new(MockProject::new());
    project.set_dependencies(
        "/bundle",
        vec![
            context_import("all", ".*"),
            context_import("narrow", r"\./narrow/.*"),
        ],
    );
    project.add_file("/ctx/narrow/a.js", &[]);
    project
}

fn all_path() -> String {
    derive_absolute_path_from_context("/ctx", &params(".*"))
}

fn narrow_path() -> String {
    derive_absolute_path_from_context("/ctx", &params(r"\./narrow/.*"))
}

#[tokio::test]
async fn contexts_become_virtual_modules() {
    let project = context_project();
    let options = project.options().build();
    let graph = build(&options).await;

    assert_eq!(graph.len(), 4);
    assert!(graph.get_resolved_context(&all_path()).is_some());
    assert!(graph.get_resolved_context(&narrow_path()).is_some());
    assert_eq!(
        graph.get_resolved_context(&all_path()).unwrap().from,
        "/ctx"
    );

    let matched = graph.get("/ctx/narrow/a.js").unwrap();
    assert_eq!(matched.inverse_dependencies.len(), 2);
    assert!(matched.inverse_dependencies.contains(all_path().as_str()));
    assert!(matched.inverse_dependencies.contains(narrow_path().as_str()));
}

#[tokio::test]
async fn new_files_mark_matching_contexts() {
    let project = context_project();
    let options = project.options().build();
    let mut graph = build(&options).await;

    let mut modified = FxHashSet::default();
    graph.mark_modified_context_modules("/ctx/b.js", &mut modified);
    assert_eq!(modified.len(), 1);
    assert!(modified.contains(&all_path()));

    let mut modified = FxHashSet::default();
    graph.mark_modified_context_modules("/ctx/narrow/c.js", &mut modified);
    assert_eq!(modified.len(), 2);

    let mut modified = FxHashSet::default();
    graph.mark_modified_context_modules("/elsewhere/c.js", &mut modified);
    assert!(modified.is_empty());

    project.add_file("/ctx/narrow/c.js", &[]);
    let mut paths = FxHashSet::default();
    graph.mark_modified_context_modules("/ctx/narrow/c.js", &mut paths);
    let delta = graph.traverse(paths, &options).await.unwrap();

    assert_eq!(keys(&delta.added), vec!["/ctx/narrow/c.js"]);
    assert_eq!(delta.modified.len(), 2);
    assert!(delta.deleted.is_empty());
    assert_consistent(&graph, false);
}

#[tokio::test]
async fn removing_one_context_keeps_the_other() {
    let project = context_project();
    let options = project.options().build();
    let mut graph = build(&options).await;

    project.set_dependencies("/bundle", vec![context_import("all", ".*")]);
    let delta = graph.traverse(["/bundle"], &options).await.unwrap();

    let narrow = narrow_path();
    assert_eq!(deleted(&delta), vec![narrow.as_str()]);
    assert!(graph.get_resolved_context(&narrow).is_none());
    assert!(graph.get_resolved_context(&all_path()).is_some());
    assert!(graph.contains("/ctx/narrow/a.js"));
    assert_consistent(&graph, false);
}

#[tokio::test]
async fn changing_context_params_replaces_the_virtual_module() {
    let project = context_project();
    let options = project.options().build();
    let mut graph = build(&options).await;

    let exact = r"\./narrow/a\.js$";
    project.set_dependencies(
        "/bundle",
        vec![context_import("all", ".*"), context_import("narrow", exact)],
    );
    let delta = graph.traverse(["/bundle"], &options).await.unwrap();

    let replacement = derive_absolute_path_from_context("/ctx", &params(exact));
    assert_eq!(keys(&delta.added), vec![replacement.as_str()]);
    assert_eq!(deleted(&delta), vec![narrow_path().as_str()]);
    assert!(graph.get_resolved_context(&replacement).is_some());
    assert_consistent(&graph, false);
}

#[tokio::test]
async fn renamed_context_import_is_transformed_as_a_context() {
    let project = context_project();
    let options = project.options().build();
    let mut graph = build(&options).await;

    // the old key frees the virtual module, the new key brings it back
    project.set_dependencies(
        "/bundle",
        vec![
            context_import("renamed", ".*"),
            context_import("narrow", r"\./narrow/.*"),
        ],
    );
    let delta = graph.traverse(["/bundle"], &options).await.unwrap();

    let all = all_path();
    assert!(delta.added.is_empty());
    assert!(delta.deleted.is_empty());
    assert_eq!(keys(&delta.modified), vec!["/bundle", all.as_str()]);
    assert_eq!(graph.get_resolved_context(&all).unwrap().from, "/ctx");
    assert_eq!(
        graph.get(&all).unwrap().resolved_targets().collect::<Vec<_>>(),
        vec!["/ctx/narrow/a.js"]
    );
    assert_consistent(&graph, false);
}

#[tokio::test]
async fn non_recursive_context_skips_subdirectories() {
    let project = Arc::new(MockProject::new());
    project.set_dependencies(
        "/bundle",
        vec![TransformResultDependency::new("./ctx").with_context(RequireContextParams {
            recursive: false,
            ..params(".*")
        })],
    );
    project.add_file("/ctx/top.js", &[]);
    project.add_file("/ctx/nested/deep.js", &[]);
    let options = project.options().build();
    let graph = build(&options).await;

    assert!(graph.contains("/ctx/top.js"));
    assert!(!graph.contains("/ctx/nested/deep.js"));
}

#[tokio::test]
async fn invalid_context_filter_fails_the_traversal() {
    let project = Arc::new(MockProject::new());
    project.set_dependencies(
        "/bundle",
        vec![
            TransformResultDependency::new("./ctx").with_context(RequireContextParams {
                filter: ContextFilter::new(".*", "x"),
                ..params(".*")
            }),
        ],
    );
    let options = project.options().build();
    let mut graph: crate::Graph = crate::Graph::new(crate::GraphInput::new(["/bundle"]));

    let err = graph.initial_traverse(&options).await.unwrap_err();
    assert!(matches!(err, GraphError::InvalidContextFilter { .. }));
}
