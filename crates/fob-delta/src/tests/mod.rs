
use std::sync::Arc;

use fob_delta_graph::test_utils::MockProject;
use fob_delta_graph::{DeltaResult, MixedOutput};

use crate::{DeltaCalculator, DeltaCalculatorOptions};

/// `/bundle -> /foo -> {/bar, /baz}`
pub(crate) fn basic_project() -> Arc<MockProject> {
    let project = Arc::new(MockProject::new());
    project.add_file("/bundle", &["/foo"]);
    project.add_file("/foo", &["/bar", "/baz"]);
    project.add_file("/bar", &[]);
    project.add_file("/baz", &[]);
    project
}

pub(crate) fn options(project: &Arc<MockProject>) -> DeltaCalculatorOptions {
    DeltaCalculatorOptions::new(project.clone(), project.clone())
}

pub(crate) fn calculator(project: &Arc<MockProject>) -> DeltaCalculator {
    DeltaCalculator::new(["/bundle"], options(project)).expect("valid options")
}

fn sorted(mut paths: Vec<&str>) -> Vec<&str> {
    paths.sort_unstable();
    paths
}

/// Sorted `(added, modified, deleted)` paths of a delta.
pub(crate) fn summary(delta: &DeltaResult<MixedOutput>) -> (Vec<&str>, Vec<&str>, Vec<&str>) {
    (
        sorted(delta.added.keys().map(String::as_str).collect()),
        sorted(delta.modified.keys().map(String::as_str).collect()),
        sorted(delta.deleted.iter().map(String::as_str).collect()),
    )
}
