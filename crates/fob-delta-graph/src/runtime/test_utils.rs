//! In-memory project for exercising the graph without a real bundler.
//!
//! [`MockProject`] acts as both [`Transformer`] and [`Resolver`]. Each file
//! has a list of declared dependencies and a revision counter; the revision
//! feeds the validity stamp, so [`MockProject::touch`] is how a test says
//! "this file's bytes changed".
//!
//! ```rust,ignore
//! let project = Arc::new(MockProject::new());
//! project.add_file("/bundle", &["/foo"]);
//! project.add_file("/foo", &[]);
//!
//! let options = project.options().build();
//! let mut graph = Graph::new(GraphInput::new(["/bundle"]));
//! graph.initial_traverse(&options).await?;
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::json;

use super::{Resolver, RuntimeError, RuntimeResult, TransformResult, Transformer};
use crate::context::RequireContext;
use crate::module::{GetSource, MixedOutput, TransformResultDependency};
use crate::options::TraversalOptionsBuilder;
use crate::TraversalOptions;

#[derive(Debug, Clone)]
struct MockFile {
    dependencies: Vec<TransformResultDependency>,
    revision: u64,
}

#[derive(Debug, Default)]
struct MockState {
    files: IndexMap<String, MockFile>,
    transform_counts: FxHashMap<String, usize>,
    failing: FxHashSet<String>,
    delays: FxHashMap<String, Duration>,
}

/// Fake file tree implementing both collaborator traits.
#[derive(Debug, Default)]
pub struct MockProject {
    state: Mutex<MockState>,
}

impl MockProject {
    pub fn new() -> Self {
        Self::default()
    }

    /// Traversal options backed by this project.
    pub fn options(self: &Arc<Self>) -> TraversalOptionsBuilder<MixedOutput> {
        TraversalOptions::builder(self.clone(), self.clone())
    }

    /// Create (or replace) a file whose dependencies are plain imports.
    pub fn add_file(&self, path: &str, dependencies: &[&str]) {
        let dependencies = dependencies
            .iter()
            .map(|name| TransformResultDependency::new(*name))
            .collect();
        self.set_dependencies(path, dependencies);
    }

    /// Create or replace a file, bumping its revision.
    pub fn set_dependencies(&self, path: &str, dependencies: Vec<TransformResultDependency>) {
        let mut state = self.state.lock();
        let revision = state.files.get(path).map_or(0, |file| file.revision + 1);
        state.files.insert(
            path.to_string(),
            MockFile {
                dependencies,
                revision,
            },
        );
    }

    pub fn add_dependency(&self, path: &str, dependency: TransformResultDependency) {
        self.edit(path, |dependencies| dependencies.push(dependency));
    }

    /// Drop the dependency declared under `key`.
    pub fn remove_dependency(&self, path: &str, key: &str) {
        self.edit(path, |dependencies| dependencies.retain(|dep| dep.key != key));
    }

    pub fn remove_file(&self, path: &str) {
        self.state.lock().files.shift_remove(path);
    }

    /// Pretend the contents of `path` changed without touching its imports.
    pub fn touch(&self, path: &str) {
        self.edit(path, |_| {});
    }

    pub fn set_failing(&self, path: &str, failing: bool) {
        let mut state = self.state.lock();
        if failing {
            state.failing.insert(path.to_string());
        } else {
            state.failing.remove(path);
        }
    }

    /// Make transforms of `path` take `delay` before completing.
    pub fn set_delay(&self, path: &str, delay: Duration) {
        self.state.lock().delays.insert(path.to_string(), delay);
    }

    pub fn transform_count(&self, path: &str) -> usize {
        self.state
            .lock()
            .transform_counts
            .get(path)
            .copied()
            .unwrap_or(0)
    }

    /// Dependencies currently declared by `path`.
    pub fn declared(&self, path: &str) -> Vec<TransformResultDependency> {
        self.state
            .lock()
            .files
            .get(path)
            .map(|file| file.dependencies.clone())
            .unwrap_or_default()
    }

    pub fn exists(&self, path: &str) -> bool {
        self.state.lock().files.contains_key(path)
    }

    fn edit(&self, path: &str, f: impl FnOnce(&mut Vec<TransformResultDependency>)) {
        let mut state = self.state.lock();
        if let Some(file) = state.files.get_mut(path) {
            f(&mut file.dependencies);
            file.revision += 1;
        }
    }
}

#[async_trait]
impl Transformer<MixedOutput> for MockProject {
    async fn transform(
        &self,
        path: &str,
        context: Option<&RequireContext>,
    ) -> RuntimeResult<TransformResult<MixedOutput>> {
        let delay = self.state.lock().delays.get(path).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();
        *state.transform_counts.entry(path.to_string()).or_default() += 1;

        if state.failing.contains(path) {
            return Err(RuntimeError::Transform(format!(
                "SyntaxError: unexpected token in {path}"
            )));
        }

        // context modules depend on every matching file
        if let Some(context) = context {
            let matched: Vec<String> = state
                .files
                .keys()
                .filter(|file| context.matches(file))
                .cloned()
                .collect();
            let stamp = format!("{path}@[{}]", matched.join(","));
            let dependencies = matched
                .into_iter()
                .map(TransformResultDependency::new)
                .collect();
            let mut result = TransformResult::new(dependencies, vec![module_output(path, 0)]);
            result.unstable_transform_result_key = Some(stamp);
            return Ok(result);
        }

        let Some(file) = state.files.get(path) else {
            return Err(RuntimeError::Transform(format!(
                "ENOENT: no such file or directory, open '{path}'"
            )));
        };

        let source = format!("// {path} r{}", file.revision);
        Ok(TransformResult {
            dependencies: file.dependencies.clone(),
            output: vec![module_output(path, file.revision)],
            get_source: GetSource::from_bytes(source.into_bytes()),
            unstable_transform_result_key: Some(format!("{path}@{}", file.revision)),
        })
    }
}

impl Resolver for MockProject {
    fn resolve(&self, from: &str, dependency: &TransformResultDependency) -> RuntimeResult<String> {
        let candidate = if dependency.name.starts_with('/') {
            dependency.name.clone()
        } else {
            path_clean::clean(Path::new(from).join("..").join(&dependency.name))
                .to_string_lossy()
                .into_owned()
        };

        if self.state.lock().files.contains_key(&candidate) {
            Ok(candidate)
        } else {
            Err(RuntimeError::NotFound {
                specifier: dependency.name.clone(),
                from: from.to_string(),
            })
        }
    }
}

fn module_output(path: &str, revision: u64) -> MixedOutput {
    MixedOutput {
        data: json!({ "code": format!("__d(\"{path}\")"), "revision": revision }),
        output_type: "js/module".to_string(),
    }
}
