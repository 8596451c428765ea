//! Incremental traversal and dependency diffing.
//!
//! A traversal owns the graph exclusively for its whole duration. Sibling
//! dependencies are processed concurrently on the calling task, so the
//! graph and the delta sit behind a mutex that is only ever held between
//! suspension points, never across one.

use std::path::Path;

use futures::future::{BoxFuture, FutureExt, try_join_all};
use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::{debug, trace};

use super::Graph;
use super::delta::{Delta, DeltaResult};
use crate::context::{RequireContext, derive_absolute_path_from_context};
use crate::counting_set::CountingSet;
use crate::module::{Dependency, Module, TransformResultDependency};
use crate::options::TraversalOptions;
use crate::runtime::TransformResult;
use crate::{GraphError, Result};

struct TraversalState<'a, T> {
    graph: &'a mut Graph<T>,
    delta: Delta,
    processed: usize,
    total: usize,
}

struct Traversal<'a, T> {
    state: Mutex<TraversalState<'a, T>>,
    options: &'a TraversalOptions<T>,
}

impl<T> Graph<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Build the graph from its entry points.
    ///
    /// The graph must be empty. Every module ends up in `added`, in
    /// depth-first order, and the result is flagged as a reset.
    pub async fn initial_traverse(
        &mut self,
        options: &TraversalOptions<T>,
    ) -> Result<DeltaResult<T>> {
        if !self.dependencies.is_empty() {
            return Err(GraphError::NonEmptyGraph);
        }

        self.gc.clear();
        self.import_bundle_nodes.clear();

        let entry_points: Vec<String> = self.entry_points().iter().cloned().collect();
        debug!(entry_points = entry_points.len(), "initial traversal");

        let mut delta = Delta::default();
        for path in &entry_points {
            // entry points hold an implicit reference
            self.mark_module_in_use(path);
            // an entry point reached as a dependency of another one is in flight
            delta
                .early_inverse_dependencies
                .insert(path.clone(), CountingSet::new());
        }

        let traversal = Traversal::new(&mut *self, options, delta);
        try_join_all(
            entry_points
                .iter()
                .map(|path| traversal.traverse_single_file(path.clone())),
        )
        .await?;
        drop(traversal);

        self.reorder_graph(options.shallow)?;

        Ok(DeltaResult {
            added: self.dependencies.clone(),
            reset: true,
            ..DeltaResult::empty()
        })
    }

    /// Re-process `paths` and everything newly reachable from them.
    ///
    /// Paths that are not in the graph are ignored. On error, nothing is
    /// reported and modules touched so far lose their validity stamps, so
    /// retrying the same paths reports them again.
    pub async fn traverse<I, S>(
        &mut self,
        paths: I,
        options: &TraversalOptions<T>,
    ) -> Result<DeltaResult<T>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let traversal = Traversal::new(&mut *self, options, Delta::default());

        let mut outcome = Ok(());
        for path in paths {
            let path = path.as_ref();
            if !traversal.state.lock().graph.contains(path) {
                continue;
            }
            outcome = traversal.traverse_single_file(path.to_string()).await;
            if outcome.is_err() {
                break;
            }
        }

        let mut delta = traversal.into_delta();
        if let Err(err) = outcome {
            self.invalidate_touched_modules(&delta);
            return Err(err);
        }

        self.collect_cycles(&mut delta, options.lazy);
        self.reorder_graph(options.shallow)?;

        let added = delta
            .added
            .iter()
            .map(|path| self.reported_module(path))
            .collect::<Result<IndexMap<_, _>>>()?;
        let modified = delta
            .modified
            .iter()
            .filter(|path| !delta.added.contains(*path) && !delta.deleted.contains(*path))
            .map(|path| self.reported_module(path))
            .collect::<Result<IndexMap<_, _>>>()?;

        debug!(
            added = added.len(),
            modified = modified.len(),
            deleted = delta.deleted.len(),
            "traversal finished"
        );

        Ok(DeltaResult {
            added,
            modified,
            deleted: delta.deleted.into_iter().collect(),
            reset: false,
        })
    }

    fn reported_module(&self, path: &str) -> Result<(String, Module<T>)> {
        self.dependencies
            .get(path)
            .map(|module| (path.to_string(), module.clone()))
            .ok_or_else(|| GraphError::Consistency(format!("reported module {path} is missing")))
    }

    fn invalidate_touched_modules(&mut self, delta: &Delta) {
        for path in delta.added.iter().chain(delta.modified.iter()) {
            if let Some(module) = self.dependencies.get_mut(path) {
                module.unstable_transform_result_key = None;
            }
        }
    }
}

enum ModuleUpdate {
    Unchanged,
    /// Dropping its own edges left the module unreferenced.
    Released,
    Changed(Vec<(String, Dependency)>),
}

type Contexts = Vec<(String, RequireContext)>;

impl<'a, T> Traversal<'a, T>
where
    T: Clone + Send + Sync + 'static,
{
    fn new(graph: &'a mut Graph<T>, options: &'a TraversalOptions<T>, delta: Delta) -> Self {
        Self {
            state: Mutex::new(TraversalState {
                graph,
                delta,
                processed: 0,
                total: 0,
            }),
            options,
        }
    }

    fn into_delta(self) -> Delta {
        self.state.into_inner().delta
    }

    fn on_dependency_add(&self) {
        let (processed, total) = {
            let mut state = self.state.lock();
            state.total += 1;
            (state.processed, state.total)
        };
        if let Some(on_progress) = &self.options.on_progress {
            on_progress(processed, total);
        }
    }

    fn on_dependency_added(&self) {
        let (processed, total) = {
            let mut state = self.state.lock();
            state.processed += 1;
            (state.processed, state.total)
        };
        if let Some(on_progress) = &self.options.on_progress {
            on_progress(processed, total);
        }
    }

    async fn traverse_single_file(&self, path: String) -> Result<()> {
        self.on_dependency_add();
        self.process_module(path).await?;
        self.on_dependency_added();
        Ok(())
    }

    fn process_module(&self, path: String) -> BoxFuture<'_, Result<()>> {
        async move {
            let context = self
                .state
                .lock()
                .graph
                .resolved_contexts
                .get(&path)
                .cloned();

            trace!(path = %path, "transforming");
            let result = self
                .options
                .transformer
                .transform(&path, context.as_ref())
                .await
                .map_err(|source| GraphError::Transform {
                    path: path.clone(),
                    source,
                })?;

            let (current, contexts) = self.resolve_dependencies(&path, &result.dependencies)?;

            let additions = match self.update_module(&path, result, &current, contexts)? {
                ModuleUpdate::Unchanged | ModuleUpdate::Released => return Ok(()),
                ModuleUpdate::Changed(additions) => additions,
            };

            try_join_all(
                additions
                    .into_iter()
                    .map(|(key, dependency)| self.add_dependency(&path, key, dependency)),
            )
            .await?;

            let mut state = self.state.lock();
            if let Some(module) = state.graph.dependencies.get_mut(&path) {
                if module.dependencies.len() != current.len() {
                    return Err(GraphError::Consistency(format!(
                        "failed to add the dependencies of {path}"
                    )));
                }
                // same edges, declaration order
                module.dependencies = current;
            }
            Ok(())
        }
        .boxed()
    }

    /// Store the transform result and remove edges that went away.
    ///
    /// Returns the edges still to be added, or `Unchanged` when the module
    /// kept both its validity stamp and its edges. Context descriptors are
    /// registered once the removals are done, since a removal may free the
    /// very context module that is about to be added back.
    fn update_module(
        &self,
        path: &str,
        result: TransformResult<T>,
        current: &IndexMap<String, Dependency>,
        contexts: Contexts,
    ) -> Result<ModuleUpdate> {
        let lazy = self.options.lazy;
        let mut guard = self.state.lock();
        let TraversalState { graph, delta, .. } = &mut *guard;

        let previous = graph
            .dependencies
            .get(path)
            .map(|module| {
                (
                    module.dependencies.clone(),
                    module.unstable_transform_result_key.clone(),
                )
            });
        let existed = previous.is_some();
        let (previous_dependencies, previous_key) = previous.unwrap_or_default();

        let removals: Vec<(String, Dependency)> = previous_dependencies
            .iter()
            .filter(|(key, previous)| {
                current
                    .get(*key)
                    .is_none_or(|current| !previous.is_equivalent(current, lazy))
            })
            .map(|(key, dependency)| (key.clone(), dependency.clone()))
            .collect();
        let additions: Vec<(String, Dependency)> = current
            .iter()
            .filter(|(key, current)| {
                previous_dependencies
                    .get(*key)
                    .is_none_or(|previous| !previous.is_equivalent(current, lazy))
            })
            .map(|(key, dependency)| (key.clone(), dependency.clone()))
            .collect();

        if existed {
            let same_output = previous_key.is_some()
                && previous_key == result.unstable_transform_result_key;
            if same_output && removals.is_empty() && additions.is_empty() {
                trace!(path, "module unchanged");
                return Ok(ModuleUpdate::Unchanged);
            }
            delta.modified.insert(path.to_string());
        } else {
            let inverse_dependencies = delta
                .early_inverse_dependencies
                .remove(path)
                .unwrap_or_default();
            graph.dependencies.insert(
                path.to_string(),
                Module::new(path.to_string(), inverse_dependencies),
            );
        }

        if let Some(module) = graph.dependencies.get_mut(path) {
            module.output = result.output;
            module.get_source = result.get_source;
            module.unstable_transform_result_key = result.unstable_transform_result_key;
        }

        for (key, dependency) in &removals {
            graph.remove_dependency(path, key, dependency, delta, lazy)?;
            if !graph.dependencies.contains_key(path) {
                trace!(path, "released while updating");
                return Ok(ModuleUpdate::Released);
            }
        }

        graph.resolved_contexts.extend(contexts);

        Ok(ModuleUpdate::Changed(additions))
    }

    async fn add_dependency(&self, parent: &str, key: String, dependency: Dependency) -> Result<()> {
        if let Dependency::Resolved {
            absolute_path,
            data,
        } = &dependency
        {
            if self.options.shallow || data.is_weak() {
                // no node for single-module graphs or weak imports
            } else if self.options.lazy && data.is_lazy_candidate() {
                self.state
                    .lock()
                    .graph
                    .increment_import_bundle_reference(absolute_path, parent);
            } else {
                self.reference_module(parent, absolute_path).await?;
            }
        }

        // the edge is recorded even when no node backs it
        if let Some(module) = self.state.lock().graph.dependencies.get_mut(parent) {
            module.dependencies.insert(key, dependency);
        }
        Ok(())
    }

    /// Add `parent` as a reference of `path`, creating `path` if needed.
    async fn reference_module(&self, parent: &str, path: &str) -> Result<()> {
        let needs_processing = {
            let mut guard = self.state.lock();
            let TraversalState { graph, delta, .. } = &mut *guard;
            if graph.dependencies.contains_key(path) {
                false
            } else if let Some(early) = delta.early_inverse_dependencies.get_mut(path) {
                // being transformed right now by another parent
                early.add(parent.to_string());
                return Ok(());
            } else {
                delta.mark_added(path);
                delta
                    .early_inverse_dependencies
                    .insert(path.to_string(), CountingSet::new());
                true
            }
        };

        if needs_processing {
            self.on_dependency_add();
            self.process_module(path.to_string()).await?;
            self.on_dependency_added();
        }

        let mut guard = self.state.lock();
        let graph = &mut *guard.graph;
        if let Some(module) = graph.dependencies.get_mut(path) {
            module.inverse_dependencies.add(parent.to_string());
            graph.mark_module_in_use(path);
        }
        Ok(())
    }

    /// Resolve declared dependencies, keyed by dependency key.
    ///
    /// Context dependencies come back with their compiled descriptor. Optional
    /// dependencies that fail to resolve stay in place as unresolved edges.
    fn resolve_dependencies(
        &self,
        parent: &str,
        dependencies: &[TransformResultDependency],
    ) -> Result<(IndexMap<String, Dependency>, Contexts)> {
        let mut resolved = IndexMap::with_capacity(dependencies.len());
        let mut contexts = Contexts::new();

        for data in dependencies {
            let dependency = if let Some(params) = &data.context_params {
                let from = context_directory(parent, &data.name);
                let absolute_path = derive_absolute_path_from_context(&from, params);
                contexts.push((absolute_path.clone(), RequireContext::new(from, params)?));
                Dependency::Resolved {
                    absolute_path,
                    data: data.clone(),
                }
            } else {
                match self.options.resolver.resolve(parent, data) {
                    Ok(absolute_path) => {
                        // the path may have been a context module before
                        self.state
                            .lock()
                            .graph
                            .resolved_contexts
                            .remove(&absolute_path);
                        Dependency::Resolved {
                            absolute_path,
                            data: data.clone(),
                        }
                    }
                    Err(err) if data.is_optional => {
                        debug!(from = parent, name = %data.name, error = %err, "skipping optional dependency");
                        Dependency::Unresolved { data: data.clone() }
                    }
                    Err(source) => {
                        return Err(GraphError::Resolution {
                            from: parent.to_string(),
                            name: data.name.clone(),
                            source,
                        });
                    }
                }
            };

            if resolved.contains_key(&data.key) {
                return Err(GraphError::DuplicateDependencyKey {
                    key: data.key.clone(),
                    path: parent.to_string(),
                });
            }
            resolved.insert(data.key.clone(), dependency);
        }

        Ok((resolved, contexts))
    }
}

/// Directory a `require.context(name)` call in `parent` points at.
fn context_directory(parent: &str, name: &str) -> String {
    path_clean::clean(Path::new(parent).join("..").join(name))
        .to_string_lossy()
        .into_owned()
}
