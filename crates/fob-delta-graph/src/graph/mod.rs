//! The graph store.
//!
//! Modules live in a path-keyed table; every edge is a key lookup into that
//! table, never an owning reference, so the cycle collector can walk and
//! mutate cycles freely. Iteration order of the table is meaningful: after an
//! initial traversal (or an explicit reorder) it is the depth-first visiting
//! order from the entry points.

mod delta;
mod gc;
mod reorder;
mod traversal;

pub use delta::DeltaResult;
pub use gc::NodeColor;

use indexmap::{IndexMap, IndexSet};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::context::RequireContext;
use crate::counting_set::CountingSet;
use crate::module::{Dependency, MixedOutput, Module};
use crate::options::TransformInputOptions;

use gc::GcState;

/// Arguments for [`Graph::new`].
#[derive(Debug, Clone, Default)]
pub struct GraphInput {
    pub entry_points: IndexSet<String>,
    pub transform_options: TransformInputOptions,
}

impl GraphInput {
    pub fn new<I, S>(entry_points: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entry_points: entry_points.into_iter().map(Into::into).collect(),
            transform_options: TransformInputOptions::default(),
        }
    }

    pub fn with_transform_options(mut self, transform_options: TransformInputOptions) -> Self {
        self.transform_options = transform_options;
        self
    }
}

/// Incremental module graph.
#[derive(Debug)]
pub struct Graph<T = MixedOutput> {
    entry_points: IndexSet<String>,
    transform_options: TransformInputOptions,
    pub(crate) dependencies: IndexMap<String, Module<T>>,
    /// Lazily imported targets under lazy mode, with the parents importing them.
    pub(crate) import_bundle_nodes: FxHashMap<String, CountingSet<String>>,
    pub(crate) resolved_contexts: FxHashMap<String, RequireContext>,
    pub(crate) gc: GcState,
}

impl<T> Graph<T> {
    pub fn new(input: GraphInput) -> Self {
        Self {
            entry_points: input.entry_points,
            transform_options: input.transform_options,
            dependencies: IndexMap::new(),
            import_bundle_nodes: FxHashMap::default(),
            resolved_contexts: FxHashMap::default(),
            gc: GcState::default(),
        }
    }

    pub fn entry_points(&self) -> &IndexSet<String> {
        &self.entry_points
    }

    pub fn transform_options(&self) -> &TransformInputOptions {
        &self.transform_options
    }

    /// All modules, in table order.
    pub fn dependencies(&self) -> &IndexMap<String, Module<T>> {
        &self.dependencies
    }

    pub fn get(&self, path: &str) -> Option<&Module<T>> {
        self.dependencies.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.dependencies.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.dependencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }

    pub fn is_entry_point(&self, path: &str) -> bool {
        self.entry_points.contains(path)
    }

    /// Context descriptor registered under a virtual context path.
    pub fn get_resolved_context(&self, path: &str) -> Option<&RequireContext> {
        self.resolved_contexts.get(path)
    }

    /// Whether `path` is only referenced through lazy imports.
    pub fn is_lazy_import(&self, path: &str) -> bool {
        self.import_bundle_nodes.contains_key(path)
    }

    pub fn lazy_imports(&self) -> impl Iterator<Item = &str> {
        self.import_bundle_nodes.keys().map(String::as_str)
    }

    /// Drop every module and all bookkeeping, keeping the entry points.
    ///
    /// The next traversal has to be an initial one.
    pub fn clear_modules(&mut self) {
        self.dependencies.clear();
        self.import_bundle_nodes.clear();
        self.resolved_contexts.clear();
        self.gc.clear();
    }

    /// Add every context module whose descriptor matches `file_path`.
    pub fn mark_modified_context_modules(
        &self,
        file_path: &str,
        modified_paths: &mut FxHashSet<String>,
    ) {
        for (absolute_path, context) in &self.resolved_contexts {
            if !modified_paths.contains(absolute_path) && context.matches(file_path) {
                modified_paths.insert(absolute_path.clone());
            }
        }
    }

    /// Modules that have to be re-processed because `file_path` was deleted.
    ///
    /// May contain duplicates.
    pub fn get_modified_modules_for_deleted_path(&self, file_path: &str) -> Vec<String> {
        let direct = self
            .dependencies
            .get(file_path)
            .into_iter()
            .flat_map(|module| module.inverse_dependencies.iter());
        let lazy = self
            .import_bundle_nodes
            .get(file_path)
            .into_iter()
            .flat_map(|parents| parents.iter());
        direct.chain(lazy).cloned().collect()
    }

    /// Compare inverse dependencies against the live edges of the graph.
    ///
    /// Returns one message per violation; an empty list means the reference
    /// counts are consistent.
    pub fn check_invariants(&self, lazy: bool) -> Vec<String> {
        let mut expected: FxHashMap<&str, CountingSet<&str>> = FxHashMap::default();
        let mut expected_lazy: FxHashMap<&str, CountingSet<&str>> = FxHashMap::default();

        for (parent, module) in &self.dependencies {
            for dependency in module.dependencies.values() {
                let Dependency::Resolved {
                    absolute_path,
                    data,
                } = dependency
                else {
                    continue;
                };
                if data.is_weak() {
                    continue;
                }
                if lazy && data.is_lazy_candidate() {
                    expected_lazy
                        .entry(absolute_path.as_str())
                        .or_default()
                        .add(parent.as_str());
                } else if self.dependencies.contains_key(absolute_path) {
                    expected
                        .entry(absolute_path.as_str())
                        .or_default()
                        .add(parent.as_str());
                }
            }
        }

        let mut violations = Vec::new();
        for (path, module) in &self.dependencies {
            let actual: CountingSet<&str> =
                counts_of(&module.inverse_dependencies).into_iter().collect();
            let wanted = expected.remove(path.as_str()).unwrap_or_default();
            if actual != wanted {
                violations.push(format!(
                    "{path}: inverse dependencies {actual:?} do not match live edges {wanted:?}"
                ));
            }
            if module.inverse_dependencies.is_empty() && !self.is_entry_point(path) {
                violations.push(format!("{path}: unreferenced module kept alive"));
            }
        }

        for (path, parents) in &self.import_bundle_nodes {
            let actual: CountingSet<&str> = counts_of(parents).into_iter().collect();
            let wanted = expected_lazy.remove(path.as_str()).unwrap_or_default();
            if actual != wanted {
                violations.push(format!(
                    "{path}: lazy import parents {actual:?} do not match live edges {wanted:?}"
                ));
            }
        }
        for (path, parents) in expected_lazy {
            violations.push(format!(
                "{path}: lazy import from {parents:?} is not tracked"
            ));
        }

        for entry_point in &self.entry_points {
            if !self.dependencies.is_empty() && !self.dependencies.contains_key(entry_point) {
                violations.push(format!("{entry_point}: entry point missing from graph"));
            }
        }

        if !self.gc.possible_cycle_roots.is_empty() {
            violations.push(format!(
                "cycle roots left after collection: {:?}",
                self.gc.possible_cycle_roots
            ));
        }

        violations
    }
}

/// Expand a counting set into one item per reference.
fn counts_of(set: &CountingSet<String>) -> Vec<&str> {
    set.iter()
        .flat_map(|value| std::iter::repeat_n(value.as_str(), set.count(value)))
        .collect()
}
