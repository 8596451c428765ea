//! Reference counting and synchronous cycle collection.
//!
//! A module stays alive while it has inverse dependencies or is an entry
//! point. Dropping the last reference frees it right away, together with
//! whatever it alone kept alive; dropping any other reference makes it a
//! *possible cycle root*. Once a traversal has
//! applied all of its edge changes, [`Graph::collect_cycles`] runs the
//! Bacon–Rajan trial deletion over those roots:
//!
//! 1. mark: paint each purple root's subgraph gray, removing the inverse
//!    dependency of every edge walked;
//! 2. scan: nodes that still have references (or are entry points) are
//!    painted black again with their edges restored, the rest turn white;
//! 3. collect: white nodes are freed.

use rustc_hash::FxHashMap;
use tracing::trace;

use super::Graph;
use super::delta::{Delta, FxIndexSet};
use crate::module::Dependency;
use crate::{GraphError, Result};

/// Cycle collector color of a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeColor {
    /// In use or free
    Black,
    /// Possible member of a garbage cycle
    Gray,
    /// Member of a garbage cycle
    White,
    /// Possible root of a garbage cycle
    Purple,
    /// Acyclic
    Green,
}

#[derive(Debug, Default)]
pub(crate) struct GcState {
    pub color: FxHashMap<String, NodeColor>,
    pub possible_cycle_roots: FxIndexSet<String>,
}

impl GcState {
    pub fn clear(&mut self) {
        self.color.clear();
        self.possible_cycle_roots.clear();
    }
}

impl<T> Graph<T> {
    pub fn color_of(&self, path: &str) -> Option<NodeColor> {
        self.gc.color.get(path).copied()
    }

    pub(crate) fn mark_module_in_use(&mut self, path: &str) {
        self.gc.color.insert(path.to_string(), NodeColor::Black);
    }

    /// References a module holds, one entry per edge.
    ///
    /// Weak edges, lazy edges under lazy mode and edges to modules outside
    /// the table are not references.
    fn children(&self, path: &str, lazy: bool) -> Vec<String> {
        let Some(module) = self.dependencies.get(path) else {
            return Vec::new();
        };
        module
            .dependencies
            .values()
            .filter_map(|dependency| match dependency {
                Dependency::Resolved {
                    absolute_path,
                    data,
                } if !data.is_weak() && !(lazy && data.is_lazy_candidate()) => {
                    Some(absolute_path)
                }
                _ => None,
            })
            .filter(|target| self.dependencies.contains_key(target.as_str()))
            .cloned()
            .collect()
    }

    fn has_references(&self, path: &str) -> bool {
        self.is_entry_point(path)
            || self
                .dependencies
                .get(path)
                .is_some_and(|module| !module.inverse_dependencies.is_empty())
    }

    pub(crate) fn increment_import_bundle_reference(&mut self, target: &str, parent: &str) {
        self.import_bundle_nodes
            .entry(target.to_string())
            .or_default()
            .add(parent.to_string());
    }

    pub(crate) fn decrement_import_bundle_reference(
        &mut self,
        target: &str,
        parent: &str,
    ) -> Result<()> {
        let Some(parents) = self.import_bundle_nodes.get_mut(target) else {
            return Err(GraphError::Consistency(format!(
                "lazy import of {target} from {parent} was never recorded"
            )));
        };
        if !parents.contains(parent) {
            return Err(GraphError::Consistency(format!(
                "lazy import of {target} is not referenced by {parent}"
            )));
        }
        parents.remove(parent);
        if parents.is_empty() {
            self.import_bundle_nodes.remove(target);
        }
        Ok(())
    }

    /// Remove the edge `key` of `parent` and drop the reference it held.
    pub(crate) fn remove_dependency(
        &mut self,
        parent: &str,
        key: &str,
        dependency: &Dependency,
        delta: &mut Delta,
        lazy: bool,
    ) -> Result<()> {
        if let Some(parent_module) = self.dependencies.get_mut(parent) {
            parent_module.dependencies.shift_remove(key);
        }

        let Dependency::Resolved {
            absolute_path,
            data,
        } = dependency
        else {
            return Ok(());
        };
        if data.is_weak() {
            return Ok(());
        }
        if lazy && data.is_lazy_candidate() {
            return self.decrement_import_bundle_reference(absolute_path, parent);
        }

        let Some(module) = self.dependencies.get_mut(absolute_path.as_str()) else {
            return Ok(());
        };
        module.inverse_dependencies.remove(parent);

        if self.has_references(absolute_path) {
            self.mark_as_possible_cycle_root(absolute_path);
            Ok(())
        } else {
            self.release_module(absolute_path, delta, lazy)
        }
    }

    /// Called once the reference count of `path` reached zero.
    fn release_module(&mut self, path: &str, delta: &mut Delta, lazy: bool) -> Result<()> {
        let edges: Vec<(String, Dependency)> = match self.dependencies.get(path) {
            Some(module) => module
                .dependencies
                .iter()
                .map(|(key, dependency)| (key.clone(), dependency.clone()))
                .collect(),
            None => return Ok(()),
        };
        for (key, dependency) in &edges {
            // a cycle back to `path` may have freed it already
            if !self.dependencies.contains_key(path) {
                return Ok(());
            }
            self.remove_dependency(path, key, dependency, delta, lazy)?;
        }
        // a queued root leaves the queue too; a later reference recreates it
        if self.dependencies.contains_key(path) {
            self.free_module(path, delta);
        }
        Ok(())
    }

    pub(crate) fn free_module(&mut self, path: &str, delta: &mut Delta) {
        trace!(path, "freeing module");
        delta.mark_deleted(path);
        self.dependencies.shift_remove(path);
        delta.early_inverse_dependencies.remove(path);
        self.gc.possible_cycle_roots.shift_remove(path);
        self.gc.color.remove(path);
        self.resolved_contexts.remove(path);
    }

    fn mark_as_possible_cycle_root(&mut self, path: &str) {
        if self.color_of(path) != Some(NodeColor::Purple) {
            self.gc.color.insert(path.to_string(), NodeColor::Purple);
            self.gc.possible_cycle_roots.insert(path.to_string());
        }
    }

    /// Free every cycle that lost its last external reference.
    pub(crate) fn collect_cycles(&mut self, delta: &mut Delta, lazy: bool) {
        if self.gc.possible_cycle_roots.is_empty() {
            return;
        }
        trace!(
            roots = self.gc.possible_cycle_roots.len(),
            "collecting cycles"
        );

        let roots: Vec<String> = self.gc.possible_cycle_roots.iter().cloned().collect();
        for path in &roots {
            if !self.gc.possible_cycle_roots.contains(path) {
                continue;
            }
            if self.color_of(path) == Some(NodeColor::Purple) {
                self.mark_gray(path, lazy);
            } else {
                // referenced again since it was queued
                self.gc.possible_cycle_roots.shift_remove(path);
            }
        }

        let roots: Vec<String> = self.gc.possible_cycle_roots.iter().cloned().collect();
        for path in &roots {
            self.scan(path, lazy);
        }

        let roots: Vec<String> = self.gc.possible_cycle_roots.iter().cloned().collect();
        for path in &roots {
            self.gc.possible_cycle_roots.swap_remove(path);
            self.collect_white(path, delta, lazy);
        }
    }

    fn mark_gray(&mut self, path: &str, lazy: bool) {
        if self.color_of(path) == Some(NodeColor::Gray) {
            return;
        }
        self.gc.color.insert(path.to_string(), NodeColor::Gray);
        for child in self.children(path, lazy) {
            // restored by scan_black if the child turns out to be live
            if let Some(module) = self.dependencies.get_mut(&child) {
                module.inverse_dependencies.remove(path);
            }
            self.mark_gray(&child, lazy);
        }
    }

    fn scan(&mut self, path: &str, lazy: bool) {
        if self.color_of(path) != Some(NodeColor::Gray) {
            return;
        }
        if self.has_references(path) {
            self.scan_black(path, lazy);
        } else {
            self.gc.color.insert(path.to_string(), NodeColor::White);
            for child in self.children(path, lazy) {
                self.scan(&child, lazy);
            }
        }
    }

    fn scan_black(&mut self, path: &str, lazy: bool) {
        self.gc.color.insert(path.to_string(), NodeColor::Black);
        for child in self.children(path, lazy) {
            if let Some(module) = self.dependencies.get_mut(&child) {
                module.inverse_dependencies.add(path.to_string());
            }
            if self.color_of(&child) != Some(NodeColor::Black) {
                self.scan_black(&child, lazy);
            }
        }
    }

    fn collect_white(&mut self, path: &str, delta: &mut Delta, lazy: bool) {
        if self.color_of(path) != Some(NodeColor::White)
            || self.gc.possible_cycle_roots.contains(path)
        {
            return;
        }
        self.gc.color.insert(path.to_string(), NodeColor::Black);
        for child in self.children(path, lazy) {
            self.collect_white(&child, delta, lazy);
        }
        self.free_module(path, delta);
    }
}
