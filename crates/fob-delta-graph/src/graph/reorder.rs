use indexmap::IndexSet;
use rustc_hash::FxBuildHasher;

use super::Graph;
use crate::module::Dependency;
use crate::{GraphError, Result};

impl<T> Graph<T> {
    /// Rewrite the module table in depth-first order from the entry points.
    ///
    /// Concurrent transforms finish in arbitrary order, which would otherwise
    /// leak into serialized output. Entry points are walked in order, and each
    /// module's dependencies in declaration order. Modules that are not
    /// reachable this way are dropped from the table.
    pub fn reorder_graph(&mut self, shallow: bool) -> Result<()> {
        let mut ordered: IndexSet<String, FxBuildHasher> = IndexSet::default();

        for entry_point in &self.entry_points {
            if !self.dependencies.contains_key(entry_point) {
                return Err(GraphError::ModuleNotFound(entry_point.clone()));
            }
            self.visit_in_order(entry_point, &mut ordered, shallow)?;
        }

        let mut previous = std::mem::take(&mut self.dependencies);
        self.dependencies.reserve(ordered.len());
        for path in ordered {
            if let Some(module) = previous.swap_remove(&path) {
                self.dependencies.insert(path, module);
            }
        }
        Ok(())
    }

    fn visit_in_order(
        &self,
        start: &str,
        ordered: &mut IndexSet<String, FxBuildHasher>,
        shallow: bool,
    ) -> Result<()> {
        let mut stack = vec![start.to_string()];

        while let Some(path) = stack.pop() {
            if ordered.contains(&path) {
                continue;
            }
            let Some(module) = self.dependencies.get(&path) else {
                continue;
            };

            let mut children = Vec::with_capacity(module.dependencies.len());
            for dependency in module.dependencies.values() {
                let Dependency::Resolved {
                    absolute_path,
                    data,
                } = dependency
                else {
                    continue;
                };
                if !self.dependencies.contains_key(absolute_path) {
                    if data.async_type.is_some() || shallow {
                        continue;
                    }
                    return Err(GraphError::ModuleNotFound(absolute_path.clone()));
                }
                children.push(absolute_path.clone());
            }

            ordered.insert(path);
            // reversed so the first dependency is visited first
            stack.extend(children.into_iter().rev());
        }
        Ok(())
    }
}
