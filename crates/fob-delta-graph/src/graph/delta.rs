use indexmap::{IndexMap, IndexSet};
use rustc_hash::{FxBuildHasher, FxHashMap};

use crate::counting_set::CountingSet;
use crate::module::Module;

pub(crate) type FxIndexSet<T> = IndexSet<T, FxBuildHasher>;

/// Bookkeeping of one traversal.
#[derive(Debug, Default)]
pub(crate) struct Delta {
    pub added: FxIndexSet<String>,
    pub modified: FxIndexSet<String>,
    pub deleted: FxIndexSet<String>,
    /// Parents of modules whose transform is still in flight.
    pub early_inverse_dependencies: FxHashMap<String, CountingSet<String>>,
}

impl Delta {
    /// Record that `path` entered the graph.
    ///
    /// A path freed earlier in the same traversal is back with a fresh
    /// transform, so it is reported as modified instead.
    pub fn mark_added(&mut self, path: &str) {
        if self.deleted.shift_remove(path) {
            self.modified.insert(path.to_string());
        } else {
            self.added.insert(path.to_string());
        }
    }

    /// Record that `path` left the graph.
    pub fn mark_deleted(&mut self, path: &str) {
        if !self.added.shift_remove(path) {
            self.deleted.insert(path.to_string());
        }
    }
}

/// Modules changed by a traversal, as handed to serializers.
#[derive(Debug, Clone)]
pub struct DeltaResult<T> {
    pub added: IndexMap<String, Module<T>>,
    pub modified: IndexMap<String, Module<T>>,
    pub deleted: IndexSet<String>,
    /// Set when `added` holds the whole graph rather than a diff.
    pub reset: bool,
}

impl<T> DeltaResult<T> {
    pub fn empty() -> Self {
        Self {
            added: IndexMap::new(),
            modified: IndexMap::new(),
            deleted: IndexSet::new(),
            reset: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }
}

impl<T> Default for DeltaResult<T> {
    fn default() -> Self {
        Self::empty()
    }
}
