//! # fob-delta-graph
//!
//! Incremental module dependency graph for a development bundler.
//!
//! The graph keeps every module reachable from a set of entry points, and on
//! each file change re-processes only the changed modules, diffing their new
//! dependencies against the old ones. The outcome of a traversal is a delta
//! (added, modified and deleted modules) that serializers turn into bundle
//! updates.
//!
//! ## Overview
//!
//! - **Arena graph**: modules live in a path-keyed table and edges are key
//!   lookups, never owning references
//! - **Reference counting**: each module tracks its parents in a
//!   [`CountingSet`]; entry points hold one implicit reference
//! - **Cycle collection**: unreachable cycles are reclaimed with synchronous
//!   trial deletion after every traversal
//! - **Context modules**: `require.context` imports become virtual modules
//!   keyed by a hash of their parameters
//! - **No I/O**: transforming and resolving are injected through the
//!   [`Transformer`] and [`Resolver`] traits
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Graph::traverse                        │
//! │      (diff dependencies, add/remove edges, concurrent)      │
//! └────────────────────┬────────────────────────────────────────┘
//!                      │
//!          ┌───────────┼───────────┐
//!          │           │           │
//!          ▼           ▼           ▼
//!   ┌────────────┐ ┌────────┐ ┌──────────┐
//!   │Transformer │ │Resolver│ │ Context  │
//!   │ (injected) │ │(inject)│ │ modules  │
//!   └────────────┘ └────────┘ └──────────┘
//!                      │
//!                      ▼
//!          ┌──────────────────────┐
//!          │   Cycle collector    │
//!          │ (mark, scan, collect)│
//!          └──────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use fob_delta_graph::{Graph, GraphInput, TraversalOptions};
//!
//! let options = TraversalOptions::builder(transformer, resolver).build();
//! let mut graph = Graph::new(GraphInput::new(["/app/index.js"]));
//!
//! let initial = graph.initial_traverse(&options).await?;
//! println!("{} modules", initial.added.len());
//!
//! // later, after /app/foo.js changed on disk
//! let delta = graph.traverse(["/app/foo.js"], &options).await?;
//! for path in &delta.deleted {
//!     println!("removed {path}");
//! }
//! ```

pub mod context;
pub mod counting_set;
pub mod graph;
pub mod module;
pub mod options;
pub mod runtime;

pub use context::{
    ContextFilter, ContextMode, RequireContext, RequireContextParams,
    derive_absolute_path_from_context, file_matches_context, get_context_module_id,
};
pub use counting_set::CountingSet;
pub use graph::{DeltaResult, Graph, GraphInput, NodeColor};
pub use module::{
    AsyncDependencyType, Dependency, GetSource, MixedOutput, Module, TransformResultDependency,
};
pub use options::{ModuleType, ProgressFn, TransformInputOptions, TraversalOptions};
pub use runtime::{Resolver, RuntimeError, RuntimeResult, TransformResult, Transformer};

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils {
    pub use super::runtime::test_utils::*;
}

/// Errors raised while building or updating a graph.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// The transformer failed; reported as-is.
    #[error("{source}")]
    Transform { path: String, source: RuntimeError },

    /// A non-optional dependency could not be resolved.
    #[error("Failed to resolve '{name}' from '{from}': {source}")]
    Resolution {
        from: String,
        name: String,
        source: RuntimeError,
    },

    #[error("Invalid require.context filter /{pattern}/: {reason}")]
    InvalidContextFilter { pattern: String, reason: String },

    #[error("Found duplicate dependency key '{key}' in {path}")]
    DuplicateDependencyKey { key: String, path: String },

    #[error("Module not registered in graph: {0}")]
    ModuleNotFound(String),

    #[error("initial traversal called on a nonempty graph")]
    NonEmptyGraph,

    /// Internal invariant violation.
    #[error("Graph consistency error: {0}")]
    Consistency(String),
}

impl GraphError {
    /// Bugs in the graph itself, as opposed to errors in user code.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            GraphError::DuplicateDependencyKey { .. }
                | GraphError::ModuleNotFound(_)
                | GraphError::NonEmptyGraph
                | GraphError::Consistency(_)
        )
    }
}

/// Result type alias for graph operations.
pub type Result<T> = std::result::Result<T, GraphError>;

#[cfg(test)]
mod tests;
