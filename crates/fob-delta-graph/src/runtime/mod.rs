//! Collaborators injected into the graph
//!
//! The graph never reads files or parses code itself. A [`Transformer`] turns a
//! module path into output artifacts plus the imports it declares, and a
//! [`Resolver`] maps each declared import to an absolute file path. Bundler
//! front-ends implement both traits.

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

use async_trait::async_trait;

use crate::context::RequireContext;
use crate::module::{GetSource, TransformResultDependency};

/// Result type for collaborator calls
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Errors reported by transformers and resolvers
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// The specifier does not point at any file
    #[error("Unable to resolve module '{specifier}' from '{from}'")]
    NotFound { specifier: String, from: String },

    /// The transformer rejected the module (syntax error, missing file, ...)
    #[error("{0}")]
    Transform(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// What a transformer hands back for one module.
#[derive(Debug, Clone)]
pub struct TransformResult<T> {
    pub dependencies: Vec<TransformResultDependency>,
    pub output: Vec<T>,
    pub get_source: GetSource,
    /// Content stamp; equal stamps promise byte-identical output.
    pub unstable_transform_result_key: Option<String>,
}

impl<T> TransformResult<T> {
    pub fn new(dependencies: Vec<TransformResultDependency>, output: Vec<T>) -> Self {
        Self {
            dependencies,
            output,
            get_source: GetSource::empty(),
            unstable_transform_result_key: None,
        }
    }
}

/// Produces module output and declared dependencies.
///
/// Called concurrently for distinct paths within one traversal.
#[async_trait]
pub trait Transformer<T>: Send + Sync {
    /// Transform the module at `path`. `context` is set when `path` is the
    /// virtual path of a context module.
    async fn transform(
        &self,
        path: &str,
        context: Option<&RequireContext>,
    ) -> RuntimeResult<TransformResult<T>>;
}

/// Maps a declared dependency to an absolute path.
pub trait Resolver: Send + Sync {
    fn resolve(&self, from: &str, dependency: &TransformResultDependency) -> RuntimeResult<String>;
}
