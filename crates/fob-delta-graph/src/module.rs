use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::context::RequireContextParams;
use crate::counting_set::CountingSet;

/// Kind of a non-eager import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AsyncDependencyType {
    /// `import()`
    Async,
    /// `__prefetchImport()`
    Prefetch,
    /// `require.resolveWeak()`, never pulls the target into the graph.
    Weak,
}

/// Dependency as declared by the transformer, before resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformResultDependency {
    /// Specifier as written in the source (`./foo`, `react`, ...).
    pub name: String,
    /// Identifier unique within the declaring module.
    pub key: String,
    #[serde(default)]
    pub async_type: Option<AsyncDependencyType>,
    #[serde(default)]
    pub is_optional: bool,
    #[serde(default)]
    pub context_params: Option<RequireContextParams>,
}

impl TransformResultDependency {
    /// An eager dependency whose key is its specifier.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            key: name.clone(),
            name,
            async_type: None,
            is_optional: false,
            context_params: None,
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn with_async_type(mut self, async_type: AsyncDependencyType) -> Self {
        self.async_type = Some(async_type);
        self
    }

    pub fn optional(mut self) -> Self {
        self.is_optional = true;
        self
    }

    pub fn with_context(mut self, params: RequireContextParams) -> Self {
        self.context_params = Some(params);
        self
    }

    pub fn is_weak(&self) -> bool {
        self.async_type == Some(AsyncDependencyType::Weak)
    }

    /// `import()` or prefetch; these are split out under lazy mode.
    pub fn is_lazy_candidate(&self) -> bool {
        matches!(
            self.async_type,
            Some(AsyncDependencyType::Async | AsyncDependencyType::Prefetch)
        )
    }
}

/// An edge of a module, keyed by [`TransformResultDependency::key`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Dependency {
    Resolved {
        absolute_path: String,
        data: TransformResultDependency,
    },
    /// An optional dependency that failed to resolve.
    Unresolved { data: TransformResultDependency },
}

impl Dependency {
    pub fn data(&self) -> &TransformResultDependency {
        match self {
            Dependency::Resolved { data, .. } | Dependency::Unresolved { data } => data,
        }
    }

    /// Target path, if resolved.
    pub fn absolute_path(&self) -> Option<&str> {
        match self {
            Dependency::Resolved { absolute_path, .. } => Some(absolute_path),
            Dependency::Unresolved { .. } => None,
        }
    }

    /// Whether two edges under the same key are interchangeable for diffing.
    ///
    /// The async type only matters when lazy mode splits async edges out of
    /// the graph.
    pub fn is_equivalent(&self, other: &Dependency, lazy: bool) -> bool {
        match (self, other) {
            (
                Dependency::Resolved {
                    absolute_path: a,
                    data: a_data,
                },
                Dependency::Resolved {
                    absolute_path: b,
                    data: b_data,
                },
            ) => {
                a == b
                    && (!lazy || a_data.async_type == b_data.async_type)
                    && a_data.context_params == b_data.context_params
            }
            (Dependency::Unresolved { data: a }, Dependency::Unresolved { data: b }) => a == b,
            _ => false,
        }
    }
}

/// Default artifact type emitted by transformers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixedOutput {
    pub data: serde_json::Value,
    #[serde(rename = "type")]
    pub output_type: String,
}

/// Lazily produces the original source of a module.
#[derive(Clone)]
pub struct GetSource(Arc<dyn Fn() -> Vec<u8> + Send + Sync>);

impl GetSource {
    pub fn new(f: impl Fn() -> Vec<u8> + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn from_bytes(bytes: impl Into<Arc<[u8]>>) -> Self {
        let bytes: Arc<[u8]> = bytes.into();
        Self::new(move || bytes.to_vec())
    }

    pub fn empty() -> Self {
        Self::new(Vec::new)
    }

    pub fn call(&self) -> Vec<u8> {
        (self.0)()
    }
}

impl Default for GetSource {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for GetSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("GetSource(..)")
    }
}

/// A node of the graph.
#[derive(Debug, Clone)]
pub struct Module<T = MixedOutput> {
    pub path: String,
    pub dependencies: IndexMap<String, Dependency>,
    pub inverse_dependencies: CountingSet<String>,
    pub output: Vec<T>,
    pub get_source: GetSource,
    /// Stamp of the transform result; equal stamps mean equal output.
    pub unstable_transform_result_key: Option<String>,
}

impl<T> Module<T> {
    pub(crate) fn new(path: String, inverse_dependencies: CountingSet<String>) -> Self {
        Self {
            path,
            dependencies: IndexMap::new(),
            inverse_dependencies,
            output: Vec::new(),
            get_source: GetSource::empty(),
            unstable_transform_result_key: None,
        }
    }

    /// Resolved, non-weak targets in declaration order.
    pub fn resolved_targets(&self) -> impl Iterator<Item = &str> {
        self.dependencies
            .values()
            .filter(|dep| !dep.data().is_weak())
            .filter_map(Dependency::absolute_path)
    }
}
