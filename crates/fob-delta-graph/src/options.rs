use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::runtime::{Resolver, Transformer};

/// Snapshot of the options a graph was built with.
///
/// The graph stores it so serializers can tell graphs apart; nothing in the
/// traversal reads it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransformInputOptions {
    pub dev: bool,
    pub hot: bool,
    pub minify: bool,
    pub platform: Option<String>,
    #[serde(rename = "type")]
    pub module_type: ModuleType,
    pub unstable_transform_profile: Option<String>,
    /// Transformer-specific extras.
    pub custom: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleType {
    #[default]
    Module,
    Script,
}

/// Progress callback, called with `(processed, total)`.
pub type ProgressFn = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// Everything a traversal needs besides the graph itself.
#[derive(Clone)]
pub struct TraversalOptions<T> {
    pub transformer: Arc<dyn Transformer<T>>,
    pub resolver: Arc<dyn Resolver>,
    /// Keep async and prefetch imports out of the graph.
    pub lazy: bool,
    /// Only process the requested modules; never add dependency nodes.
    pub shallow: bool,
    pub on_progress: Option<ProgressFn>,
}

impl<T> TraversalOptions<T> {
    pub fn builder(
        transformer: Arc<dyn Transformer<T>>,
        resolver: Arc<dyn Resolver>,
    ) -> TraversalOptionsBuilder<T> {
        TraversalOptionsBuilder {
            options: Self {
                transformer,
                resolver,
                lazy: false,
                shallow: false,
                on_progress: None,
            },
        }
    }
}

impl<T> fmt::Debug for TraversalOptions<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraversalOptions")
            .field("lazy", &self.lazy)
            .field("shallow", &self.shallow)
            .field("on_progress", &self.on_progress.is_some())
            .finish_non_exhaustive()
    }
}

pub struct TraversalOptionsBuilder<T> {
    options: TraversalOptions<T>,
}

impl<T> TraversalOptionsBuilder<T> {
    pub fn lazy(mut self, lazy: bool) -> Self {
        self.options.lazy = lazy;
        self
    }

    pub fn shallow(mut self, shallow: bool) -> Self {
        self.options.shallow = shallow;
        self
    }

    pub fn on_progress(mut self, f: impl Fn(usize, usize) + Send + Sync + 'static) -> Self {
        self.options.on_progress = Some(Arc::new(f));
        self
    }

    pub fn build(self) -> TraversalOptions<T> {
        self.options
    }
}
