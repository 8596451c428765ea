//! The delta calculator.
//!
//! Owns one graph and turns the file events recorded since the last request
//! into a single incremental traversal. Builds never overlap: the graph sits
//! behind an async mutex held for the whole build, while events keep being
//! recorded into fresh pending sets.

use std::path::Path;
use std::sync::Arc;

use fob_delta_graph::{
    DeltaResult, Graph, GraphInput, MixedOutput, ProgressFn, Resolver, TransformInputOptions,
    Transformer, TraversalOptions,
};
use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use tokio::sync::{MutexGuard, broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::changes::{ChangeNotification, ChangeSet, FileEvent, FxIndexSet};
use crate::config::DeltaConfig;
use crate::error::{DeltaError, Result};

const NOTIFICATION_CAPACITY: usize = 64;

/// Construction options of a [`DeltaCalculator`].
pub struct DeltaCalculatorOptions<T = MixedOutput> {
    pub transformer: Arc<dyn Transformer<T>>,
    pub resolver: Arc<dyn Resolver>,
    pub transform_options: TransformInputOptions,
    pub lazy: bool,
    pub shallow: bool,
    /// Re-process context modules when a file is added under them.
    pub unstable_allow_require_context: bool,
    pub on_progress: Option<ProgressFn>,
}

impl<T> DeltaCalculatorOptions<T> {
    pub fn new(transformer: Arc<dyn Transformer<T>>, resolver: Arc<dyn Resolver>) -> Self {
        Self {
            transformer,
            resolver,
            transform_options: TransformInputOptions::default(),
            lazy: false,
            shallow: false,
            unstable_allow_require_context: false,
            on_progress: None,
        }
    }

    /// Take the graph-related settings from a loaded config.
    pub fn with_config(mut self, config: &DeltaConfig) -> Self {
        self.transform_options = config.transform.clone();
        self.lazy = config.lazy;
        self.shallow = config.shallow;
        self.unstable_allow_require_context = config.unstable_allow_require_context;
        self
    }

    pub fn on_progress(mut self, f: impl Fn(usize, usize) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Arc::new(f));
        self
    }
}

/// Per-request flags of [`DeltaCalculator::get_delta`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeltaRequest {
    /// Return the whole graph as added instead of a diff.
    pub reset: bool,
    /// Only reorder entry points when resetting.
    pub shallow: bool,
}

impl DeltaRequest {
    pub fn reset() -> Self {
        Self {
            reset: true,
            shallow: false,
        }
    }
}

/// Pending events and their subscribers, shared with the listener task.
#[derive(Debug)]
struct PendingChanges {
    changes: Mutex<ChangeSet>,
    notifier: broadcast::Sender<ChangeNotification>,
}

impl PendingChanges {
    fn record(&self, events: &[FileEvent]) {
        if events.is_empty() {
            return;
        }
        {
            let mut changes = self.changes.lock();
            for event in events {
                changes.record(event);
            }
        }
        // no receivers is fine
        let _ = self.notifier.send(ChangeNotification {
            events: events.to_vec(),
        });
    }
}

/// Incremental delta computation for one set of entry points.
pub struct DeltaCalculator<T = MixedOutput> {
    graph: tokio::sync::Mutex<Graph<T>>,
    options: TraversalOptions<T>,
    allow_require_context: bool,
    pending: Arc<PendingChanges>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl<T> DeltaCalculator<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a calculator. Entry points must be absolute paths.
    pub fn new<I, S>(entry_points: I, options: DeltaCalculatorOptions<T>) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let input = GraphInput::new(entry_points)
            .with_transform_options(options.transform_options.clone());

        if input.entry_points.is_empty() {
            return Err(DeltaError::InvalidOptions(
                "at least one entry point is required".to_string(),
            ));
        }
        if let Some(relative) = input
            .entry_points
            .iter()
            .find(|path| !Path::new(path.as_str()).is_absolute())
        {
            return Err(DeltaError::InvalidOptions(format!(
                "entry point '{relative}' is not an absolute path"
            )));
        }

        let traversal = TraversalOptions {
            transformer: options.transformer,
            resolver: options.resolver,
            lazy: options.lazy,
            shallow: options.shallow,
            on_progress: options.on_progress,
        };
        let (notifier, _) = broadcast::channel(NOTIFICATION_CAPACITY);

        Ok(Self {
            graph: tokio::sync::Mutex::new(Graph::new(input)),
            options: traversal,
            allow_require_context: options.unstable_allow_require_context,
            pending: Arc::new(PendingChanges {
                changes: Mutex::new(ChangeSet::new()),
                notifier,
            }),
            listener: Mutex::new(None),
        })
    }

    /// Record a single file event.
    pub fn handle_file_event(&self, event: &FileEvent) {
        self.pending.record(std::slice::from_ref(event));
    }

    /// Record a batch of file events.
    pub fn handle_changes(&self, events: &[FileEvent]) {
        self.pending.record(events);
    }

    /// Notifications sent after every recorded batch.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeNotification> {
        self.pending.notifier.subscribe()
    }

    /// Snapshot of the events recorded since the last build started.
    pub fn pending_changes(&self) -> ChangeSet {
        self.pending.changes.lock().clone()
    }

    /// Consume batches from `feed` in a background task.
    ///
    /// Replaces any feed registered before. Must be called within a tokio
    /// runtime.
    pub fn listen(&self, mut feed: mpsc::Receiver<Vec<FileEvent>>) {
        let pending = Arc::clone(&self.pending);
        let handle = tokio::spawn(async move {
            while let Some(batch) = feed.recv().await {
                debug!(events = batch.len(), "file changes");
                pending.record(&batch);
            }
            debug!("change feed closed");
        });

        if let Some(previous) = self.listener.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Stop listening and release all state. The next delta is a full one.
    pub async fn end(&self) {
        if let Some(listener) = self.listener.lock().take() {
            listener.abort();
        }
        self.pending.changes.lock().clear();
        self.graph.lock().await.clear_modules();
    }

    /// Read access to the graph, waiting for any build in flight.
    pub async fn graph(&self) -> MutexGuard<'_, Graph<T>> {
        self.graph.lock().await
    }

    /// Compute the changes since the previous call.
    ///
    /// The first call (or the first after a failure that left the graph in
    /// an unknown state) traverses everything from the entry points. On
    /// error, the consumed events are kept so the next call retries them.
    pub async fn get_delta(&self, request: DeltaRequest) -> Result<DeltaResult<T>> {
        let mut graph = self.graph.lock().await;

        let consumed = self.pending.changes.lock().take();
        let module_count = graph.len();

        let result = match self.compute_delta(&mut graph, &consumed).await {
            Ok(result) => result,
            Err(err) => {
                warn!(error = %err, "delta failed, changes kept for retry");
                self.pending.changes.lock().merge_back(consumed);
                if graph.len() != module_count {
                    debug!("module count changed, clearing graph");
                    graph.clear_modules();
                }
                return Err(err);
            }
        };

        if request.reset {
            graph.reorder_graph(request.shallow)?;
            return Ok(DeltaResult {
                added: graph.dependencies().clone(),
                reset: true,
                ..DeltaResult::empty()
            });
        }
        Ok(result)
    }

    async fn compute_delta(
        &self,
        graph: &mut Graph<T>,
        consumed: &ChangeSet,
    ) -> Result<DeltaResult<T>> {
        if graph.is_empty() {
            let result = graph.initial_traverse(&self.options).await?;
            info!(modules = result.added.len(), "initial build");
            return Ok(result);
        }

        let mut modified: FxIndexSet<String> = consumed.modified.clone();

        // parents of deleted files have to fail resolution or drop the import
        for path in &consumed.deleted {
            for parent in graph.get_modified_modules_for_deleted_path(path) {
                if !consumed.deleted.contains(&parent) {
                    modified.insert(parent);
                }
            }
        }

        if self.allow_require_context {
            let mut contexts = FxHashSet::default();
            for path in &consumed.added {
                graph.mark_modified_context_modules(path, &mut contexts);
            }
            let mut contexts: Vec<String> = contexts.into_iter().collect();
            contexts.sort_unstable();
            modified.extend(contexts);
        }

        modified.retain(|path| graph.contains(path));
        if modified.is_empty() {
            debug!("no modules affected");
            return Ok(DeltaResult::empty());
        }

        let result = graph.traverse(&modified, &self.options).await?;
        info!(
            added = result.added.len(),
            modified = result.modified.len(),
            deleted = result.deleted.len(),
            "delta"
        );
        Ok(result)
    }
}

impl<T> Drop for DeltaCalculator<T> {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.get_mut().take() {
            listener.abort();
        }
    }
}
