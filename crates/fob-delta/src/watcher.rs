//! File system watcher feeding [`DeltaCalculator::listen`].
//!
//! Watches a project directory recursively and drops changes to ignored
//! paths. Events are held back until the tree has been quiet for the
//! debounce window and then forwarded as one batch of [`FileEvent`]s, so a
//! burst of saves becomes a single rebuild and no event is ever dropped.
//!
//! [`DeltaCalculator::listen`]: crate::DeltaCalculator::listen

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self as std_mpsc, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::changes::{FileEvent, FileEventKind};
use crate::config::WatchConfig;
use crate::error::{DeltaError, Result};

/// Always ignored, whatever the configuration says.
pub const DEFAULT_IGNORE: [&str; 2] = ["node_modules", ".git"];

const CHANNEL_CAPACITY: usize = 100;

/// A batch is forwarded at the latest after this many debounce windows,
/// even if events keep coming.
const MAX_WINDOWS_PER_BATCH: u32 = 10;

/// Recursive watcher over a project root.
pub struct FileWatcher {
    /// Underlying notify watcher
    _watcher: RecommendedWatcher,
    /// Root directory being watched
    root: PathBuf,
}

impl FileWatcher {
    /// Start watching `root`.
    ///
    /// # Errors
    ///
    /// Returns error if watcher cannot be created or directory doesn't exist
    pub fn new(
        root: impl Into<PathBuf>,
        config: &WatchConfig,
    ) -> Result<(Self, mpsc::Receiver<Vec<FileEvent>>)> {
        let root = root.into();
        if !root.is_dir() {
            return Err(DeltaError::InvalidOptions(format!(
                "watch root {} is not a directory",
                root.display()
            )));
        }

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (raw_tx, raw_rx) = std_mpsc::channel::<Vec<FileEvent>>();

        let mut ignore: Vec<String> = DEFAULT_IGNORE.iter().map(|p| p.to_string()).collect();
        ignore.extend(config.ignore.iter().cloned());
        let watched_root = root.clone();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let event = match res {
                Ok(event) => event,
                Err(err) => {
                    warn!(error = %err, "watch error");
                    return;
                }
            };

            let events: Vec<FileEvent> = to_file_events(&event)
                .into_iter()
                .filter(|(_, path)| !should_ignore(path, &watched_root, &ignore))
                .map(|(kind, path)| FileEvent::new(kind, path.to_string_lossy().into_owned()))
                .collect();

            if !events.is_empty() {
                // the batching thread is gone once the watcher is dropped
                let _ = raw_tx.send(events);
            }
        })?;

        watcher.watch(&root, RecursiveMode::Recursive)?;

        let batcher = Batcher::new(Duration::from_millis(config.debounce_ms));
        thread::Builder::new()
            .name("fob-delta-watch".to_string())
            .spawn(move || forward_batches(batcher, raw_rx, tx))?;

        Ok((
            Self {
                _watcher: watcher,
                root,
            },
            rx,
        ))
    }

    /// Get the root directory being watched.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Collect raw events into batches until `raw` closes or nobody listens.
fn forward_batches(
    mut batcher: Batcher,
    raw: std_mpsc::Receiver<Vec<FileEvent>>,
    feed: mpsc::Sender<Vec<FileEvent>>,
) {
    loop {
        let received = match batcher.time_until_flush(Instant::now()) {
            Some(wait) => raw.recv_timeout(wait),
            None => raw.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        let closed = match received {
            Ok(events) => {
                batcher.push(events, Instant::now());
                false
            }
            Err(RecvTimeoutError::Timeout) => false,
            Err(RecvTimeoutError::Disconnected) => true,
        };

        let batch = if closed {
            batcher.take()
        } else {
            batcher.take_if_due(Instant::now())
        };
        if let Some(batch) = batch {
            trace!(events = batch.len(), "forwarding file events");
            if feed.blocking_send(batch).is_err() {
                debug!("change feed dropped, stopping watcher");
                return;
            }
        }
        if closed {
            return;
        }
    }
}

/// Trailing-edge debounce over raw watcher events.
///
/// Events pile up until none arrived for a whole window, or until the batch
/// has been open for [`MAX_WINDOWS_PER_BATCH`] windows.
struct Batcher {
    window: Duration,
    pending: Vec<FileEvent>,
    opened: Option<Instant>,
    last_event: Option<Instant>,
}

impl Batcher {
    fn new(window: Duration) -> Self {
        Self {
            window,
            pending: Vec::new(),
            opened: None,
            last_event: None,
        }
    }

    fn push(&mut self, events: Vec<FileEvent>, now: Instant) {
        self.pending.extend(events);
        self.opened.get_or_insert(now);
        self.last_event = Some(now);
    }

    fn due_at(&self) -> Option<Instant> {
        let quiet = self.last_event? + self.window;
        let capped = self.opened? + self.window * MAX_WINDOWS_PER_BATCH;
        Some(quiet.min(capped))
    }

    /// How long to wait for more events; `None` when nothing is pending.
    fn time_until_flush(&self, now: Instant) -> Option<Duration> {
        self.due_at()
            .map(|due| due.saturating_duration_since(now))
    }

    fn take_if_due(&mut self, now: Instant) -> Option<Vec<FileEvent>> {
        match self.due_at() {
            Some(due) if due <= now => self.take(),
            _ => None,
        }
    }

    fn take(&mut self) -> Option<Vec<FileEvent>> {
        self.opened = None;
        self.last_event = None;
        if self.pending.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending))
        }
    }
}

/// Translate a notify event into `(kind, path)` pairs.
///
/// Renames become a delete of the old path and an add of the new one.
fn to_file_events(event: &Event) -> Vec<(FileEventKind, &Path)> {
    let kind = match event.kind {
        EventKind::Create(_) => FileEventKind::Add,
        EventKind::Remove(_) => FileEventKind::Delete,
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => FileEventKind::Delete,
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => FileEventKind::Add,
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            return match event.paths.as_slice() {
                [from, to] => vec![
                    (FileEventKind::Delete, from.as_path()),
                    (FileEventKind::Add, to.as_path()),
                ],
                _ => Vec::new(),
            };
        }
        EventKind::Modify(_) => FileEventKind::Change,
        _ => return Vec::new(),
    };
    event.paths.iter().map(|path| (kind, path.as_path())).collect()
}

/// Check if a path should be ignored.
///
/// Paths outside of `root` are always ignored.
fn should_ignore(path: &Path, root: &Path, ignore_patterns: &[String]) -> bool {
    let Ok(rel_path) = path.strip_prefix(root) else {
        return true;
    };
    let path_str = rel_path.to_string_lossy();

    ignore_patterns.iter().any(|pattern| {
        if let Some(ext) = pattern.strip_prefix('*') {
            // extension pattern like "*.log"
            path_str.ends_with(ext)
        } else {
            // directory or file name anywhere in the path
            rel_path
                .components()
                .any(|component| component.as_os_str() == pattern.as_str())
                || path_str.starts_with(pattern.as_str())
        }
    })
}
