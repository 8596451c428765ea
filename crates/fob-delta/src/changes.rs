//! Coalescing of raw file events.
//!
//! Events are only recorded here; no work happens until a delta is
//! requested. Repeated events on the same path collapse so that every path
//! sits in at most one of the three sets.

use indexmap::IndexSet;
use rustc_hash::FxBuildHasher;
use serde::{Deserialize, Serialize};

pub(crate) type FxIndexSet<T> = IndexSet<T, FxBuildHasher>;

/// Kind of a raw file system event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileEventKind {
    Add,
    Change,
    Delete,
}

/// One event from the change feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEvent {
    #[serde(rename = "type")]
    pub kind: FileEventKind,
    /// Absolute path of the file.
    pub path: String,
}

impl FileEvent {
    pub fn new(kind: FileEventKind, path: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }

    pub fn add(path: impl Into<String>) -> Self {
        Self::new(FileEventKind::Add, path)
    }

    pub fn change(path: impl Into<String>) -> Self {
        Self::new(FileEventKind::Change, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(FileEventKind::Delete, path)
    }
}

/// Sent to subscribers whenever a batch of events was recorded, so clients
/// can decide to ask for a new delta.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeNotification {
    pub events: Vec<FileEvent>,
}

/// Pending added, modified and deleted paths. The sets are disjoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub added: FxIndexSet<String>,
    pub modified: FxIndexSet<String>,
    pub deleted: FxIndexSet<String>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one event into the pending sets.
    ///
    /// - delete after add or change is a delete
    /// - add after delete is a change
    /// - change after add is still an add, add after change still a change
    pub fn record(&mut self, event: &FileEvent) {
        let path = event.path.as_str();
        match event.kind {
            FileEventKind::Delete => {
                self.added.shift_remove(path);
                self.modified.shift_remove(path);
                self.deleted.insert(path.to_string());
            }
            FileEventKind::Add => {
                if self.deleted.shift_remove(path) {
                    self.modified.insert(path.to_string());
                } else if !self.modified.contains(path) {
                    self.added.insert(path.to_string());
                }
            }
            FileEventKind::Change => {
                self.deleted.shift_remove(path);
                if !self.added.contains(path) {
                    self.modified.insert(path.to_string());
                }
            }
        }
    }

    /// Swap the pending sets out, leaving empty ones behind.
    pub fn take(&mut self) -> ChangeSet {
        std::mem::take(self)
    }

    /// Put back sets consumed by a failed build.
    ///
    /// A path that received a newer event in the meantime keeps its newer
    /// state.
    pub fn merge_back(&mut self, consumed: ChangeSet) {
        let ChangeSet {
            added,
            modified,
            deleted,
        } = consumed;
        for path in added {
            if !self.contains(&path) {
                self.added.insert(path);
            }
        }
        for path in modified {
            if !self.contains(&path) {
                self.modified.insert(path);
            }
        }
        for path in deleted {
            if !self.contains(&path) {
                self.deleted.insert(path);
            }
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        self.added.contains(path) || self.modified.contains(path) || self.deleted.contains(path)
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }

    pub fn len(&self) -> usize {
        self.added.len() + self.modified.len() + self.deleted.len()
    }

    pub fn clear(&mut self) {
        self.added.clear();
        self.modified.clear();
        self.deleted.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(events: &[FileEvent]) -> ChangeSet {
        let mut changes = ChangeSet::new();
        for event in events {
            changes.record(event);
        }
        changes
    }

    fn collect(set: &FxIndexSet<String>) -> Vec<&str> {
        set.iter().map(String::as_str).collect()
    }

    fn sets(changes: &ChangeSet) -> (Vec<&str>, Vec<&str>, Vec<&str>) {
        (
            collect(&changes.added),
            collect(&changes.modified),
            collect(&changes.deleted),
        )
    }

    #[test]
    fn test_delete_after_add_or_change_is_delete() {
        let changes = apply(&[FileEvent::add("/a"), FileEvent::delete("/a")]);
        assert_eq!(sets(&changes), (vec![], vec![], vec!["/a"]));

        let changes = apply(&[FileEvent::change("/a"), FileEvent::delete("/a")]);
        assert_eq!(sets(&changes), (vec![], vec![], vec!["/a"]));
    }

    #[test]
    fn test_add_after_delete_is_change() {
        let changes = apply(&[FileEvent::delete("/a"), FileEvent::add("/a")]);
        assert_eq!(sets(&changes), (vec![], vec!["/a"], vec![]));
    }

    #[test]
    fn test_change_is_idempotent_with_add_and_itself() {
        let changes = apply(&[FileEvent::add("/a"), FileEvent::change("/a")]);
        assert_eq!(sets(&changes), (vec!["/a"], vec![], vec![]));

        let changes = apply(&[FileEvent::change("/a"), FileEvent::add("/a")]);
        assert_eq!(sets(&changes), (vec![], vec!["/a"], vec![]));

        let changes = apply(&[FileEvent::change("/a"), FileEvent::change("/a")]);
        assert_eq!(sets(&changes), (vec![], vec!["/a"], vec![]));
    }

    #[test]
    fn test_change_after_delete_is_change() {
        let changes = apply(&[FileEvent::delete("/a"), FileEvent::change("/a")]);
        assert_eq!(sets(&changes), (vec![], vec!["/a"], vec![]));
    }

    #[test]
    fn test_take_leaves_empty_sets() {
        let mut changes = apply(&[FileEvent::add("/a"), FileEvent::delete("/b")]);
        let taken = changes.take();

        assert!(changes.is_empty());
        assert_eq!(taken.len(), 2);
    }

    #[test]
    fn test_merge_back_keeps_newer_events() {
        let mut live = ChangeSet::new();
        let consumed = apply(&[
            FileEvent::delete("/a"),
            FileEvent::change("/b"),
            FileEvent::add("/c"),
        ]);

        // /a came back while the failed build was running
        live.record(&FileEvent::add("/a"));
        live.merge_back(consumed);

        assert_eq!(sets(&live), (vec!["/a", "/c"], vec!["/b"], vec![]));
    }

    #[test]
    fn test_file_event_serde_shape() {
        let json = r#"{"type":"delete","path":"/app/a.js"}"#;
        let event: FileEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event, FileEvent::delete("/app/a.js"));
    }
}
