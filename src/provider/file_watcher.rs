use std::path::{Path, PathBuf};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher, recommended_watcher};
use tokio::sync::mpsc;

/// Represents a file system event for a watched directory entry.
#[derive(Debug, Clone)]
pub(super) struct FileEvent {
    /// The path of the entry that changed
    pub path: PathBuf,
    /// The type of change that occurred
    pub kind: FileEventKind,
}

/// The type of file system change that occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum FileEventKind {
    Modified,
    Created,
    Removed,
}

/// Async adapter over a `notify` watcher.
///
/// Events are forwarded from notify's callback thread into a Tokio channel.
/// Uses an unbounded channel since file events are typically infrequent but bursty.
pub(super) struct FileWatcher {
    watcher: RecommendedWatcher,
}

impl FileWatcher {
    /// Creates a new file watcher and returns the watcher and event receiver.
    ///
    /// # Errors
    /// Returns error if the underlying file system watcher cannot be initialized.
    pub fn new() -> notify::Result<(Self, mpsc::UnboundedReceiver<FileEvent>)> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let watcher = recommended_watcher(move |res: notify::Result<Event>| {
            let Ok(event) = res else {
                return;
            };

            let kind = match event.kind {
                EventKind::Create(_) => FileEventKind::Created,
                EventKind::Modify(_) => FileEventKind::Modified,
                EventKind::Remove(_) => FileEventKind::Removed,
                _ => return,
            };

            for path in event.paths {
                let _ = event_tx.send(FileEvent { path, kind });
            }
        })?;

        Ok((Self { watcher }, event_rx))
    }

    /// Starts watching a directory, non-recursively.
    ///
    /// Watching the directory rather than the file keeps events flowing when
    /// editors replace the file through a rename.
    ///
    /// # Errors
    /// Returns error if the watcher fails to monitor the directory.
    pub fn watch_dir(&mut self, dir: &Path) -> notify::Result<()> {
        self.watcher.watch(dir, RecursiveMode::NonRecursive)
    }
}
