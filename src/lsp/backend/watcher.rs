//! File system watching
//!
//! `notify` delivers events on its own thread. They are collected into
//! batches and forwarded to the service actor once the file system has been
//! quiet for a short window, which folds the bursts editors and version
//! control produce into one event per path.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc};
use tokio::task;
use tracing::{debug, info, warn};

use super::state::Command;
use crate::pipeline::FileChange;

const BATCH_WINDOW: Duration = Duration::from_millis(100);

pub fn is_script_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "as")
}

/// Maps a notify event kind onto the scheduler's notion of a change
fn change_for(kind: &EventKind) -> Option<FileChange> {
    match kind {
        EventKind::Create(_) => Some(FileChange::Created),
        EventKind::Modify(_) => Some(FileChange::Changed),
        EventKind::Remove(_) => Some(FileChange::Deleted),
        _ => None,
    }
}

/// Starts watching `root` recursively and spawns the batching task.
///
/// The returned watcher must be kept alive for events to flow.
pub(super) fn spawn_file_watcher(
    root: &Path,
    commands: mpsc::Sender<Command>,
    shutdown_tx: &broadcast::Sender<()>,
) -> notify::Result<RecommendedWatcher> {
    let (tx, rx) = std::sync::mpsc::channel::<notify::Result<notify::Event>>();
    let mut watcher = RecommendedWatcher::new(
        move |res| {
            let _ = tx.send(res);
        },
        notify::Config::default(),
    )?;
    watcher.watch(root, RecursiveMode::Recursive)?;

    let shutdown_flag = Arc::new(AtomicBool::new(false));
    let shutdown_flag_clone = shutdown_flag.clone();
    let mut shutdown_rx = shutdown_tx.subscribe();
    tokio::spawn(async move {
        let _ = shutdown_rx.recv().await;
        shutdown_flag_clone.store(true, Ordering::Relaxed);
    });

    task::spawn_blocking(move || {
        let mut pending: HashMap<PathBuf, FileChange> = HashMap::new();
        loop {
            if shutdown_flag.load(Ordering::Relaxed) {
                info!("File watcher task exiting gracefully");
                break;
            }
            match rx.recv_timeout(BATCH_WINDOW) {
                Ok(Ok(event)) => {
                    let Some(change) = change_for(&event.kind) else {
                        continue;
                    };
                    for path in event.paths.into_iter().filter(|p| is_script_file(p)) {
                        pending.insert(path, change);
                    }
                }
                Ok(Err(e)) => warn!("File watcher error: {}", e),
                Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {
                    if pending.is_empty() {
                        continue;
                    }
                    debug!("Forwarding batch of {} file changes", pending.len());
                    for (path, change) in pending.drain() {
                        if commands.blocking_send(Command::FileChanged { path, change }).is_err() {
                            return;
                        }
                    }
                }
                Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
            }
        }
        debug!("File watcher task terminated");
    });

    Ok(watcher)
}
