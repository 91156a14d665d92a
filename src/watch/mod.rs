//! Disk watcher feeding change batches to the pointer engine.
//!
//! Architecture:
//! ```text
//! notify → Debouncer (pure timing) → translate (paths → FileEvents) → on_batch
//! ```
//!
//! The watcher starts immediately in [`FsWatcher::new`], so events that
//! arrive while the caller sets up its pointers are buffered, not lost.
//! Disk changes are observed after the fact: the engine's before phase
//! selects pointers by URL, which does not need the old tree.

use std::path::PathBuf;
use std::time::Duration;

use notify::RecommendedWatcher;
use tokio::sync::mpsc;

use crate::vfs::FileEvent;

// Pure timing and deduplication.
mod debouncer;
// Watch root attach/re-attach lifecycle.
mod roots;
// Debounced changes -> FileEvent batches.
mod translate;
// Shared watch types.
mod types;

#[cfg(test)]
mod tests;

use debouncer::Debouncer;
use roots::WatchRoots;

pub use translate::to_file_events;
pub use types::{ChangeKind, DebouncedChanges};

/// Upper bound on idle sleeps, so missing roots are re-attached promptly.
const MAINTAIN_INTERVAL: Duration = Duration::from_secs(2);

/// Watches directories and turns bursts of disk changes into event batches.
pub struct FsWatcher {
    /// Channel to receive notify events (sync -> async bridge)
    notify_rx: std::sync::mpsc::Receiver<notify::Result<notify::Event>>,
    /// Watcher handle (must be kept alive)
    watcher: RecommendedWatcher,
    roots: WatchRoots,
    debouncer: Debouncer,
}

impl FsWatcher {
    pub fn new(paths: Vec<PathBuf>, debounce: Duration) -> notify::Result<Self> {
        let (notify_tx, notify_rx) = std::sync::mpsc::channel();

        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = notify_tx.send(res);
        })?;

        let mut roots = WatchRoots::new(paths);
        roots.attach_existing(&mut watcher)?;

        Ok(Self {
            notify_rx,
            watcher,
            roots,
            debouncer: Debouncer::new(debounce),
        })
    }

    /// Number of roots currently attached.
    pub fn attached_roots(&self) -> usize {
        self.roots.attached_count()
    }

    /// Run the event loop until `shutdown` fires or all its senders drop.
    pub async fn run(
        self,
        mut shutdown: mpsc::UnboundedReceiver<()>,
        mut on_batch: impl FnMut(Vec<FileEvent>),
    ) {
        let notify_rx = self.notify_rx;
        let mut debouncer = self.debouncer;
        let mut watcher = self.watcher;
        let mut roots = self.roots;

        let (async_tx, mut async_rx) = mpsc::channel::<notify::Event>(64);

        // Bridge the blocking notify channel into the async loop
        std::thread::spawn(move || {
            while let Ok(result) = notify_rx.recv() {
                match result {
                    Ok(event) => {
                        if async_tx.blocking_send(event).is_err() {
                            break;
                        }
                    }
                    Err(e) => crate::log!("watch"; "notify error: {}", e),
                }
            }
        });

        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => break,
                Some(event) = async_rx.recv() => debouncer.add_event(&event),
                _ = tokio::time::sleep(debouncer.sleep_duration().min(MAINTAIN_INTERVAL)) => {
                    roots.maintain(&mut watcher);
                    if let Some(changes) = debouncer.take_if_ready() {
                        crate::debug!("watch"; "{} debounced change(s)", changes.len());
                        let events = to_file_events(&changes);
                        if !events.is_empty() {
                            on_batch(events);
                        }
                    }
                }
            }
        }
        crate::debug!("watch"; "event loop stopped");
    }
}
