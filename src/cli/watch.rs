//! `tether watch`: pin targets and report validity changes.
//!
//! ```text
//! FsWatcher ──FileEvent[]──▶ EventBus.dispatch ──▶ Reporter (validity changed)
//!                                                     └──▶ status line
//! ```
//!
//! The disk has already changed when a batch arrives, so the apply step of
//! the dispatch is empty. The engine's before phase selects pointers by URL
//! and does not need the old tree.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use tether::config::Config;
use tether::logger::{status_error, status_keep, status_success, status_unchanged};
use tether::pointer::{FilePointer, PointerListener};
use tether::vfs::FileEvent;
use tether::watch::FsWatcher;
use tether::{debug, log};
use tokio::sync::mpsc;

use super::common::{Engine, collect_targets, watch_dirs};
use crate::state;

/// Prints every validity change on the status line.
struct Reporter;

impl PointerListener for Reporter {
    fn before_validity_changed(&self, pointers: &[FilePointer]) {
        debug!("watch"; "{} pointer(s) about to change", pointers.len());
    }

    fn validity_changed(&self, pointers: &[FilePointer]) {
        let (valid, invalid): (Vec<_>, Vec<_>) = pointers.iter().partition(|p| p.is_valid());
        if !valid.is_empty() {
            status_success(&format!("valid: {}", join_paths(&valid)));
            status_keep();
        }
        if !invalid.is_empty() {
            status_error("invalid", &join_paths(&invalid));
            status_keep();
        }
    }
}

fn join_paths(pointers: &[&FilePointer]) -> String {
    pointers
        .iter()
        .map(|p| p.presentable_url())
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn run_watch(config: &Config, targets: &[String]) -> Result<()> {
    let engine = Engine::new(config);
    let scope = engine.scopes.root("watch");
    let listener = engine.manager.register_listener(Arc::new(Reporter));

    let urls = collect_targets(config, targets)?;
    let container = engine.manager.create_container(scope, listener)?;
    for url in &urls {
        container.add(url)?;
    }

    let dirs = watch_dirs(config, &urls);
    if dirs.is_empty() {
        bail!("nothing to watch: pass a local target or set [watch].roots");
    }
    let wanted = dirs.len();

    let watcher = FsWatcher::new(dirs, Duration::from_millis(config.watch.debounce_ms))?;
    log!(
        "watch";
        "{} pointer(s), {} of {} root(s) attached",
        container.len(),
        watcher.attached_roots(),
        wanted
    );
    for pointer in container.list() {
        let mark = if pointer.is_valid() { "ok" } else { "missing" };
        debug!("watch"; "{mark}: {}", pointer.url());
    }

    let (shutdown_tx, shutdown_rx) = mpsc::unbounded_channel();
    state::register_shutdown(shutdown_tx);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(watcher.run(shutdown_rx, |events| on_batch(&engine, &events)));

    engine.scopes.dispose(scope);
    engine.manager.unregister_listener(listener);
    engine.manager.shutdown();
    Ok(())
}

fn on_batch(engine: &Engine, events: &[FileEvent]) {
    if state::is_shutdown() {
        return;
    }
    debug_events(events);

    let before = engine.manager.modification_count();
    if let Err(err) = engine.bus.dispatch(events, || ()) {
        status_error("batch failed", &err.to_string());
        return;
    }
    debug!("watch"; "modification #{} (was #{})", engine.manager.modification_count(), before);
    status_unchanged(&format!("{} change(s) processed", events.len()));
}

fn debug_events(events: &[FileEvent]) {
    tether::debug_do! {
        for event in events {
            debug!("watch"; "{} {}", event.label(), event.url());
        }
    }
}
