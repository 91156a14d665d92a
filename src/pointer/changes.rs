//! Two-phase change processing.
//!
//! ```text
//! before(events)                      after(events)
//! ──────────────                      ─────────────
//! snapshot registry                   re-key moved/renamed pointers
//! pick affected pointers              re-resolve affected pointers
//! group by listener                   bump modification count
//! before_validity_changed(group)      validity_changed(same groups)
//! ```
//!
//! Affected pointers are chosen by URL before anything moves, so the
//! selection sees the old world; the after phase re-resolves them against
//! the new one.

use rustc_hash::FxHashSet;
use smallvec::SmallVec;

use super::listener::ListenerId;
use super::manager::Shared;
use super::FilePointer;
use crate::vfs::url::{extract_path, extract_protocol, is_under, strip_trailing_separator};
use crate::vfs::FileEvent;

/// Where the manager is in the batch protocol.
#[derive(Default)]
pub(crate) enum Phase {
    #[default]
    Idle,
    /// `before` is selecting pointers and notifying listeners.
    Collecting,
    /// Between `before` and `after`.
    Pending(Batch),
    /// `after` is re-resolving and notifying.
    Applying,
}

pub(crate) type Groups = SmallVec<[(ListenerId, Vec<FilePointer>); 4]>;

/// Pointers selected by `before`, consumed by `after`.
#[derive(Default)]
pub(crate) struct Batch {
    /// Pointers whose validity may change.
    pub candidates: Vec<FilePointer>,
    /// Pointers whose file keeps its identity but changes URL.
    pub relocated: Vec<FilePointer>,
    /// `candidates` partitioned by listener; silent pointers are left out.
    pub groups: Groups,
}

#[derive(Default)]
struct PointerSet {
    seen: FxHashSet<FilePointer>,
    items: Vec<FilePointer>,
}

impl PointerSet {
    fn insert(&mut self, pointer: &FilePointer) {
        if self.seen.insert(pointer.clone()) {
            self.items.push(pointer.clone());
        }
    }
}

/// Select affected pointers for a batch that has not happened yet.
pub(crate) fn collect(shared: &Shared, events: &[FileEvent]) -> Batch {
    let snapshot = shared.registry.lock().pointers();
    let mut candidates = PointerSet::default();
    let mut relocated = PointerSet::default();

    for event in events {
        match event {
            FileEvent::ContentChange { .. } => {}
            FileEvent::Delete { url } => select(shared, &snapshot, url, &mut candidates),
            FileEvent::Create { .. } | FileEvent::Copy { .. } => {
                if let Some(new_url) = event.new_url() {
                    select(shared, &snapshot, &new_url, &mut candidates);
                }
            }
            FileEvent::Move { url, .. } | FileEvent::Rename { url, .. } => {
                select(shared, &snapshot, url, &mut relocated);
                if let Some(new_url) = event.new_url() {
                    select(shared, &snapshot, &new_url, &mut candidates);
                }
            }
        }
    }

    let groups = group(&candidates.items);
    Batch {
        candidates: candidates.items,
        relocated: relocated.items,
        groups,
    }
}

/// Pointers at or below `target`, on the same tree.
fn select(shared: &Shared, snapshot: &[FilePointer], target: &str, out: &mut PointerSet) {
    let target = strip_trailing_separator(target);
    let Some(protocol) = extract_protocol(target) else {
        return;
    };
    let target_path = extract_path(target);
    let case_sensitive = shared
        .file_systems
        .get(protocol)
        .is_none_or(|fs| fs.is_case_sensitive());

    for pointer in snapshot {
        if pointer.is_disposed() {
            continue;
        }
        let Some((pointer_protocol, path)) = pointer.location() else {
            continue;
        };
        if pointer_protocol == protocol && is_under(&path, target_path, case_sensitive) {
            out.insert(pointer);
        }
    }
}

/// Partition by listener, ordered by listener id.
fn group(pointers: &[FilePointer]) -> Groups {
    let mut groups = Groups::new();
    for pointer in pointers {
        let Some(id) = pointer.listener().id() else {
            continue;
        };
        match groups.iter_mut().find(|(group_id, _)| *group_id == id) {
            Some((_, members)) => members.push(pointer.clone()),
            None => groups.push((id, vec![pointer.clone()])),
        }
    }
    groups.sort_by_key(|(id, _)| *id);
    groups
}

/// Bring selected pointers in line with the mutated world.
pub(crate) fn apply(shared: &Shared, batch: &Batch) {
    for pointer in batch.relocated.iter().filter(|p| !p.is_disposed()) {
        pointer.update();
        shared.rekey(pointer);
    }
    for pointer in batch.candidates.iter().filter(|p| !p.is_disposed()) {
        pointer.update();
    }
}

pub(crate) fn notify_before(shared: &Shared, groups: &Groups) {
    for (id, pointers) in groups {
        if let Some(listener) = shared.listener(*id) {
            listener.before_validity_changed(pointers);
        }
    }
}

/// Pointers disposed by a listener during the batch are left out.
pub(crate) fn notify_after(shared: &Shared, groups: &Groups) {
    for (id, pointers) in groups {
        let alive: Vec<_> = pointers.iter().filter(|p| !p.is_disposed()).cloned().collect();
        if alive.is_empty() {
            continue;
        }
        if let Some(listener) = shared.listener(*id) {
            listener.validity_changed(&alive);
        }
    }
}
