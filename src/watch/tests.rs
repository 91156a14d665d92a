use std::path::PathBuf;
use std::time::Duration;

use tempfile::TempDir;

use super::debouncer::Debouncer;
use super::translate::to_file_events;
use super::types::{ChangeKind, DebouncedChanges};
use crate::vfs::{FileEvent, LocalFileSystem};

const WINDOW: Duration = Duration::from_millis(300);

fn make_event(paths: Vec<&str>, kind: notify::EventKind) -> notify::Event {
    notify::Event {
        kind,
        paths: paths.into_iter().map(PathBuf::from).collect(),
        attrs: Default::default(),
    }
}

fn modify_kind() -> notify::EventKind {
    notify::EventKind::Modify(notify::event::ModifyKind::Data(
        notify::event::DataChange::Any,
    ))
}

fn create_kind() -> notify::EventKind {
    notify::EventKind::Create(notify::event::CreateKind::File)
}

fn remove_kind() -> notify::EventKind {
    notify::EventKind::Remove(notify::event::RemoveKind::File)
}

// ============================================================================
// Debouncer
// ============================================================================

#[test]
fn test_debouncer_empty() {
    let debouncer = Debouncer::new(WINDOW);
    assert!(!debouncer.is_ready());
}

#[test]
fn test_event_routing_by_kind() {
    let mut debouncer = Debouncer::new(WINDOW);

    debouncer.add_event(&make_event(vec!["/tmp/a.txt"], create_kind()));
    debouncer.add_event(&make_event(vec!["/tmp/b.txt"], modify_kind()));
    debouncer.add_event(&make_event(vec!["/tmp/c.txt"], remove_kind()));

    assert_eq!(debouncer.changes.len(), 3);
    assert_eq!(debouncer.changes[&PathBuf::from("/tmp/a.txt")], ChangeKind::Created);
    assert_eq!(debouncer.changes[&PathBuf::from("/tmp/b.txt")], ChangeKind::Modified);
    assert_eq!(debouncer.changes[&PathBuf::from("/tmp/c.txt")], ChangeKind::Removed);
}

#[test]
fn test_metadata_ignored() {
    let mut debouncer = Debouncer::new(WINDOW);
    let kind = notify::EventKind::Modify(notify::event::ModifyKind::Metadata(
        notify::event::MetadataKind::Any,
    ));
    debouncer.add_event(&make_event(vec!["/tmp/a.txt"], kind));
    assert!(debouncer.changes.is_empty());
    assert!(debouncer.last_event.is_none());
}

#[test]
fn test_temp_file_ignored() {
    let mut debouncer = Debouncer::new(WINDOW);

    debouncer.add_event(&make_event(vec!["/tmp/real.txt"], modify_kind()));
    let first_time = debouncer.last_event.unwrap();

    std::thread::sleep(Duration::from_millis(5));

    debouncer.add_event(&make_event(vec!["/tmp/real.txt.swp"], modify_kind()));
    debouncer.add_event(&make_event(vec!["/tmp/real.txt~"], modify_kind()));
    assert_eq!(debouncer.last_event.unwrap(), first_time);
    assert_eq!(debouncer.changes.len(), 1);
}

#[test]
fn test_dedup_first_event_wins() {
    let mut debouncer = Debouncer::new(WINDOW);
    debouncer.add_event(&make_event(vec!["/tmp/a.txt"], create_kind()));
    debouncer.add_event(&make_event(vec!["/tmp/a.txt"], modify_kind()));

    assert_eq!(debouncer.changes.len(), 1);
    assert_eq!(debouncer.changes[&PathBuf::from("/tmp/a.txt")], ChangeKind::Created);
}

#[test]
fn test_remove_then_create_restores() {
    let mut debouncer = Debouncer::new(WINDOW);
    debouncer.add_event(&make_event(vec!["/tmp/a.txt"], remove_kind()));
    debouncer.add_event(&make_event(vec!["/tmp/a.txt"], create_kind()));
    assert_eq!(debouncer.changes[&PathBuf::from("/tmp/a.txt")], ChangeKind::Created);
}

#[test]
fn test_modify_then_remove_upgrades() {
    let mut debouncer = Debouncer::new(WINDOW);
    debouncer.add_event(&make_event(vec!["/tmp/a.txt"], modify_kind()));
    debouncer.add_event(&make_event(vec!["/tmp/a.txt"], remove_kind()));
    assert_eq!(debouncer.changes[&PathBuf::from("/tmp/a.txt")], ChangeKind::Removed);
}

#[test]
fn test_create_then_remove_discards() {
    let mut debouncer = Debouncer::new(WINDOW);
    debouncer.add_event(&make_event(vec!["/tmp/a.txt"], create_kind()));
    debouncer.add_event(&make_event(vec!["/tmp/a.txt"], remove_kind()));
    assert!(debouncer.changes.is_empty(), "created+removed should discard");
}

#[test]
fn test_rename_classified_by_existence() {
    let dir = TempDir::new().unwrap();
    let old = dir.path().join("a.txt");
    let new = dir.path().join("b.txt");
    std::fs::write(&old, "a").unwrap();
    std::fs::rename(&old, &new).unwrap();

    let both = notify::EventKind::Modify(notify::event::ModifyKind::Name(
        notify::event::RenameMode::Both,
    ));
    let mut debouncer = Debouncer::new(WINDOW);
    debouncer.add_event(&notify::Event {
        kind: both,
        paths: vec![old.clone(), new.clone()],
        attrs: Default::default(),
    });

    assert_eq!(debouncer.changes.len(), 2);
    assert_eq!(debouncer.changes[&old], ChangeKind::Removed);
    assert_eq!(debouncer.changes[&new], ChangeKind::Created);
}

#[test]
fn test_rename_halves_delivered_separately() {
    let dir = TempDir::new().unwrap();
    let old = dir.path().join("a.txt");
    let new = dir.path().join("b.txt");
    std::fs::write(&new, "b").unwrap();

    let mut debouncer = Debouncer::new(WINDOW);
    for (path, mode) in [
        (&old, notify::event::RenameMode::From),
        (&new, notify::event::RenameMode::To),
    ] {
        debouncer.add_event(&notify::Event {
            kind: notify::EventKind::Modify(notify::event::ModifyKind::Name(mode)),
            paths: vec![path.clone()],
            attrs: Default::default(),
        });
    }

    assert_eq!(debouncer.changes[&old], ChangeKind::Removed);
    assert_eq!(debouncer.changes[&new], ChangeKind::Created);
}

#[test]
fn test_disk_rename_invalidates_pointer() {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use crate::pointer::{FilePointer, PointerListener, PointerManager};
    use crate::scope::ScopeTree;
    use crate::vfs::FileSystemRegistry;

    #[derive(Default)]
    struct Invalidated(Mutex<Vec<(String, bool)>>);

    impl PointerListener for Invalidated {
        fn before_validity_changed(&self, _pointers: &[FilePointer]) {}

        fn validity_changed(&self, pointers: &[FilePointer]) {
            let mut seen = self.0.lock();
            seen.extend(pointers.iter().map(|p| (p.url(), p.is_valid())));
        }
    }

    let dir = TempDir::new().unwrap();
    let old = dir.path().join("a.txt");
    let new = dir.path().join("b.txt");
    std::fs::write(&old, "a").unwrap();

    let file_systems = Arc::new(FileSystemRegistry::new());
    file_systems.register(LocalFileSystem::new(true));
    let manager = PointerManager::new(file_systems, Arc::new(ScopeTree::new()));
    let listener = Arc::new(Invalidated::default());
    let id = manager.register_listener(listener.clone());
    let old_url = LocalFileSystem::url_for_path(&old);
    let pointer = manager.acquire(&old_url, id).unwrap();
    assert!(pointer.is_valid());

    std::fs::rename(&old, &new).unwrap();
    let mut debouncer = Debouncer::new(Duration::from_millis(1));
    debouncer.add_event(&notify::Event {
        kind: notify::EventKind::Modify(notify::event::ModifyKind::Name(
            notify::event::RenameMode::Both,
        )),
        paths: vec![old, new],
        attrs: Default::default(),
    });
    std::thread::sleep(Duration::from_millis(5));
    let changes = debouncer.take_if_ready().unwrap();
    let events = to_file_events(&changes);
    assert!(events.contains(&FileEvent::delete(old_url.clone())));

    manager.process(&events, || ()).unwrap();

    assert!(!pointer.is_valid());
    assert_eq!(*listener.0.lock(), vec![(old_url, false)]);
}

#[test]
fn test_cancelled_changes_stop_timer() {
    let mut debouncer = Debouncer::new(WINDOW);
    debouncer.add_event(&make_event(vec!["/tmp/a.txt"], create_kind()));
    debouncer.add_event(&make_event(vec!["/tmp/a.txt"], remove_kind()));
    assert!(debouncer.take_if_ready().is_none());
    assert!(debouncer.sleep_duration() >= Duration::from_secs(3600));
}

#[test]
fn test_sleep_duration_no_events() {
    let debouncer = Debouncer::new(WINDOW);
    assert!(debouncer.sleep_duration() >= Duration::from_secs(3600));
}

#[test]
fn test_sleep_duration_after_event() {
    let mut debouncer = Debouncer::new(WINDOW);
    debouncer.last_event = Some(std::time::Instant::now());

    let dur = debouncer.sleep_duration();
    assert!(dur >= WINDOW - Duration::from_millis(10));
    assert!(dur <= WINDOW);
}

#[test]
fn test_take_if_ready_after_window() {
    let mut debouncer = Debouncer::new(Duration::from_millis(10));
    debouncer.add_event(&make_event(vec!["/tmp/b.txt", "/tmp/a.txt"], modify_kind()));
    assert!(debouncer.take_if_ready().is_none());

    std::thread::sleep(Duration::from_millis(20));
    let changes = debouncer.take_if_ready().unwrap();
    assert_eq!(
        changes,
        DebouncedChanges(vec![
            (PathBuf::from("/tmp/a.txt"), ChangeKind::Modified),
            (PathBuf::from("/tmp/b.txt"), ChangeKind::Modified),
        ])
    );
    assert!(!debouncer.is_ready());
    assert!(debouncer.take_if_ready().is_none());
}

// ============================================================================
// Translation
// ============================================================================

#[test]
fn test_translate_order() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    std::fs::create_dir(root.join("new")).unwrap();

    let changes = DebouncedChanges(vec![
        (root.join("edited.txt"), ChangeKind::Modified),
        (root.join("gone.txt"), ChangeKind::Removed),
        (root.join("new"), ChangeKind::Created),
    ]);
    let events = to_file_events(&changes);

    let root_url = LocalFileSystem::url_for_path(root);
    assert_eq!(
        events,
        vec![
            FileEvent::delete(LocalFileSystem::url_for_path(&root.join("gone.txt"))),
            FileEvent::create(root_url, "new", true),
            FileEvent::content_change(LocalFileSystem::url_for_path(&root.join("edited.txt"))),
        ]
    );
}

#[test]
fn test_translate_prunes_below_removed_dir() {
    let changes = DebouncedChanges(vec![
        (PathBuf::from("/p/dir"), ChangeKind::Removed),
        (PathBuf::from("/p/dir/a.txt"), ChangeKind::Removed),
        (PathBuf::from("/p/dir/b.txt"), ChangeKind::Modified),
        (PathBuf::from("/p/dirt.txt"), ChangeKind::Modified),
    ]);
    let events = to_file_events(&changes);
    assert_eq!(
        events,
        vec![
            FileEvent::delete("file:///p/dir"),
            FileEvent::content_change("file:///p/dirt.txt"),
        ]
    );
}
