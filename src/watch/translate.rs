//! Debounced disk changes → [`FileEvent`] batch.
//!
//! ```text
//! /p/a.txt  removed   ─▶ Delete  file:///p/a.txt
//! /p/b      created   ─▶ Create  file:///p + "b"
//! /p/b/c    created   ─▶ Create  file:///p/b + "c"
//! /p/d.txt  modified  ─▶ ContentChange file:///p/d.txt
//! ```
//!
//! Deletions come first, then creations (parents before children), then
//! content changes. Changes below a removed directory are dropped: the
//! directory's deletion already covers them.

use std::path::Path;

use super::types::{ChangeKind, DebouncedChanges};
use crate::vfs::{FileEvent, LocalFileSystem};

pub fn to_file_events(changes: &DebouncedChanges) -> Vec<FileEvent> {
    let removed: Vec<&Path> = changes
        .0
        .iter()
        .filter(|(_, kind)| *kind == ChangeKind::Removed)
        .map(|(path, _)| path.as_path())
        .collect();

    let mut deletes = Vec::new();
    let mut creates = Vec::new();
    let mut contents = Vec::new();

    for (path, kind) in &changes.0 {
        if removed.iter().any(|dir| *dir != path.as_path() && path.starts_with(dir)) {
            continue;
        }
        match kind {
            ChangeKind::Removed => deletes.push(FileEvent::delete(LocalFileSystem::url_for_path(path))),
            ChangeKind::Created => {
                let (Some(parent), Some(name)) = (path.parent(), path.file_name()) else {
                    continue;
                };
                creates.push(FileEvent::create(
                    LocalFileSystem::url_for_path(parent),
                    name.to_string_lossy(),
                    path.is_dir(),
                ));
            }
            ChangeKind::Modified => {
                contents.push(FileEvent::content_change(LocalFileSystem::url_for_path(path)));
            }
        }
    }

    deletes.extend(creates);
    deletes.extend(contents);
    deletes
}
