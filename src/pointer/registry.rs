//! Interning table: one pointer per (listener group, protocol, path).

use rustc_hash::FxHashMap;

use super::listener::ListenerTag;
use super::FilePointer;
use crate::vfs::url::fold_case;

/// Registry key. The path is case-folded on case-insensitive trees.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct PointerKey {
    protocol: String,
    path: String,
}

impl PointerKey {
    pub fn new(protocol: &str, path: &str, case_sensitive: bool) -> Self {
        Self {
            protocol: protocol.to_string(),
            path: fold_case(path, case_sensitive).into_owned(),
        }
    }
}

/// Outcome of moving a pointer to a new key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Rekey {
    Moved,
    /// The new key was already taken; the occupant keeps the slot and the
    /// migrating pointer is no longer interned.
    Detached,
}

#[derive(Default)]
pub(crate) struct Registry {
    groups: FxHashMap<ListenerTag, FxHashMap<PointerKey, FilePointer>>,
}

impl Registry {
    pub fn get(&self, tag: ListenerTag, key: &PointerKey) -> Option<&FilePointer> {
        self.groups.get(&tag)?.get(key)
    }

    pub fn insert(&mut self, tag: ListenerTag, key: PointerKey, pointer: FilePointer) {
        self.groups.entry(tag).or_default().insert(key, pointer);
    }

    /// Remove the entry at `key` only if it is `pointer` itself.
    pub fn remove(&mut self, tag: ListenerTag, key: &PointerKey, pointer: &FilePointer) -> bool {
        let Some(group) = self.groups.get_mut(&tag) else {
            return false;
        };
        if !group.get(key).is_some_and(|p| p.ptr_eq(pointer)) {
            return false;
        }
        group.remove(key);
        if group.is_empty() {
            self.groups.remove(&tag);
        }
        true
    }

    pub fn rekey(
        &mut self,
        tag: ListenerTag,
        old: &PointerKey,
        new: PointerKey,
        pointer: &FilePointer,
    ) -> Rekey {
        self.remove(tag, old, pointer);
        let group = self.groups.entry(tag).or_default();
        match group.get(&new) {
            Some(occupant) if !occupant.ptr_eq(pointer) => Rekey::Detached,
            _ => {
                group.insert(new, pointer.clone());
                Rekey::Moved
            }
        }
    }

    /// Snapshot of every interned pointer.
    pub fn pointers(&self) -> Vec<FilePointer> {
        self.groups.values().flat_map(|g| g.values().cloned()).collect()
    }

    pub fn len(&self) -> usize {
        self.groups.values().map(FxHashMap::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Weak};

    use super::*;
    use crate::pointer::error::Trace;
    use crate::pointer::file_pointer::PointerState;
    use crate::vfs::FileSystemRegistry;

    fn pointer(url: &str) -> FilePointer {
        FilePointer::new(
            PointerState::Unresolved(url.to_string()),
            ListenerTag::Silent,
            None,
            Trace::capture(false),
            Arc::new(FileSystemRegistry::new()),
            Weak::new(),
        )
    }

    #[test]
    fn test_key_case_folding() {
        assert_eq!(
            PointerKey::new("mem", "/A/B.txt", false),
            PointerKey::new("mem", "/a/b.TXT", false)
        );
        assert_ne!(
            PointerKey::new("mem", "/A/B.txt", true),
            PointerKey::new("mem", "/a/b.txt", true)
        );
        assert_ne!(
            PointerKey::new("mem", "/a", true),
            PointerKey::new("jar", "/a", true)
        );
    }

    #[test]
    fn test_remove_only_same_pointer() {
        let mut registry = Registry::default();
        let key = PointerKey::new("mem", "/a", true);
        let a = pointer("mem:///a");
        let impostor = pointer("mem:///a");
        registry.insert(ListenerTag::Silent, key.clone(), a.clone());

        assert!(!registry.remove(ListenerTag::Silent, &key, &impostor));
        assert_eq!(registry.len(), 1);
        assert!(registry.remove(ListenerTag::Silent, &key, &a));
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_rekey_collision_keeps_occupant() {
        let mut registry = Registry::default();
        let old = PointerKey::new("mem", "/a", true);
        let new = PointerKey::new("mem", "/b", true);
        let moving = pointer("mem:///a");
        let occupant = pointer("mem:///b");
        registry.insert(ListenerTag::Silent, old.clone(), moving.clone());
        registry.insert(ListenerTag::Silent, new.clone(), occupant.clone());

        assert_eq!(
            registry.rekey(ListenerTag::Silent, &old, new.clone(), &moving),
            Rekey::Detached
        );
        assert!(registry.get(ListenerTag::Silent, &new).unwrap().ptr_eq(&occupant));
        assert!(registry.get(ListenerTag::Silent, &old).is_none());
    }

    #[test]
    fn test_rekey_moves() {
        let mut registry = Registry::default();
        let old = PointerKey::new("mem", "/a", true);
        let new = PointerKey::new("mem", "/b", true);
        let moving = pointer("mem:///a");
        registry.insert(ListenerTag::Silent, old.clone(), moving.clone());

        assert_eq!(
            registry.rekey(ListenerTag::Silent, &old, new.clone(), &moving),
            Rekey::Moved
        );
        assert!(registry.get(ListenerTag::Silent, &new).unwrap().ptr_eq(&moving));
        assert_eq!(registry.len(), 1);
    }
}
