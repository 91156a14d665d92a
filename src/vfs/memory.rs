//! In-memory resource tree.
//!
//! Nodes live in an arena and are addressed by index. A [`FileHandle`]
//! holds the index, so it follows its node through renames and moves, and
//! still knows where the node was after it is deleted.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use super::event::FileEvent;
use super::url::{extract_path, extract_protocol, file_name, join_path, paths_equal};
use super::{FileHandle, FileSystem, VfsError, VirtualFile};

type NodeId = usize;

const ROOT: NodeId = 0;

#[derive(Debug, Clone)]
struct Node {
    name: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    directory: bool,
    alive: bool,
}

#[derive(Debug)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn new() -> Self {
        Self {
            nodes: vec![Node {
                name: String::new(),
                parent: None,
                children: Vec::new(),
                directory: true,
                alive: true,
            }],
        }
    }

    fn path_of(&self, id: NodeId) -> String {
        let mut segments = Vec::new();
        let mut current = Some(id);
        while let Some(node_id) = current {
            let node = &self.nodes[node_id];
            if node.parent.is_some() {
                segments.push(node.name.as_str());
            }
            current = node.parent;
        }
        segments.reverse();

        let mut path = format!("/{}", segments.join("/"));
        if path.ends_with('!') {
            path.push('/');
        }
        path
    }

    fn child(&self, parent: NodeId, name: &str, case_sensitive: bool) -> Option<NodeId> {
        self.nodes[parent]
            .children
            .iter()
            .copied()
            .find(|&c| self.nodes[c].alive && paths_equal(&self.nodes[c].name, name, case_sensitive))
    }

    fn find(&self, path: &str, case_sensitive: bool) -> Option<NodeId> {
        path.split('/')
            .filter(|s| !s.is_empty())
            .try_fold(ROOT, |node, name| self.child(node, name, case_sensitive))
    }

    fn add(&mut self, parent: NodeId, name: &str, directory: bool) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Node {
            name: name.to_string(),
            parent: Some(parent),
            children: Vec::new(),
            directory,
            alive: true,
        });
        self.nodes[parent].children.push(id);
        id
    }

    fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id].parent {
            self.nodes[parent].children.retain(|&c| c != id);
        }
    }

    fn kill(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(node) = stack.pop() {
            self.nodes[node].alive = false;
            stack.extend(self.nodes[node].children.iter().copied());
        }
    }

    fn copy_subtree(&mut self, source: NodeId, parent: NodeId, name: &str) -> NodeId {
        let directory = self.nodes[source].directory;
        let copy = self.add(parent, name, directory);
        let children: Vec<_> = self.nodes[source]
            .children
            .iter()
            .copied()
            .filter(|&c| self.nodes[c].alive)
            .collect();
        for child in children {
            let child_name = self.nodes[child].name.clone();
            self.copy_subtree(child, copy, &child_name);
        }
        copy
    }
}

/// In-memory [`FileSystem`].
pub struct MemoryFileSystem {
    protocol: String,
    persistent: bool,
    case_sensitive: bool,
    tree: RwLock<Tree>,
    this: Weak<MemoryFileSystem>,
}

impl MemoryFileSystem {
    /// Persistent, case-sensitive tree for `protocol`.
    pub fn new(protocol: impl Into<String>) -> Arc<Self> {
        Self::with_options(protocol, true, true)
    }

    /// Tree whose entries are never interned by the pointer manager.
    pub fn non_persistent(protocol: impl Into<String>) -> Arc<Self> {
        Self::with_options(protocol, false, true)
    }

    /// Persistent tree that ignores case in names.
    pub fn case_insensitive(protocol: impl Into<String>) -> Arc<Self> {
        Self::with_options(protocol, true, false)
    }

    pub fn with_options(
        protocol: impl Into<String>,
        persistent: bool,
        case_sensitive: bool,
    ) -> Arc<Self> {
        let protocol = protocol.into();
        Arc::new_cyclic(|this| Self {
            protocol,
            persistent,
            case_sensitive,
            tree: RwLock::new(Tree::new()),
            this: this.clone(),
        })
    }

    fn handle(&self, id: NodeId) -> Option<FileHandle> {
        let fs = self.this.upgrade()?;
        Some(FileHandle::new(MemoryFile { fs, id }))
    }

    /// Create a file and any missing parent directories. No events are sent.
    pub fn create_file(&self, path: &str) -> Result<FileHandle, VfsError> {
        self.create_entry(path, false)
    }

    /// Create a directory and any missing parents. No events are sent.
    pub fn create_dir(&self, path: &str) -> Result<FileHandle, VfsError> {
        self.create_entry(path, true)
    }

    fn create_entry(&self, path: &str, directory: bool) -> Result<FileHandle, VfsError> {
        let id = {
            let mut tree = self.tree.write();
            let segments: Vec<_> = path.split('/').filter(|s| !s.is_empty()).collect();
            let Some((last, parents)) = segments.split_last() else {
                return self.handle(ROOT).ok_or_else(|| VfsError::NotFound(path.into()));
            };

            let mut node = ROOT;
            for name in parents {
                node = match tree.child(node, name, self.case_sensitive) {
                    Some(child) if tree.nodes[child].directory => child,
                    Some(child) => return Err(VfsError::NotADirectory(tree.path_of(child))),
                    None => tree.add(node, name, true),
                };
            }

            match tree.child(node, last, self.case_sensitive) {
                Some(existing) if tree.nodes[existing].directory == directory => existing,
                Some(_) => return Err(VfsError::AlreadyExists(path.to_string())),
                None => tree.add(node, last, directory),
            }
        };
        self.handle(id).ok_or_else(|| VfsError::NotFound(path.to_string()))
    }

    /// Apply one event to the tree.
    pub fn apply(&self, event: &FileEvent) -> Result<(), VfsError> {
        crate::debug!("vfs"; "apply {} {}", event.label(), event.url());
        match event {
            FileEvent::Create {
                parent,
                name,
                directory,
            } => {
                let parent = self.own_path(parent)?;
                self.create_child(parent, name, *directory).map(|_| ())
            }
            FileEvent::Delete { url } => self.delete(self.own_path(url)?),
            FileEvent::Copy {
                url,
                new_parent,
                new_name,
            } => {
                let source = self.own_path(url)?;
                let new_parent = self.own_path(new_parent)?;
                self.copy(source, new_parent, new_name).map(|_| ())
            }
            FileEvent::Move {
                url, new_parent, ..
            } => self.move_to(self.own_path(url)?, self.own_path(new_parent)?),
            FileEvent::Rename { url, new_name, .. } => self.rename(self.own_path(url)?, new_name),
            FileEvent::ContentChange { url } => {
                let path = self.own_path(url)?;
                self.find_node(path)
                    .map(|_| ())
                    .ok_or_else(|| VfsError::NotFound(url.clone()))
            }
        }
    }

    /// Apply a batch of events in order, stopping at the first failure.
    pub fn apply_all(&self, events: &[FileEvent]) -> Result<(), VfsError> {
        events.iter().try_for_each(|event| self.apply(event))
    }

    /// Create `name` under the directory at `parent`.
    pub fn create_child(
        &self,
        parent: &str,
        name: &str,
        directory: bool,
    ) -> Result<FileHandle, VfsError> {
        let id = {
            let mut tree = self.tree.write();
            let parent_id = self.existing_dir(&tree, parent)?;
            if tree.child(parent_id, name, self.case_sensitive).is_some() {
                return Err(VfsError::AlreadyExists(join_path(parent, name)));
            }
            tree.add(parent_id, name, directory)
        };
        self.handle(id).ok_or_else(|| VfsError::NotFound(parent.to_string()))
    }

    /// Delete the entry at `path` and everything below it.
    pub fn delete(&self, path: &str) -> Result<(), VfsError> {
        let mut tree = self.tree.write();
        let id = self.existing(&tree, path)?;
        if id == ROOT {
            return Err(VfsError::NotFound(path.to_string()));
        }
        tree.detach(id);
        tree.kill(id);
        Ok(())
    }

    /// Give the entry at `path` a new name, keeping its identity.
    pub fn rename(&self, path: &str, new_name: &str) -> Result<(), VfsError> {
        let mut tree = self.tree.write();
        let id = self.existing(&tree, path)?;
        let parent = tree.nodes[id]
            .parent
            .ok_or_else(|| VfsError::NotFound(path.to_string()))?;
        if let Some(other) = tree.child(parent, new_name, self.case_sensitive)
            && other != id
        {
            return Err(VfsError::AlreadyExists(new_name.to_string()));
        }
        tree.nodes[id].name = new_name.to_string();
        Ok(())
    }

    /// Move the entry at `path` under the directory at `new_parent`, keeping its identity.
    pub fn move_to(&self, path: &str, new_parent: &str) -> Result<(), VfsError> {
        let mut tree = self.tree.write();
        let id = self.existing(&tree, path)?;
        let parent_id = self.existing_dir(&tree, new_parent)?;
        let name = tree.nodes[id].name.clone();
        if tree.child(parent_id, &name, self.case_sensitive).is_some() {
            return Err(VfsError::AlreadyExists(join_path(new_parent, &name)));
        }
        tree.detach(id);
        tree.nodes[id].parent = Some(parent_id);
        tree.nodes[parent_id].children.push(id);
        Ok(())
    }

    /// Copy the entry at `path` (recursively) to `new_parent/new_name`.
    pub fn copy(&self, path: &str, new_parent: &str, new_name: &str) -> Result<FileHandle, VfsError> {
        let id = {
            let mut tree = self.tree.write();
            let source = self.existing(&tree, path)?;
            let parent_id = self.existing_dir(&tree, new_parent)?;
            if tree.child(parent_id, new_name, self.case_sensitive).is_some() {
                return Err(VfsError::AlreadyExists(join_path(new_parent, new_name)));
            }
            tree.copy_subtree(source, parent_id, new_name)
        };
        self.handle(id).ok_or_else(|| VfsError::NotFound(path.to_string()))
    }

    fn own_path<'a>(&self, url: &'a str) -> Result<&'a str, VfsError> {
        match extract_protocol(url) {
            Some(protocol) if protocol == self.protocol => Ok(extract_path(url)),
            _ => Err(VfsError::WrongFileSystem {
                url: url.to_string(),
                protocol: self.protocol.clone(),
            }),
        }
    }

    fn find_node(&self, path: &str) -> Option<NodeId> {
        self.tree.read().find(path, self.case_sensitive)
    }

    fn existing(&self, tree: &Tree, path: &str) -> Result<NodeId, VfsError> {
        tree.find(path, self.case_sensitive)
            .ok_or_else(|| VfsError::NotFound(path.to_string()))
    }

    fn existing_dir(&self, tree: &Tree, path: &str) -> Result<NodeId, VfsError> {
        let id = self.existing(tree, path)?;
        if tree.nodes[id].directory {
            Ok(id)
        } else {
            Err(VfsError::NotADirectory(path.to_string()))
        }
    }
}

impl fmt::Debug for MemoryFileSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryFileSystem")
            .field("protocol", &self.protocol)
            .field("persistent", &self.persistent)
            .field("case_sensitive", &self.case_sensitive)
            .finish()
    }
}

impl FileSystem for MemoryFileSystem {
    fn protocol(&self) -> &str {
        &self.protocol
    }

    fn find_file_by_path(&self, path: &str) -> Option<FileHandle> {
        let id = self.find_node(path)?;
        self.handle(id)
    }

    fn is_persistent(&self) -> bool {
        self.persistent
    }

    fn is_case_sensitive(&self) -> bool {
        self.case_sensitive
    }
}

/// Handle to one arena node.
struct MemoryFile {
    fs: Arc<MemoryFileSystem>,
    id: NodeId,
}

impl fmt::Debug for MemoryFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MemoryFile({}://{})", self.fs.protocol, self.path())
    }
}

impl VirtualFile for MemoryFile {
    fn file_system(&self) -> Arc<dyn FileSystem> {
        self.fs.clone()
    }

    fn path(&self) -> String {
        self.fs.tree.read().path_of(self.id)
    }

    fn name(&self) -> String {
        let path = self.path();
        file_name(&path).to_string()
    }

    fn is_directory(&self) -> bool {
        self.fs.tree.read().nodes[self.id].directory
    }

    fn is_valid(&self) -> bool {
        self.fs.tree.read().nodes[self.id].alive
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_find() {
        let fs = MemoryFileSystem::new("mem");
        let file = fs.create_file("/proj/src/Main.txt").unwrap();
        assert_eq!(file.path(), "/proj/src/Main.txt");
        assert!(file.is_valid());
        assert!(!file.is_directory());

        let dir = fs.find_file_by_path("/proj/src").unwrap();
        assert!(dir.is_directory());
        assert!(fs.find_file_by_path("/proj/missing").is_none());
    }

    #[test]
    fn test_root() {
        let fs = MemoryFileSystem::new("mem");
        let root = fs.find_file_by_path("/").unwrap();
        assert_eq!(root.path(), "/");
        assert!(root.is_directory());
    }

    #[test]
    fn test_archive_root_path() {
        let fs = MemoryFileSystem::new("jar");
        let entry = fs.create_file("/lib/outer.jar!/a/b.class").unwrap();
        assert_eq!(entry.url(), "jar:///lib/outer.jar!/a/b.class");
        let root = fs.find_file_by_path("/lib/outer.jar!/").unwrap();
        assert_eq!(root.path(), "/lib/outer.jar!/");
        assert_eq!(root.name(), "outer.jar");
    }

    #[test]
    fn test_handle_follows_rename_and_move() {
        let fs = MemoryFileSystem::new("mem");
        let file = fs.create_file("/a/b.txt").unwrap();
        fs.create_dir("/z").unwrap();

        fs.rename("/a/b.txt", "c.txt").unwrap();
        assert_eq!(file.path(), "/a/c.txt");

        fs.move_to("/a/c.txt", "/z").unwrap();
        assert_eq!(file.path(), "/z/c.txt");
        assert!(file.is_valid());
        assert!(fs.find_file_by_path("/a/c.txt").is_none());
    }

    #[test]
    fn test_deleted_handle_remembers_path() {
        let fs = MemoryFileSystem::new("mem");
        let dir = fs.create_dir("/a").unwrap();
        let file = fs.create_file("/a/b.txt").unwrap();

        fs.delete("/a").unwrap();
        assert!(!dir.is_valid());
        assert!(!file.is_valid());
        assert_eq!(file.path(), "/a/b.txt");
        assert!(fs.find_file_by_path("/a/b.txt").is_none());

        // Recreating yields a different node
        let again = fs.create_file("/a/b.txt").unwrap();
        assert!(again.is_valid());
        assert!(!file.is_valid());
    }

    #[test]
    fn test_copy_is_deep() {
        let fs = MemoryFileSystem::new("mem");
        fs.create_file("/a/x/1.txt").unwrap();
        fs.create_dir("/b").unwrap();
        fs.copy("/a/x", "/b", "y").unwrap();
        assert!(fs.find_file_by_path("/b/y/1.txt").is_some());
        assert!(fs.find_file_by_path("/a/x/1.txt").is_some());
    }

    #[test]
    fn test_apply_events() {
        let fs = MemoryFileSystem::new("mem");
        fs.create_dir("/a").unwrap();

        fs.apply_all(&[
            FileEvent::create("mem:///a", "b.txt", false),
            FileEvent::rename("mem:///a/b.txt", "c.txt"),
            FileEvent::content_change("mem:///a/c.txt"),
        ])
        .unwrap();
        assert!(fs.find_file_by_path("/a/c.txt").is_some());

        fs.apply(&FileEvent::delete("mem:///a/c.txt")).unwrap();
        assert!(fs.find_file_by_path("/a/c.txt").is_none());
    }

    #[test]
    fn test_apply_errors() {
        let fs = MemoryFileSystem::new("mem");
        fs.create_file("/a.txt").unwrap();

        assert!(matches!(
            fs.apply(&FileEvent::delete("other:///a.txt")),
            Err(VfsError::WrongFileSystem { .. })
        ));
        assert!(matches!(
            fs.apply(&FileEvent::delete("mem:///missing")),
            Err(VfsError::NotFound(_))
        ));
        assert!(matches!(
            fs.apply(&FileEvent::create("mem:///", "a.txt", false)),
            Err(VfsError::AlreadyExists(_))
        ));
        assert!(matches!(
            fs.apply(&FileEvent::create("mem:///a.txt", "x", false)),
            Err(VfsError::NotADirectory(_))
        ));
    }

    #[test]
    fn test_case_insensitive_lookup() {
        let fs = MemoryFileSystem::case_insensitive("mem");
        fs.create_file("/Docs/Readme.TXT").unwrap();
        let file = fs.find_file_by_path("/docs/readme.txt").unwrap();
        assert_eq!(file.path(), "/Docs/Readme.TXT");
        assert!(!fs.is_case_sensitive());
    }
}
