//! Virtual file system seam consumed by the pointer engine.
//!
//! The engine never walks a real tree itself. It talks to:
//!
//! - [`FileSystem`]: one resource tree, addressed by a protocol (`file`, `jar`, …)
//! - [`VirtualFile`]: a live entry inside a tree, shared as a [`FileHandle`]
//! - [`FileSystemRegistry`]: protocol -> tree lookup, URL resolution
//!
//! # Module Structure
//!
//! - [`url`]: URL string helpers (protocol, archive split, prefix matching)
//! - [`event`]: structural change events and the [`EventBus`]
//! - [`memory`]: in-memory arena tree ([`MemoryFileSystem`])
//! - [`local`]: disk-backed `file://` tree ([`LocalFileSystem`])

pub mod event;
mod local;
mod memory;
pub mod url;

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use thiserror::Error;

pub use event::{BulkFileListener, EventBus, FileEvent};
pub use local::{FILE_PROTOCOL, LocalFileSystem};
pub use memory::MemoryFileSystem;

// ============================================================================
// Errors
// ============================================================================

/// Errors raised while mutating a resource tree.
#[derive(Debug, Error)]
pub enum VfsError {
    #[error("no such file: {0}")]
    NotFound(String),

    #[error("file already exists: {0}")]
    AlreadyExists(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("`{url}` does not belong to the `{protocol}` file system")]
    WrongFileSystem { url: String, protocol: String },

    #[error("IO error at `{0}`")]
    Io(String, #[source] std::io::Error),
}

// ============================================================================
// Traits
// ============================================================================

/// A resource tree addressed by one protocol.
pub trait FileSystem: Send + Sync + fmt::Debug {
    /// URL protocol handled by this tree (without `://`).
    fn protocol(&self) -> &str;

    /// Find a live entry by its path (the part of the URL after `://`).
    fn find_file_by_path(&self, path: &str) -> Option<FileHandle>;

    /// Non-persistent trees hold throwaway entries with no stable URL;
    /// pointers to them are never interned.
    fn is_persistent(&self) -> bool {
        true
    }

    /// Case rule for paths in this tree.
    fn is_case_sensitive(&self) -> bool {
        true
    }
}

/// A live entry inside a [`FileSystem`].
///
/// Implementations must keep answering `path()` and `name()` after the entry
/// is gone, reporting where it was last seen.
pub trait VirtualFile: Send + Sync + fmt::Debug {
    /// The tree this entry belongs to.
    fn file_system(&self) -> Arc<dyn FileSystem>;

    /// Canonical path inside the tree.
    fn path(&self) -> String;

    /// Entry name (last path segment).
    fn name(&self) -> String;

    fn is_directory(&self) -> bool;

    /// Whether the entry still exists.
    fn is_valid(&self) -> bool;
}

// ============================================================================
// FileHandle
// ============================================================================

/// Shared handle to a [`VirtualFile`].
#[derive(Clone)]
pub struct FileHandle(Arc<dyn VirtualFile>);

impl FileHandle {
    pub fn new(file: impl VirtualFile + 'static) -> Self {
        Self(Arc::new(file))
    }

    /// Full URL (`protocol://path`).
    pub fn url(&self) -> String {
        url::construct_url(self.0.file_system().protocol(), &self.0.path())
    }

    pub fn path(&self) -> String {
        self.0.path()
    }

    pub fn name(&self) -> String {
        self.0.name()
    }

    pub fn is_directory(&self) -> bool {
        self.0.is_directory()
    }

    pub fn is_valid(&self) -> bool {
        self.0.is_valid()
    }

    pub fn file_system(&self) -> Arc<dyn FileSystem> {
        self.0.file_system()
    }
}

impl fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FileHandle").field(&self.url()).finish()
    }
}

impl fmt::Display for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url())
    }
}

impl PartialEq for FileHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.url() == other.url()
    }
}

impl Eq for FileHandle {}

// ============================================================================
// FileSystemRegistry
// ============================================================================

/// Protocol -> [`FileSystem`] map; the resolution service of the engine.
#[derive(Debug, Default)]
pub struct FileSystemRegistry {
    systems: RwLock<FxHashMap<String, Arc<dyn FileSystem>>>,
}

impl FileSystemRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tree under its protocol, replacing any previous one.
    pub fn register(&self, fs: Arc<dyn FileSystem>) {
        let protocol = fs.protocol().to_string();
        crate::debug!("vfs"; "registered file system `{}`", protocol);
        self.systems.write().insert(protocol, fs);
    }

    /// Tree for a protocol.
    pub fn get(&self, protocol: &str) -> Option<Arc<dyn FileSystem>> {
        self.systems.read().get(protocol).cloned()
    }

    /// Tree owning a URL, or `None` if the protocol is missing or unknown.
    pub fn file_system_for_url(&self, url: &str) -> Option<Arc<dyn FileSystem>> {
        url::extract_protocol(url).and_then(|protocol| self.get(protocol))
    }

    /// Resolve a URL to a live entry.
    ///
    /// A miss is not an error: the entry may simply not exist yet.
    pub fn resolve(&self, url: &str) -> Option<FileHandle> {
        let fs = self.file_system_for_url(url)?;
        let path = url::extract_path(url);
        fs.find_file_by_path(path).filter(FileHandle::is_valid)
    }

    /// Registered protocols, sorted.
    pub fn protocols(&self) -> Vec<String> {
        let mut protocols: Vec<_> = self.systems.read().keys().cloned().collect();
        protocols.sort();
        protocols
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_resolve() {
        let registry = FileSystemRegistry::new();
        let fs = MemoryFileSystem::new("mem");
        fs.create_file("/a/b.txt").unwrap();
        registry.register(fs);

        let file = registry.resolve("mem:///a/b.txt").unwrap();
        assert_eq!(file.url(), "mem:///a/b.txt");
        assert_eq!(file.name(), "b.txt");
        assert!(!file.is_directory());

        assert!(registry.resolve("mem:///a/missing.txt").is_none());
        assert!(registry.resolve("other:///a/b.txt").is_none());
        assert!(registry.resolve("/a/b.txt").is_none());
    }

    #[test]
    fn test_registry_protocols() {
        let registry = FileSystemRegistry::new();
        registry.register(MemoryFileSystem::new("mem"));
        registry.register(MemoryFileSystem::new("jar"));
        assert_eq!(registry.protocols(), vec!["jar", "mem"]);
        assert!(registry.file_system_for_url("jar:///x.jar!/").is_some());
        assert!(registry.file_system_for_url("zip:///x.zip!/").is_none());
    }

    #[test]
    fn test_handle_equality() {
        let fs = MemoryFileSystem::new("mem");
        let a = fs.create_file("/a.txt").unwrap();
        let again = fs.find_file_by_path("/a.txt").unwrap();
        let b = fs.create_file("/b.txt").unwrap();
        assert_eq!(a, again);
        assert_ne!(a, b);
    }
}
