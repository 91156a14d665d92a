//! Disk-backed `file://` tree.
//!
//! Handles are path snapshots: a handle keeps pointing at its path, and is
//! valid exactly while something exists there.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use super::url::{file_name, normalize_path, to_system_independent};
use super::{FileHandle, FileSystem, VirtualFile};

/// Protocol of the local file system.
pub const FILE_PROTOCOL: &str = "file";

/// [`FileSystem`] over the real disk.
pub struct LocalFileSystem {
    case_sensitive: bool,
    this: Weak<LocalFileSystem>,
}

impl LocalFileSystem {
    pub fn new(case_sensitive: bool) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            case_sensitive,
            this: this.clone(),
        })
    }

    /// URL for a local path, e.g. `/tmp/a.txt` -> `file:///tmp/a.txt`.
    pub fn url_for_path(path: &Path) -> String {
        let path = path.to_string_lossy();
        let path = to_system_independent(&path);
        if path.starts_with('/') {
            format!("{FILE_PROTOCOL}://{path}")
        } else {
            format!("{FILE_PROTOCOL}:///{path}")
        }
    }
}

impl fmt::Debug for LocalFileSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalFileSystem")
            .field("case_sensitive", &self.case_sensitive)
            .finish()
    }
}

impl FileSystem for LocalFileSystem {
    fn protocol(&self) -> &str {
        FILE_PROTOCOL
    }

    fn find_file_by_path(&self, path: &str) -> Option<FileHandle> {
        // One spelling per file, so `/a/./b` and `/a/b` share a registry slot
        let path = normalize_path(&to_system_independent(path)).into_owned();
        if PathBuf::from(&path).symlink_metadata().is_err() {
            return None;
        }
        let fs = self.this.upgrade()?;
        Some(FileHandle::new(LocalFile { fs, path }))
    }

    fn is_case_sensitive(&self) -> bool {
        self.case_sensitive
    }
}

struct LocalFile {
    fs: Arc<LocalFileSystem>,
    path: String,
}

impl fmt::Debug for LocalFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LocalFile({})", self.path)
    }
}

impl VirtualFile for LocalFile {
    fn file_system(&self) -> Arc<dyn FileSystem> {
        self.fs.clone()
    }

    fn path(&self) -> String {
        self.path.clone()
    }

    fn name(&self) -> String {
        file_name(&self.path).to_string()
    }

    fn is_directory(&self) -> bool {
        Path::new(&self.path).is_dir()
    }

    fn is_valid(&self) -> bool {
        Path::new(&self.path).symlink_metadata().is_ok()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_find_existing_and_missing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, "a").unwrap();

        let local = LocalFileSystem::new(true);
        let url_path = to_system_independent(&path.to_string_lossy()).into_owned();
        let file = local.find_file_by_path(&url_path).unwrap();
        assert!(file.is_valid());
        assert!(!file.is_directory());
        assert_eq!(file.name(), "a.txt");

        fs::remove_file(&path).unwrap();
        assert!(!file.is_valid());
        assert!(local.find_file_by_path(&url_path).is_none());
    }

    #[test]
    fn test_dotted_spellings_share_one_pointer() {
        use crate::pointer::{ListenerTag, PointerManager};
        use crate::scope::ScopeTree;
        use crate::vfs::FileSystemRegistry;

        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();

        let file_systems = Arc::new(FileSystemRegistry::new());
        file_systems.register(LocalFileSystem::new(true));
        let scopes = Arc::new(ScopeTree::new());
        let scope = scopes.root("local");
        let manager = PointerManager::new(file_systems, scopes);

        let base = LocalFileSystem::url_for_path(dir.path());
        let plain = manager
            .create(&format!("{base}/a.txt"), scope, ListenerTag::Silent)
            .unwrap();
        let dotted = manager
            .create(&format!("{base}/./a.txt"), scope, ListenerTag::Silent)
            .unwrap();
        let parent = manager
            .create(&format!("{base}/sub/../a.txt"), scope, ListenerTag::Silent)
            .unwrap();

        assert!(plain.ptr_eq(&dotted));
        assert!(plain.ptr_eq(&parent));
        assert_eq!(plain.usage_count(), 3);
        assert_eq!(manager.pointer_count(), 1);
        assert_eq!(parent.url(), format!("{base}/a.txt"));

        // Missing files intern under the folded path too
        let missing = manager
            .create(&format!("{base}/sub/../gone.txt"), scope, ListenerTag::Silent)
            .unwrap();
        let missing_plain = manager
            .create(&format!("{base}/gone.txt"), scope, ListenerTag::Silent)
            .unwrap();
        assert!(missing.ptr_eq(&missing_plain));
        assert!(!missing.is_valid());
    }

    #[test]
    fn test_url_for_path() {
        assert_eq!(
            LocalFileSystem::url_for_path(Path::new("/tmp/a.txt")),
            "file:///tmp/a.txt"
        );
    }

    #[test]
    fn test_directory_handle() {
        let dir = TempDir::new().unwrap();
        let local = LocalFileSystem::new(true);
        let url_path = to_system_independent(&dir.path().to_string_lossy()).into_owned();
        let handle = local.find_file_by_path(&url_path).unwrap();
        assert!(handle.is_directory());
        assert_eq!(handle.url(), LocalFileSystem::url_for_path(dir.path()));
    }
}
