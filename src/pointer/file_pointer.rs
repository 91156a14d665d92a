//! The pointer itself: a URL that lazily resolves to a live file.
//!
//! ```text
//!              resolve(url) hits
//!  Unresolved ───────────────────▶ Resolved(file)
//!       ▲                               │
//!       └───────────────────────────────┘
//!         file no longer valid: keep file.url()
//! ```
//!
//! Every accessor except [`FilePointer::url`] and the lifecycle queries
//! first runs `update()`, so a pointer never hands out a dead handle.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::error::{PointerError, Trace};
use super::listener::ListenerTag;
use super::manager::Shared;
use super::registry::PointerKey;
use crate::vfs::url::{extract_path, extract_protocol, file_name, presentable};
use crate::vfs::{FileHandle, FileSystemRegistry};

#[derive(Debug, Clone)]
pub(crate) enum PointerState {
    Unresolved(String),
    Resolved(FileHandle),
}

impl PointerState {
    fn url(&self) -> String {
        match self {
            Self::Unresolved(url) => url.clone(),
            Self::Resolved(file) => file.url(),
        }
    }
}

struct PointerInner {
    state: Mutex<PointerState>,
    usage: AtomicUsize,
    disposed: Mutex<Option<Trace>>,
    listener: ListenerTag,
    /// Registry slot; `None` for non-interned or detached pointers.
    key: Mutex<Option<PointerKey>>,
    created: Trace,
    file_systems: Arc<FileSystemRegistry>,
    manager: Weak<Shared>,
}

/// Shared, reference-counted pointer to a file by URL.
///
/// Cloning a `FilePointer` copies the handle, not a usage: usages are only
/// taken through the manager and returned through [`dispose`](Self::dispose).
/// Equality is identity.
#[derive(Clone)]
pub struct FilePointer(Arc<PointerInner>);

impl FilePointer {
    pub(crate) fn new(
        state: PointerState,
        listener: ListenerTag,
        key: Option<PointerKey>,
        created: Trace,
        file_systems: Arc<FileSystemRegistry>,
        manager: Weak<Shared>,
    ) -> Self {
        Self(Arc::new(PointerInner {
            state: Mutex::new(state),
            usage: AtomicUsize::new(1),
            disposed: Mutex::new(None),
            listener,
            key: Mutex::new(key),
            created,
            file_systems,
            manager,
        }))
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Current URL.
    ///
    /// Allowed after disposal: a disposed pointer reports the last URL it
    /// knew without resolving again.
    pub fn url(&self) -> String {
        if !self.is_disposed() {
            self.update();
        }
        self.0.state.lock().url()
    }

    /// Live file, or `None` while nothing exists at the URL.
    ///
    /// # Panics
    ///
    /// Panics if the pointer is disposed.
    #[track_caller]
    pub fn file(&self) -> Option<FileHandle> {
        self.assert_alive();
        self.update();
        match &*self.0.state.lock() {
            PointerState::Resolved(file) => Some(file.clone()),
            PointerState::Unresolved(_) => None,
        }
    }

    /// Whether a live file exists at the URL.
    ///
    /// # Panics
    ///
    /// Panics if the pointer is disposed.
    #[track_caller]
    pub fn is_valid(&self) -> bool {
        self.file().is_some()
    }

    /// Human-readable form of the URL.
    ///
    /// # Panics
    ///
    /// Panics if the pointer is disposed.
    #[track_caller]
    pub fn presentable_url(&self) -> String {
        self.assert_alive();
        presentable(&self.url())
    }

    /// Last segment of the URL.
    ///
    /// # Panics
    ///
    /// Panics if the pointer is disposed.
    #[track_caller]
    pub fn file_name(&self) -> String {
        self.assert_alive();
        file_name(&self.url()).to_string()
    }

    /// Number of owners still holding this pointer.
    pub fn usage_count(&self) -> usize {
        self.0.usage.load(Ordering::Acquire)
    }

    pub fn listener(&self) -> ListenerTag {
        self.0.listener
    }

    pub fn is_disposed(&self) -> bool {
        self.0.disposed.lock().is_some()
    }

    /// Where this pointer was first created.
    pub fn created_at(&self) -> &Trace {
        &self.0.created
    }

    /// Same underlying pointer.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Give back one usage.
    ///
    /// # Panics
    ///
    /// Panics with creation and disposal sites if the pointer was already
    /// disposed.
    #[track_caller]
    pub fn dispose(&self) {
        if let Err(err) = self.try_dispose() {
            panic!("{err}");
        }
    }

    /// Give back one usage, reporting a double dispose as an error.
    #[track_caller]
    pub fn try_dispose(&self) -> Result<(), PointerError> {
        let trace = Trace::capture(self.0.created.backtrace().is_some());
        self.release(trace)
    }

    /// Drop one usage; the last one disposes the pointer and frees its
    /// registry slot.
    pub(crate) fn release(&self, trace: Trace) -> Result<(), PointerError> {
        let mut disposed = self.0.disposed.lock();
        if let Some(at) = &*disposed {
            return Err(self.already_disposed(at.clone()));
        }

        let previous = self.0.usage.fetch_sub(1, Ordering::AcqRel);
        if previous > 1 {
            return Ok(());
        }

        *disposed = Some(trace);
        drop(disposed);

        crate::debug!("pointer"; "disposed {}", self.peek_url());
        if let Some(shared) = self.0.manager.upgrade() {
            shared.forget(self);
        }
        Ok(())
    }

    /// Take one more usage, unless the pointer is already disposed.
    pub(crate) fn try_acquire(&self) -> Option<usize> {
        let disposed = self.0.disposed.lock();
        if disposed.is_some() {
            return None;
        }
        Some(self.0.usage.fetch_add(1, Ordering::AcqRel) + 1)
    }

    /// Re-check the state against the file systems.
    ///
    /// A resolved pointer whose file died keeps the file's last URL and
    /// immediately tries to resolve it again, so a file recreated at the
    /// same place is picked up.
    pub(crate) fn update(&self) {
        let mut state = self.0.state.lock();

        let lost = match &*state {
            PointerState::Resolved(file) if !file.is_valid() => Some(file.url()),
            _ => None,
        };
        if let Some(url) = lost {
            crate::debug!("pointer"; "lost {}", url);
            *state = PointerState::Unresolved(url);
        }

        let found = match &*state {
            PointerState::Unresolved(url) => self.0.file_systems.resolve(url),
            PointerState::Resolved(_) => None,
        };
        if let Some(file) = found {
            *state = PointerState::Resolved(file);
        }
    }

    /// `(protocol, path)` the pointer currently stands for, without updating.
    pub(crate) fn location(&self) -> Option<(String, String)> {
        match &*self.0.state.lock() {
            PointerState::Resolved(file) => {
                Some((file.file_system().protocol().to_string(), file.path()))
            }
            PointerState::Unresolved(url) => {
                let protocol = extract_protocol(url)?;
                Some((protocol.to_string(), extract_path(url).to_string()))
            }
        }
    }

    pub(crate) fn key(&self) -> Option<PointerKey> {
        self.0.key.lock().clone()
    }

    pub(crate) fn set_key(&self, key: Option<PointerKey>) {
        *self.0.key.lock() = key;
    }

    /// URL without updating; safe in `Debug` and logging.
    pub(crate) fn peek_url(&self) -> String {
        self.0.state.lock().url()
    }

    #[track_caller]
    fn assert_alive(&self) {
        let disposed = self.0.disposed.lock().clone();
        if let Some(at) = disposed {
            panic!("{}", self.already_disposed(at));
        }
    }

    fn already_disposed(&self, disposed: Trace) -> PointerError {
        PointerError::AlreadyDisposed {
            url: self.peek_url(),
            created: self.0.created.clone(),
            disposed,
        }
    }
}

impl PartialEq for FilePointer {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for FilePointer {}

impl Hash for FilePointer {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.0).hash(state);
    }
}

impl fmt::Debug for FilePointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilePointer")
            .field("url", &self.peek_url())
            .field("usage", &self.usage_count())
            .field("listener", &self.0.listener)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

impl fmt::Display for FilePointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.peek_url())
    }
}
