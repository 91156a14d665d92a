//! Ordered, owned lists of pointers with memoized views.
//!
//! A container owns one usage of each pointer it holds. Its URL, file and
//! directory views are cached and stamped with the manager's modification
//! count: the cache survives until the container itself changes or a
//! change batch completes.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, MutexGuard};

use super::error::{PointerError, Trace};
use super::listener::ListenerTag;
use super::manager::{PointerManager, Shared};
use super::FilePointer;
use crate::scope::ScopeId;
use crate::vfs::FileHandle;

// ============================================================================
// PointerFactory
// ============================================================================

/// How a container obtains its pointers.
///
/// Each call hands over exactly one usage, which the container gives back
/// when the pointer is removed or the container is disposed.
pub trait PointerFactory: Send + Sync {
    fn create(
        &self,
        manager: &PointerManager,
        url: &str,
        listener: ListenerTag,
    ) -> Result<FilePointer, PointerError>;

    fn create_for_file(
        &self,
        manager: &PointerManager,
        file: &FileHandle,
        listener: ListenerTag,
    ) -> Result<FilePointer, PointerError> {
        self.create(manager, &file.url(), listener)
    }

    fn duplicate(
        &self,
        manager: &PointerManager,
        pointer: &FilePointer,
        listener: ListenerTag,
    ) -> Result<FilePointer, PointerError> {
        self.create(manager, &pointer.url(), listener)
    }
}

/// Default strategy: interned pointers from the manager.
#[derive(Debug, Clone, Copy, Default)]
pub struct InterningFactory;

impl PointerFactory for InterningFactory {
    fn create(
        &self,
        manager: &PointerManager,
        url: &str,
        listener: ListenerTag,
    ) -> Result<FilePointer, PointerError> {
        manager.acquire(url, listener)
    }

    fn create_for_file(
        &self,
        manager: &PointerManager,
        file: &FileHandle,
        listener: ListenerTag,
    ) -> Result<FilePointer, PointerError> {
        manager.acquire_file(file, listener)
    }

    fn duplicate(
        &self,
        manager: &PointerManager,
        pointer: &FilePointer,
        listener: ListenerTag,
    ) -> Result<FilePointer, PointerError> {
        manager.acquire_duplicate(pointer, listener)
    }
}

// ============================================================================
// PointerContainer
// ============================================================================

struct Memo<T> {
    stamp: u64,
    values: Arc<[T]>,
}

#[derive(Default)]
struct ContainerState {
    pointers: Vec<FilePointer>,
    urls: Option<Memo<String>>,
    files: Option<Memo<FileHandle>>,
    directories: Option<Memo<FileHandle>>,
    disposed: Option<Trace>,
}

impl ContainerState {
    fn invalidate(&mut self) {
        self.urls = None;
        self.files = None;
        self.directories = None;
    }
}

struct ContainerInner {
    id: u64,
    manager: Weak<Shared>,
    listener: ListenerTag,
    factory: Arc<dyn PointerFactory>,
    created: Trace,
    capture_backtraces: bool,
    state: Mutex<ContainerState>,
}

/// Ordered list of pointers owned by a scope.
///
/// Cloning copies the handle; both handles see the same list. Use
/// [`clone_to`](Self::clone_to) for an independent copy.
#[derive(Clone)]
pub struct PointerContainer(Arc<ContainerInner>);

impl PointerContainer {
    pub(super) fn new(
        id: u64,
        manager: Weak<Shared>,
        listener: ListenerTag,
        factory: Arc<dyn PointerFactory>,
        created: Trace,
        capture_backtraces: bool,
    ) -> Self {
        Self(Arc::new(ContainerInner {
            id,
            manager,
            listener,
            factory,
            created,
            capture_backtraces,
            state: Mutex::new(ContainerState::default()),
        }))
    }

    pub fn listener(&self) -> ListenerTag {
        self.0.listener
    }

    pub fn is_disposed(&self) -> bool {
        self.0.state.lock().disposed.is_some()
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Append a pointer for `url`.
    pub fn add(&self, url: &str) -> Result<FilePointer, PointerError> {
        let manager = self.manager()?;
        self.ensure_alive()?;
        let pointer = self.0.factory.create(&manager, url, self.0.listener)?;
        self.push(pointer)
    }

    /// Append a pointer for a live file.
    pub fn add_file(&self, file: &FileHandle) -> Result<FilePointer, PointerError> {
        let manager = self.manager()?;
        self.ensure_alive()?;
        let pointer = self.0.factory.create_for_file(&manager, file, self.0.listener)?;
        self.push(pointer)
    }

    /// Append duplicates of every pointer in `other`, in order.
    pub fn add_all(&self, other: &PointerContainer) -> Result<(), PointerError> {
        let manager = self.manager()?;
        self.ensure_alive()?;
        for pointer in other.list() {
            let copy = self.0.factory.duplicate(&manager, &pointer, self.0.listener)?;
            self.push(copy)?;
        }
        Ok(())
    }

    /// Remove `pointer` and give back its usage. Returns whether it was held.
    #[track_caller]
    pub fn remove(&self, pointer: &FilePointer) -> Result<bool, PointerError> {
        let removed = {
            let mut state = self.alive_state()?;
            let Some(idx) = state.pointers.iter().position(|p| p.ptr_eq(pointer)) else {
                return Ok(false);
            };
            state.invalidate();
            state.pointers.remove(idx)
        };
        removed.release(self.trace())?;
        Ok(true)
    }

    /// Swap the pointer at `url` with its predecessor.
    pub fn move_up(&self, url: &str) -> Result<bool, PointerError> {
        let mut state = self.alive_state()?;
        let Some(idx) = position_of(&state.pointers, url) else {
            return Ok(false);
        };
        if idx == 0 {
            return Ok(false);
        }
        state.pointers.swap(idx - 1, idx);
        state.invalidate();
        Ok(true)
    }

    /// Swap the pointer at `url` with its successor.
    pub fn move_down(&self, url: &str) -> Result<bool, PointerError> {
        let mut state = self.alive_state()?;
        let Some(idx) = position_of(&state.pointers, url) else {
            return Ok(false);
        };
        if idx + 1 >= state.pointers.len() {
            return Ok(false);
        }
        state.pointers.swap(idx, idx + 1);
        state.invalidate();
        Ok(true)
    }

    /// Give back every pointer and empty the list.
    #[track_caller]
    pub fn kill_all(&self) -> Result<(), PointerError> {
        let pointers = {
            let mut state = self.alive_state()?;
            state.invalidate();
            std::mem::take(&mut state.pointers)
        };
        release_all(pointers, &self.trace())
    }

    /// Same as [`kill_all`](Self::kill_all).
    #[track_caller]
    pub fn clear(&self) -> Result<(), PointerError> {
        self.kill_all()
    }

    /// Give back every pointer and retire the container.
    ///
    /// Runs automatically when the owning scope is disposed.
    #[track_caller]
    pub fn dispose(&self) -> Result<(), PointerError> {
        let trace = self.trace();
        let pointers = {
            let mut state = self.0.state.lock();
            if let Some(disposed) = &state.disposed {
                return Err(self.disposed_error(disposed.clone()));
            }
            state.disposed = Some(trace.clone());
            state.invalidate();
            std::mem::take(&mut state.pointers)
        };
        if let Some(shared) = self.0.manager.upgrade() {
            shared.forget_container(self.0.id);
        }
        release_all(pointers, &trace)
    }

    /// Independent copy owned by `scope`, duplicating every pointer.
    ///
    /// `listener` defaults to this container's listener.
    #[track_caller]
    pub fn clone_to(
        &self,
        scope: ScopeId,
        listener: Option<ListenerTag>,
    ) -> Result<PointerContainer, PointerError> {
        let manager = self.manager()?;
        self.ensure_alive()?;
        let listener = listener.unwrap_or(self.0.listener);
        let copy = manager.create_container_with(scope, listener, Arc::clone(&self.0.factory))?;
        for pointer in self.list() {
            let duplicate = self.0.factory.duplicate(&manager, &pointer, listener)?;
            copy.push(duplicate)?;
        }
        Ok(copy)
    }

    // ========================================================================
    // Views
    // ========================================================================

    /// URLs of all pointers, in order.
    ///
    /// # Panics
    ///
    /// Panics if the container is disposed.
    #[track_caller]
    pub fn urls(&self) -> Arc<[String]> {
        let stamp = self.stamp();
        let mut state = self.expect_alive();
        if let Some(memo) = &state.urls
            && memo.stamp == stamp
        {
            return Arc::clone(&memo.values);
        }
        let values: Arc<[String]> = state.pointers.iter().map(FilePointer::url).collect();
        state.urls = Some(Memo {
            stamp,
            values: Arc::clone(&values),
        });
        values
    }

    /// Live files of valid pointers, in order.
    ///
    /// # Panics
    ///
    /// Panics if the container is disposed.
    #[track_caller]
    pub fn files(&self) -> Arc<[FileHandle]> {
        let stamp = self.stamp();
        let mut state = self.expect_alive();
        if let Some(memo) = &state.files
            && memo.stamp == stamp
        {
            return Arc::clone(&memo.values);
        }
        let values: Arc<[FileHandle]> = state.pointers.iter().filter_map(FilePointer::file).collect();
        state.files = Some(Memo {
            stamp,
            values: Arc::clone(&values),
        });
        values
    }

    /// Live directories among the pointers, in order.
    ///
    /// # Panics
    ///
    /// Panics if the container is disposed.
    #[track_caller]
    pub fn directories(&self) -> Arc<[FileHandle]> {
        let stamp = self.stamp();
        let mut state = self.expect_alive();
        if let Some(memo) = &state.directories
            && memo.stamp == stamp
        {
            return Arc::clone(&memo.values);
        }
        let values: Arc<[FileHandle]> = state
            .pointers
            .iter()
            .filter_map(FilePointer::file)
            .filter(|file| {
                debug_assert!(file.is_valid(), "resolved pointer holds a dead file: {file}");
                file.is_valid() && file.is_directory()
            })
            .collect();
        state.directories = Some(Memo {
            stamp,
            values: Arc::clone(&values),
        });
        values
    }

    /// First pointer whose current URL is `url`.
    #[track_caller]
    pub fn find_by_url(&self, url: &str) -> Option<FilePointer> {
        let state = self.expect_alive();
        position_of(&state.pointers, url).map(|idx| state.pointers[idx].clone())
    }

    /// Snapshot of the pointers, in order.
    #[track_caller]
    pub fn list(&self) -> Vec<FilePointer> {
        self.expect_alive().pointers.clone()
    }

    #[track_caller]
    pub fn len(&self) -> usize {
        self.expect_alive().pointers.len()
    }

    #[track_caller]
    pub fn is_empty(&self) -> bool {
        self.expect_alive().pointers.is_empty()
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn push(&self, pointer: FilePointer) -> Result<FilePointer, PointerError> {
        let mut state = self.0.state.lock();
        if let Some(disposed) = state.disposed.clone() {
            drop(state);
            let _ = pointer.release(self.trace());
            return Err(self.disposed_error(disposed));
        }
        state.pointers.push(pointer.clone());
        state.invalidate();
        Ok(pointer)
    }

    fn manager(&self) -> Result<PointerManager, PointerError> {
        self.0
            .manager
            .upgrade()
            .map(PointerManager::from_shared)
            .ok_or(PointerError::ManagerShutdown)
    }

    fn stamp(&self) -> u64 {
        self.0
            .manager
            .upgrade()
            .map_or(0, |shared| shared.modification_count())
    }

    #[track_caller]
    fn trace(&self) -> Trace {
        Trace::capture(self.0.capture_backtraces)
    }

    fn ensure_alive(&self) -> Result<(), PointerError> {
        self.alive_state().map(drop)
    }

    fn alive_state(&self) -> Result<MutexGuard<'_, ContainerState>, PointerError> {
        let state = self.0.state.lock();
        if let Some(disposed) = state.disposed.clone() {
            return Err(self.disposed_error(disposed));
        }
        Ok(state)
    }

    #[track_caller]
    fn expect_alive(&self) -> MutexGuard<'_, ContainerState> {
        match self.alive_state() {
            Ok(state) => state,
            Err(err) => panic!("{err}"),
        }
    }

    fn disposed_error(&self, disposed: Trace) -> PointerError {
        PointerError::ContainerDisposed {
            created: self.0.created.clone(),
            disposed,
        }
    }

    /// Pointer list without the disposed check, for equality and hashing.
    fn snapshot(&self) -> Vec<FilePointer> {
        self.0.state.lock().pointers.clone()
    }
}

fn position_of(pointers: &[FilePointer], url: &str) -> Option<usize> {
    pointers.iter().position(|p| p.url() == url)
}

/// Release every pointer, reporting the first failure after trying all.
fn release_all(pointers: Vec<FilePointer>, trace: &Trace) -> Result<(), PointerError> {
    let mut first_error = None;
    for pointer in pointers {
        if let Err(err) = pointer.release(trace.clone()) {
            first_error.get_or_insert(err);
        }
    }
    first_error.map_or(Ok(()), Err)
}

impl PartialEq for PointerContainer {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.snapshot() == other.snapshot()
    }
}

impl Eq for PointerContainer {}

impl Hash for PointerContainer {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.snapshot().hash(state);
    }
}

impl fmt::Debug for PointerContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.0.state.lock();
        f.debug_struct("PointerContainer")
            .field("pointers", &state.pointers)
            .field("listener", &self.0.listener)
            .field("disposed", &state.disposed.is_some())
            .finish()
    }
}
