//! Pointer factory, interning registry, and change-event driver.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;

use super::changes::{self, Phase};
use super::container::{InterningFactory, PointerContainer, PointerFactory};
use super::error::{PointerError, Trace};
use super::file_pointer::PointerState;
use super::leak::{LeakReport, LeakedPointer};
use super::listener::{ListenerId, ListenerTag, PointerListener};
use super::registry::{PointerKey, Registry, Rekey};
use super::FilePointer;
use crate::config::PointerConfig;
use crate::scope::{Hook, ScopeError, ScopeId, ScopeTree};
use crate::vfs::url::{
    construct_url, extract_path, extract_protocol, normalize_path, strip_trailing_separator,
    to_system_independent,
};
use crate::vfs::{FileEvent, FileHandle, FileSystem, FileSystemRegistry};

/// What a pointer is requested for.
#[derive(Clone, Copy)]
enum Source<'a> {
    Url(&'a str),
    File(&'a FileHandle),
}

/// A request resolved against the file systems, before interning.
struct Located {
    url: String,
    fs: Arc<dyn FileSystem>,
    file: Option<FileHandle>,
}

impl Located {
    fn key(&self) -> PointerKey {
        let path = match &self.file {
            Some(file) => file.path(),
            None => extract_path(&self.url).to_string(),
        };
        PointerKey::new(self.fs.protocol(), &path, self.fs.is_case_sensitive())
    }

    fn state(&self) -> PointerState {
        match &self.file {
            Some(file) => PointerState::Resolved(file.clone()),
            None => PointerState::Unresolved(self.url.clone()),
        }
    }
}

pub(crate) struct Shared {
    pub(super) file_systems: Arc<FileSystemRegistry>,
    scopes: Arc<ScopeTree>,
    config: PointerConfig,
    pub(super) registry: Mutex<Registry>,
    listeners: RwLock<FxHashMap<ListenerId, Arc<dyn PointerListener>>>,
    next_listener: AtomicU32,
    phase: Mutex<Phase>,
    modification_count: AtomicU64,
    containers: Mutex<FxHashMap<u64, Trace>>,
    next_container: AtomicU64,
    shut_down: AtomicBool,
}

impl Shared {
    #[track_caller]
    fn trace(&self) -> Trace {
        Trace::capture(self.config.capture_backtraces)
    }

    fn ensure_running(&self) -> Result<(), PointerError> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(PointerError::ManagerShutdown);
        }
        Ok(())
    }

    fn ensure_scope(&self, scope: ScopeId) -> Result<(), PointerError> {
        if !self.scopes.is_alive(scope) {
            return Err(ScopeError::Disposed(scope).into());
        }
        Ok(())
    }

    fn locate(&self, source: Source<'_>) -> Result<Located, PointerError> {
        match source {
            Source::File(file) => Ok(Located {
                url: file.url(),
                fs: file.file_system(),
                file: Some(file.clone()),
            }),
            Source::Url(raw) => {
                let normalized = to_system_independent(raw);
                let protocol = extract_protocol(&normalized)
                    .ok_or_else(|| PointerError::IllegalUrl(raw.to_string()))?;
                let fs = self.file_systems.get(protocol).ok_or_else(|| {
                    PointerError::UnknownProtocol {
                        url: raw.to_string(),
                        protocol: protocol.to_string(),
                    }
                })?;
                let stripped = strip_trailing_separator(&normalized);
                let url = construct_url(protocol, &normalize_path(extract_path(stripped)));
                let file = fs
                    .find_file_by_path(extract_path(&url))
                    .filter(FileHandle::is_valid);
                Ok(Located { url, fs, file })
            }
        }
    }

    /// Find or create the pointer for `source`, taking one usage.
    fn intern(
        self: &Arc<Self>,
        source: Source<'_>,
        listener: ListenerTag,
        trace: Trace,
    ) -> Result<FilePointer, PointerError> {
        self.ensure_running()?;
        let located = self.locate(source)?;

        if !located.fs.is_persistent() {
            crate::debug!("pointer"; "{} is not persistent, not interned", located.url);
            return Ok(self.new_pointer(&located, listener, None, trace));
        }

        let key = located.key();
        let mut registry = self.registry.lock();
        if let Some(existing) = registry.get(listener, &key)
            && let Some(usage) = existing.try_acquire()
        {
            crate::debug!("pointer"; "reuse {} ({} usages)", located.url, usage);
            return Ok(existing.clone());
        }

        let pointer = self.new_pointer(&located, listener, Some(key.clone()), trace);
        registry.insert(listener, key, pointer.clone());
        crate::debug!("pointer"; "new {} [{}]", located.url, listener);
        Ok(pointer)
    }

    fn new_pointer(
        self: &Arc<Self>,
        located: &Located,
        listener: ListenerTag,
        key: Option<PointerKey>,
        trace: Trace,
    ) -> FilePointer {
        FilePointer::new(
            located.state(),
            listener,
            key,
            trace,
            Arc::clone(&self.file_systems),
            Arc::downgrade(self),
        )
    }

    /// Tie one usage of `pointer` to `scope`. On failure the usage is given back.
    fn attach(&self, pointer: &FilePointer, scope: ScopeId) -> Result<(), PointerError> {
        let held = pointer.clone();
        let capture = self.config.capture_backtraces;
        let hook: Hook = Box::new(move || {
            let trace = Trace::capture(capture).with_note(format!("teardown of {scope}"));
            if let Err(err) = held.release(trace) {
                panic!("{err}");
            }
        });

        if let Err(err) = self.scopes.register(scope, hook) {
            let _ = pointer.release(self.trace());
            return Err(err.into());
        }
        Ok(())
    }

    /// Free the registry slot of a disposed pointer.
    pub(super) fn forget(&self, pointer: &FilePointer) {
        if let Some(key) = pointer.key() {
            self.registry.lock().remove(pointer.listener(), &key, pointer);
        }
    }

    /// Move an interned pointer to the key matching its current location.
    pub(super) fn rekey(&self, pointer: &FilePointer) {
        let Some(old) = pointer.key() else {
            return;
        };
        let Some((protocol, path)) = pointer.location() else {
            return;
        };
        let case_sensitive = self
            .file_systems
            .get(&protocol)
            .is_none_or(|fs| fs.is_case_sensitive());
        let new = PointerKey::new(&protocol, &path, case_sensitive);
        if new == old {
            return;
        }

        let outcome = self
            .registry
            .lock()
            .rekey(pointer.listener(), &old, new.clone(), pointer);
        match outcome {
            Rekey::Moved => pointer.set_key(Some(new)),
            Rekey::Detached => {
                crate::log!(
                    "pointer";
                    "{} now collides with a live pointer, no longer interned",
                    pointer.peek_url()
                );
                pointer.set_key(None);
            }
        }
    }

    pub(super) fn listener(&self, id: ListenerId) -> Option<Arc<dyn PointerListener>> {
        self.listeners.read().get(&id).cloned()
    }

    pub(super) fn modification_count(&self) -> u64 {
        self.modification_count.load(Ordering::Acquire)
    }

    pub(super) fn forget_container(&self, id: u64) {
        self.containers.lock().remove(&id);
    }
}

/// Resets the batch phase to idle when a listener unwinds mid-batch.
struct IdleOnDrop<'a> {
    phase: &'a Mutex<Phase>,
    armed: bool,
}

impl<'a> IdleOnDrop<'a> {
    fn new(phase: &'a Mutex<Phase>) -> Self {
        Self { phase, armed: true }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for IdleOnDrop<'_> {
    fn drop(&mut self) {
        if self.armed {
            *self.phase.lock() = Phase::Idle;
        }
    }
}

// ============================================================================
// PointerManager
// ============================================================================

/// Creates, interns, and keeps pointers up to date.
///
/// Cheap to clone; clones share one registry.
#[derive(Clone)]
pub struct PointerManager {
    shared: Arc<Shared>,
}

impl PointerManager {
    pub fn new(file_systems: Arc<FileSystemRegistry>, scopes: Arc<ScopeTree>) -> Self {
        Self::with_config(file_systems, scopes, PointerConfig::default())
    }

    pub fn with_config(
        file_systems: Arc<FileSystemRegistry>,
        scopes: Arc<ScopeTree>,
        config: PointerConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                file_systems,
                scopes,
                config,
                registry: Mutex::new(Registry::default()),
                listeners: RwLock::new(FxHashMap::default()),
                next_listener: AtomicU32::new(0),
                phase: Mutex::new(Phase::Idle),
                modification_count: AtomicU64::new(0),
                containers: Mutex::new(FxHashMap::default()),
                next_container: AtomicU64::new(0),
                shut_down: AtomicBool::new(false),
            }),
        }
    }

    pub fn file_systems(&self) -> &Arc<FileSystemRegistry> {
        &self.shared.file_systems
    }

    pub fn scopes(&self) -> &Arc<ScopeTree> {
        &self.shared.scopes
    }

    pub fn config(&self) -> &PointerConfig {
        &self.shared.config
    }

    // ========================================================================
    // Listeners
    // ========================================================================

    pub fn register_listener(&self, listener: Arc<dyn PointerListener>) -> ListenerId {
        let id = ListenerId(self.shared.next_listener.fetch_add(1, Ordering::Relaxed));
        self.shared.listeners.write().insert(id, listener);
        id
    }

    /// Pointers tagged with `id` stay interned under it but are no longer
    /// reported to anyone.
    pub fn unregister_listener(&self, id: ListenerId) -> bool {
        self.shared.listeners.write().remove(&id).is_some()
    }

    // ========================================================================
    // Creation
    // ========================================================================

    /// Pointer for `url`, owned by `scope`.
    ///
    /// Returns the existing pointer for the same URL and listener group when
    /// there is one, with its usage count bumped.
    #[track_caller]
    pub fn create(
        &self,
        url: &str,
        scope: ScopeId,
        listener: impl Into<ListenerTag>,
    ) -> Result<FilePointer, PointerError> {
        let trace = self.shared.trace();
        self.create_from(Source::Url(url), scope, listener.into(), trace)
    }

    /// Pointer for a live file, owned by `scope`.
    #[track_caller]
    pub fn create_for_file(
        &self,
        file: &FileHandle,
        scope: ScopeId,
        listener: impl Into<ListenerTag>,
    ) -> Result<FilePointer, PointerError> {
        let trace = self.shared.trace();
        self.create_from(Source::File(file), scope, listener.into(), trace)
    }

    /// Another usage of what `pointer` points at, owned by `scope`.
    #[track_caller]
    pub fn duplicate(
        &self,
        pointer: &FilePointer,
        scope: ScopeId,
        listener: impl Into<ListenerTag>,
    ) -> Result<FilePointer, PointerError> {
        let trace = self.shared.trace();
        self.shared.ensure_scope(scope)?;
        let pointer = self.acquire_like(pointer, listener.into(), trace)?;
        self.shared.attach(&pointer, scope)?;
        Ok(pointer)
    }

    fn create_from(
        &self,
        source: Source<'_>,
        scope: ScopeId,
        listener: ListenerTag,
        trace: Trace,
    ) -> Result<FilePointer, PointerError> {
        self.shared.ensure_scope(scope)?;
        let pointer = self.shared.intern(source, listener, trace)?;
        self.shared.attach(&pointer, scope)?;
        Ok(pointer)
    }

    /// Pointer for `url` with no owning scope.
    ///
    /// The caller holds one usage and must [`dispose`](FilePointer::dispose) it.
    #[track_caller]
    pub fn acquire(
        &self,
        url: &str,
        listener: impl Into<ListenerTag>,
    ) -> Result<FilePointer, PointerError> {
        let trace = self.shared.trace();
        self.shared.intern(Source::Url(url), listener.into(), trace)
    }

    /// Scope-less pointer for a live file; see [`acquire`](Self::acquire).
    #[track_caller]
    pub fn acquire_file(
        &self,
        file: &FileHandle,
        listener: impl Into<ListenerTag>,
    ) -> Result<FilePointer, PointerError> {
        let trace = self.shared.trace();
        self.shared.intern(Source::File(file), listener.into(), trace)
    }

    /// Scope-less duplicate; see [`acquire`](Self::acquire).
    #[track_caller]
    pub fn acquire_duplicate(
        &self,
        pointer: &FilePointer,
        listener: impl Into<ListenerTag>,
    ) -> Result<FilePointer, PointerError> {
        let trace = self.shared.trace();
        self.acquire_like(pointer, listener.into(), trace)
    }

    fn acquire_like(
        &self,
        pointer: &FilePointer,
        listener: ListenerTag,
        trace: Trace,
    ) -> Result<FilePointer, PointerError> {
        if pointer.is_disposed() {
            // Same diagnostics as any other access to a disposed pointer.
            pointer.try_dispose()?;
        }
        match pointer.file() {
            Some(file) => self.shared.intern(Source::File(&file), listener, trace),
            None => self.shared.intern(Source::Url(&pointer.url()), listener, trace),
        }
    }

    /// The interned pointer for `url` in a listener group, if any.
    ///
    /// Takes no usage.
    pub fn find(&self, url: &str, listener: impl Into<ListenerTag>) -> Option<FilePointer> {
        let located = self.shared.locate(Source::Url(url)).ok()?;
        let key = located.key();
        self.shared.registry.lock().get(listener.into(), &key).cloned()
    }

    /// Number of interned pointers across all listener groups.
    pub fn pointer_count(&self) -> usize {
        self.shared.registry.lock().len()
    }

    /// Snapshot of interned pointers, sorted by URL.
    pub fn pointers(&self) -> Vec<FilePointer> {
        let mut pointers = self.shared.registry.lock().pointers();
        pointers.sort_by_cached_key(FilePointer::peek_url);
        pointers
    }

    // ========================================================================
    // Containers
    // ========================================================================

    /// Ordered pointer list owned by `scope`, interning its pointers.
    #[track_caller]
    pub fn create_container(
        &self,
        scope: ScopeId,
        listener: impl Into<ListenerTag>,
    ) -> Result<PointerContainer, PointerError> {
        let trace = self.shared.trace();
        self.container_from(scope, listener.into(), Arc::new(InterningFactory), trace)
    }

    /// Container that obtains its pointers from `factory`.
    #[track_caller]
    pub fn create_container_with(
        &self,
        scope: ScopeId,
        listener: impl Into<ListenerTag>,
        factory: Arc<dyn PointerFactory>,
    ) -> Result<PointerContainer, PointerError> {
        let trace = self.shared.trace();
        self.container_from(scope, listener.into(), factory, trace)
    }

    fn container_from(
        &self,
        scope: ScopeId,
        listener: ListenerTag,
        factory: Arc<dyn PointerFactory>,
        trace: Trace,
    ) -> Result<PointerContainer, PointerError> {
        self.shared.ensure_running()?;
        self.shared.ensure_scope(scope)?;

        let id = self.shared.next_container.fetch_add(1, Ordering::Relaxed);
        self.shared.containers.lock().insert(id, trace.clone());
        let container = PointerContainer::new(
            id,
            Arc::downgrade(&self.shared),
            listener,
            factory,
            trace,
            self.shared.config.capture_backtraces,
        );

        let held = container.clone();
        let hook: Hook = Box::new(move || {
            if !held.is_disposed() {
                let _ = held.dispose();
            }
        });
        if let Err(err) = self.shared.scopes.register(scope, hook) {
            self.shared.forget_container(id);
            return Err(err.into());
        }
        Ok(container)
    }

    // ========================================================================
    // Change Events
    // ========================================================================

    /// First half of a batch: select affected pointers and notify
    /// `before_validity_changed`. The batch must not be applied yet.
    pub fn before(&self, events: &[FileEvent]) -> Result<(), PointerError> {
        let shared = &self.shared;
        {
            let mut phase = shared.phase.lock();
            if !matches!(*phase, Phase::Idle) {
                return Err(PointerError::BatchInProgress);
            }
            *phase = Phase::Collecting;
        }

        let batch = changes::collect(shared, events);
        crate::debug!(
            "pointer";
            "before {} event(s): {} candidate(s), {} relocated",
            events.len(), batch.candidates.len(), batch.relocated.len()
        );
        // Still `Collecting` while listeners run; an unwinding listener
        // drops the batch instead of leaving it pending.
        let idle = IdleOnDrop::new(&shared.phase);
        changes::notify_before(shared, &batch.groups);
        idle.disarm();

        *shared.phase.lock() = Phase::Pending(batch);
        Ok(())
    }

    /// Second half of a batch: re-key and re-resolve, then notify
    /// `validity_changed` with the groups computed in [`before`](Self::before).
    pub fn after(&self, events: &[FileEvent]) -> Result<(), PointerError> {
        let shared = &self.shared;
        let batch = {
            let mut phase = shared.phase.lock();
            match std::mem::replace(&mut *phase, Phase::Applying) {
                Phase::Pending(batch) => batch,
                previous => {
                    *phase = previous;
                    return Err(PointerError::NoBatchInProgress);
                }
            }
        };
        let _idle = IdleOnDrop::new(&shared.phase);

        changes::apply(shared, &batch);
        let count = shared.modification_count.fetch_add(1, Ordering::AcqRel) + 1;
        crate::debug!("pointer"; "after {} event(s), modification #{}", events.len(), count);

        changes::notify_after(shared, &batch.groups);
        Ok(())
    }

    /// Run `before`, the mutation, then `after`.
    pub fn process<R>(
        &self,
        events: &[FileEvent],
        apply: impl FnOnce() -> R,
    ) -> Result<R, PointerError> {
        self.before(events)?;
        let result = apply();
        self.after(events)?;
        Ok(result)
    }

    /// Bumped once per completed batch.
    pub fn modification_count(&self) -> u64 {
        self.shared.modification_count()
    }

    // ========================================================================
    // Shutdown
    // ========================================================================

    /// Stop accepting new pointers and report what was never disposed.
    pub fn shutdown(&self) -> LeakReport {
        self.shared.shut_down.store(true, Ordering::Release);

        let pointers = self
            .pointers()
            .into_iter()
            .map(|pointer| LeakedPointer {
                url: pointer.peek_url(),
                usage_count: pointer.usage_count(),
                created: pointer.created_at().clone(),
            })
            .collect();

        let mut containers: Vec<(u64, Trace)> = self
            .shared
            .containers
            .lock()
            .iter()
            .map(|(id, trace)| (*id, trace.clone()))
            .collect();
        containers.sort_by_key(|(id, _)| *id);

        let report = LeakReport {
            pointers,
            containers: containers.into_iter().map(|(_, trace)| trace).collect(),
        };
        if self.shared.config.report_leaks && !report.is_empty() {
            report.log();
        }
        report
    }

    pub(super) fn from_shared(shared: Arc<Shared>) -> Self {
        Self { shared }
    }
}

impl std::fmt::Debug for PointerManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PointerManager")
            .field("pointers", &self.pointer_count())
            .field("modifications", &self.modification_count())
            .finish()
    }
}
