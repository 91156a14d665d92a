//! Ownership scopes.
//!
//! A scope is an arena slot that owns teardown hooks and child scopes.
//! Disposing a scope tears down its subtree deterministically:
//!
//! ```text
//! dispose(A)          A
//!   1. C's hooks     / \
//!   2. B's hooks    B   C      (children: latest first)
//!   3. A's hooks               (hooks: latest registered first)
//! ```
//!
//! Hooks run after the arena lock is released, so a hook may create or
//! dispose other scopes.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use thiserror::Error;

/// Identifier of one ownership scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(u64);

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scope#{}", self.0)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScopeError {
    #[error("{0} is already disposed")]
    Disposed(ScopeId),
}

/// Teardown hook registered against a scope.
pub type Hook = Box<dyn FnOnce() + Send>;

struct Scope {
    label: String,
    parent: Option<ScopeId>,
    children: Vec<ScopeId>,
    hooks: Vec<Hook>,
}

/// Arena of ownership scopes.
#[derive(Default)]
pub struct ScopeTree {
    next_id: AtomicU64,
    scopes: Mutex<FxHashMap<ScopeId, Scope>>,
}

impl ScopeTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a top-level scope.
    pub fn root(&self, label: impl Into<String>) -> ScopeId {
        let id = self.allocate();
        self.scopes.lock().insert(id, Scope::new(label.into(), None));
        id
    }

    /// Create a scope owned by `parent`; it is disposed with `parent`.
    pub fn child(&self, parent: ScopeId, label: impl Into<String>) -> Result<ScopeId, ScopeError> {
        let id = self.allocate();
        let mut scopes = self.scopes.lock();
        let parent_scope = scopes.get_mut(&parent).ok_or(ScopeError::Disposed(parent))?;
        parent_scope.children.push(id);
        scopes.insert(id, Scope::new(label.into(), Some(parent)));
        Ok(id)
    }

    /// Register a hook to run when `scope` is disposed.
    pub fn register(&self, scope: ScopeId, hook: Hook) -> Result<(), ScopeError> {
        let mut scopes = self.scopes.lock();
        let entry = scopes.get_mut(&scope).ok_or(ScopeError::Disposed(scope))?;
        entry.hooks.push(hook);
        Ok(())
    }

    pub fn is_alive(&self, scope: ScopeId) -> bool {
        self.scopes.lock().contains_key(&scope)
    }

    /// Label given at creation, while the scope is alive.
    pub fn label(&self, scope: ScopeId) -> Option<String> {
        self.scopes.lock().get(&scope).map(|s| s.label.clone())
    }

    /// Number of live scopes.
    pub fn len(&self) -> usize {
        self.scopes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.lock().is_empty()
    }

    /// Dispose `scope` and its subtree, running every hook once.
    ///
    /// Disposing a scope that is already gone is a no-op and returns `false`.
    pub fn dispose(&self, scope: ScopeId) -> bool {
        let hooks = {
            let mut scopes = self.scopes.lock();
            if !scopes.contains_key(&scope) {
                return false;
            }

            if let Some(parent) = scopes.get(&scope).and_then(|s| s.parent)
                && let Some(parent_scope) = scopes.get_mut(&parent)
            {
                parent_scope.children.retain(|&c| c != scope);
            }

            let mut order = Vec::new();
            collect_post_order(&scopes, scope, &mut order);

            let mut hooks = Vec::new();
            for id in order {
                if let Some(removed) = scopes.remove(&id) {
                    crate::debug!("scope"; "dispose {} ({})", id, removed.label);
                    hooks.extend(removed.hooks.into_iter().rev());
                }
            }
            hooks
        };

        for hook in hooks {
            hook();
        }
        true
    }

    fn allocate(&self) -> ScopeId {
        ScopeId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Debug for ScopeTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeTree").field("live", &self.len()).finish()
    }
}

impl Scope {
    fn new(label: String, parent: Option<ScopeId>) -> Self {
        Self {
            label,
            parent,
            children: Vec::new(),
            hooks: Vec::new(),
        }
    }
}

/// Children (latest first) before their parent.
fn collect_post_order(scopes: &FxHashMap<ScopeId, Scope>, id: ScopeId, out: &mut Vec<ScopeId>) {
    if let Some(scope) = scopes.get(&id) {
        for &child in scope.children.iter().rev() {
            collect_post_order(scopes, child, out);
        }
    }
    out.push(id);
}

// ============================================================================
// Tests
// ============================================================================
