//! Structural change events and their delivery.
//!
//! A batch of [`FileEvent`]s is delivered in two phases around the actual
//! mutation. [`EventBus::dispatch`] fixes the order:
//!
//! ```text
//! subscribers.before → pointers.before → apply() → pointers.after → subscribers.after
//! ```
//!
//! Pointers are re-resolved before ordinary subscribers see the new world.

use std::sync::Arc;

use parking_lot::RwLock;

use super::url::{construct_url, extract_path, extract_protocol, file_name, join_path, parent_path};
use crate::pointer::{PointerError, PointerManager};

/// One structural change, described by URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEvent {
    /// A new entry `name` appears under `parent`.
    Create {
        parent: String,
        name: String,
        directory: bool,
    },
    /// The entry at `url` (and everything below it) disappears.
    Delete { url: String },
    /// The entry at `url` is copied to `new_parent/new_name`.
    Copy {
        url: String,
        new_parent: String,
        new_name: String,
    },
    /// The entry at `url` moves from `old_parent` to `new_parent`, keeping its name.
    Move {
        url: String,
        old_parent: String,
        new_parent: String,
    },
    /// The entry at `url` changes its name property.
    Rename {
        url: String,
        old_name: String,
        new_name: String,
    },
    /// The content of `url` changes; its structure does not.
    ContentChange { url: String },
}

impl FileEvent {
    pub fn create(parent: impl Into<String>, name: impl Into<String>, directory: bool) -> Self {
        Self::Create {
            parent: parent.into(),
            name: name.into(),
            directory,
        }
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::Delete { url: url.into() }
    }

    pub fn copy(
        url: impl Into<String>,
        new_parent: impl Into<String>,
        new_name: impl Into<String>,
    ) -> Self {
        Self::Copy {
            url: url.into(),
            new_parent: new_parent.into(),
            new_name: new_name.into(),
        }
    }

    /// Move `url` under `new_parent`; the old parent is derived from `url`.
    pub fn moved(url: impl Into<String>, new_parent: impl Into<String>) -> Self {
        let url = url.into();
        let old_parent = parent_url(&url).unwrap_or_default();
        Self::Move {
            url,
            old_parent,
            new_parent: new_parent.into(),
        }
    }

    /// Rename `url` to `new_name`; the old name is derived from `url`.
    pub fn rename(url: impl Into<String>, new_name: impl Into<String>) -> Self {
        let url = url.into();
        let old_name = file_name(&url).to_string();
        Self::Rename {
            url,
            old_name,
            new_name: new_name.into(),
        }
    }

    pub fn content_change(url: impl Into<String>) -> Self {
        Self::ContentChange { url: url.into() }
    }

    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Create { .. } => "create",
            Self::Delete { .. } => "delete",
            Self::Copy { .. } => "copy",
            Self::Move { .. } => "move",
            Self::Rename { .. } => "rename",
            Self::ContentChange { .. } => "content",
        }
    }

    /// URL of the entry the event is about, before the change.
    ///
    /// For `Create` this is the URL of the entry being created.
    pub fn url(&self) -> String {
        match self {
            Self::Create { parent, name, .. } => join_url(parent, name),
            Self::Delete { url }
            | Self::Copy { url, .. }
            | Self::Move { url, .. }
            | Self::Rename { url, .. }
            | Self::ContentChange { url } => url.clone(),
        }
    }

    /// URL the entry occupies after the change, when it differs from [`url`](Self::url)
    /// or a new entry appears.
    pub fn new_url(&self) -> Option<String> {
        match self {
            Self::Create { parent, name, .. } => Some(join_url(parent, name)),
            Self::Copy {
                new_parent,
                new_name,
                ..
            } => Some(join_url(new_parent, new_name)),
            Self::Move {
                url, new_parent, ..
            } => Some(join_url(new_parent, file_name(url))),
            Self::Rename { url, new_name, .. } => {
                parent_url(url).map(|parent| join_url(&parent, new_name))
            }
            Self::Delete { .. } | Self::ContentChange { .. } => None,
        }
    }
}

/// Parent URL of a URL, or `None` for a root.
pub fn parent_url(url: &str) -> Option<String> {
    let protocol = extract_protocol(url)?;
    let parent = parent_path(extract_path(url))?;
    Some(construct_url(protocol, parent))
}

/// Child URL under a parent URL.
pub fn join_url(parent: &str, name: &str) -> String {
    match extract_protocol(parent) {
        Some(protocol) => construct_url(protocol, &join_path(extract_path(parent), name)),
        None => join_path(parent, name),
    }
}

// ============================================================================
// Listeners
// ============================================================================

/// Subscriber to whole event batches.
pub trait BulkFileListener: Send + Sync {
    /// Called before the batch is applied.
    fn before(&self, _events: &[FileEvent]) {}

    /// Called after the batch is applied.
    fn after(&self, _events: &[FileEvent]) {}
}

/// Delivers event batches to subscribers and to the pointer manager in a
/// fixed order.
pub struct EventBus {
    pointers: PointerManager,
    subscribers: RwLock<Vec<Arc<dyn BulkFileListener>>>,
}

impl EventBus {
    pub fn new(pointers: PointerManager) -> Self {
        Self {
            pointers,
            subscribers: RwLock::new(Vec::new()),
        }
    }

    pub fn subscribe(&self, listener: Arc<dyn BulkFileListener>) {
        self.subscribers.write().push(listener);
    }

    /// The pointer manager driven by this bus.
    pub fn pointers(&self) -> &PointerManager {
        &self.pointers
    }

    /// Run one batch: notify, apply the mutation, notify again.
    ///
    /// The pointer manager opens the batch first; if it refuses, no
    /// subscriber hears about the batch at all. `apply` performs the actual
    /// mutation and its result is passed back. The after phase runs even
    /// when `apply` reports failure, so the pointer manager never stays
    /// inside a half-open batch.
    pub fn dispatch<R>(
        &self,
        events: &[FileEvent],
        apply: impl FnOnce() -> R,
    ) -> Result<R, PointerError> {
        let subscribers = self.subscribers.read().clone();

        self.pointers.before(events)?;
        for subscriber in &subscribers {
            subscriber.before(events);
        }

        let result = apply();

        self.pointers.after(events)?;
        for subscriber in &subscribers {
            subscriber.after(events);
        }

        Ok(result)
    }
}

// ============================================================================
// Tests
// ============================================================================
