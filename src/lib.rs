//! Tether - stable file pointers over a virtual file system.
//!
//! A [`FilePointer`](pointer::FilePointer) keeps referring to the same
//! logical file while it is renamed, moved, deleted and recreated. Pointers
//! are interned per URL and listener, reference counted, and owned by
//! [`scope`]s that release them on teardown. Change batches are applied in
//! two phases so listeners can observe the world before and after.
//!
//! ```text
//! watch / caller ──FileEvent[]──▶ EventBus ──▶ PointerManager.before
//!                                    │             (select, notify)
//!                                    ├──▶ apply to the file system
//!                                    └──▶ PointerManager.after
//!                                              (update, rekey, notify)
//! ```

pub mod config;
pub mod logger;
pub mod pointer;
pub mod scope;
pub mod vfs;
pub mod watch;

pub use pointer::{
    FilePointer, ListenerId, ListenerTag, PointerContainer, PointerError, PointerListener,
    PointerManager,
};
pub use scope::{ScopeId, ScopeTree};
pub use vfs::{EventBus, FileEvent, FileHandle, FileSystem, FileSystemRegistry};
