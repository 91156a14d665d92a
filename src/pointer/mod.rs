//! Virtual file pointers.
//!
//! A [`FilePointer`] stands for "the file at this URL": it resolves to a
//! live [`FileHandle`](crate::vfs::FileHandle) when one exists, falls back
//! to the URL when it does not, and follows its file through renames and
//! moves.
//!
//! ```text
//! create(url, scope) ──▶ PointerManager ──▶ Registry[(listener, protocol, path)]
//!                             │                     │ interned, refcounted
//!                             │                     ▼
//!   FileEvent batch ──▶ before / after ──▶ FilePointer::update()
//!                             │
//!                             ▼
//!                  PointerListener callbacks
//! ```
//!
//! # Module Structure
//!
//! - `file_pointer`: the resolve/un-resolve state machine
//! - `manager`: creation, interning, batch driver, leak report
//! - `changes`: affected-pointer selection and the two batch phases
//! - `registry`: the interning table
//! - `container`: ordered pointer lists with memoized views
//! - `listener`: listener ids, tags and the callback trait
//! - `error`: [`PointerError`] and [`Trace`]
//!
//! Pointers are owned by scopes: each `create` takes one usage and ties it
//! to a [`ScopeId`](crate::scope::ScopeId); disposing the scope gives the
//! usage back. The pointer is disposed when the last usage is returned.

mod changes;
mod container;
mod error;
mod file_pointer;
mod leak;
mod listener;
mod manager;
mod registry;


pub use container::{InterningFactory, PointerContainer, PointerFactory};
pub use error::{PointerError, Trace};
pub use file_pointer::FilePointer;
pub use leak::{LeakReport, LeakedPointer};
pub use listener::{ListenerId, ListenerTag, PointerListener};
pub use manager::PointerManager;
