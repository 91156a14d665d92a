//! Pointer engine errors and lifecycle diagnostics.

use std::backtrace::Backtrace;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

use thiserror::Error;

use crate::scope::ScopeError;

// ============================================================================
// PointerError
// ============================================================================

#[derive(Debug, Error)]
pub enum PointerError {
    #[error("illegal URL `{0}`: missing protocol")]
    IllegalUrl(String),

    #[error("illegal URL `{url}`: no file system for protocol `{protocol}`")]
    UnknownProtocol { url: String, protocol: String },

    #[error("pointer `{url}` is already disposed\n  created at:  {created}\n  disposed at: {disposed}")]
    AlreadyDisposed {
        url: String,
        created: Trace,
        disposed: Trace,
    },

    #[error("pointer container is already disposed\n  created at:  {created}\n  disposed at: {disposed}")]
    ContainerDisposed { created: Trace, disposed: Trace },

    #[error(transparent)]
    Scope(#[from] ScopeError),

    #[error("a change batch is already in progress")]
    BatchInProgress,

    #[error("no change batch in progress")]
    NoBatchInProgress,

    #[error("pointer manager is shut down")]
    ManagerShutdown,
}

impl PointerError {
    /// Lifecycle misuse: a bug in the owner, never a runtime condition.
    pub const fn is_misuse(&self) -> bool {
        matches!(
            self,
            Self::AlreadyDisposed { .. }
                | Self::ContainerDisposed { .. }
                | Self::BatchInProgress
                | Self::NoBatchInProgress
        )
    }
}

// ============================================================================
// Trace
// ============================================================================

/// Where something happened: the caller's source location, an optional
/// note, and a full backtrace when capture is enabled.
#[derive(Clone)]
pub struct Trace {
    location: &'static Location<'static>,
    note: Option<String>,
    backtrace: Option<Arc<Backtrace>>,
}

impl Trace {
    /// Capture the caller's location.
    #[track_caller]
    pub fn capture(with_backtrace: bool) -> Self {
        Self {
            location: Location::caller(),
            note: None,
            backtrace: with_backtrace.then(|| Arc::new(Backtrace::force_capture())),
        }
    }

    /// Attach a note (e.g. which scope teardown triggered a disposal).
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn location(&self) -> &'static Location<'static> {
        self.location
    }

    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }

    pub fn backtrace(&self) -> Option<&Backtrace> {
        self.backtrace.as_deref()
    }
}

impl fmt::Display for Trace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.location)?;
        if let Some(note) = &self.note {
            write!(f, " ({note})")?;
        }
        if let Some(backtrace) = &self.backtrace {
            write!(f, "\n{backtrace}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Trace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trace")
            .field("location", &self.location)
            .field("note", &self.note)
            .field("backtrace", &self.backtrace.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_location() {
        let line = line!() + 1;
        let trace = Trace::capture(false);
        assert_eq!(trace.location().line(), line);
        assert!(trace.location().file().ends_with("error.rs"));
        assert!(trace.backtrace().is_none());
    }

    #[test]
    fn test_trace_display_with_note() {
        let trace = Trace::capture(false).with_note("teardown of scope#1");
        let display = trace.to_string();
        assert!(display.contains("error.rs"));
        assert!(display.ends_with("(teardown of scope#1)"));
    }

    #[test]
    fn test_already_disposed_display() {
        let err = PointerError::AlreadyDisposed {
            url: "mem:///a.txt".into(),
            created: Trace::capture(false),
            disposed: Trace::capture(false).with_note("manual"),
        };
        let display = err.to_string();
        assert!(display.contains("mem:///a.txt"));
        assert!(display.contains("created at:"));
        assert!(display.contains("disposed at:"));
        assert!(err.is_misuse());
    }

    #[test]
    fn test_config_errors_are_not_misuse() {
        let err = PointerError::UnknownProtocol {
            url: "zip:///a".into(),
            protocol: "zip".into(),
        };
        assert!(err.to_string().contains("zip"));
        assert!(!err.is_misuse());
    }
}
