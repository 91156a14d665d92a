//! `[pointers]` and `[watch]` sections.
//!
//! # Example
//!
//! ```toml
//! [pointers]
//! capture_backtraces = false  # Keep full backtraces for lifecycle diagnostics
//! report_leaks = true         # Log undisposed pointers on shutdown
//!
//! [watch]
//! roots = ["src", "assets"]   # Directories to watch (relative to tether.toml)
//! urls = ["file:///etc/hosts", "notes/todo.md"]
//! debounce_ms = 300           # Quiet period before a batch is delivered
//! case_sensitive = true       # Case rule of the local file system
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Pointer engine settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PointerConfig {
    /// Capture a full backtrace at every creation and disposal.
    /// Off by default: only the caller location is kept.
    pub capture_backtraces: bool,

    /// Log pointers and containers still alive at shutdown.
    pub report_leaks: bool,
}

impl Default for PointerConfig {
    fn default() -> Self {
        Self {
            capture_backtraces: false,
            report_leaks: true,
        }
    }
}

/// Watch mode settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Directories to watch recursively.
    pub roots: Vec<PathBuf>,

    /// URLs or plain paths to pin with pointers.
    pub urls: Vec<String>,

    /// Debounce window in milliseconds.
    pub debounce_ms: u64,

    /// Whether the local file system distinguishes case.
    pub case_sensitive: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            urls: Vec::new(),
            debounce_ms: 300,
            case_sensitive: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pointer_config_defaults() {
        let config = PointerConfig::default();
        assert!(!config.capture_backtraces);
        assert!(config.report_leaks);
    }

    #[test]
    fn test_watch_config_partial() {
        let config: WatchConfig = toml::from_str("debounce_ms = 50").unwrap();
        assert_eq!(config.debounce_ms, 50);
        assert!(config.roots.is_empty());
        assert!(config.urls.is_empty());
    }
}
