//! Configuration management for `tether.toml`.
//!
//! # Module Structure
//!
//! ```text
//! config/
//! ├── section   # [pointers] and [watch]
//! ├── error     # ConfigError
//! ├── util      # config file discovery, path resolution
//! └── mod.rs    # Config (this file)
//! ```
//!
//! # Sections
//!
//! | Section      | Purpose                                          |
//! |--------------|--------------------------------------------------|
//! | `[pointers]` | Lifecycle diagnostics (backtraces, leak report)  |
//! | `[watch]`    | Watched roots, pinned URLs, debounce, case rule  |
//!
//! Every section is optional; a missing config file means all defaults.

mod error;
mod section;
mod util;

pub use error::ConfigError;
pub use section::{PointerConfig, WatchConfig};

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::log;
use util::{find_config_file, resolve_against};

/// Default config file name, searched upward from the working directory.
pub const CONFIG_FILE: &str = "tether.toml";

// ============================================================================
// root configuration
// ============================================================================

/// Root configuration structure representing tether.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Path of the loaded config file, if any (internal use only)
    #[serde(skip)]
    pub config_path: Option<PathBuf>,

    /// Directory relative paths are resolved against (internal use only)
    #[serde(skip)]
    pub root: PathBuf,

    /// Pointer engine settings
    #[serde(default)]
    pub pointers: PointerConfig,

    /// Watch mode settings
    #[serde(default)]
    pub watch: WatchConfig,
}

impl Config {
    /// Load configuration.
    ///
    /// An explicit `path` must exist. Without one, `tether.toml` is searched
    /// upward from the working directory, and defaults are used when none is
    /// found.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let cwd = std::env::current_dir().map_err(|err| ConfigError::Io(PathBuf::from("."), err))?;

        let found = match path {
            Some(path) => Some(resolve_against(&cwd, path)),
            None => find_config_file(&cwd, Path::new(CONFIG_FILE)),
        };

        let mut config = match &found {
            Some(path) => Self::from_path(path)?,
            None => Self::default(),
        };

        let root = found
            .as_deref()
            .and_then(Path::parent)
            .map_or(cwd, Path::to_path_buf);
        config.config_path = found;
        config.root = root;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from TOML string
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    /// Load configuration from file path with unknown field detection.
    fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;

        let (config, ignored) = Self::parse_with_ignored(&content)?;
        if !ignored.is_empty() {
            Self::print_unknown_fields_warning(&ignored, path);
        }
        Ok(config)
    }

    /// Parse TOML content, collecting any unknown fields.
    fn parse_with_ignored(content: &str) -> Result<(Self, Vec<String>), ConfigError> {
        let mut ignored = Vec::new();
        let deserializer = toml::Deserializer::new(content);
        let config = serde_ignored::deserialize(deserializer, |path: serde_ignored::Path| {
            ignored.push(path.to_string());
        })?;
        Ok((config, ignored))
    }

    fn print_unknown_fields_warning(fields: &[String], path: &Path) {
        let display_path = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_else(|| path.to_string_lossy());
        log!("warning"; "unknown fields in {}, ignoring:", display_path);
        for field in fields {
            eprintln!("- {field}");
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.watch.debounce_ms == 0 {
            return Err(ConfigError::validation(
                "watch.debounce_ms",
                "must be greater than zero",
            ));
        }
        if let Some(empty) = self.watch.urls.iter().position(|url| url.trim().is_empty()) {
            return Err(ConfigError::validation(
                "watch.urls",
                format!("entry {empty} is empty"),
            ));
        }
        Ok(())
    }

    /// `[watch].roots`, resolved against the config directory.
    pub fn watch_roots(&self) -> Vec<PathBuf> {
        self.watch
            .roots
            .iter()
            .map(|root| resolve_against(&self.root, root))
            .collect()
    }
}

// ============================================================================
// tests
// ============================================================================
