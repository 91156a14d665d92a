//! Shared engine setup and target handling for CLI commands.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tether::config::Config;
use tether::pointer::PointerManager;
use tether::scope::ScopeTree;
use tether::vfs::url::{extract_path, extract_protocol};
use tether::vfs::{EventBus, FILE_PROTOCOL, FileSystemRegistry, LocalFileSystem};

/// Everything a command needs to pin and track files on disk.
pub struct Engine {
    pub scopes: Arc<ScopeTree>,
    pub manager: PointerManager,
    pub bus: EventBus,
}

impl Engine {
    pub fn new(config: &Config) -> Self {
        let file_systems = Arc::new(FileSystemRegistry::new());
        file_systems.register(LocalFileSystem::new(config.watch.case_sensitive));

        let scopes = Arc::new(ScopeTree::new());
        let manager =
            PointerManager::with_config(file_systems, Arc::clone(&scopes), config.pointers);
        let bus = EventBus::new(manager.clone());

        Self {
            scopes,
            manager,
            bus,
        }
    }
}

// ============================================================================
// Targets
// ============================================================================

/// Turn a command-line target into a URL.
///
/// Anything with a scheme is kept verbatim. Everything else is a local
/// path, resolved against `base`. Single-letter schemes are drive letters.
pub fn parse_target(target: &str, base: &Path) -> String {
    match url::Url::parse(target) {
        Ok(parsed) if parsed.scheme().len() > 1 => target.to_string(),
        _ => LocalFileSystem::url_for_path(&normalize(&base.join(target))),
    }
}

/// `[watch].urls` followed by the command-line targets, deduplicated.
pub fn collect_targets(config: &Config, targets: &[String]) -> Result<Vec<String>> {
    let cwd = std::env::current_dir().context("failed to read current directory")?;

    let mut urls: Vec<String> = Vec::new();
    let configured = config.watch.urls.iter().map(|t| parse_target(t, &config.root));
    let given = targets.iter().map(|t| parse_target(t, &cwd));
    for url in configured.chain(given) {
        if !urls.contains(&url) {
            urls.push(url);
        }
    }
    Ok(urls)
}

/// Directories to watch: `[watch].roots` plus the nearest existing
/// directory of every local target.
pub fn watch_dirs(config: &Config, urls: &[String]) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = Vec::new();
    let local = urls
        .iter()
        .filter(|url| extract_protocol(url) == Some(FILE_PROTOCOL))
        .filter_map(|url| nearest_dir(Path::new(extract_path(url))));

    for dir in config.watch_roots().into_iter().chain(local) {
        if dirs.iter().any(|known| dir.starts_with(known)) {
            continue;
        }
        dirs.retain(|known| !known.starts_with(&dir));
        dirs.push(dir);
    }
    dirs
}

/// Closest existing directory at or above the parent of `path`.
///
/// Watching the parent (not the target itself) also catches the target
/// being created, deleted or renamed.
fn nearest_dir(path: &Path) -> Option<PathBuf> {
    path.ancestors()
        .skip(1)
        .find(|dir| dir.is_dir())
        .map(Path::to_path_buf)
}

/// Lexically drop `.` and fold `..` components.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_target_keeps_urls() {
        let base = Path::new("/work");
        assert_eq!(parse_target("file:///a/b.txt", base), "file:///a/b.txt");
        assert_eq!(parse_target("jar:///lib/a.jar!/x", base), "jar:///lib/a.jar!/x");
    }

    #[test]
    fn test_parse_target_paths() {
        let base = Path::new("/work");
        assert_eq!(parse_target("notes/a.md", base), "file:///work/notes/a.md");
        assert_eq!(parse_target("./a.md", base), "file:///work/a.md");
        assert_eq!(parse_target("../a.md", base), "file:///a.md");
        assert_eq!(parse_target("/etc/hosts", base), "file:///etc/hosts");
    }

    #[test]
    fn test_watch_dirs_uses_nearest_existing_parent() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        std::fs::create_dir(root.join("sub")).unwrap();

        let config = Config::default();
        let urls = vec![
            LocalFileSystem::url_for_path(&root.join("sub/missing/deep.txt")),
            "mem:///ignored".to_string(),
        ];
        assert_eq!(watch_dirs(&config, &urls), vec![root.join("sub")]);
    }

    #[test]
    fn test_watch_dirs_merges_nested() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        std::fs::create_dir(root.join("sub")).unwrap();

        let config = Config::default();
        let urls = vec![
            LocalFileSystem::url_for_path(&root.join("sub/a.txt")),
            LocalFileSystem::url_for_path(&root.join("b.txt")),
        ];
        assert_eq!(watch_dirs(&config, &urls), vec![root.to_path_buf()]);
    }
}
