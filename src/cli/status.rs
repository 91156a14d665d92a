//! `tether status`: resolve targets once and print their state.

use anyhow::Result;
use owo_colors::OwoColorize;
use serde::Serialize;
use tether::config::Config;
use tether::log;
use tether::pointer::{FilePointer, ListenerTag};

use super::common::{Engine, collect_targets};

/// Serializable snapshot of one pointer.
#[derive(Debug, Serialize)]
pub struct PointerStatus {
    pub url: String,
    pub path: String,
    pub valid: bool,
    pub directory: bool,
}

impl PointerStatus {
    pub fn of(pointer: &FilePointer) -> Self {
        let file = pointer.file();
        Self {
            url: pointer.url(),
            path: pointer.presentable_url(),
            valid: file.is_some(),
            directory: file.is_some_and(|f| f.is_directory()),
        }
    }
}

pub fn run_status(config: &Config, targets: &[String], json: bool) -> Result<()> {
    let engine = Engine::new(config);
    let scope = engine.scopes.root("status");

    let urls = collect_targets(config, targets)?;
    let container = engine.manager.create_container(scope, ListenerTag::Silent)?;
    for url in &urls {
        container.add(url)?;
    }

    let statuses: Vec<_> = container.list().iter().map(PointerStatus::of).collect();
    if json {
        println!("{}", serde_json::to_string_pretty(&statuses)?);
    } else if statuses.is_empty() {
        log!("status"; "nothing to resolve: pass a target or set [watch].urls");
    } else {
        for status in &statuses {
            print_status(status);
        }
    }

    engine.scopes.dispose(scope);
    engine.manager.shutdown();
    Ok(())
}

fn print_status(status: &PointerStatus) {
    let state = match (status.valid, status.directory) {
        (true, true) => format!("{:>7}", "dir").bright_blue().to_string(),
        (true, false) => format!("{:>7}", "ok").green().to_string(),
        (false, _) => format!("{:>7}", "missing").red().to_string(),
    };
    log!("status"; "{} {}", state, status.path);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tether::vfs::LocalFileSystem;

    #[test]
    fn test_pointer_status_on_disk() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();

        let engine = Engine::new(&Config::default());
        let scope = engine.scopes.root("test");
        let present = LocalFileSystem::url_for_path(&dir.path().join("a.txt"));
        let missing = LocalFileSystem::url_for_path(&dir.path().join("b.txt"));
        let folder = LocalFileSystem::url_for_path(dir.path());

        let status = |url: &str| {
            let pointer = engine.manager.create(url, scope, ListenerTag::Silent).unwrap();
            PointerStatus::of(&pointer)
        };

        let a = status(&present);
        assert!(a.valid);
        assert!(!a.directory);
        assert_eq!(a.url, present);

        assert!(!status(&missing).valid);
        assert!(status(&folder).directory);

        engine.scopes.dispose(scope);
        assert!(engine.manager.shutdown().is_empty());
    }
}
