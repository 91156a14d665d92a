use std::path::PathBuf;

/// What happened to a path on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
    Removed,
}

impl ChangeKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Modified => "modified",
            Self::Removed => "removed",
        }
    }
}

/// Debounced changes, sorted by path.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct DebouncedChanges(pub Vec<(PathBuf, ChangeKind)>);

impl DebouncedChanges {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}
