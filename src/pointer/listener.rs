//! Validity listeners and the groups they partition pointers into.

use std::fmt;

use super::FilePointer;

/// Handle returned by [`PointerManager::register_listener`](super::PointerManager::register_listener).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub(crate) u32);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener#{}", self.0)
    }
}

/// Which listener group a pointer belongs to.
///
/// Pointers are interned per group: the same URL requested under two
/// different tags yields two distinct pointers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ListenerTag {
    /// No one is notified about validity changes.
    #[default]
    Silent,
    Id(ListenerId),
}

impl ListenerTag {
    pub const fn id(self) -> Option<ListenerId> {
        match self {
            Self::Silent => None,
            Self::Id(id) => Some(id),
        }
    }
}

impl From<ListenerId> for ListenerTag {
    fn from(id: ListenerId) -> Self {
        Self::Id(id)
    }
}

impl From<Option<ListenerId>> for ListenerTag {
    fn from(id: Option<ListenerId>) -> Self {
        id.map_or(Self::Silent, Self::Id)
    }
}

impl fmt::Display for ListenerTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Silent => f.write_str("silent"),
            Self::Id(id) => id.fmt(f),
        }
    }
}

/// Observer of pointer validity across a change batch.
///
/// Both callbacks receive the same pointers: `before_validity_changed`
/// while the old world is still visible, `validity_changed` once the
/// pointers have been re-resolved against the new one. Callbacks run with
/// no engine locks held and may create or dispose pointers.
pub trait PointerListener: Send + Sync {
    fn before_validity_changed(&self, _pointers: &[FilePointer]) {}

    fn validity_changed(&self, pointers: &[FilePointer]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_conversions() {
        assert_eq!(ListenerTag::from(None), ListenerTag::Silent);
        assert_eq!(ListenerTag::from(Some(ListenerId(3))), ListenerTag::Id(ListenerId(3)));
        assert_eq!(ListenerTag::from(ListenerId(3)).id(), Some(ListenerId(3)));
        assert_eq!(ListenerTag::default().id(), None);
    }

    #[test]
    fn test_tag_display() {
        assert_eq!(ListenerTag::Silent.to_string(), "silent");
        assert_eq!(ListenerTag::Id(ListenerId(7)).to_string(), "listener#7");
    }
}
