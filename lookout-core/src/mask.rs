//! Change categories.
//!
//! The kernel reports changes as a bitmask. We expose two views of it:
//! [`ChangeMask`], the raw set used when registering a watch, and
//! [`ChangeKind`], a single named category used as the dispatch key
//! for listeners. A mask coming off the wire is decomposed into its
//! kinds before anything is emitted.

use crate::error::UnknownChangeKind;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

bitflags! {
    /// A set of change categories.
    ///
    /// Bit values are the kernel's `IN_*` constants, so a mask can be
    /// handed to the facility unchanged.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ChangeMask: u32 {
        const ACCESS = 0x0000_0001;
        const MODIFY = 0x0000_0002;
        const ATTRIB = 0x0000_0004;
        const CLOSE_WRITE = 0x0000_0008;
        const CLOSE_NOWRITE = 0x0000_0010;
        const OPEN = 0x0000_0020;
        const MOVED_FROM = 0x0000_0040;
        const MOVED_TO = 0x0000_0080;
        const CREATE = 0x0000_0100;
        const DELETE = 0x0000_0200;
        const DELETE_SELF = 0x0000_0400;
        const MOVE_SELF = 0x0000_0800;
        /// Emitted by the facility on its own; never needs to be requested.
        const UNMOUNT = 0x0000_2000;
        /// Emitted by the facility on its own when a watch is invalidated.
        const IGNORED = 0x0000_8000;

        const CLOSE = Self::CLOSE_WRITE.bits() | Self::CLOSE_NOWRITE.bits();
        const MOVE = Self::MOVED_FROM.bits() | Self::MOVED_TO.bits();
        /// Every category a caller can subscribe to.
        const ALL_EVENTS = 0x0000_0fff;
    }
}

impl ChangeMask {
    /// Keeps only the recognized category bits of a raw kernel mask.
    ///
    /// Modifier bits such as `IN_ISDIR` are dropped here; see
    /// [`crate::RawNotification::is_dir`].
    pub fn from_raw(bits: u32) -> Self {
        Self::from_bits_truncate(bits)
    }

    /// Iterates the categories in this mask, lowest bit first.
    pub fn kinds(self) -> impl Iterator<Item = ChangeKind> {
        ChangeKind::ALL
            .into_iter()
            .filter(move |kind| self.contains(kind.mask()))
    }

    /// Parses a comma-separated list of kind names.
    ///
    /// Besides the names of [`ChangeKind`], accepts the composites
    /// `close`, `move` and `all`. Whitespace around names is ignored.
    pub fn parse_list(list: &str) -> Result<Self, UnknownChangeKind> {
        let mut mask = Self::empty();
        for name in list.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            mask |= match name.to_ascii_lowercase().as_str() {
                "all" => Self::ALL_EVENTS,
                "close" => Self::CLOSE,
                "move" => Self::MOVE,
                _ => name.parse::<ChangeKind>()?.mask(),
            };
        }
        Ok(mask)
    }
}

impl From<ChangeKind> for ChangeMask {
    fn from(kind: ChangeKind) -> Self {
        kind.mask()
    }
}

impl FromIterator<ChangeKind> for ChangeMask {
    fn from_iter<I: IntoIterator<Item = ChangeKind>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::empty(), |mask, kind| mask | kind.mask())
    }
}

/// A single named class of filesystem change.
///
/// This is the key listeners subscribe on. Order follows the kernel bit
/// order, which is also the order kinds are emitted in when one record
/// carries several.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// File was read.
    Access,
    /// File contents were written.
    Modify,
    /// Permissions, timestamps, ownership or link count changed.
    Attrib,
    /// A file opened for writing was closed.
    CloseWrite,
    /// A file not opened for writing was closed.
    CloseNoWrite,
    /// File or directory was opened.
    Open,
    /// A child was moved out of the watched directory.
    MovedFrom,
    /// A child was moved into the watched directory.
    MovedTo,
    /// A child was created in the watched directory.
    Create,
    /// A child was deleted from the watched directory.
    Delete,
    /// The watched object itself was deleted.
    DeleteSelf,
    /// The watched object itself was moved.
    MoveSelf,
    /// The filesystem holding the watched object was unmounted.
    Unmount,
    /// The watch was invalidated by the kernel.
    Ignored,
}

impl ChangeKind {
    /// Every kind, in bit order.
    pub const ALL: [ChangeKind; 14] = [
        Self::Access,
        Self::Modify,
        Self::Attrib,
        Self::CloseWrite,
        Self::CloseNoWrite,
        Self::Open,
        Self::MovedFrom,
        Self::MovedTo,
        Self::Create,
        Self::Delete,
        Self::DeleteSelf,
        Self::MoveSelf,
        Self::Unmount,
        Self::Ignored,
    ];

    /// The single bit for this kind.
    pub fn mask(self) -> ChangeMask {
        match self {
            Self::Access => ChangeMask::ACCESS,
            Self::Modify => ChangeMask::MODIFY,
            Self::Attrib => ChangeMask::ATTRIB,
            Self::CloseWrite => ChangeMask::CLOSE_WRITE,
            Self::CloseNoWrite => ChangeMask::CLOSE_NOWRITE,
            Self::Open => ChangeMask::OPEN,
            Self::MovedFrom => ChangeMask::MOVED_FROM,
            Self::MovedTo => ChangeMask::MOVED_TO,
            Self::Create => ChangeMask::CREATE,
            Self::Delete => ChangeMask::DELETE,
            Self::DeleteSelf => ChangeMask::DELETE_SELF,
            Self::MoveSelf => ChangeMask::MOVE_SELF,
            Self::Unmount => ChangeMask::UNMOUNT,
            Self::Ignored => ChangeMask::IGNORED,
        }
    }

    /// Stable lowercase name, as used in config and JSON output.
    pub fn name(self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Modify => "modify",
            Self::Attrib => "attrib",
            Self::CloseWrite => "close_write",
            Self::CloseNoWrite => "close_no_write",
            Self::Open => "open",
            Self::MovedFrom => "moved_from",
            Self::MovedTo => "moved_to",
            Self::Create => "create",
            Self::Delete => "delete",
            Self::DeleteSelf => "delete_self",
            Self::MoveSelf => "move_self",
            Self::Unmount => "unmount",
            Self::Ignored => "ignored",
        }
    }

    /// Whether the kernel emits this kind without being asked.
    pub fn is_unsolicited(self) -> bool {
        matches!(self, Self::Unmount | Self::Ignored)
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ChangeKind {
    type Err = UnknownChangeKind;

    /// Accepts the snake_case name in any case, with `-` or `_`, and the
    /// kernel's `close_nowrite` spelling.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        if normalized == "close_nowrite" {
            return Ok(Self::CloseNoWrite);
        }
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == normalized)
            .ok_or_else(|| UnknownChangeKind(s.to_string()))
    }
}
