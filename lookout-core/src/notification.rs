//! Raw and translated notification records.

use crate::mask::{ChangeKind, ChangeMask};
use serde::{Deserialize, Serialize};
use std::fmt;

/// `IN_ISDIR`: the subject of the event is a directory.
pub const IS_DIR_BIT: u32 = 0x4000_0000;

/// `IN_Q_OVERFLOW`: the kernel queue overflowed and records were lost.
pub const QUEUE_OVERFLOW_BIT: u32 = 0x0000_4000;

/// Opaque identifier the facility hands out for one active watch.
///
/// Only unique among watches that are currently active. The kernel is
/// free to hand the same number out again once a watch is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WatchDescriptor(pub i32);

impl WatchDescriptor {
    /// The raw kernel number.
    pub fn as_raw(self) -> i32 {
        self.0
    }
}

impl fmt::Display for WatchDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "wd:{}", self.0)
    }
}

/// One unprocessed record from the facility.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawNotification {
    /// Watch this record belongs to.
    pub descriptor: WatchDescriptor,

    /// Raw kernel mask, modifier bits included.
    pub mask: u32,

    /// Pairs `MOVED_FROM` with its `MOVED_TO`; zero otherwise.
    pub cookie: u32,

    /// Child name relative to the watched directory. Empty when the
    /// watched object itself changed.
    pub name: String,
}

impl RawNotification {
    /// Creates a record without a cookie.
    pub fn new(descriptor: WatchDescriptor, mask: u32, name: impl Into<String>) -> Self {
        Self {
            descriptor,
            mask,
            cookie: 0,
            name: name.into(),
        }
    }

    /// The recognized categories carried by this record.
    pub fn changes(&self) -> ChangeMask {
        ChangeMask::from_raw(self.mask)
    }

    /// Whether the subject is a directory.
    pub fn is_dir(&self) -> bool {
        self.mask & IS_DIR_BIT != 0
    }

    /// Whether the kernel dropped records before this one.
    pub fn is_queue_overflow(&self) -> bool {
        self.mask & QUEUE_OVERFLOW_BIT != 0
    }
}

/// A translated event, as handed to listeners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// The single category this event is for.
    #[serde(rename = "event")]
    pub kind: ChangeKind,

    /// Registered path with the child name appended.
    pub path: String,

    /// Watch the record came in on.
    pub descriptor: WatchDescriptor,

    pub is_dir: bool,

    pub cookie: u32,
}

impl ChangeEvent {
    /// Builds the event for one kind out of a resolved record.
    ///
    /// `registered` is prepended verbatim; no separator is inserted.
    pub fn from_raw(kind: ChangeKind, registered: &str, raw: &RawNotification) -> Self {
        let mut path = String::with_capacity(registered.len() + raw.name.len());
        path.push_str(registered);
        path.push_str(&raw.name);

        Self {
            kind,
            path,
            descriptor: raw.descriptor,
            is_dir: raw.is_dir(),
            cookie: raw.cookie,
        }
    }
}
