//! The kernel side of the bridge.
//!
//! A facility hands out notification sessions; a session (channel) holds
//! watches and queues raw records until they're read. The bridge only
//! talks to the kernel through these two traits, which keeps it testable
//! without inotify.

use lookout_core::{ChangeMask, RawNotification, WatchDescriptor};
use std::io;
use std::os::fd::AsFd;

/// Something that can open notification sessions.
pub trait NotificationFacility {
    type Channel: NotificationChannel;

    /// Allocates a fresh session in non-blocking mode.
    fn open_session(&self) -> io::Result<Self::Channel>;
}

/// One open notification session.
///
/// The file descriptor exposed through [`AsFd`] becomes readable whenever
/// records are queued; readiness-driven schedulers wait on it.
pub trait NotificationChannel: AsFd {
    /// Starts watching `path` for the changes in `mask`.
    fn add_watch(&mut self, path: &str, mask: ChangeMask) -> io::Result<WatchDescriptor>;

    /// Stops watching one descriptor.
    fn remove_watch(&mut self, descriptor: WatchDescriptor) -> io::Result<()>;

    /// Returns every record queued right now.
    ///
    /// Never blocks. An empty vector means nothing was pending.
    fn read_pending(&mut self) -> io::Result<Vec<RawNotification>>;

    /// Whether the last [`read_pending`] stopped before the queue ran dry.
    ///
    /// Readiness-driven schedulers keep the descriptor marked ready while
    /// this holds, since no new wakeup will come for records already queued.
    ///
    /// [`read_pending`]: NotificationChannel::read_pending
    fn has_backlog(&self) -> bool {
        false
    }

    /// Releases the session. Queued records are discarded.
    fn close(self) -> io::Result<()>
    where
        Self: Sized;
}
