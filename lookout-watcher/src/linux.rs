//! Linux inotify backend.
//!
//! Uses the inotify crate, which opens its instance with `IN_NONBLOCK`
//! and `IN_CLOEXEC`, so reads return `WouldBlock` instead of parking the
//! event loop.

use crate::bridge::EventBridge;
use crate::config::BridgeConfig;
use crate::facility::{NotificationChannel, NotificationFacility};
use crate::scheduler::Scheduler;
use inotify::{EventMask, Inotify, WatchMask};
use lookout_core::{ChangeMask, RawNotification, WatchDescriptor};
use std::borrow::Cow;
use std::collections::HashMap;
use std::ffi::OsStr;
use std::io;
use std::os::fd::{AsFd, BorrowedFd};
use tracing::{debug, warn};

/// Read buffer size. Fits many records; one record needs at most
/// 16 bytes of header plus `NAME_MAX + 1`.
const BUFFER_SIZE: usize = 4096;

/// A bridge over the kernel's inotify.
pub type InotifyBridge = EventBridge<InotifyFacility>;

impl EventBridge<InotifyFacility> {
    /// An inotify bridge driven by the tokio adapter `config` selects.
    ///
    /// Watches must be added from inside a [`tokio::task::LocalSet`].
    pub fn with_config(config: &BridgeConfig) -> Self {
        Self::new(InotifyFacility::new(), Scheduler::tokio(config))
    }
}

/// Opens inotify instances.
#[derive(Debug, Default, Clone, Copy)]
pub struct InotifyFacility;

impl InotifyFacility {
    pub fn new() -> Self {
        Self
    }
}

impl NotificationFacility for InotifyFacility {
    type Channel = InotifyChannel;

    fn open_session(&self) -> io::Result<InotifyChannel> {
        let inotify = Inotify::init()?;
        debug!("inotify instance initialized");
        Ok(InotifyChannel {
            inotify,
            watches: HashMap::new(),
            buffer: [0; BUFFER_SIZE],
            backlog: false,
        })
    }
}

/// An open inotify instance.
pub struct InotifyChannel {
    inotify: Inotify,

    /// The crate's descriptor objects, needed again for `rm_watch`
    watches: HashMap<i32, inotify::WatchDescriptor>,

    buffer: [u8; BUFFER_SIZE],

    /// Set when a read gave up before hitting `WouldBlock`
    backlog: bool,
}

impl std::fmt::Debug for InotifyChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InotifyChannel")
            .field("watches", &self.watches.len())
            .field("backlog", &self.backlog)
            .finish()
    }
}

impl AsFd for InotifyChannel {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.inotify.as_fd()
    }
}

impl NotificationChannel for InotifyChannel {
    fn add_watch(&mut self, path: &str, mask: ChangeMask) -> io::Result<WatchDescriptor> {
        let watch_mask = WatchMask::from_bits_truncate(mask.bits());
        let wd = self.inotify.watches().add(path, watch_mask)?;
        let id = wd.get_watch_descriptor_id();
        self.watches.insert(id, wd);
        Ok(WatchDescriptor(id))
    }

    fn remove_watch(&mut self, descriptor: WatchDescriptor) -> io::Result<()> {
        let wd = self.watches.remove(&descriptor.as_raw()).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no inotify watch for {}", descriptor),
            )
        })?;
        self.inotify.watches().remove(wd)
    }

    fn read_pending(&mut self) -> io::Result<Vec<RawNotification>> {
        let mut records = Vec::new();
        self.backlog = false;

        loop {
            let events = match self.inotify.read_events(&mut self.buffer) {
                Ok(events) => events,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if records.is_empty() => return Err(e),
                Err(e) => {
                    // Hand out what we already have; the rest is still
                    // queued and gets picked up by the next pass.
                    warn!("inotify read failed mid-pass: {}", e);
                    self.backlog = true;
                    break;
                }
            };

            let before = records.len();
            for event in events {
                let id = event.wd.get_watch_descriptor_id();
                if event.mask.contains(EventMask::IGNORED) {
                    // The kernel has already dropped this watch
                    self.watches.remove(&id);
                }

                records.push(RawNotification {
                    descriptor: WatchDescriptor(id),
                    mask: event.mask.bits(),
                    cookie: event.cookie,
                    name: event.name.map(child_name).unwrap_or_default(),
                });
            }

            if records.len() == before {
                break;
            }
        }

        Ok(records)
    }

    fn has_backlog(&self) -> bool {
        self.backlog
    }

    fn close(self) -> io::Result<()> {
        self.inotify.close()
    }
}

/// Child names are carried as strings; bytes that aren't UTF-8 are replaced.
fn child_name(name: &OsStr) -> String {
    let lossy = name.to_string_lossy();
    if let Cow::Owned(_) = lossy {
        debug!(raw = ?name, name = %lossy, "child name is not valid UTF-8, replaced");
    }
    lossy.into_owned()
}
