//! In-memory facility and a hand-cranked scheduler for bridge tests.

use crate::facility::{NotificationChannel, NotificationFacility};
use crate::scheduler::{
    Backlog, Callback, PeriodicScheduler, ReadinessScheduler, TimerHandle,
};
use lookout_core::{ChangeMask, RawNotification, WatchDescriptor};
use std::cell::{RefCell, RefMut};
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::fs::File;
use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, RawFd};
use std::rc::Rc;
use std::time::Duration;

const EINVAL: i32 = 22;
const EMFILE: i32 = 24;

/// Kernel-side state shared by the fake facility and its channels.
#[derive(Debug, Default)]
pub(crate) struct FakeKernel {
    pub next_wd: i32,
    pub sessions_opened: usize,
    pub open_sessions: usize,
    pub watches: BTreeMap<i32, String>,
    pub pending: VecDeque<RawNotification>,
    pub removed: Vec<WatchDescriptor>,
    pub fail_open: bool,
    pub fail_remove: bool,
    /// Reported by channels as left-over records after a read
    pub backlog: bool,
    pub rejected: HashSet<String>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct FakeFacility {
    kernel: Rc<RefCell<FakeKernel>>,
}

impl FakeFacility {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kernel(&self) -> RefMut<'_, FakeKernel> {
        self.kernel.borrow_mut()
    }

    /// Queues a record as if the kernel had produced it.
    pub fn push(&self, wd: i32, mask: ChangeMask, name: &str) {
        self.push_raw(RawNotification::new(WatchDescriptor(wd), mask.bits(), name));
    }

    pub fn push_raw(&self, raw: RawNotification) {
        self.kernel().pending.push_back(raw);
    }

    /// The next successful `add_watch` returns this descriptor.
    pub fn set_next_descriptor(&self, wd: i32) {
        self.kernel().next_wd = wd - 1;
    }

    pub fn reject(&self, path: &str) {
        self.kernel().rejected.insert(path.to_string());
    }

    pub fn open_sessions(&self) -> usize {
        self.kernel().open_sessions
    }

    pub fn sessions_opened(&self) -> usize {
        self.kernel().sessions_opened
    }
}

impl NotificationFacility for FakeFacility {
    type Channel = FakeChannel;

    fn open_session(&self) -> io::Result<FakeChannel> {
        let mut kernel = self.kernel();
        if kernel.fail_open {
            return Err(io::Error::from_raw_os_error(EMFILE));
        }
        let file = tempfile::tempfile()?;
        kernel.sessions_opened += 1;
        kernel.open_sessions += 1;
        Ok(FakeChannel {
            kernel: Rc::clone(&self.kernel),
            file,
        })
    }
}

#[derive(Debug)]
pub(crate) struct FakeChannel {
    kernel: Rc<RefCell<FakeKernel>>,
    /// Stands in for the session descriptor
    file: File,
}

impl AsFd for FakeChannel {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}

impl NotificationChannel for FakeChannel {
    fn add_watch(&mut self, path: &str, _mask: ChangeMask) -> io::Result<WatchDescriptor> {
        let mut kernel = self.kernel.borrow_mut();
        if kernel.rejected.contains(path) {
            return Err(io::Error::from(io::ErrorKind::NotFound));
        }
        // Same path, same inode, same descriptor
        if let Some((&wd, _)) = kernel.watches.iter().find(|(_, p)| p.as_str() == path) {
            return Ok(WatchDescriptor(wd));
        }
        kernel.next_wd += 1;
        let wd = kernel.next_wd;
        kernel.watches.insert(wd, path.to_string());
        Ok(WatchDescriptor(wd))
    }

    fn remove_watch(&mut self, descriptor: WatchDescriptor) -> io::Result<()> {
        let mut kernel = self.kernel.borrow_mut();
        if kernel.fail_remove || kernel.watches.remove(&descriptor.as_raw()).is_none() {
            return Err(io::Error::from_raw_os_error(EINVAL));
        }
        kernel.removed.push(descriptor);
        kernel
            .pending
            .push_back(RawNotification::new(descriptor, ChangeMask::IGNORED.bits(), ""));
        Ok(())
    }

    fn read_pending(&mut self) -> io::Result<Vec<RawNotification>> {
        Ok(self.kernel.borrow_mut().pending.drain(..).collect())
    }

    fn has_backlog(&self) -> bool {
        self.kernel.borrow().backlog
    }

    fn close(self) -> io::Result<()> {
        let mut kernel = self.kernel.borrow_mut();
        kernel.open_sessions -= 1;
        kernel.watches.clear();
        kernel.pending.clear();
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotKey {
    Timer(TimerHandle),
    Fd(RawFd),
}

struct Slot {
    key: SlotKey,
    callback: Option<Callback>,
}

#[derive(Default)]
struct ManualLoop {
    next_timer: u64,
    slots: Vec<Slot>,
    registered: usize,
    cancelled: usize,
    intervals: Vec<Duration>,
    last_backlog: Option<Backlog>,
    fail_readable: bool,
}

/// A scheduler that only runs callbacks when told to.
#[derive(Clone, Default)]
pub(crate) struct ManualScheduler {
    inner: Rc<RefCell<ManualLoop>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs every registered callback once. Returns how many ran.
    pub fn fire(&self) -> usize {
        let keys: Vec<SlotKey> = self.inner.borrow().slots.iter().map(|s| s.key).collect();
        let mut fired = 0;

        for key in keys {
            let callback = self
                .inner
                .borrow_mut()
                .slots
                .iter_mut()
                .find(|s| s.key == key)
                .and_then(|s| s.callback.take());

            if let Some(mut callback) = callback {
                let backlog = callback();
                self.inner.borrow_mut().last_backlog = Some(backlog);
                fired += 1;

                // Put it back unless it was cancelled while running
                let mut inner = self.inner.borrow_mut();
                if let Some(slot) = inner
                    .slots
                    .iter_mut()
                    .find(|s| s.key == key && s.callback.is_none())
                {
                    slot.callback = Some(callback);
                }
            }
        }
        fired
    }

    pub fn active(&self) -> usize {
        self.inner.borrow().slots.len()
    }

    pub fn registered(&self) -> usize {
        self.inner.borrow().registered
    }

    pub fn cancelled(&self) -> usize {
        self.inner.borrow().cancelled
    }

    pub fn last_interval(&self) -> Option<Duration> {
        self.inner.borrow().intervals.last().copied()
    }

    /// What the most recent callback reported.
    pub fn last_backlog(&self) -> Option<Backlog> {
        self.inner.borrow().last_backlog
    }

    pub fn fail_readable(&self) {
        self.inner.borrow_mut().fail_readable = true;
    }

    fn cancel(&self, key: SlotKey) {
        let mut inner = self.inner.borrow_mut();
        let before = inner.slots.len();
        inner.slots.retain(|s| s.key != key);
        if inner.slots.len() != before {
            inner.cancelled += 1;
        }
    }
}

impl PeriodicScheduler for ManualScheduler {
    fn register_recurring(&mut self, interval: Duration, callback: Callback) -> TimerHandle {
        let mut inner = self.inner.borrow_mut();
        let handle = TimerHandle(inner.next_timer);
        inner.next_timer += 1;
        inner.registered += 1;
        inner.intervals.push(interval);
        inner.slots.push(Slot {
            key: SlotKey::Timer(handle),
            callback: Some(callback),
        });
        handle
    }

    fn cancel_recurring(&mut self, handle: TimerHandle) {
        self.cancel(SlotKey::Timer(handle));
    }
}

impl ReadinessScheduler for ManualScheduler {
    fn register_readable(&mut self, fd: BorrowedFd<'_>, callback: Callback) -> io::Result<()> {
        let mut inner = self.inner.borrow_mut();
        if inner.fail_readable {
            return Err(io::Error::from_raw_os_error(EINVAL));
        }
        inner.registered += 1;
        inner.slots.push(Slot {
            key: SlotKey::Fd(fd.as_raw_fd()),
            callback: Some(callback),
        });
        Ok(())
    }

    fn unregister_readable(&mut self, fd: RawFd) {
        self.cancel(SlotKey::Fd(fd));
    }
}
