//! Event loop integration.
//!
//! The bridge never drives itself. It hands a callback to the host loop,
//! which calls it either on a fixed interval or whenever the channel's
//! descriptor turns readable. A bridge uses exactly one of the two for
//! its whole lifetime; [`Scheduler`] enforces that by construction.

use crate::config::TriggerStyle;
use std::io;
use std::os::fd::{AsRawFd, BorrowedFd, RawFd};
use std::time::Duration;
use tracing::warn;

/// What a drain pass left in the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backlog {
    /// The channel was read until it reported nothing more.
    Empty,
    /// Records are still queued. Readiness schedulers must run the
    /// callback again without waiting for a fresh wakeup.
    Pending,
}

/// A drain pass, as handed to the host loop.
pub type Callback = Box<dyn FnMut() -> Backlog>;

/// Identifies one recurring registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(pub u64);

/// A loop that can call something on a fixed interval.
pub trait PeriodicScheduler {
    fn register_recurring(&mut self, interval: Duration, callback: Callback) -> TimerHandle;

    fn cancel_recurring(&mut self, handle: TimerHandle);
}

/// A loop that can call something whenever a descriptor is readable.
pub trait ReadinessScheduler {
    /// Subscribes `callback` to readability of `fd`.
    ///
    /// Implementations must not keep relying on `fd` staying open; the
    /// channel may be closed right after [`unregister_readable`] returns.
    ///
    /// [`unregister_readable`]: ReadinessScheduler::unregister_readable
    fn register_readable(&mut self, fd: BorrowedFd<'_>, callback: Callback) -> io::Result<()>;

    fn unregister_readable(&mut self, fd: RawFd);
}

/// The host loop, in one of its two styles.
pub enum Scheduler {
    Periodic {
        scheduler: Box<dyn PeriodicScheduler>,
        interval: Duration,
    },
    Readiness(Box<dyn ReadinessScheduler>),
}

/// What the bridge must undo on teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Registration {
    Timer(TimerHandle),
    Readable(RawFd),
}

impl Scheduler {
    /// Polls on a fixed interval.
    pub fn periodic(scheduler: impl PeriodicScheduler + 'static, interval: Duration) -> Self {
        Self::Periodic {
            scheduler: Box::new(scheduler),
            interval,
        }
    }

    /// Drains whenever the channel is readable.
    pub fn readiness(scheduler: impl ReadinessScheduler + 'static) -> Self {
        Self::Readiness(Box::new(scheduler))
    }

    pub fn style(&self) -> TriggerStyle {
        match self {
            Self::Periodic { .. } => TriggerStyle::Poll,
            Self::Readiness(_) => TriggerStyle::Readable,
        }
    }

    pub(crate) fn register(
        &mut self,
        fd: BorrowedFd<'_>,
        callback: Callback,
    ) -> io::Result<Registration> {
        match self {
            Self::Periodic {
                scheduler,
                interval,
            } => Ok(Registration::Timer(
                scheduler.register_recurring(*interval, callback),
            )),
            Self::Readiness(scheduler) => {
                let raw = fd.as_raw_fd();
                scheduler.register_readable(fd, callback)?;
                Ok(Registration::Readable(raw))
            }
        }
    }

    pub(crate) fn deregister(&mut self, registration: Registration) {
        match (self, registration) {
            (Self::Periodic { scheduler, .. }, Registration::Timer(handle)) => {
                scheduler.cancel_recurring(handle)
            }
            (Self::Readiness(scheduler), Registration::Readable(fd)) => {
                scheduler.unregister_readable(fd)
            }
            (scheduler, registration) => {
                warn!(?registration, ?scheduler, "registration does not match scheduler style");
            }
        }
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Periodic { interval, .. } => f
                .debug_struct("Periodic")
                .field("interval", interval)
                .finish_non_exhaustive(),
            Self::Readiness(_) => f.write_str("Readiness(..)"),
        }
    }
}
