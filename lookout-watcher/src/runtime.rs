//! Tokio integration.
//!
//! Both adapters spawn `!Send` tasks with [`tokio::task::spawn_local`],
//! so they must be used from inside a [`tokio::task::LocalSet`].
//! Outside of one, [`TokioReadiness`] reports an error and
//! [`TokioInterval`] panics.

use crate::config::{BridgeConfig, TriggerStyle};
use crate::scheduler::{
    Backlog, Callback, PeriodicScheduler, ReadinessScheduler, Scheduler, TimerHandle,
};
use std::collections::HashMap;
use std::future::poll_fn;
use std::io;
use std::os::fd::{AsRawFd, BorrowedFd, OwnedFd, RawFd};
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::task::Poll;
use std::time::Duration;
use tokio::io::unix::AsyncFd;
use tokio::io::Interest;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error};

/// Runs callbacks on a tokio interval.
#[derive(Debug, Default)]
pub struct TokioInterval {
    next_handle: u64,
    tasks: HashMap<TimerHandle, JoinHandle<()>>,
}

impl TokioInterval {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PeriodicScheduler for TokioInterval {
    fn register_recurring(&mut self, interval: Duration, mut callback: Callback) -> TimerHandle {
        let handle = TimerHandle(self.next_handle);
        self.next_handle += 1;

        // tokio panics on a zero period
        let period = interval.max(Duration::from_millis(1));
        let task = tokio::task::spawn_local(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                callback();
            }
        });

        debug!(?handle, ?period, "recurring drain registered");
        self.tasks.insert(handle, task);
        handle
    }

    fn cancel_recurring(&mut self, handle: TimerHandle) {
        if let Some(task) = self.tasks.remove(&handle) {
            task.abort();
            debug!(?handle, "recurring drain cancelled");
        }
    }
}

impl Drop for TokioInterval {
    fn drop(&mut self) {
        for (_, task) in self.tasks.drain() {
            task.abort();
        }
    }
}

/// Runs callbacks whenever a descriptor turns readable.
///
/// The descriptor is duplicated before it's handed to the reactor, so the
/// reactor registration belongs to the duplicate and survives the channel's
/// own fd being closed and its number reused. The adapter holds the only
/// strong reference to the duplicate; `unregister_readable` closes it before
/// returning, and the task notices on its next wakeup.
#[derive(Debug, Default)]
pub struct TokioReadiness {
    subscriptions: HashMap<RawFd, Subscription>,
}

#[derive(Debug)]
struct Subscription {
    source: Rc<AsyncFd<OwnedFd>>,
    task: JoinHandle<()>,
}

impl TokioReadiness {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReadinessScheduler for TokioReadiness {
    fn register_readable(&mut self, fd: BorrowedFd<'_>, mut callback: Callback) -> io::Result<()> {
        let raw = fd.as_raw_fd();
        if Handle::try_current().is_err() {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "readiness drains need a tokio runtime",
            ));
        }
        let source = Rc::new(AsyncFd::with_interest(
            fd.try_clone_to_owned()?,
            Interest::READABLE,
        )?);
        let weak = Rc::downgrade(&source);

        let drain = async move {
            loop {
                let backlog = poll_fn(|cx| {
                    // Only borrowed for the duration of one poll
                    let Some(source) = weak.upgrade() else {
                        return Poll::Ready(None);
                    };
                    let mut guard = match source.poll_read_ready(cx) {
                        Poll::Ready(Ok(guard)) => guard,
                        Poll::Ready(Err(e)) => {
                            error!(fd = raw, "readiness wait failed: {}", e);
                            return Poll::Ready(None);
                        }
                        Poll::Pending => return Poll::Pending,
                    };
                    let backlog = callback();
                    if backlog == Backlog::Empty {
                        guard.clear_ready();
                    }
                    Poll::Ready(Some(backlog))
                })
                .await;

                match backlog {
                    Some(Backlog::Empty) => {}
                    Some(Backlog::Pending) => tokio::task::yield_now().await,
                    None => break,
                }
            }
        };

        // spawn_local panics outside a LocalSet
        let task = panic::catch_unwind(AssertUnwindSafe(|| tokio::task::spawn_local(drain)))
            .map_err(|_| {
                io::Error::new(
                    io::ErrorKind::Other,
                    "readiness drains must be registered inside a tokio LocalSet",
                )
            })?;

        debug!(fd = raw, "readiness drain registered");
        if let Some(previous) = self.subscriptions.insert(raw, Subscription { source, task }) {
            previous.task.abort();
        }
        Ok(())
    }

    fn unregister_readable(&mut self, fd: RawFd) {
        if let Some(Subscription { source, task }) = self.subscriptions.remove(&fd) {
            task.abort();
            // Deregisters from the reactor and closes the duplicate now
            drop(source);
            debug!(fd, "readiness drain cancelled");
        }
    }
}

impl Drop for TokioReadiness {
    fn drop(&mut self) {
        for (_, subscription) in self.subscriptions.drain() {
            subscription.task.abort();
        }
    }
}

impl Scheduler {
    /// A tokio-backed scheduler in the style `config` asks for.
    pub fn tokio(config: &BridgeConfig) -> Self {
        match config.trigger {
            TriggerStyle::Poll => Self::periodic(TokioInterval::new(), config.interval),
            TriggerStyle::Readable => Self::readiness(TokioReadiness::new()),
        }
    }
}
