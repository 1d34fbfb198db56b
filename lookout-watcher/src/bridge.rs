//! The event bridge.
//!
//! Owns the notification channel and turns its raw records into
//! [`ChangeEvent`]s. The channel is opened by the first `add` and closed
//! as soon as the last watch goes away, so an idle bridge holds neither
//! a kernel session nor a slot in the host loop.

use crate::config::TriggerStyle;
use crate::facility::{NotificationChannel, NotificationFacility};
use crate::scheduler::{Backlog, Callback, Registration, Scheduler};
use lookout_core::{
    BridgeError, ChangeEvent, ChangeKind, ChangeMask, EventEmitter, ListenerId, RawNotification,
    Result, WatchDescriptor, WatchRegistry,
};
use std::cell::RefCell;
use std::fmt;
use std::io;
use std::os::fd::AsFd;
use std::rc::{Rc, Weak};
use tracing::{debug, error, info, warn};

/// Channel lifecycle. `add` is the only way into `Active`; removing the
/// last watch or closing is the only way out.
enum Lifecycle<C> {
    Inactive,
    Active {
        channel: C,
        registration: Registration,
    },
}

struct BridgeState<F: NotificationFacility> {
    facility: F,
    scheduler: Scheduler,
    registry: WatchRegistry,
    lifecycle: Lifecycle<F::Channel>,
}

impl<F: NotificationFacility> BridgeState<F> {
    fn is_active(&self) -> bool {
        matches!(self.lifecycle, Lifecycle::Active { .. })
    }

    fn channel(&mut self) -> Option<&mut F::Channel> {
        match &mut self.lifecycle {
            Lifecycle::Active { channel, .. } => Some(channel),
            Lifecycle::Inactive => None,
        }
    }

    fn remove(&mut self, descriptor: WatchDescriptor) -> bool {
        let Some(path) = self.registry.remove(descriptor) else {
            return false;
        };
        debug!(%descriptor, path = %path, "watch removed");

        if self.registry.is_empty() {
            // Closing the session drops the kernel-side watch with it
            self.close();
        } else if let Some(channel) = self.channel() {
            if let Err(e) = channel.remove_watch(descriptor) {
                warn!(%descriptor, "failed to remove watch from kernel: {}", e);
            }
        }
        true
    }

    fn close(&mut self) {
        let Lifecycle::Active {
            channel,
            registration,
        } = std::mem::replace(&mut self.lifecycle, Lifecycle::Inactive)
        else {
            self.registry.clear();
            return;
        };

        self.scheduler.deregister(registration);
        if let Err(e) = channel.close() {
            warn!("failed to close notification channel: {}", e);
        }

        let dropped = self.registry.len();
        self.registry.clear();
        info!(watches = dropped, "notification channel closed");
    }

    fn has_backlog(&self) -> bool {
        match &self.lifecycle {
            Lifecycle::Active { channel, .. } => channel.has_backlog(),
            Lifecycle::Inactive => false,
        }
    }

    fn read_pending(&mut self) -> Vec<RawNotification> {
        let Some(channel) = self.channel() else {
            return Vec::new();
        };
        match channel.read_pending() {
            Ok(records) => records,
            Err(e) => {
                error!("failed to read notification channel: {}", e);
                Vec::new()
            }
        }
    }

    /// Turns one record into events, or nothing if its watch is gone.
    fn resolve(&mut self, raw: &RawNotification) -> Vec<ChangeEvent> {
        if raw.is_queue_overflow() {
            warn!("kernel event queue overflowed, changes were lost");
        }

        let Some(base) = self.registry.lookup(raw.descriptor) else {
            debug!(descriptor = %raw.descriptor, mask = raw.mask, "dropping stale record");
            return Vec::new();
        };

        let changes = raw.changes();
        let events: Vec<_> = changes
            .kinds()
            .map(|kind| ChangeEvent::from_raw(kind, base, raw))
            .collect();

        if changes.contains(ChangeMask::IGNORED) {
            // The kernel dropped this watch and may hand its number out again
            debug!(descriptor = %raw.descriptor, "watch invalidated by kernel");
            self.registry.remove(raw.descriptor);
            if self.registry.is_empty() {
                self.close();
            }
        }

        events
    }
}

impl<F: NotificationFacility> Drop for BridgeState<F> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<F: NotificationFacility + 'static> BridgeState<F> {
    /// Opens a session and subscribes it to the host loop, if needed.
    fn ensure_active(&mut self, shared: Weak<Shared<F>>) -> Result<()> {
        if self.is_active() {
            return Ok(());
        }

        let channel = self
            .facility
            .open_session()
            .map_err(BridgeError::channel_init)?;

        let callback: Callback = Box::new(move || match shared.upgrade() {
            Some(shared) => {
                shared.drain();
                shared.backlog()
            }
            None => Backlog::Empty,
        });

        let registration = match self.scheduler.register(channel.as_fd(), callback) {
            Ok(registration) => registration,
            Err(e) => {
                if let Err(close_err) = channel.close() {
                    warn!("failed to close unsubscribed channel: {}", close_err);
                }
                return Err(BridgeError::channel_init(e));
            }
        };

        info!(trigger = %self.scheduler.style(), "notification channel opened");
        self.lifecycle = Lifecycle::Active {
            channel,
            registration,
        };
        Ok(())
    }
}

struct Shared<F: NotificationFacility> {
    state: RefCell<BridgeState<F>>,
    emitter: EventEmitter,
}

impl<F: NotificationFacility> Shared<F> {
    fn drain(&self) -> usize {
        let records = match self.state.try_borrow_mut() {
            Ok(mut state) => state.read_pending(),
            Err(_) => {
                debug!("bridge busy, skipping drain pass");
                return 0;
            }
        };
        if records.is_empty() {
            return 0;
        }
        debug!(records = records.len(), "drain pass");

        // Resolve one record at a time and release the state before
        // listeners run, so they can add or remove watches.
        let mut emitted = 0;
        for raw in &records {
            let events = self.state.borrow_mut().resolve(raw);
            for event in &events {
                self.emitter.emit(event);
                emitted += 1;
            }
        }
        emitted
    }

    fn backlog(&self) -> Backlog {
        match self.state.try_borrow() {
            Ok(state) if state.has_backlog() => Backlog::Pending,
            _ => Backlog::Empty,
        }
    }
}

/// Bridges a notification facility into a single-threaded event loop.
///
/// Cloning gives another handle to the same bridge. The channel is
/// closed when the last handle is dropped. Listeners that need to call
/// back into the bridge should hold a [`WeakBridge`], not a clone, or
/// the bridge will never be dropped.
///
/// # Example
///
/// ```no_run
/// use lookout_core::{ChangeKind, ChangeMask};
/// use lookout_watcher::{BridgeConfig, InotifyBridge};
///
/// # async fn run() -> lookout_core::Result<()> {
/// let bridge = InotifyBridge::with_config(&BridgeConfig::default());
/// bridge.on(ChangeKind::Create, |path| println!("created {}", path));
/// bridge.add("/tmp/", ChangeMask::CREATE | ChangeMask::DELETE)?;
/// # Ok(())
/// # }
/// ```
pub struct EventBridge<F: NotificationFacility> {
    shared: Rc<Shared<F>>,
}

impl<F: NotificationFacility + 'static> EventBridge<F> {
    /// Creates an idle bridge. Nothing is opened until the first `add`.
    pub fn new(facility: F, scheduler: Scheduler) -> Self {
        Self {
            shared: Rc::new(Shared {
                state: RefCell::new(BridgeState {
                    facility,
                    scheduler,
                    registry: WatchRegistry::new(),
                    lifecycle: Lifecycle::Inactive,
                }),
                emitter: EventEmitter::new(),
            }),
        }
    }

    /// Watches `path` for the changes in `mask`.
    ///
    /// Opens the channel first if none is open. The path is stored as
    /// given and prefixed verbatim to child names, so directories should
    /// carry a trailing `/`.
    ///
    /// # Errors
    ///
    /// [`BridgeError::ChannelInit`] if no session could be opened, and
    /// [`BridgeError::WatchAdd`] if the path was rejected. A rejected path
    /// leaves existing watches alone; a channel opened for it stays open.
    pub fn add(&self, path: impl Into<String>, mask: ChangeMask) -> Result<WatchDescriptor> {
        let path = path.into();
        let mut state = self.shared.state.borrow_mut();
        state.ensure_active(Rc::downgrade(&self.shared))?;

        let channel = state
            .channel()
            .ok_or_else(|| BridgeError::channel_init(io::ErrorKind::NotConnected.into()))?;
        let descriptor = channel
            .add_watch(&path, mask)
            .map_err(|e| BridgeError::watch_add(&path, e))?;

        debug!(%descriptor, path = %path, ?mask, "watch added");
        state.registry.add(descriptor, path);
        Ok(descriptor)
    }

    /// Stops watching one descriptor.
    ///
    /// Does nothing if the descriptor isn't registered. Removing the last
    /// watch closes the channel. Returns whether anything was removed.
    pub fn remove(&self, descriptor: WatchDescriptor) -> bool {
        self.shared.state.borrow_mut().remove(descriptor)
    }

    /// Closes the channel and forgets every watch. Safe to call repeatedly.
    pub fn close(&self) {
        self.shared.state.borrow_mut().close();
    }

    /// Runs one drain pass right now. Returns how many events were emitted.
    ///
    /// The host loop normally does this; calling it on an idle bridge is
    /// a no-op.
    pub fn drain(&self) -> usize {
        self.shared.drain()
    }

    pub fn on<L>(&self, kind: ChangeKind, listener: L) -> ListenerId
    where
        L: Fn(&str) + 'static,
    {
        self.shared.emitter.on(kind, listener)
    }

    pub fn once<L>(&self, kind: ChangeKind, listener: L) -> ListenerId
    where
        L: Fn(&str) + 'static,
    {
        self.shared.emitter.once(kind, listener)
    }

    pub fn on_any<L>(&self, listener: L) -> ListenerId
    where
        L: Fn(&ChangeEvent) + 'static,
    {
        self.shared.emitter.on_any(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.shared.emitter.remove_listener(id)
    }

    pub fn emitter(&self) -> &EventEmitter {
        &self.shared.emitter
    }

    /// Whether a channel is currently open.
    pub fn is_active(&self) -> bool {
        self.shared.state.borrow().is_active()
    }

    pub fn watch_count(&self) -> usize {
        self.shared.state.borrow().registry.len()
    }

    pub fn path_of(&self, descriptor: WatchDescriptor) -> Option<String> {
        self.shared
            .state
            .borrow()
            .registry
            .lookup(descriptor)
            .map(str::to_string)
    }

    /// Registered watches, in descriptor order.
    pub fn watches(&self) -> Vec<(WatchDescriptor, String)> {
        self.shared
            .state
            .borrow()
            .registry
            .iter()
            .map(|(wd, path)| (wd, path.to_string()))
            .collect()
    }

    pub fn trigger_style(&self) -> TriggerStyle {
        self.shared.state.borrow().scheduler.style()
    }

    pub fn downgrade(&self) -> WeakBridge<F> {
        WeakBridge {
            shared: Rc::downgrade(&self.shared),
        }
    }
}

impl<F: NotificationFacility> Clone for EventBridge<F> {
    fn clone(&self) -> Self {
        Self {
            shared: Rc::clone(&self.shared),
        }
    }
}

impl<F: NotificationFacility> fmt::Debug for EventBridge<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("EventBridge");
        match self.shared.state.try_borrow() {
            Ok(state) => s
                .field("active", &matches!(state.lifecycle, Lifecycle::Active { .. }))
                .field("watches", &state.registry.len())
                .field("scheduler", &state.scheduler),
            Err(_) => s.field("state", &"<borrowed>"),
        };
        s.field("emitter", &self.shared.emitter).finish()
    }
}

/// A handle that doesn't keep the bridge alive.
pub struct WeakBridge<F: NotificationFacility> {
    shared: Weak<Shared<F>>,
}

impl<F: NotificationFacility> WeakBridge<F> {
    pub fn upgrade(&self) -> Option<EventBridge<F>> {
        self.shared.upgrade().map(|shared| EventBridge { shared })
    }
}

impl<F: NotificationFacility> Clone for WeakBridge<F> {
    fn clone(&self) -> Self {
        Self {
            shared: Weak::clone(&self.shared),
        }
    }
}

impl<F: NotificationFacility> fmt::Debug for WeakBridge<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakBridge")
            .field("alive", &(self.shared.strong_count() > 0))
            .finish()
    }
}
