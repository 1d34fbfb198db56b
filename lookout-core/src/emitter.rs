//! Listener registry and dispatch, keyed by change kind.
//!
//! Listeners run synchronously, in registration order, on the turn that
//! emits. They may register or remove listeners (or call back into the
//! bridge) while running; the listener list is snapshotted before
//! dispatch, so such changes apply from the next event on.

use crate::mask::ChangeKind;
use crate::notification::ChangeEvent;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use tracing::trace;

type Callback = Rc<dyn Fn(&ChangeEvent)>;

/// Handle for removing a listener later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Slot {
    id: ListenerId,
    once: bool,
    callback: Callback,
}

#[derive(Default)]
struct Listeners {
    next_id: u64,
    by_kind: HashMap<ChangeKind, Vec<Slot>>,
    any: Vec<Slot>,
}

impl Listeners {
    fn slot(&mut self, once: bool, callback: Callback) -> Slot {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        Slot { id, once, callback }
    }
}

/// Delivers [`ChangeEvent`]s to listeners registered per [`ChangeKind`].
#[derive(Default)]
pub struct EventEmitter {
    listeners: RefCell<Listeners>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls `listener` with the path of every `kind` event.
    pub fn on<F>(&self, kind: ChangeKind, listener: F) -> ListenerId
    where
        F: Fn(&str) + 'static,
    {
        let callback = Rc::new(move |event: &ChangeEvent| listener(&event.path));
        self.push(Some(kind), false, callback)
    }

    /// Like [`on`](Self::on), but the listener is dropped after its first call.
    pub fn once<F>(&self, kind: ChangeKind, listener: F) -> ListenerId
    where
        F: Fn(&str) + 'static,
    {
        let callback = Rc::new(move |event: &ChangeEvent| listener(&event.path));
        self.push(Some(kind), true, callback)
    }

    /// Calls `listener` with the full record of every event, whatever its kind.
    ///
    /// Catch-all listeners run after the kind-specific ones.
    pub fn on_any<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ChangeEvent) + 'static,
    {
        self.push(None, false, Rc::new(listener))
    }

    fn push(&self, kind: Option<ChangeKind>, once: bool, callback: Callback) -> ListenerId {
        let mut listeners = self.listeners.borrow_mut();
        let slot = listeners.slot(once, callback);
        let id = slot.id;
        match kind {
            Some(kind) => listeners.by_kind.entry(kind).or_default().push(slot),
            None => listeners.any.push(slot),
        }
        id
    }

    /// Removes one listener. Returns `false` if it was already gone.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let Listeners { by_kind, any, .. } = &mut *listeners;

        for slots in by_kind.values_mut().chain(std::iter::once(any)) {
            if let Some(pos) = slots.iter().position(|s| s.id == id) {
                slots.remove(pos);
                return true;
            }
        }
        false
    }

    /// Removes every listener for one kind. Catch-all listeners are kept.
    pub fn remove_all_listeners(&self, kind: ChangeKind) {
        self.listeners.borrow_mut().by_kind.remove(&kind);
    }

    /// Number of kind-specific listeners for `kind`.
    pub fn listener_count(&self, kind: ChangeKind) -> usize {
        self.listeners
            .borrow()
            .by_kind
            .get(&kind)
            .map_or(0, Vec::len)
    }

    /// Invokes every listener interested in `event`.
    ///
    /// Returns how many listeners ran.
    pub fn emit(&self, event: &ChangeEvent) -> usize {
        let callbacks = self.snapshot(event.kind);
        trace!(
            kind = %event.kind,
            path = %event.path,
            listeners = callbacks.len(),
            "emit"
        );

        for callback in &callbacks {
            callback(event);
        }
        callbacks.len()
    }

    /// Clones out the callbacks for one dispatch and retires `once` slots.
    fn snapshot(&self, kind: ChangeKind) -> Vec<Callback> {
        let mut listeners = self.listeners.borrow_mut();
        let Listeners { by_kind, any, .. } = &mut *listeners;

        let mut callbacks = Vec::new();
        for slots in by_kind.get_mut(&kind).into_iter().chain(std::iter::once(any)) {
            callbacks.extend(slots.iter().map(|s| Rc::clone(&s.callback)));
            slots.retain(|s| !s.once);
        }
        callbacks
    }
}

impl fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners = self.listeners.borrow();
        let per_kind: usize = listeners.by_kind.values().map(Vec::len).sum();
        f.debug_struct("EventEmitter")
            .field("kind_listeners", &per_kind)
            .field("any_listeners", &listeners.any.len())
            .finish()
    }
}
