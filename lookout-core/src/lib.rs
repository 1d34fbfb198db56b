//! Lookout Core - watch bookkeeping and event delivery
//!
//! This crate holds the pieces of Lookout that never touch the kernel:
//! the change categories, the descriptor-to-path registry, the record
//! types and the emitter that hands events to listeners.
//!
//! # Example
//!
//! ```
//! use lookout_core::{ChangeEvent, ChangeKind, EventEmitter, RawNotification, WatchDescriptor};
//! use lookout_core::WatchRegistry;
//!
//! let mut registry = WatchRegistry::new();
//! registry.add(WatchDescriptor(7), "/tmp/");
//!
//! let emitter = EventEmitter::new();
//! emitter.on(ChangeKind::Create, |path| println!("created {}", path));
//!
//! let raw = RawNotification::new(WatchDescriptor(7), 0x100, "a.txt");
//! if let Some(base) = registry.lookup(raw.descriptor) {
//!     for kind in raw.changes().kinds() {
//!         emitter.emit(&ChangeEvent::from_raw(kind, base, &raw));
//!     }
//! }
//! ```

pub mod emitter;
pub mod error;
pub mod mask;
pub mod notification;
pub mod registry;

pub use emitter::{EventEmitter, ListenerId};
pub use error::{BridgeError, Result, UnknownChangeKind};
pub use mask::{ChangeKind, ChangeMask};
pub use notification::{ChangeEvent, RawNotification, WatchDescriptor};
pub use registry::WatchRegistry;
