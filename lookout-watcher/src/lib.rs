//! Lookout Watcher - kernel change notifications for event loops
//!
//! This crate owns the moving parts:
//! - The [`EventBridge`], which opens a notification session on the
//!   first watch and closes it when the last one goes away
//! - The facility traits it talks to the kernel through, and an inotify
//!   implementation of them
//! - Scheduler traits for the host loop, with tokio adapters for
//!   interval polling and readiness
//!
//! Everything here is single-threaded. Bridges are `!Send` and the tokio
//! adapters expect to run inside a `LocalSet`.

mod bridge;
mod config;
mod facility;
#[cfg(target_os = "linux")]
mod linux;
mod runtime;
mod scheduler;
#[cfg(test)]
mod testing;

pub use bridge::{EventBridge, WeakBridge};
pub use config::{BridgeConfig, ConfigError, TriggerStyle, DEFAULT_INTERVAL};
pub use facility::{NotificationChannel, NotificationFacility};
#[cfg(target_os = "linux")]
pub use linux::{InotifyBridge, InotifyChannel, InotifyFacility};
pub use runtime::{TokioInterval, TokioReadiness};
pub use scheduler::{
    Backlog, Callback, PeriodicScheduler, ReadinessScheduler, Scheduler, TimerHandle,
};
