//! Error types for the bridge.
//!
//! Only two things can go wrong when registering a watch: the kernel
//! refuses to hand out a notification session, or it refuses the path.
//! Everything that happens after that (removal, draining) is best-effort
//! and never surfaces as an error.

use std::io;
use thiserror::Error;

/// Convenience type for bridge operations that can fail.
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Things that can go wrong when adding a watch.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// The facility could not allocate a notification session, or the
    /// session could not be subscribed to the event loop. No channel is
    /// left open behind this error.
    #[error("failed to open notification channel: {source}")]
    ChannelInit {
        #[source]
        source: io::Error,
    },

    /// The facility rejected the path. Usually the path does not exist
    /// or the process lacks permission to read it.
    #[error("failed to watch '{path}': {source}")]
    WatchAdd {
        path: String,
        #[source]
        source: io::Error,
    },
}

impl BridgeError {
    /// Creates a channel initialization error.
    pub fn channel_init(source: io::Error) -> Self {
        Self::ChannelInit { source }
    }

    /// Creates a watch registration error with the offending path.
    pub fn watch_add(path: impl Into<String>, source: io::Error) -> Self {
        Self::WatchAdd {
            path: path.into(),
            source,
        }
    }

    /// The underlying OS error, whichever variant this is.
    pub fn io_error(&self) -> &io::Error {
        match self {
            Self::ChannelInit { source } | Self::WatchAdd { source, .. } => source,
        }
    }
}

/// A change category name that doesn't match any known kind.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown change kind '{0}'")]
pub struct UnknownChangeKind(pub String);
