//! Error type shared by the library modules.

use std::io;
use thiserror::Error;
use x11rb::errors::{ConnectError, ConnectionError, ReplyError, ReplyOrIdError};

/// Errors surfaced to the owner of a [`crate::GameManager`].
///
/// Lookup misses and handler faults inside the event worker never show up
/// here; they are logged and swallowed.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to connect to X server: {0}")]
    Connect(#[from] ConnectError),

    #[error("X11 connection failed: {0}")]
    Connection(#[from] ConnectionError),

    #[error("X11 request failed: {0}")]
    Reply(#[from] ReplyError),

    #[error("X11 resource id allocation failed: {0}")]
    ReplyOrId(#[from] ReplyOrIdError),

    /// The server answered `BadWindow`: the window was destroyed under us
    #[error("window {0:#x} no longer exists")]
    WindowGone(u32),

    #[error("X server does not support the {0} extension")]
    MissingExtension(&'static str),

    #[error("shared memory segment of {size} bytes: {source}")]
    SharedMemory {
        size: usize,
        #[source]
        source: io::Error,
    },

    #[error("failed to spawn event worker: {0}")]
    Spawn(#[source] io::Error),

    /// Used by test doubles and callers that wrap their own failures.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// A window vanished between being listed and being queried
    pub fn is_window_gone(&self) -> bool {
        matches!(self, Self::WindowGone(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
