//! runewatch
//!
//! Tracks the top-level windows of one game client on an X11 display: which
//! windows exist, which one has focus, and the input and geometry events they
//! receive. Also pools MIT-SHM segments for pixel transfers from the server.

pub mod atoms;
pub mod config;
pub mod display;
pub mod error;
pub mod instance;
pub mod manager;
pub mod property;
pub mod registry;
pub mod shm;
pub mod worker;

pub use config::Config;
pub use display::{ConfigureEvent, DisplayServer, InputEvent, WindowEvent, WindowId};
pub use error::{Error, Result};
pub use instance::{GameInstance, InstanceEvent};
pub use manager::GameManager;
pub use property::{PropertyQuery, PropertyValue, WindowClass};
pub use shm::{ShmPool, ShmSegment, SysvAllocator, SysvSegment};
