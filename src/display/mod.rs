//! Display Module
//!
//! The seam between runewatch and the X server. Everything the manager and
//! the event worker need from the connection goes through [`DisplayServer`],
//! which the x11rb-backed [`x11::X11Display`] implements.

pub mod x11;

#[cfg(test)]
pub(crate) mod testing;

use x11rb::protocol::xproto::{Atom, EventMask, Window};

use crate::error::Result;

/// Server-assigned window handle
pub type WindowId = Window;

/// Raw `GetProperty` answer, before any decoding
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyReply {
    /// Declared type of the property, `NONE` if the property does not exist
    pub type_: Atom,
    pub format: u8,
    pub value: Vec<u8>,
}

impl PropertyReply {
    pub fn is_absent(&self) -> bool {
        self.type_ == x11rb::NONE
    }
}

/// Key or button press, as delivered to the window that selected it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputEvent {
    /// Window the event was reported on
    pub window: WindowId,
    pub root: WindowId,
    pub child: WindowId,
    /// Keycode for key presses, button number for button presses
    pub detail: u8,
    pub time: u32,
    pub root_x: i16,
    pub root_y: i16,
    pub event_x: i16,
    pub event_y: i16,
    /// Modifier and button mask
    pub state: u16,
    pub same_screen: bool,
}

/// Window moved, resized or restacked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigureEvent {
    pub window: WindowId,
    /// Window the event was reported on (the parent for substructure notify)
    pub event: WindowId,
    pub above_sibling: WindowId,
    pub x: i16,
    pub y: i16,
    pub width: u16,
    pub height: u16,
    pub border_width: u16,
    pub override_redirect: bool,
}

/// Protocol events the worker cares about.
///
/// Anything else the server sends is folded into [`WindowEvent::Other`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowEvent {
    PropertyNotify { window: WindowId, atom: Atom },
    ConfigureNotify(ConfigureEvent),
    KeyPress(InputEvent),
    ButtonPress(InputEvent),
    Other,
}

/// Operations runewatch needs from a display server connection.
///
/// Implementations must be safe to call from the owning thread and the event
/// worker at the same time; x11rb serializes requests internally.
pub trait DisplayServer: Send + Sync + 'static {
    /// Root window of the screen being watched
    fn root(&self) -> WindowId;

    /// Direct children of `window`, bottom-to-top stacking order
    fn query_children(&self, window: WindowId) -> Result<Vec<WindowId>>;

    fn get_property(
        &self,
        window: WindowId,
        property: Atom,
        type_: Atom,
        long_offset: u32,
        long_length: u32,
    ) -> Result<PropertyReply>;

    /// Replace a property; `data` is already laid out in `format`-bit units
    fn set_property(
        &self,
        window: WindowId,
        property: Atom,
        type_: Atom,
        format: u8,
        data: &[u8],
    ) -> Result<()>;

    fn intern_atom(&self, name: &[u8]) -> Result<Atom>;

    /// Replace the event mask this client selects on `window`
    fn select_events(&self, window: WindowId, mask: EventMask) -> Result<()>;

    /// Fresh client-side resource id
    fn generate_id(&self) -> Result<u32>;

    fn shm_attach(&self, shmseg: u32, shmid: u32) -> Result<()>;

    fn shm_detach(&self, shmseg: u32) -> Result<()>;

    /// Next queued event, without blocking
    fn poll_event(&self) -> Result<Option<WindowEvent>>;
}
