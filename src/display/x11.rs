//! x11rb-backed display connection

use tracing::{debug, info};
use x11rb::connection::{Connection, RequestConnection};
use x11rb::errors::ReplyError;
use x11rb::protocol::composite::{self, ConnectionExt as CompositeExt};
use x11rb::protocol::shm::{self, ConnectionExt as ShmExt};
use x11rb::protocol::xproto::{
    Atom, ButtonPressEvent, ChangeWindowAttributesAux, ConfigureNotifyEvent,
    ConnectionExt as XprotoExt, EventMask, KeyPressEvent, PropMode,
};
use x11rb::protocol::{ErrorKind, Event};
use x11rb::rust_connection::RustConnection;

use super::{
    ConfigureEvent, DisplayServer, InputEvent, PropertyReply, WindowEvent, WindowId,
};
use crate::error::{Error, Result};

/// Composite version requested at startup
const COMPOSITE_VERSION: (u32, u32) = (0, 4);

/// One connection to one X server screen
pub struct X11Display {
    conn: RustConnection,
    root: WindowId,
}

impl X11Display {
    /// Connect to `display` (or `$DISPLAY`) and check the extensions we rely on
    pub fn connect(display: Option<&str>) -> Result<Self> {
        let (conn, screen_num) = x11rb::connect(display)?;
        let root = conn.setup().roots[screen_num].root;
        info!("Connected to X server, screen {}, root window {}", screen_num, root);

        let this = Self { conn, root };
        this.setup_composite()?;
        this.setup_shm()?;

        Ok(this)
    }

    fn setup_composite(&self) -> Result<()> {
        if self.conn.extension_information(composite::X11_EXTENSION_NAME)?.is_none() {
            return Err(Error::MissingExtension(composite::X11_EXTENSION_NAME));
        }

        let (major, minor) = COMPOSITE_VERSION;
        let reply = self.conn.composite_query_version(major, minor)?.reply()?;
        debug!(
            "Composite extension {}.{} available",
            reply.major_version, reply.minor_version
        );
        Ok(())
    }

    fn setup_shm(&self) -> Result<()> {
        if self.conn.extension_information(shm::X11_EXTENSION_NAME)?.is_none() {
            return Err(Error::MissingExtension(shm::X11_EXTENSION_NAME));
        }

        let reply = self.conn.shm_query_version()?.reply()?;
        debug!(
            "MIT-SHM extension {}.{} available",
            reply.major_version, reply.minor_version
        );
        Ok(())
    }
}

/// Map `BadWindow` to [`Error::WindowGone`], everything else passes through
fn window_request<T>(window: WindowId, result: std::result::Result<T, ReplyError>) -> Result<T> {
    match result {
        Err(ReplyError::X11Error(e)) if matches!(e.error_kind, ErrorKind::Window) => {
            Err(Error::WindowGone(window))
        }
        other => Ok(other?),
    }
}

impl DisplayServer for X11Display {
    fn root(&self) -> WindowId {
        self.root
    }

    fn query_children(&self, window: WindowId) -> Result<Vec<WindowId>> {
        let reply = window_request(window, self.conn.query_tree(window)?.reply())?;
        Ok(reply.children)
    }

    fn get_property(
        &self,
        window: WindowId,
        property: Atom,
        type_: Atom,
        long_offset: u32,
        long_length: u32,
    ) -> Result<PropertyReply> {
        let cookie = self
            .conn
            .get_property(false, window, property, type_, long_offset, long_length)?;
        let reply = window_request(window, cookie.reply())?;

        Ok(PropertyReply {
            type_: reply.type_,
            format: reply.format,
            value: reply.value,
        })
    }

    fn set_property(
        &self,
        window: WindowId,
        property: Atom,
        type_: Atom,
        format: u8,
        data: &[u8],
    ) -> Result<()> {
        let unit = usize::from(format / 8).max(1);
        let data_len = u32::try_from(data.len() / unit).map_err(|_| {
            Error::Other(format!("property data of {} bytes is too large", data.len()))
        })?;

        let cookie = self.conn.change_property(
            PropMode::REPLACE,
            window,
            property,
            type_,
            format,
            data_len,
            data,
        )?;
        window_request(window, cookie.check())
    }

    fn intern_atom(&self, name: &[u8]) -> Result<Atom> {
        Ok(self.conn.intern_atom(false, name)?.reply()?.atom)
    }

    fn select_events(&self, window: WindowId, mask: EventMask) -> Result<()> {
        let cookie = self
            .conn
            .change_window_attributes(window, &ChangeWindowAttributesAux::new().event_mask(mask))?;
        window_request(window, cookie.check())
    }

    fn generate_id(&self) -> Result<u32> {
        Ok(self.conn.generate_id()?)
    }

    fn shm_attach(&self, shmseg: u32, shmid: u32) -> Result<()> {
        self.conn.shm_attach(shmseg, shmid, false)?.check()?;
        Ok(())
    }

    fn shm_detach(&self, shmseg: u32) -> Result<()> {
        self.conn.shm_detach(shmseg)?;
        self.conn.flush()?;
        Ok(())
    }

    fn poll_event(&self) -> Result<Option<WindowEvent>> {
        Ok(self.conn.poll_for_event()?.map(translate_event))
    }
}

fn translate_event(event: Event) -> WindowEvent {
    match event {
        Event::PropertyNotify(e) => WindowEvent::PropertyNotify {
            window: e.window,
            atom: e.atom,
        },
        Event::ConfigureNotify(e) => WindowEvent::ConfigureNotify(configure_event(&e)),
        Event::KeyPress(e) => WindowEvent::KeyPress(key_event(&e)),
        Event::ButtonPress(e) => WindowEvent::ButtonPress(button_event(&e)),
        _ => WindowEvent::Other,
    }
}

fn configure_event(e: &ConfigureNotifyEvent) -> ConfigureEvent {
    ConfigureEvent {
        window: e.window,
        event: e.event,
        above_sibling: e.above_sibling,
        x: e.x,
        y: e.y,
        width: e.width,
        height: e.height,
        border_width: e.border_width,
        override_redirect: e.override_redirect,
    }
}

fn key_event(e: &KeyPressEvent) -> InputEvent {
    InputEvent {
        window: e.event,
        root: e.root,
        child: e.child,
        detail: e.detail,
        time: e.time,
        root_x: e.root_x,
        root_y: e.root_y,
        event_x: e.event_x,
        event_y: e.event_y,
        state: u16::from(e.state),
        same_screen: e.same_screen,
    }
}

fn button_event(e: &ButtonPressEvent) -> InputEvent {
    InputEvent {
        window: e.event,
        root: e.root,
        child: e.child,
        detail: e.detail,
        time: e.time,
        root_x: e.root_x,
        root_y: e.root_y,
        event_x: e.event_x,
        event_y: e.event_y,
        state: u16::from(e.state),
        same_screen: e.same_screen,
    }
}
