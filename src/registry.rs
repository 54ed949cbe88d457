//! Instance registry and window discovery
//!
//! Maps window ids to their [`GameInstance`] handles. Entries are created by
//! discovery and never removed, even after the window goes away.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};
use x11rb::protocol::xproto::{AtomEnum, EventMask};

use crate::atoms::AtomCache;
use crate::display::{DisplayServer, WindowId};
use crate::error::Result;
use crate::instance::{GameInstance, InstanceEvent};
use crate::property::{PropertyQuery, WindowClass, read_property};

/// Events selected on every registered game window
pub fn instance_events() -> EventMask {
    EventMask::STRUCTURE_NOTIFY | EventMask::KEY_PRESS
}

#[derive(Debug, Default)]
pub struct Registry {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    instances: BTreeMap<WindowId, Arc<GameInstance>>,
    /// Last active window handed to [`Registry::apply_focus`]
    active: WindowId,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, window: WindowId) -> Option<Arc<GameInstance>> {
        self.inner.read().instances.get(&window).cloned()
    }

    /// Register `window` unless it already has a handle; returns true if new.
    /// A new handle starts focused iff it is the last known active window.
    pub fn insert_if_absent(&self, window: WindowId) -> bool {
        let mut inner = self.inner.write();
        if inner.instances.contains_key(&window) {
            return false;
        }
        let focused = window == inner.active;
        inner
            .instances
            .insert(window, Arc::new(GameInstance::new(window, focused)));
        true
    }

    /// All handles, ordered by window id
    pub fn snapshot(&self) -> Vec<Arc<GameInstance>> {
        self.inner.read().instances.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn active(&self) -> WindowId {
        self.inner.read().active
    }

    /// Record `active` and bring every focus flag in line with it; returns
    /// how many changed
    pub fn apply_focus(&self, active: WindowId) -> usize {
        let mut inner = self.inner.write();
        inner.active = active;
        inner
            .instances
            .iter()
            .filter(|(window, instance)| instance.update_focus(**window == active))
            .count()
    }

    /// Forward an event to the handle for `window`; false if it is not tracked
    pub fn forward(&self, window: WindowId, event: InstanceEvent) -> bool {
        match self.get(window) {
            Some(instance) => {
                instance.notify(event);
                true
            }
            None => false,
        }
    }

    /// Walk the whole window tree and register every window whose WM_CLASS
    /// class half equals `class`
    pub fn discover<D>(
        &self,
        conn: &D,
        atoms: &AtomCache,
        class: &str,
        max_length: u32,
    ) -> Result<Vec<Arc<GameInstance>>>
    where
        D: DisplayServer + ?Sized,
    {
        // Explicit stack, children pushed in reverse to keep depth-first order
        let mut stack = vec![conn.root()];

        while let Some(window) = stack.pop() {
            match window_class(conn, atoms, window, max_length) {
                Ok(Some(found)) if found.class == class => {
                    if self.insert_if_absent(window) {
                        info!("Found {} window {:#x} ({})", class, window, found.instance);
                        if let Err(e) = conn.select_events(window, instance_events()) {
                            warn!("Failed to select events on {:#x}: {}", window, e);
                        }
                    }
                }
                Ok(_) => {}
                Err(e) if e.is_window_gone() => {
                    debug!("Window {:#x} vanished during discovery", window);
                    continue;
                }
                Err(e) => return Err(e),
            }

            let children = match conn.query_children(window) {
                Ok(children) => children,
                Err(e) if e.is_window_gone() => {
                    debug!("Window {:#x} vanished during discovery", window);
                    continue;
                }
                Err(e) => return Err(e),
            };
            stack.extend(children.into_iter().rev());
        }

        Ok(self.snapshot())
    }
}

fn window_class<D>(
    conn: &D,
    atoms: &AtomCache,
    window: WindowId,
    max_length: u32,
) -> Result<Option<WindowClass>>
where
    D: DisplayServer + ?Sized,
{
    let value = read_property(
        conn,
        atoms,
        window,
        u32::from(AtomEnum::WM_CLASS),
        PropertyQuery::any(max_length),
    )?;

    Ok(value.as_ref().and_then(|v| v.as_text()).and_then(WindowClass::parse))
}
