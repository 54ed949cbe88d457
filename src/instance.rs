//! Game instance handles
//!
//! One [`GameInstance`] exists per tracked top-level game window. The event
//! worker is the only writer of its focus flag and the only sender on its
//! notification channel.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::debug;

use crate::display::{ConfigureEvent, InputEvent, WindowId};

/// Notifications delivered to a handle's subscriber, in dispatch order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceEvent {
    FocusChanged(bool),
    Input(InputEvent),
    Configure(ConfigureEvent),
}

#[derive(Debug)]
pub struct GameInstance {
    window: WindowId,
    focused: AtomicBool,
    subscriber: Mutex<Option<UnboundedSender<InstanceEvent>>>,
}

impl GameInstance {
    pub(crate) fn new(window: WindowId, focused: bool) -> Self {
        Self {
            window,
            focused: AtomicBool::new(focused),
            subscriber: Mutex::new(None),
        }
    }

    pub fn window(&self) -> WindowId {
        self.window
    }

    pub fn is_focused(&self) -> bool {
        self.focused.load(Ordering::Acquire)
    }

    /// Start receiving notifications for this window.
    ///
    /// Replaces any earlier subscriber. Notifications sent while nobody is
    /// subscribed are dropped.
    pub fn subscribe(&self) -> UnboundedReceiver<InstanceEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.subscriber.lock() = Some(tx);
        rx
    }

    /// Store the new focus state; notifies only on an actual transition
    pub(crate) fn update_focus(&self, focused: bool) -> bool {
        if self.focused.swap(focused, Ordering::AcqRel) == focused {
            return false;
        }
        self.notify(InstanceEvent::FocusChanged(focused));
        true
    }

    pub(crate) fn notify(&self, event: InstanceEvent) {
        let mut subscriber = self.subscriber.lock();
        let Some(tx) = subscriber.as_ref() else {
            return;
        };
        if tx.send(event).is_err() {
            debug!("Subscriber for window {:#x} went away", self.window);
            *subscriber = None;
        }
    }
}
