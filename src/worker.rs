//! Event worker
//!
//! Runs on its own thread for the lifetime of the manager: subscribes the
//! root window to property changes, then polls the connection and dispatches
//! each event to the focus, configure or input handler. Handler errors are
//! logged and never end the loop; only a failing connection does.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, error, info};
use x11rb::protocol::xproto::{Atom, EventMask};

use crate::atoms::NET_ACTIVE_WINDOW;
use crate::display::{ConfigureEvent, DisplayServer, InputEvent, WindowEvent, WindowId};
use crate::error::{Error, Result};
use crate::instance::InstanceEvent;
use crate::manager::Session;

pub struct EventWorker<D: DisplayServer> {
    session: Arc<Session<D>>,
    poll_interval: Duration,
}

impl<D: DisplayServer> EventWorker<D> {
    /// Records the current active window in the registry so handles
    /// created before the first change start with the right focus flag
    pub fn new(session: Arc<Session<D>>, poll_interval: Duration) -> Result<Self> {
        let active_window = session.active_window()?;
        session.registry.apply_focus(active_window);
        Ok(Self {
            session,
            poll_interval,
        })
    }

    /// Start the poll loop on a dedicated thread
    pub fn spawn(self) -> Result<WorkerHandle> {
        // The loop runs until the receiving half is dropped
        let (guard, cancel) = oneshot::channel::<()>();
        let thread = thread::Builder::new()
            .name("runewatch-events".into())
            .spawn(move || self.run(guard))
            .map_err(Error::Spawn)?;

        Ok(WorkerHandle {
            cancel: Some(cancel),
            thread: Some(thread),
        })
    }

    fn run(mut self, guard: oneshot::Sender<()>) -> Result<()> {
        let conn = self.session.conn.clone();
        conn.select_events(conn.root(), EventMask::PROPERTY_CHANGE)?;
        info!("Event worker started on root window {:#x}", conn.root());

        loop {
            if guard.is_closed() {
                info!("Event worker shutting down");
                return Ok(());
            }

            let event = match conn.poll_event() {
                Ok(event) => event,
                Err(e) => {
                    error!("X11 connection failed, stopping event worker: {}", e);
                    return Err(e);
                }
            };

            match event {
                Some(event) => self.dispatch(&event),
                None => thread::sleep(self.poll_interval),
            }
        }
    }

    /// Run exactly one handler for `event`, logging any failure
    pub(crate) fn dispatch(&mut self, event: &WindowEvent) {
        if let Err(e) = self.handle(event) {
            error!("Error handling event {:?}: {}", event, e);
        }
    }

    fn handle(&mut self, event: &WindowEvent) -> Result<()> {
        match event {
            WindowEvent::PropertyNotify { atom, .. } => self.on_property_change(*atom),
            WindowEvent::ConfigureNotify(e) => {
                self.on_configure(e);
                Ok(())
            }
            WindowEvent::KeyPress(e) | WindowEvent::ButtonPress(e) => {
                self.on_input(e);
                Ok(())
            }
            WindowEvent::Other => Ok(()),
        }
    }

    fn on_property_change(&mut self, atom: Atom) -> Result<()> {
        if atom != self.session.atom(NET_ACTIVE_WINDOW)? {
            return Ok(());
        }

        let active_window = self.session.active_window()?;
        let previous = self.session.registry.active();
        if active_window == previous {
            return Ok(());
        }

        debug!("Active window changed {:#x} -> {:#x}", previous, active_window);
        self.session.registry.apply_focus(active_window);

        Ok(())
    }

    fn on_input(&self, event: &InputEvent) {
        if !self
            .session
            .registry
            .forward(event.window, InstanceEvent::Input(*event))
        {
            debug!("Got input event for {} but is not registered", event.window);
        }
    }

    fn on_configure(&self, event: &ConfigureEvent) {
        if !self
            .session
            .registry
            .forward(event.window, InstanceEvent::Configure(*event))
        {
            debug!("Got configure event for {} but is not registered", event.window);
        }
    }
}

/// Owner side of a running [`EventWorker`]
#[derive(Debug)]
pub struct WorkerHandle {
    cancel: Option<oneshot::Receiver<()>>,
    thread: Option<JoinHandle<Result<()>>>,
}

impl WorkerHandle {
    /// Request cancellation and wait for the thread to exit.
    ///
    /// Returns the connection error that ended the loop, if any. Calling it
    /// again after the worker has stopped is a no-op.
    pub fn stop(&mut self) -> Result<()> {
        drop(self.cancel.take());

        let Some(thread) = self.thread.take() else {
            return Ok(());
        };
        thread
            .join()
            .unwrap_or_else(|_| Err(Error::Other("event worker panicked".into())))
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(|t| t.is_finished())
    }
}
