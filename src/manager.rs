//! Game manager
//!
//! Owns the display connection, the atom cache, the instance registry, the
//! shared memory pool and the event worker thread. Discovery, property reads
//! and shm checkout happen synchronously on the caller's thread; focus and
//! input tracking happen on the worker.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};
use x11rb::protocol::xproto::Atom;

use crate::atoms::{AtomCache, AtomName, NET_ACTIVE_WINDOW};
use crate::config::Config;
use crate::display::x11::X11Display;
use crate::display::{DisplayServer, WindowId};
use crate::error::Result;
use crate::instance::GameInstance;
use crate::property::{PropertyQuery, PropertyValue, read_property};
use crate::registry::Registry;
use crate::shm::{ShmAllocator, ShmPool, ShmSegment, SysvAllocator};
use crate::worker::{EventWorker, WorkerHandle};

/// State shared between the manager and its event worker
pub struct Session<D: DisplayServer> {
    pub(crate) conn: Arc<D>,
    pub(crate) atoms: AtomCache,
    pub(crate) registry: Registry,
    max_property_length: u32,
}

impl<D: DisplayServer> Session<D> {
    pub(crate) fn new(conn: Arc<D>, max_property_length: u32) -> Self {
        Self {
            conn,
            atoms: AtomCache::new(),
            registry: Registry::new(),
            max_property_length,
        }
    }

    pub(crate) fn atom<'a>(&self, name: impl Into<AtomName<'a>>) -> Result<Atom> {
        self.atoms.resolve(self.conn.as_ref(), name)
    }

    pub(crate) fn property<'a>(
        &self,
        window: WindowId,
        name: impl Into<AtomName<'a>>,
        query: PropertyQuery,
    ) -> Result<Option<PropertyValue>> {
        read_property(self.conn.as_ref(), &self.atoms, window, name, query)
    }

    /// `_NET_ACTIVE_WINDOW` of the root window, `NONE` when unset
    pub(crate) fn active_window(&self) -> Result<WindowId> {
        let value = self.property(
            self.conn.root(),
            NET_ACTIVE_WINDOW,
            PropertyQuery::any(self.max_property_length),
        )?;
        Ok(value
            .and_then(|v| v.as_cardinal())
            .unwrap_or(x11rb::NONE))
    }
}

pub struct GameManager<D: DisplayServer = X11Display, A: ShmAllocator = SysvAllocator> {
    session: Arc<Session<D>>,
    window_class: String,
    shm: Mutex<ShmPool<A>>,
    worker: WorkerHandle,
}

impl GameManager {
    /// Connect to the configured X display and start tracking
    pub fn connect(config: &Config) -> Result<Self> {
        let display = X11Display::connect(config.display.as_deref())?;
        Self::with_display(Arc::new(display), SysvAllocator, config)
    }
}

impl<D: DisplayServer, A: ShmAllocator> GameManager<D, A> {
    /// Build a manager over an existing connection; spawns the event worker
    pub fn with_display(conn: Arc<D>, allocator: A, config: &Config) -> Result<Self> {
        let session = Arc::new(Session::new(conn, config.property.max_length));
        let worker = EventWorker::new(session.clone(), config.events.poll_interval())?.spawn()?;

        info!("Tracking windows of class {:?}", config.game.window_class);

        Ok(Self {
            session,
            window_class: config.game.window_class.clone(),
            shm: Mutex::new(ShmPool::new(allocator, config.shm.max_idle_segments)),
            worker,
        })
    }

    /// Rescan the window tree and return every instance seen so far
    pub fn instances(&self) -> Result<Vec<Arc<GameInstance>>> {
        self.session.registry.discover(
            self.session.conn.as_ref(),
            &self.session.atoms,
            &self.window_class,
            self.session.max_property_length,
        )
    }

    /// Handle for `window`, if discovery has registered it
    pub fn instance(&self, window: WindowId) -> Option<Arc<GameInstance>> {
        self.session.registry.get(window)
    }

    /// Currently focused window according to the window manager
    pub fn active_window(&self) -> Result<WindowId> {
        self.session.active_window()
    }

    pub fn property<'a>(
        &self,
        window: WindowId,
        name: impl Into<AtomName<'a>>,
        query: PropertyQuery,
    ) -> Result<Option<PropertyValue>> {
        self.session.property(window, name, query)
    }

    pub fn set_property<'a, 'b>(
        &self,
        window: WindowId,
        name: impl Into<AtomName<'a>>,
        type_: impl Into<AtomName<'b>>,
        format: u8,
        data: &[u8],
    ) -> Result<()> {
        let property = self.session.atom(name)?;
        let type_ = self.session.atom(type_)?;
        self.session
            .conn
            .set_property(window, property, type_, format, data)
    }

    pub fn atom<'a>(&self, name: impl Into<AtomName<'a>>) -> Result<Atom> {
        self.session.atom(name)
    }

    /// Check out a segment of at least `min_size` bytes
    pub fn acquire_shm(&self, min_size: usize) -> Result<ShmSegment<A::Memory>> {
        self.shm.lock().acquire(self.session.conn.as_ref(), min_size)
    }

    /// Hand a segment back for reuse
    pub fn release_shm(&self, segment: ShmSegment<A::Memory>) -> Result<()> {
        self.shm.lock().release(self.session.conn.as_ref(), segment)
    }

    pub fn idle_shm_segments(&self) -> usize {
        self.shm.lock().idle_len()
    }

    /// False once the event worker has exited, e.g. after the connection
    /// dropped; [`GameManager::stop`] then returns the error that ended it
    pub fn is_running(&self) -> bool {
        !self.worker.is_finished()
    }

    /// Stop the event worker, wait for it, then free idle shm segments
    pub fn stop(&mut self) -> Result<()> {
        let stopped = self.worker.stop();
        let drained = self.shm.lock().drain(self.session.conn.as_ref());
        stopped.and(drained)
    }
}

impl<D: DisplayServer, A: ShmAllocator> Drop for GameManager<D, A> {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("Error while stopping game manager: {}", e);
        }
    }
}
