//! Scripted in-memory display used by the unit tests

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use x11rb::protocol::xproto::{Atom, AtomEnum, EventMask};

use super::{DisplayServer, PropertyReply, WindowEvent, WindowId};
use crate::error::{Error, Result};

pub(crate) const ROOT: WindowId = 1;

/// First atom handed out by the fake intern; above every predefined atom
const FIRST_DYNAMIC_ATOM: Atom = 300;

#[derive(Default)]
struct FakeState {
    children: HashMap<WindowId, Vec<WindowId>>,
    properties: HashMap<(WindowId, Atom), PropertyReply>,
    atoms: HashMap<Vec<u8>, Atom>,
    next_atom: Atom,
    next_id: u32,
    events: VecDeque<WindowEvent>,
    gone: HashSet<WindowId>,
    attached: Vec<(u32, u32)>,
    detached: Vec<u32>,
    selected: Vec<(WindowId, u32)>,
    poll_fails: bool,
}

#[derive(Default)]
pub(crate) struct FakeDisplay {
    state: Mutex<FakeState>,
    intern_calls: AtomicUsize,
    property_calls: AtomicUsize,
    poll_calls: AtomicUsize,
}

impl FakeDisplay {
    pub(crate) fn new() -> Self {
        let this = Self::default();
        {
            let mut state = this.state.lock();
            state.next_atom = FIRST_DYNAMIC_ATOM;
            state.next_id = 0x0040_0000;
            state.children.insert(ROOT, Vec::new());
        }
        this
    }

    pub(crate) fn add_window(&self, parent: WindowId, window: WindowId) {
        let mut state = self.state.lock();
        state.children.entry(parent).or_default().push(window);
        state.children.entry(window).or_default();
    }

    /// Set WM_CLASS the way Xlib does: `instance\0class\0`
    pub(crate) fn set_class(&self, window: WindowId, instance: &str, class: &str) {
        let value = format!("{instance}\0{class}\0").into_bytes();
        self.put_property(
            window,
            AtomEnum::WM_CLASS.into(),
            PropertyReply {
                type_: AtomEnum::STRING.into(),
                format: 8,
                value,
            },
        );
    }

    pub(crate) fn set_active_window(&self, window: WindowId) {
        let atom = self.atom_uncounted(b"_NET_ACTIVE_WINDOW");
        self.put_property(
            ROOT,
            atom,
            PropertyReply {
                type_: AtomEnum::WINDOW.into(),
                format: 32,
                value: window.to_ne_bytes().to_vec(),
            },
        );
    }

    pub(crate) fn put_property(&self, window: WindowId, atom: Atom, reply: PropertyReply) {
        self.state.lock().properties.insert((window, atom), reply);
    }

    /// Requests against `window` fail with `BadWindow` from now on
    pub(crate) fn destroy_window(&self, window: WindowId) {
        self.state.lock().gone.insert(window);
    }

    pub(crate) fn push_event(&self, event: WindowEvent) {
        self.state.lock().events.push_back(event);
    }

    pub(crate) fn fail_polls(&self) {
        self.state.lock().poll_fails = true;
    }

    pub(crate) fn atom_uncounted(&self, name: &[u8]) -> Atom {
        let mut state = self.state.lock();
        if let Some(atom) = state.atoms.get(name) {
            return *atom;
        }
        let atom = state.next_atom;
        state.next_atom += 1;
        state.atoms.insert(name.to_vec(), atom);
        atom
    }

    pub(crate) fn intern_calls(&self) -> usize {
        self.intern_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn property_calls(&self) -> usize {
        self.property_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn poll_calls(&self) -> usize {
        self.poll_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn pending_events(&self) -> usize {
        self.state.lock().events.len()
    }

    pub(crate) fn attached(&self) -> Vec<(u32, u32)> {
        self.state.lock().attached.clone()
    }

    pub(crate) fn detached(&self) -> Vec<u32> {
        self.state.lock().detached.clone()
    }

    pub(crate) fn selected(&self) -> Vec<(WindowId, u32)> {
        self.state.lock().selected.clone()
    }

    fn check_alive(state: &FakeState, window: WindowId) -> Result<()> {
        if state.gone.contains(&window) {
            return Err(Error::WindowGone(window));
        }
        Ok(())
    }
}

impl DisplayServer for FakeDisplay {
    fn root(&self) -> WindowId {
        ROOT
    }

    fn query_children(&self, window: WindowId) -> Result<Vec<WindowId>> {
        let state = self.state.lock();
        Self::check_alive(&state, window)?;
        Ok(state.children.get(&window).cloned().unwrap_or_default())
    }

    fn get_property(
        &self,
        window: WindowId,
        property: Atom,
        _type: Atom,
        _long_offset: u32,
        _long_length: u32,
    ) -> Result<PropertyReply> {
        self.property_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock();
        Self::check_alive(&state, window)?;
        Ok(state
            .properties
            .get(&(window, property))
            .cloned()
            .unwrap_or_default())
    }

    fn set_property(
        &self,
        window: WindowId,
        property: Atom,
        type_: Atom,
        format: u8,
        data: &[u8],
    ) -> Result<()> {
        let mut state = self.state.lock();
        Self::check_alive(&state, window)?;
        state.properties.insert(
            (window, property),
            PropertyReply {
                type_,
                format,
                value: data.to_vec(),
            },
        );
        Ok(())
    }

    fn intern_atom(&self, name: &[u8]) -> Result<Atom> {
        self.intern_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.atom_uncounted(name))
    }

    fn select_events(&self, window: WindowId, mask: EventMask) -> Result<()> {
        self.state.lock().selected.push((window, u32::from(mask)));
        Ok(())
    }

    fn generate_id(&self) -> Result<u32> {
        let mut state = self.state.lock();
        state.next_id += 1;
        Ok(state.next_id)
    }

    fn shm_attach(&self, shmseg: u32, shmid: u32) -> Result<()> {
        self.state.lock().attached.push((shmseg, shmid));
        Ok(())
    }

    fn shm_detach(&self, shmseg: u32) -> Result<()> {
        self.state.lock().detached.push(shmseg);
        Ok(())
    }

    fn poll_event(&self) -> Result<Option<WindowEvent>> {
        self.poll_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock();
        if state.poll_fails {
            return Err(Error::Other("connection lost".into()));
        }
        Ok(state.events.pop_front())
    }
}
