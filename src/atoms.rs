//! Atom cache
//!
//! Resolves property names to atoms, skipping the round trip for the atoms the
//! core protocol predefines and for names already interned on this connection.

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::debug;
use x11rb::protocol::xproto::{Atom, AtomEnum};

use crate::display::DisplayServer;
use crate::error::Result;

pub const NET_ACTIVE_WINDOW: &str = "_NET_ACTIVE_WINDOW";

/// Match `name` against the atoms the core protocol predefines
macro_rules! predefined_atoms {
    ($name:expr; $($atom:ident),* $(,)?; $($alias:literal => $aliased:ident),* $(,)?) => {
        match $name {
            $(stringify!($atom) => Some(AtomEnum::$atom.into()),)*
            $($alias => Some(AtomEnum::$aliased.into()),)*
            _ => None,
        }
    };
}

/// Look up a predefined atom by name
pub fn predefined(name: &str) -> Option<Atom> {
    predefined_atoms!(name;
        PRIMARY, SECONDARY, ARC, ATOM,
        BITMAP, CARDINAL, COLORMAP, CURSOR,
        DRAWABLE, FONT, INTEGER, PIXMAP,
        POINT, RECTANGLE, RESOURCE_MANAGER, RGB_COLOR_MAP,
        RGB_BEST_MAP, RGB_BLUE_MAP, RGB_DEFAULT_MAP, RGB_GRAY_MAP,
        RGB_GREEN_MAP, RGB_RED_MAP, STRING, VISUALID,
        WINDOW, WM_COMMAND, WM_HINTS, WM_CLIENT_MACHINE,
        WM_ICON_NAME, WM_ICON_SIZE, WM_NAME, WM_NORMAL_HINTS,
        WM_SIZE_HINTS, WM_ZOOM_HINTS, MIN_SPACE, NORM_SPACE,
        MAX_SPACE, END_SPACE, SUPERSCRIPT_X, SUPERSCRIPT_Y,
        SUBSCRIPT_X, SUBSCRIPT_Y, UNDERLINE_POSITION, UNDERLINE_THICKNESS,
        STRIKEOUT_ASCENT, STRIKEOUT_DESCENT, ITALIC_ANGLE, X_HEIGHT,
        QUAD_WIDTH, WEIGHT, POINT_SIZE, RESOLUTION,
        COPYRIGHT, NOTICE, FONT_NAME, FAMILY_NAME,
        FULL_NAME, CAP_HEIGHT, WM_CLASS, WM_TRANSIENT_FOR;
        // x11rb spells these constants `CUT_BUFFE_Rn`
        "CUT_BUFFER0" => CUT_BUFFE_R0, "CUT_BUFFER1" => CUT_BUFFE_R1,
        "CUT_BUFFER2" => CUT_BUFFE_R2, "CUT_BUFFER3" => CUT_BUFFE_R3,
        "CUT_BUFFER4" => CUT_BUFFE_R4, "CUT_BUFFER5" => CUT_BUFFE_R5,
        "CUT_BUFFER6" => CUT_BUFFE_R6, "CUT_BUFFER7" => CUT_BUFFE_R7,
    )
}

/// Something that names an atom: either the atom itself or its name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtomName<'a> {
    Id(Atom),
    Name(&'a str),
}

impl From<Atom> for AtomName<'_> {
    fn from(atom: Atom) -> Self {
        Self::Id(atom)
    }
}

impl<'a> From<&'a str> for AtomName<'a> {
    fn from(name: &'a str) -> Self {
        Self::Name(name)
    }
}

/// Name-to-atom memo, valid for the lifetime of one connection
#[derive(Debug, Default)]
pub struct AtomCache {
    interned: RwLock<HashMap<Vec<u8>, Atom>>,
}

impl AtomCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve<'a, D>(&self, conn: &D, name: impl Into<AtomName<'a>>) -> Result<Atom>
    where
        D: DisplayServer + ?Sized,
    {
        let name = match name.into() {
            AtomName::Id(atom) => return Ok(atom),
            AtomName::Name(name) => name,
        };

        if let Some(atom) = predefined(name) {
            return Ok(atom);
        }

        let key = name.as_bytes();
        if let Some(atom) = self.interned.read().get(key) {
            return Ok(*atom);
        }

        // Interned outside the lock; a racing thread gets the same atom back
        let atom = conn.intern_atom(key)?;
        debug!("Interned atom {} = {}", name, atom);
        self.interned.write().insert(key.to_vec(), atom);

        Ok(atom)
    }

    pub fn len(&self) -> usize {
        self.interned.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
