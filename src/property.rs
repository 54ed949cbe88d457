//! Window property reads
//!
//! `STRING` properties come back as text without their trailing NUL,
//! single-value `WINDOW`/`CARDINAL` properties as a `u32`, anything else raw.

use x11rb::protocol::xproto::{Atom, AtomEnum};

use crate::atoms::{AtomCache, AtomName};
use crate::display::{DisplayServer, PropertyReply, WindowId};
use crate::error::Result;

/// Property type filter that matches every type
pub const ANY_PROPERTY_TYPE: Atom = 0;

/// Decoded property contents
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    Text(String),
    Cardinal(u32),
    Raw(Vec<u8>),
}

impl PropertyValue {
    /// Decode a reply; `None` when the property is not set on the window
    pub fn decode(reply: PropertyReply) -> Option<Self> {
        if reply.is_absent() {
            return None;
        }

        let string = u32::from(AtomEnum::STRING);
        let window = u32::from(AtomEnum::WINDOW);
        let cardinal = u32::from(AtomEnum::CARDINAL);

        let value = if reply.type_ == string {
            let mut bytes = reply.value;
            if bytes.last() == Some(&0) {
                bytes.pop();
            }
            Self::Text(String::from_utf8_lossy(&bytes).into_owned())
        } else if (reply.type_ == window || reply.type_ == cardinal) && reply.value.len() == 4 {
            let word = [reply.value[0], reply.value[1], reply.value[2], reply.value[3]];
            Self::Cardinal(u32::from_ne_bytes(word))
        } else {
            Self::Raw(reply.value)
        };

        Some(value)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_cardinal(&self) -> Option<u32> {
        match self {
            Self::Cardinal(value) => Some(*value),
            _ => None,
        }
    }
}

/// Arguments of one `GetProperty` request
#[derive(Debug, Clone, Copy)]
pub struct PropertyQuery {
    pub type_: Atom,
    /// Offset into the property, in 32-bit units
    pub long_offset: u32,
    /// Maximum length to fetch, in 32-bit units
    pub long_length: u32,
}

impl PropertyQuery {
    pub fn any(long_length: u32) -> Self {
        Self {
            type_: ANY_PROPERTY_TYPE,
            long_offset: 0,
            long_length,
        }
    }
}

/// Fetch and decode a property, resolving its name through `atoms`
pub fn read_property<'a, D>(
    conn: &D,
    atoms: &AtomCache,
    window: WindowId,
    name: impl Into<AtomName<'a>>,
    query: PropertyQuery,
) -> Result<Option<PropertyValue>>
where
    D: DisplayServer + ?Sized,
{
    let property = atoms.resolve(conn, name)?;
    let reply = conn.get_property(
        window,
        property,
        query.type_,
        query.long_offset,
        query.long_length,
    )?;

    Ok(PropertyValue::decode(reply))
}

/// `WM_CLASS` split into its instance and class halves
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowClass {
    pub instance: String,
    pub class: String,
}

impl WindowClass {
    /// Parse the NUL-separated pair; returns `None` without a separator
    pub fn parse(text: &str) -> Option<Self> {
        let (instance, class) = text.split_once('\0')?;
        Some(Self {
            instance: instance.to_string(),
            class: class.trim_end_matches('\0').to_string(),
        })
    }
}
