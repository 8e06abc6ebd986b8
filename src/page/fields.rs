//! Access to page record fields by name.

use core::fmt;

/// The value of a single page field.
///
/// Values of different widths never compare equal, so collecting a field
/// across a stream yields one entry per distinct value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FieldValue {
    Bool(bool),
    U8(u8),
    U16(u16),
    U32(u32),
}

impl FieldValue {
    /// Widen the value to an unsigned integer, if it is numeric.
    pub fn as_u32(self) -> Option<u32> {
        match self {
            Self::Bool(_) => None,
            Self::U8(v) => Some(v.into()),
            Self::U16(v) => Some(v.into()),
            Self::U32(v) => Some(v),
        }
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<u8> for FieldValue {
    fn from(value: u8) -> Self {
        Self::U8(value)
    }
}

impl From<u16> for FieldValue {
    fn from(value: u16) -> Self {
        Self::U16(value)
    }
}

impl From<u32> for FieldValue {
    fn from(value: u32) -> Self {
        Self::U32(value)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::U8(v) => write!(f, "{v:#04x}"),
            Self::U16(v) => write!(f, "{v:#06x}"),
            Self::U32(v) => write!(f, "{v:#x}"),
        }
    }
}

/// Look up the fields of a page record by name.
///
/// See the [`PageFields`](macro@crate::PageFields) derive macro for an
/// automatic implementation of this trait.
pub trait PageFields {
    /// Read a field, or `None` if this record has no field of that name.
    fn field(&self, name: &str) -> Option<FieldValue>;
}
