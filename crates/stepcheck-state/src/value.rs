//! Primitive values and storage slots.

use crate::ids::ObjectId;
use std::fmt;
use std::sync::Arc;

/// The fixed primitive categories of the checked language.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
}

impl PrimitiveKind {
    /// Wide kinds occupy two 32-bit words in a fingerprint.
    #[inline]
    pub fn is_wide(self) -> bool {
        matches!(self, PrimitiveKind::Long | PrimitiveKind::Double)
    }

    pub fn name(self) -> &'static str {
        match self {
            PrimitiveKind::Boolean => "boolean",
            PrimitiveKind::Byte => "byte",
            PrimitiveKind::Char => "char",
            PrimitiveKind::Short => "short",
            PrimitiveKind::Int => "int",
            PrimitiveKind::Long => "long",
            PrimitiveKind::Float => "float",
            PrimitiveKind::Double => "double",
        }
    }

    /// Parse a kind from its source-level name.
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "boolean" => PrimitiveKind::Boolean,
            "byte" => PrimitiveKind::Byte,
            "char" => PrimitiveKind::Char,
            "short" => PrimitiveKind::Short,
            "int" => PrimitiveKind::Int,
            "long" => PrimitiveKind::Long,
            "float" => PrimitiveKind::Float,
            "double" => PrimitiveKind::Double,
            _ => return None,
        })
    }

    /// The zero value a fresh field or array element of this kind holds.
    pub fn default_value(self) -> Primitive {
        Primitive::from_i64(self, 0)
    }
}

impl fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A primitive value.
///
/// `Extension` carries values of user-defined primitive categories. The
/// engine stores and compares them but has no canonical encoding for them.
#[derive(Clone, Debug)]
pub enum Primitive {
    Boolean(bool),
    Byte(i8),
    Char(u16),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Extension { category: Arc<str>, bits: u64 },
}

impl Primitive {
    /// The built-in kind, or `None` for extension values.
    pub fn kind(&self) -> Option<PrimitiveKind> {
        Some(match self {
            Primitive::Boolean(_) => PrimitiveKind::Boolean,
            Primitive::Byte(_) => PrimitiveKind::Byte,
            Primitive::Char(_) => PrimitiveKind::Char,
            Primitive::Short(_) => PrimitiveKind::Short,
            Primitive::Int(_) => PrimitiveKind::Int,
            Primitive::Long(_) => PrimitiveKind::Long,
            Primitive::Float(_) => PrimitiveKind::Float,
            Primitive::Double(_) => PrimitiveKind::Double,
            Primitive::Extension { .. } => return None,
        })
    }

    /// Convert an integer to `kind` with two's-complement narrowing.
    pub fn from_i64(kind: PrimitiveKind, v: i64) -> Primitive {
        match kind {
            PrimitiveKind::Boolean => Primitive::Boolean(v != 0),
            PrimitiveKind::Byte => Primitive::Byte(v as i8),
            PrimitiveKind::Char => Primitive::Char(v as u16),
            PrimitiveKind::Short => Primitive::Short(v as i16),
            PrimitiveKind::Int => Primitive::Int(v as i32),
            PrimitiveKind::Long => Primitive::Long(v),
            PrimitiveKind::Float => Primitive::Float(v as f32),
            PrimitiveKind::Double => Primitive::Double(v as f64),
        }
    }

    /// Integral view of the value. Floating point values truncate; extension
    /// values have none.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Primitive::Boolean(b) => Some(*b as i64),
            Primitive::Byte(v) => Some(*v as i64),
            Primitive::Char(v) => Some(*v as i64),
            Primitive::Short(v) => Some(*v as i64),
            Primitive::Int(v) => Some(*v as i64),
            Primitive::Long(v) => Some(*v),
            Primitive::Float(v) => Some(*v as i64),
            Primitive::Double(v) => Some(*v as i64),
            Primitive::Extension { .. } => None,
        }
    }

    /// Raw bit pattern, zero-extended to 64 bits for narrow kinds.
    fn raw_bits(&self) -> u64 {
        match self {
            Primitive::Boolean(b) => *b as u64,
            Primitive::Byte(v) => *v as u8 as u64,
            Primitive::Char(v) => *v as u64,
            Primitive::Short(v) => *v as u16 as u64,
            Primitive::Int(v) => *v as u32 as u64,
            Primitive::Long(v) => *v as u64,
            Primitive::Float(v) => v.to_bits() as u64,
            Primitive::Double(v) => v.to_bits(),
            Primitive::Extension { bits, .. } => *bits,
        }
    }
}

// Bitwise equality: snapshots must compare equal to themselves even when they
// hold NaN.
impl PartialEq for Primitive {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Primitive::Extension { category: a, bits: x },
                Primitive::Extension { category: b, bits: y },
            ) => a == b && x == y,
            _ => self.kind() == other.kind() && self.raw_bits() == other.raw_bits(),
        }
    }
}

impl Eq for Primitive {}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Primitive::Boolean(b) => write!(f, "{}", b),
            Primitive::Byte(v) => write!(f, "{}b", v),
            Primitive::Char(v) => match char::from_u32(*v as u32) {
                Some(c) => write!(f, "{:?}", c),
                None => write!(f, "\\u{:04x}", v),
            },
            Primitive::Short(v) => write!(f, "{}s", v),
            Primitive::Int(v) => write!(f, "{}", v),
            Primitive::Long(v) => write!(f, "{}L", v),
            Primitive::Float(v) => write!(f, "{}f", v),
            Primitive::Double(v) => write!(f, "{}d", v),
            Primitive::Extension { category, bits } => write!(f, "{}:{:#x}", category, bits),
        }
    }
}

/// Contents of a field, array element, local variable or global root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Slot {
    Prim(Primitive),
    Ref(Option<ObjectId>),
}

impl Slot {
    pub const NULL: Slot = Slot::Ref(None);

    pub fn int(v: i32) -> Slot {
        Slot::Prim(Primitive::Int(v))
    }

    pub fn long(v: i64) -> Slot {
        Slot::Prim(Primitive::Long(v))
    }

    pub fn boolean(v: bool) -> Slot {
        Slot::Prim(Primitive::Boolean(v))
    }

    pub fn object(id: ObjectId) -> Slot {
        Slot::Ref(Some(id))
    }

    /// The reference held by this slot, `None` if it holds a primitive.
    pub fn as_reference(&self) -> Option<Option<ObjectId>> {
        match self {
            Slot::Ref(r) => Some(*r),
            Slot::Prim(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Slot::Prim(p) => p.as_i64(),
            Slot::Ref(_) => None,
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Prim(p) => write!(f, "{}", p),
            Slot::Ref(Some(id)) => write!(f, "{}", id),
            Slot::Ref(None) => f.write_str("null"),
        }
    }
}
