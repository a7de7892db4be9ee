//! Identifier newtypes.
//!
//! Thread ids double as the scheduling order: choice generators enumerate
//! runnable threads by ascending id. Object and class ids are raw identities;
//! the state matcher renames them before comparing states.

use std::fmt;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub u32);

        impl $name {
            #[inline]
            pub fn as_u32(self) -> u32 {
                self.0
            }

            #[inline]
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl From<u32> for $name {
            fn from(v: u32) -> Self {
                $name(v)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

id_type!(
    /// Identifies a thread of the checked program.
    ThreadId,
    "T"
);

id_type!(
    /// Raw identity of a heap object (object or array).
    ObjectId,
    "@"
);

id_type!(
    /// Index of a class in a [`ClassTable`](crate::ClassTable).
    ClassId,
    "C"
);
