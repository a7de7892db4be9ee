//! State model errors.
//!
//! These signal engine-internal inconsistencies (a snapshot referencing an
//! object that does not exist, a lock naming an unknown thread) or misuse of
//! the model by an interpreter. None of them describes a bug in the checked
//! program.

use crate::ids::{ClassId, ObjectId, ThreadId};
use crate::lock::LockError;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("missing object {object} referenced from {referrer}")]
    MissingObject { object: ObjectId, referrer: String },

    #[error("unknown thread {thread}")]
    UnknownThread { thread: ThreadId },

    #[error("unknown class {class}")]
    UnknownClass { class: ClassId },

    #[error("unknown class '{name}'")]
    UnknownClassName { name: String },

    #[error("class '{name}' cannot be extended")]
    InvalidSuperclass { name: String },

    #[error("class '{name}' is an array class")]
    ArrayClass { name: String },

    #[error("duplicate class '{name}'")]
    DuplicateClass { name: String },

    #[error("class '{class}' has no field '{field}'")]
    FieldNotFound { class: String, field: String },

    #[error("object {object} is not an instance of a class with fields")]
    NotAnInstance { object: ObjectId },

    #[error("object {object} is not an array")]
    NotAnArray { object: ObjectId },

    #[error("object {object} has {found} field slots, class '{class}' declares {expected}")]
    LayoutMismatch {
        object: ObjectId,
        class: String,
        expected: usize,
        found: usize,
    },

    #[error("corrupt lock on {object}: {reason}")]
    CorruptLock { object: ObjectId, reason: String },

    #[error(transparent)]
    Lock(#[from] LockError),
}

pub type StateResult<T> = Result<T, StateError>;
