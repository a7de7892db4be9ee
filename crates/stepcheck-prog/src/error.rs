//! Error types for program loading and interpretation.

use stepcheck_mc::Choice;
use stepcheck_state::{LockError, StateError, ThreadId};
use thiserror::Error;

/// A program file that cannot be loaded.
#[derive(Debug, Error)]
pub enum ProgramError {
    #[error("{message} at line {line}, column {column}")]
    Parse {
        message: String,
        line: usize,
        column: usize,
    },

    #[error("program declares no threads")]
    NoThreads,

    #[error("duplicate thread name '{name}'")]
    DuplicateThread { name: String },

    #[error("unknown class '{name}'")]
    UnknownClass { name: String },

    #[error("field {class}.{field} has unknown type '{ty}'")]
    UnknownFieldType {
        class: String,
        field: String,
        ty: String,
    },

    #[error("global '{name}' is initialized with unknown class '{class}'")]
    UnknownGlobalClass { name: String, class: String },

    #[error("thread '{thread}', op {pc}: {message}")]
    InvalidOp {
        thread: String,
        pc: usize,
        message: String,
    },

    #[error(transparent)]
    Class(#[from] StateError),
}

impl From<serde_json::Error> for ProgramError {
    fn from(e: serde_json::Error) -> Self {
        ProgramError::Parse {
            message: e.to_string(),
            line: e.line(),
            column: e.column(),
        }
    }
}

/// A failure of the interpreter itself, as opposed to a property violation
/// of the program it runs.
#[derive(Debug, Error)]
pub enum InterpError {
    #[error("unknown global '{name}'")]
    UnknownGlobal { name: String },

    #[error("global '{name}' does not hold a reference")]
    NotAReference { name: String },

    #[error("global '{name}' does not hold a primitive value")]
    NotAPrimitive { name: String },

    #[error("field {class}.{field} is not a primitive field")]
    NotAPrimitiveField { class: String, field: String },

    #[error("{thread} has no local {local}")]
    BadLocal { thread: ThreadId, local: usize },

    #[error("{thread} has no active frame")]
    NoFrame { thread: ThreadId },

    #[error("unexpected choice {choice}: {reason}")]
    UnexpectedChoice { choice: Choice, reason: String },

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Lock(#[from] LockError),
}

pub type InterpResult<T> = Result<T, InterpError>;
