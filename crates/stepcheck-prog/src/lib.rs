//! Reference interpreter for small multi-threaded programs described in JSON.
//!
//! Programs are threads running flat op lists over shared objects and global
//! roots. [`ProgramInterpreter`] implements the search engine's
//! [`Interpreter`](stepcheck_mc::Interpreter) boundary, so any program can be
//! handed to a [`SearchDriver`](stepcheck_mc::SearchDriver).

pub mod error;
pub mod interp;
pub mod program;

pub use error::{InterpError, InterpResult, ProgramError};
pub use interp::{ProgramInterpreter, DEFAULT_OP_BUDGET};
pub use program::{ClassDecl, Cmp, Cond, FieldDecl, GlobalInit, Op, Operand, Program, ThreadDecl};
