//! The boundary between the search engine and an interpreter.

use crate::choice::{Choice, ChoiceGenerator};
use std::fmt;
use stepcheck_state::{ClassTable, ExecutionState};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ViolationKind {
    Deadlock,
    AssertionFailed,
    IllegalMonitorState,
    NullDereference,
    /// Any other property the interpreter checks.
    Property,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ViolationKind::Deadlock => "deadlock",
            ViolationKind::AssertionFailed => "assertion failed",
            ViolationKind::IllegalMonitorState => "illegal monitor state",
            ViolationKind::NullDereference => "null dereference",
            ViolationKind::Property => "property violated",
        })
    }
}

/// An error in the checked program.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Violation {
    pub kind: ViolationKind,
    pub message: String,
}

impl Violation {
    pub fn new(kind: ViolationKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// What happened when the interpreter ran.
#[derive(Clone, Debug)]
pub enum StepOutcome {
    /// Ran out of its per-call budget; call `step` again with the same choice.
    Continued,
    /// Stopped at a point with several possible continuations.
    ChoicePoint(ChoiceGenerator),
    PropertyViolated(Violation),
    /// Every thread finished.
    Terminated,
}

/// An interpreter the search driver can steer.
///
/// The driver calls [`start`](Interpreter::start) once, then repeatedly
/// restores a snapshot and applies one alternative of the pending choice with
/// [`step`](Interpreter::step). Implementations must be deterministic: the
/// same snapshot and choice always lead to the same outcome.
pub trait Interpreter {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Class layouts used by the heap of every state this interpreter produces.
    fn classes(&self) -> &ClassTable;

    /// Run the initial transition up to the first choice point. Never returns
    /// [`StepOutcome::Continued`].
    fn start(&mut self) -> Result<StepOutcome, Self::Error>;

    /// Apply `choice` to the pending choice point and run on.
    fn step(&mut self, choice: &Choice) -> Result<StepOutcome, Self::Error>;

    fn capture_state(&self) -> ExecutionState;

    fn restore_state(&mut self, state: &ExecutionState) -> Result<(), Self::Error>;
}
