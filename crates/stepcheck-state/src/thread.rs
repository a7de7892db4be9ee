//! Thread state tracking.
//!
//! A thread's status records what it is waiting for. Blocked and waiting
//! threads are also members of the target object's [`LockState`] waiter set;
//! the status is what distinguishes the two.
//!
//! [`LockState`]: crate::LockState

use crate::ids::{ObjectId, ThreadId};
use crate::value::Slot;
use std::collections::BTreeMap;
use std::fmt;

/// All threads of a state, ordered by id.
pub type ThreadTable = BTreeMap<ThreadId, ThreadState>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThreadStatus {
    Runnable,
    /// Trying to enter the monitor of `on`, held by another thread.
    Blocked { on: ObjectId },
    /// Inside `wait()` on `on`, until notified.
    Waiting { on: ObjectId },
    /// Notified while waiting on `on`; runnable, but must re-enter the
    /// monitor before it continues.
    Notified { on: ObjectId },
    Terminated,
}

impl ThreadStatus {
    /// Returns true if this thread can be scheduled.
    pub fn is_runnable(self) -> bool {
        matches!(self, ThreadStatus::Runnable | ThreadStatus::Notified { .. })
    }

    /// The object whose monitor this status refers to.
    pub fn lock_target(self) -> Option<ObjectId> {
        match self {
            ThreadStatus::Blocked { on }
            | ThreadStatus::Waiting { on }
            | ThreadStatus::Notified { on } => Some(on),
            ThreadStatus::Runnable | ThreadStatus::Terminated => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ThreadStatus::Runnable => "runnable",
            ThreadStatus::Blocked { .. } => "blocked",
            ThreadStatus::Waiting { .. } => "waiting",
            ThreadStatus::Notified { .. } => "notified",
            ThreadStatus::Terminated => "terminated",
        }
    }
}

impl fmt::Display for ThreadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.lock_target() {
            Some(on) => write!(f, "{}({})", self.name(), on),
            None => f.write_str(self.name()),
        }
    }
}

/// One activation record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub method: String,
    pub pc: usize,
    pub locals: Vec<Slot>,
}

impl Frame {
    pub fn new(method: impl Into<String>, locals: Vec<Slot>) -> Self {
        Self {
            method: method.into(),
            pc: 0,
            locals,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThreadState {
    pub id: ThreadId,
    pub name: String,
    pub status: ThreadStatus,
    /// Call stack, innermost frame last.
    pub frames: Vec<Frame>,
    /// Monitor hold count given up by `wait()`, restored on re-entry.
    pub saved_lock_count: u32,
}

impl ThreadState {
    pub fn new(id: ThreadId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            status: ThreadStatus::Runnable,
            frames: Vec::new(),
            saved_lock_count: 0,
        }
    }

    pub fn with_frame(mut self, frame: Frame) -> Self {
        self.frames.push(frame);
        self
    }

    #[inline]
    pub fn is_runnable(&self) -> bool {
        self.status.is_runnable()
    }

    #[inline]
    pub fn is_alive(&self) -> bool {
        self.status != ThreadStatus::Terminated
    }

    #[inline]
    pub fn is_blocked(&self) -> bool {
        matches!(self.status, ThreadStatus::Blocked { .. })
    }

    #[inline]
    pub fn is_waiting(&self) -> bool {
        matches!(self.status, ThreadStatus::Waiting { .. })
    }

    pub fn top_frame(&self) -> Option<&Frame> {
        self.frames.last()
    }

    pub fn top_frame_mut(&mut self) -> Option<&mut Frame> {
        self.frames.last_mut()
    }

    /// Mark the thread finished. Its stack is discarded so that finished
    /// threads compare equal regardless of where they stopped.
    pub fn terminate(&mut self) {
        self.status = ThreadStatus::Terminated;
        self.frames.clear();
        self.saved_lock_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_thread_is_runnable() {
        let t = ThreadState::new(ThreadId(0), "main");
        assert!(t.is_runnable());
        assert!(t.is_alive());
        assert!(t.top_frame().is_none());
    }

    #[test]
    fn test_status_runnable() {
        assert!(ThreadStatus::Runnable.is_runnable());
        assert!(ThreadStatus::Notified { on: ObjectId(1) }.is_runnable());
        assert!(!ThreadStatus::Blocked { on: ObjectId(1) }.is_runnable());
        assert!(!ThreadStatus::Waiting { on: ObjectId(1) }.is_runnable());
        assert!(!ThreadStatus::Terminated.is_runnable());
    }

    #[test]
    fn test_terminate_clears_stack() {
        let mut t = ThreadState::new(ThreadId(1), "worker")
            .with_frame(Frame::new("run", vec![Slot::int(3)]));
        t.saved_lock_count = 2;
        t.terminate();
        assert!(!t.is_alive());
        assert!(t.frames.is_empty());
        assert_eq!(t.saved_lock_count, 0);
    }

    #[test]
    fn test_status_display() {
        assert_eq!(ThreadStatus::Blocked { on: ObjectId(4) }.to_string(), "blocked(@4)");
        assert_eq!(ThreadStatus::Terminated.to_string(), "terminated");
    }
}
