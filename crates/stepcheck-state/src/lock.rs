//! Per-object monitor records.
//!
//! A [`LockState`] is either unlocked (`owner == None`, `hold_count == 0`) or
//! locked by one thread with a positive recursion count. The waiter set holds
//! every thread parked on the monitor, both those blocked on entry and those
//! inside `wait()`; the thread table tells them apart.

use crate::ids::{ObjectId, ThreadId};
use crate::thread::{ThreadStatus, ThreadTable};
use smallvec::SmallVec;
use std::fmt;
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockOp {
    Acquire,
    Release,
    Reacquire,
}

impl fmt::Display for LockOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LockOp::Acquire => "acquire",
            LockOp::Release => "release",
            LockOp::Reacquire => "reacquire",
        })
    }
}

/// Misuse of a monitor by the caller.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LockError {
    #[error("invalid {op} by {thread}: {}", owner_text(.owner))]
    InvalidOperation {
        op: LockOp,
        thread: ThreadId,
        owner: Option<ThreadId>,
    },
}

fn owner_text(owner: &Option<ThreadId>) -> String {
    match owner {
        Some(t) => format!("monitor owned by {}", t),
        None => "monitor not owned".to_string(),
    }
}

/// Monitor state of one object.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LockState {
    owner: Option<ThreadId>,
    hold_count: u32,
    /// Sorted, no duplicates.
    waiters: SmallVec<[ThreadId; 4]>,
}

impl LockState {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn owner(&self) -> Option<ThreadId> {
        self.owner
    }

    #[inline]
    pub fn hold_count(&self) -> u32 {
        self.hold_count
    }

    #[inline]
    pub fn is_locked(&self) -> bool {
        self.owner.is_some()
    }

    /// Returns true if `thread` could enter the monitor now.
    #[inline]
    pub fn can_lock(&self, thread: ThreadId) -> bool {
        match self.owner {
            None => true,
            Some(owner) => owner == thread,
        }
    }

    pub fn acquire(&mut self, thread: ThreadId) -> Result<(), LockError> {
        if !self.can_lock(thread) {
            return Err(LockError::InvalidOperation {
                op: LockOp::Acquire,
                thread,
                owner: self.owner,
            });
        }
        self.owner = Some(thread);
        self.hold_count += 1;
        Ok(())
    }

    pub fn release(&mut self, thread: ThreadId) -> Result<(), LockError> {
        if self.owner != Some(thread) {
            return Err(LockError::InvalidOperation {
                op: LockOp::Release,
                thread,
                owner: self.owner,
            });
        }
        self.hold_count -= 1;
        if self.hold_count == 0 {
            self.owner = None;
        }
        Ok(())
    }

    /// Give up the monitor entirely, returning the recursion count so that it
    /// can later be restored with [`reacquire`](Self::reacquire).
    pub fn release_all(&mut self, thread: ThreadId) -> Result<u32, LockError> {
        if self.owner != Some(thread) {
            return Err(LockError::InvalidOperation {
                op: LockOp::Release,
                thread,
                owner: self.owner,
            });
        }
        let count = self.hold_count;
        self.owner = None;
        self.hold_count = 0;
        Ok(count)
    }

    /// Re-enter an unlocked monitor with a saved recursion count.
    pub fn reacquire(&mut self, thread: ThreadId, count: u32) -> Result<(), LockError> {
        if self.owner.is_some() || count == 0 {
            return Err(LockError::InvalidOperation {
                op: LockOp::Reacquire,
                thread,
                owner: self.owner,
            });
        }
        self.owner = Some(thread);
        self.hold_count = count;
        Ok(())
    }

    /// Insert `thread` into the waiter set. No-op if already present.
    pub fn add_waiter(&mut self, thread: ThreadId) {
        if let Err(pos) = self.waiters.binary_search(&thread) {
            self.waiters.insert(pos, thread);
        }
    }

    /// Remove `thread` from the waiter set. No-op if absent.
    pub fn remove_waiter(&mut self, thread: ThreadId) {
        if let Ok(pos) = self.waiters.binary_search(&thread) {
            self.waiters.remove(pos);
        }
    }

    /// Copy of this record with `thread` added to the waiter set.
    pub fn with_waiter(&self, thread: ThreadId) -> Self {
        let mut copy = self.clone();
        copy.add_waiter(thread);
        copy
    }

    /// Copy of this record with `thread` removed from the waiter set.
    pub fn without_waiter(&self, thread: ThreadId) -> Self {
        let mut copy = self.clone();
        copy.remove_waiter(thread);
        copy
    }

    #[inline]
    pub fn has_waiters(&self) -> bool {
        !self.waiters.is_empty()
    }

    #[inline]
    pub fn contains_waiter(&self, thread: ThreadId) -> bool {
        self.waiters.binary_search(&thread).is_ok()
    }

    /// Waiters in ascending thread id order.
    #[inline]
    pub fn waiters(&self) -> &[ThreadId] {
        &self.waiters
    }

    /// Waiters trying to enter the monitor of `object`.
    pub fn blocked_threads(&self, object: ObjectId, threads: &ThreadTable) -> Vec<ThreadId> {
        self.waiters_matching(threads, |s| s == ThreadStatus::Blocked { on: object })
    }

    /// Waiters inside `wait()` on `object`.
    pub fn waiting_threads(&self, object: ObjectId, threads: &ThreadTable) -> Vec<ThreadId> {
        self.waiters_matching(threads, |s| s == ThreadStatus::Waiting { on: object })
    }

    pub fn num_blocked(&self, object: ObjectId, threads: &ThreadTable) -> usize {
        self.blocked_threads(object, threads).len()
    }

    pub fn num_waiting(&self, object: ObjectId, threads: &ThreadTable) -> usize {
        self.waiting_threads(object, threads).len()
    }

    pub fn num_blocked_or_waiting(&self, object: ObjectId, threads: &ThreadTable) -> usize {
        self.waiters_matching(threads, |s| {
            s == ThreadStatus::Blocked { on: object } || s == ThreadStatus::Waiting { on: object }
        })
        .len()
    }

    fn waiters_matching(
        &self,
        threads: &ThreadTable,
        pred: impl Fn(ThreadStatus) -> bool,
    ) -> Vec<ThreadId> {
        self.waiters
            .iter()
            .copied()
            .filter(|t| threads.get(t).is_some_and(|ts| pred(ts.status)))
            .collect()
    }

    /// Unlocked with nobody parked: indistinguishable from a monitor that was
    /// never used.
    #[inline]
    pub fn is_trivial(&self) -> bool {
        self.owner.is_none() && self.waiters.is_empty()
    }

    /// Check the structural invariants, describing the first one broken.
    pub fn check_invariants(&self) -> Result<(), String> {
        if (self.hold_count > 0) != self.owner.is_some() {
            return Err(format!(
                "hold count {} inconsistent with owner {:?}",
                self.hold_count, self.owner
            ));
        }
        if self.waiters.windows(2).any(|w| w[0] >= w[1]) {
            return Err(format!("waiter set not strictly sorted: {:?}", self.waiters));
        }
        Ok(())
    }
}

impl fmt::Display for LockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.owner {
            Some(owner) => write!(f, "locked by {} x{}", owner, self.hold_count)?,
            None => f.write_str("unlocked")?,
        }
        if !self.waiters.is_empty() {
            f.write_str(", waiters [")?;
            for (i, w) in self.waiters.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{}", w)?;
            }
            f.write_str("]")?;
        }
        Ok(())
    }
}
