//! Search results.

use crate::config::MatchMode;
use crate::interp::Violation;
use crate::listener::{format_path, PathStep};
use crate::visited::StateId;
use std::fmt;
use std::time::Duration;
use stepcheck_state::ExecutionState;

/// A violation with the path that leads to it.
#[derive(Clone, Debug)]
pub struct ViolationReport {
    pub violation: Violation,
    pub path: Vec<PathStep>,
    pub state_id: Option<StateId>,
    pub depth: usize,
    /// The state in which the violation was detected.
    pub state: ExecutionState,
}

impl fmt::Display for ViolationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at path {}", self.violation, format_path(&self.path))
    }
}

/// Why a search stopped before covering the whole state space.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoundReason {
    StateLimit,
    DepthLimit,
    TimeLimit,
    MemoryLimit { memory_mb: usize },
    /// The external stop flag was raised.
    Stopped,
    /// The heuristic frontier overflowed and nodes were dropped.
    QueueLimit,
}

impl fmt::Display for BoundReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoundReason::StateLimit => f.write_str("state limit"),
            BoundReason::DepthLimit => f.write_str("depth limit"),
            BoundReason::TimeLimit => f.write_str("time limit"),
            BoundReason::MemoryLimit { memory_mb } => write!(f, "memory limit ({} MB)", memory_mb),
            BoundReason::Stopped => f.write_str("stop request"),
            BoundReason::QueueLimit => f.write_str("queue limit"),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SearchStats {
    /// Distinct states recorded in the visited table.
    pub unique_states: usize,
    /// Arrivals at a state that was already visited.
    pub revisited: usize,
    /// States in which every thread had finished.
    pub end_states: usize,
    pub transitions: usize,
    pub backtracks: usize,
    pub max_depth: usize,
    pub elapsed: Duration,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    PropertyHolds,
    ViolationFound,
    Incomplete,
}

#[derive(Clone, Debug)]
pub struct SearchReport {
    pub stats: SearchStats,
    pub violations: Vec<ViolationReport>,
    pub bound: Option<BoundReason>,
    pub match_mode: MatchMode,
}

impl SearchReport {
    pub fn verdict(&self) -> Verdict {
        if !self.violations.is_empty() {
            Verdict::ViolationFound
        } else if self.bound.is_some() {
            Verdict::Incomplete
        } else {
            Verdict::PropertyHolds
        }
    }

    /// Returns true if nothing cut the search short.
    pub fn is_complete(&self) -> bool {
        self.bound.is_none()
    }

    pub fn first_violation(&self) -> Option<&ViolationReport> {
        self.violations.first()
    }
}

impl fmt::Display for SearchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let states = self.stats.unique_states;
        match (self.first_violation(), self.bound) {
            (Some(v), _) => {
                write!(
                    f,
                    "violation found at path {}: {}",
                    format_path(&v.path),
                    v.violation
                )?;
                if self.violations.len() > 1 {
                    write!(f, " (+{} more)", self.violations.len() - 1)?;
                }
                Ok(())
            }
            (None, Some(reason)) => write!(
                f,
                "search bounded by {}, result incomplete ({} states explored)",
                reason, states
            ),
            (None, None) => {
                write!(f, "search completed, {} states explored, property holds", states)?;
                if self.match_mode == MatchMode::HashOnly {
                    f.write_str(" (hash-only matching, states may have been missed)")?;
                }
                Ok(())
            }
        }
    }
}
