//! Search notifications.

use crate::choice::{Choice, ChoiceKind};
use crate::config::SearchConfig;
use crate::report::{SearchReport, ViolationReport};
use crate::visited::StateId;
use std::fmt;
use stepcheck_state::ExecutionState;
use tracing::{debug, info, trace, warn};

/// One decision on the path from the initial state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathStep {
    pub label: String,
    pub kind: ChoiceKind,
    pub choice: Choice,
    /// Position of `choice` among the generator's alternatives.
    pub index: usize,
    pub total: Option<usize>,
}

impl fmt::Display for PathStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.label, self.choice)?;
        match self.total {
            Some(n) => write!(f, " ({}/{})", self.index + 1, n),
            None => write!(f, " ({}/..)", self.index + 1),
        }
    }
}

/// Render a path as `label=choice (i/n) -> ...`.
pub fn format_path(path: &[PathStep]) -> String {
    if path.is_empty() {
        return "<initial>".to_string();
    }
    path.iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// A state the search moved to or returned to.
#[derive(Clone, Copy, Debug)]
pub struct StateEvent<'a> {
    pub id: Option<StateId>,
    pub state: &'a ExecutionState,
    pub path: &'a [PathStep],
    pub depth: usize,
    /// First time this state was reached.
    pub is_new: bool,
    /// No further choices from here (all threads finished).
    pub is_end: bool,
}

/// Observer of a search. Every method defaults to doing nothing.
pub trait SearchListener {
    fn search_started(&mut self, _config: &SearchConfig) {}

    fn state_advanced(&mut self, _event: &StateEvent<'_>) {}

    fn state_backtracked(&mut self, _event: &StateEvent<'_>) {}

    fn property_violated(&mut self, _report: &ViolationReport) {}

    fn search_finished(&mut self, _report: &SearchReport) {}
}

/// Logs search events through `tracing`.
#[derive(Debug, Default)]
pub struct TracingListener;

impl SearchListener for TracingListener {
    fn search_started(&mut self, config: &SearchConfig) {
        info!(
            strategy = ?config.strategy,
            match_mode = ?config.match_mode,
            max_states = ?config.max_states,
            max_depth = ?config.max_depth,
            "search started"
        );
    }

    fn state_advanced(&mut self, event: &StateEvent<'_>) {
        trace!(
            id = ?event.id,
            depth = event.depth,
            new = event.is_new,
            end = event.is_end,
            "advanced"
        );
    }

    fn state_backtracked(&mut self, event: &StateEvent<'_>) {
        trace!(id = ?event.id, depth = event.depth, "backtracked");
    }

    fn property_violated(&mut self, report: &ViolationReport) {
        warn!(
            kind = %report.violation.kind,
            depth = report.depth,
            path = %format_path(&report.path),
            "{}",
            report.violation.message
        );
    }

    fn search_finished(&mut self, report: &SearchReport) {
        debug!(stats = ?report.stats, "search statistics");
        info!(verdict = ?report.verdict(), "{}", report);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stepcheck_state::ThreadId;

    #[test]
    fn test_format_path() {
        assert_eq!(format_path(&[]), "<initial>");
        let path = vec![
            PathStep {
                label: "schedule".into(),
                kind: ChoiceKind::Scheduling,
                choice: Choice::Thread(ThreadId(1)),
                index: 1,
                total: Some(2),
            },
            PathStep {
                label: "coin".into(),
                kind: ChoiceKind::Data,
                choice: Choice::Bool(false),
                index: 0,
                total: Some(2),
            },
        ];
        assert_eq!(format_path(&path), "schedule=T1 (2/2) -> coin=false (1/2)");
    }
}
