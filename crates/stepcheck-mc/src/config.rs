//! Search configuration.

use serde::{Deserialize, Serialize};
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

/// How visited states are compared.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// Compare complete fingerprints. Exact.
    #[default]
    Full,
    /// Compare 64-bit digests of fingerprints. Uses far less memory, but a
    /// digest collision prunes a state that was never explored, so a run that
    /// reports no violation may have missed one.
    HashOnly,
}

/// Frontier ordering for heuristic search.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Heuristic {
    /// Shallowest state first.
    BreadthFirst,
    /// State with the most blocked or waiting threads first.
    MostBlocked,
    /// Pseudo-random order, reproducible for a given seed.
    Random { seed: u64 },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStrategy {
    #[default]
    DepthFirst,
    Heuristic(Heuristic),
}

/// Lock-free progress counters shared between the driver and a reporter.
#[derive(Debug, Default)]
pub struct ProgressCounters {
    pub states: AtomicUsize,
    pub depth: AtomicUsize,
    /// Open nodes: the DFS stack height or the heuristic frontier size.
    pub frontier: AtomicUsize,
    pub transitions: AtomicUsize,
}

impl ProgressCounters {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Options read once when a search starts.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub strategy: SearchStrategy,
    /// States at this depth are not expanded.
    pub max_depth: Option<usize>,
    /// Stop after this many distinct states.
    pub max_states: Option<usize>,
    pub halt_on_first_error: bool,
    /// Field patterns left out of fingerprints (`Class.field`, `field`, `prefix*`).
    pub excluded_fields: Vec<String>,
    pub check_deadlock: bool,
    pub match_mode: MatchMode,
    pub max_time_secs: Option<u64>,
    /// Stop once the process uses this much physical memory.
    pub memory_limit_mb: Option<usize>,
    /// Maximum heuristic frontier size; the worst nodes are dropped beyond it.
    pub queue_limit: Option<usize>,
    /// Check every captured state for internal consistency.
    pub validate_snapshots: bool,
    #[serde(skip)]
    pub progress: Option<Arc<ProgressCounters>>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            strategy: SearchStrategy::DepthFirst,
            max_depth: None,
            max_states: None,
            halt_on_first_error: true,
            excluded_fields: Vec::new(),
            check_deadlock: true,
            match_mode: MatchMode::Full,
            max_time_secs: None,
            memory_limit_mb: None,
            queue_limit: None,
            validate_snapshots: true,
            progress: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SearchConfig::default();
        assert_eq!(config.strategy, SearchStrategy::DepthFirst);
        assert_eq!(config.match_mode, MatchMode::Full);
        assert!(config.halt_on_first_error);
        assert!(config.check_deadlock);
        assert!(config.max_states.is_none());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: SearchConfig = serde_json::from_str(
            r#"{"max_states": 50, "strategy": {"heuristic": {"kind": "random", "seed": 7}}}"#,
        )
        .unwrap();
        assert_eq!(config.max_states, Some(50));
        assert_eq!(
            config.strategy,
            SearchStrategy::Heuristic(Heuristic::Random { seed: 7 })
        );
        assert!(config.halt_on_first_error);

        let config: SearchConfig =
            serde_json::from_str(r#"{"match_mode": "hash_only", "excluded_fields": ["Log.*"]}"#)
                .unwrap();
        assert_eq!(config.match_mode, MatchMode::HashOnly);
        assert_eq!(config.excluded_fields, vec!["Log.*".to_string()]);
    }
}
