//! The backtracking search driver.
//!
//! Depth-first search keeps a stack of open nodes, one per pending choice
//! point on the current path. Each node owns the snapshot taken when its
//! choice point was reached; before a node's second and later alternatives
//! are applied the interpreter is rolled back to that snapshot.

use crate::choice::{Choice, ChoiceGenerator};
use crate::config::{SearchConfig, SearchStrategy};
use crate::interp::{Interpreter, StepOutcome, Violation, ViolationKind};
use crate::linearize::LinearizeError;
use crate::listener::{PathStep, SearchListener, StateEvent};
use crate::matcher::StateMatcher;
use crate::report::{BoundReason, SearchReport, SearchStats, ViolationReport};
use crate::visited::StateId;
use memory_stats::memory_stats;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use stepcheck_state::{ExecutionState, StateError};
use thiserror::Error;
use tracing::{debug, info, trace};

/// Memory is sampled once per this many transitions.
const MEMORY_CHECK_INTERVAL: usize = 1000;

/// Returns current process memory usage in MB, or None if unavailable.
fn current_memory_mb() -> Option<usize> {
    memory_stats().map(|stats| stats.physical_mem / (1024 * 1024))
}

/// Errors that abort a search. Violations in the checked program are not
/// errors; they end up in the [`SearchReport`].
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("interpreter error: {0}")]
    Interpreter(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("corrupt snapshot: {0}")]
    CorruptSnapshot(#[from] StateError),

    #[error("cannot fingerprint state: {0}")]
    Linearize(#[from] LinearizeError),

    #[error("interpreter protocol error: {message}")]
    Protocol { message: String },
}

pub type SearchResult<T> = Result<T, SearchError>;

fn interp_err<E: std::error::Error + Send + Sync + 'static>(e: E) -> SearchError {
    SearchError::Interpreter(Box::new(e))
}

/// An expanded choice point whose alternatives are still being explored.
pub(crate) struct Node {
    pub(crate) state: ExecutionState,
    pub(crate) id: Option<StateId>,
    pub(crate) generator: ChoiceGenerator,
    pub(crate) depth: usize,
    /// Alternatives applied so far.
    pub(crate) applied: usize,
}

/// What to do with the state a transition arrived at.
pub(crate) enum Arrival {
    Expand(Node),
    /// Nothing to explore from here.
    Leaf,
    /// A violation was found and the run should stop.
    Halt,
}

pub struct SearchDriver<I: Interpreter> {
    pub(crate) interp: I,
    pub(crate) config: SearchConfig,
    pub(crate) matcher: StateMatcher,
    listeners: Vec<Box<dyn SearchListener>>,
    stop_flag: Option<Arc<AtomicBool>>,
    deadline: Option<Instant>,
    next_memory_check: usize,
    pub(crate) stats: SearchStats,
    violations: Vec<ViolationReport>,
    pub(crate) bound: Option<BoundReason>,
}

impl<I: Interpreter> SearchDriver<I> {
    pub fn new(interp: I, config: SearchConfig) -> Self {
        let matcher = StateMatcher::new(config.match_mode, &config.excluded_fields);
        Self {
            interp,
            config,
            matcher,
            listeners: Vec::new(),
            stop_flag: None,
            deadline: None,
            next_memory_check: 0,
            stats: SearchStats::default(),
            violations: Vec::new(),
            bound: None,
        }
    }

    pub fn add_listener(&mut self, listener: Box<dyn SearchListener>) {
        self.listeners.push(listener);
    }

    /// Stop at the next safe point once `flag` is set.
    pub fn set_stop_flag(&mut self, flag: Arc<AtomicBool>) {
        self.stop_flag = Some(flag);
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn interpreter(&self) -> &I {
        &self.interp
    }

    pub fn matcher(&self) -> &StateMatcher {
        &self.matcher
    }

    pub fn into_interpreter(self) -> I {
        self.interp
    }

    /// Explore the state space from the interpreter's initial state.
    pub fn run(&mut self) -> SearchResult<SearchReport> {
        let started = Instant::now();
        self.matcher.reset();
        self.stats = SearchStats::default();
        self.violations.clear();
        self.bound = None;
        self.next_memory_check = MEMORY_CHECK_INTERVAL;
        self.deadline = self
            .config
            .max_time_secs
            .map(|secs| started + Duration::from_secs(secs));

        let config = self.config.clone();
        for l in &mut self.listeners {
            l.search_started(&config);
        }
        info!(strategy = ?config.strategy, "starting search");

        let outcome = self.interp.start().map_err(interp_err)?;
        if matches!(outcome, StepOutcome::Continued) {
            return Err(SearchError::Protocol {
                message: "initial transition returned Continued".to_string(),
            });
        }
        match self.arrive(outcome, &[], 0)? {
            Arrival::Expand(root) => match config.strategy {
                SearchStrategy::DepthFirst => self.depth_first(root)?,
                SearchStrategy::Heuristic(h) => self.best_first(root, h)?,
            },
            Arrival::Leaf | Arrival::Halt => {}
        }

        self.stats.unique_states = self.matcher.len();
        self.stats.elapsed = started.elapsed();
        let report = SearchReport {
            stats: self.stats.clone(),
            violations: std::mem::take(&mut self.violations),
            bound: self.bound,
            match_mode: self.config.match_mode,
        };
        info!(
            states = report.stats.unique_states,
            transitions = report.stats.transitions,
            max_depth = report.stats.max_depth,
            "search finished"
        );
        for l in &mut self.listeners {
            l.search_finished(&report);
        }
        Ok(report)
    }

    fn depth_first(&mut self, root: Node) -> SearchResult<()> {
        let mut stack = vec![root];
        let mut path: Vec<PathStep> = Vec::new();

        loop {
            if let Some(reason) = self.check_budget() {
                self.bound = Some(reason);
                break;
            }
            self.update_frontier(stack.len());

            let Some(node) = stack.last_mut() else {
                break;
            };
            let Some(choice) = node.generator.advance() else {
                trace!(depth = node.depth, "choice point exhausted");
                stack.pop();
                self.stats.backtracks += 1;
                continue;
            };
            if node.applied > 0 {
                self.restore(node, &path)?;
            }
            node.applied += 1;
            let depth = node.depth;
            path.truncate(depth);
            path.push(path_step(&node.generator, choice));

            let Some(outcome) = self.apply(&choice)? else {
                break;
            };
            match self.arrive(outcome, &path, depth + 1)? {
                Arrival::Expand(child) => stack.push(child),
                Arrival::Leaf => {}
                Arrival::Halt => break,
            }
        }
        Ok(())
    }

    /// Roll the interpreter back to `node`'s snapshot.
    pub(crate) fn restore(&mut self, node: &Node, path: &[PathStep]) -> SearchResult<()> {
        self.interp.restore_state(&node.state).map_err(interp_err)?;
        let event = StateEvent {
            id: node.id,
            state: &node.state,
            path: &path[..node.depth.min(path.len())],
            depth: node.depth,
            is_new: false,
            is_end: false,
        };
        for l in &mut self.listeners {
            l.state_backtracked(&event);
        }
        Ok(())
    }

    /// Apply `choice`, re-entering the interpreter while it reports
    /// `Continued`. Returns `None` if a budget ran out in between.
    pub(crate) fn apply(&mut self, choice: &Choice) -> SearchResult<Option<StepOutcome>> {
        loop {
            let outcome = self.interp.step(choice).map_err(interp_err)?;
            self.stats.transitions += 1;
            if !matches!(outcome, StepOutcome::Continued) {
                return Ok(Some(outcome));
            }
            if let Some(reason) = self.check_budget() {
                self.bound = Some(reason);
                return Ok(None);
            }
        }
    }

    /// Capture and classify the state a transition ended in.
    pub(crate) fn arrive(
        &mut self,
        outcome: StepOutcome,
        path: &[PathStep],
        depth: usize,
    ) -> SearchResult<Arrival> {
        let state = self.interp.capture_state();
        if self.config.validate_snapshots {
            state.validate(self.interp.classes())?;
        }
        let m = self.matcher.check(self.interp.classes(), &state)?;
        let is_new = m.visit.is_new();
        let id = m.visit.id();
        if is_new {
            self.stats.max_depth = self.stats.max_depth.max(depth);
        } else {
            self.stats.revisited += 1;
        }
        trace!(?id, depth, new = is_new, "arrived");

        let event = StateEvent {
            id,
            state: &state,
            path,
            depth,
            is_new,
            is_end: matches!(outcome, StepOutcome::Terminated),
        };
        for l in &mut self.listeners {
            l.state_advanced(&event);
        }
        if let Some(p) = &self.config.progress {
            p.states.store(self.matcher.len(), Ordering::Relaxed);
            p.depth.store(self.stats.max_depth, Ordering::Relaxed);
            p.transitions.store(self.stats.transitions, Ordering::Relaxed);
        }

        match outcome {
            StepOutcome::PropertyViolated(violation) => {
                Ok(self.violation(violation, path, id, depth, state))
            }
            StepOutcome::Terminated => {
                if is_new {
                    self.stats.end_states += 1;
                }
                Ok(Arrival::Leaf)
            }
            StepOutcome::ChoicePoint(generator) => {
                if !is_new {
                    return Ok(Arrival::Leaf);
                }
                if generator.is_empty() {
                    if self.config.check_deadlock && state.is_deadlocked() {
                        let blocked = state
                            .deadlock_candidates()
                            .iter()
                            .map(|t| t.to_string())
                            .collect::<Vec<_>>()
                            .join(", ");
                        let violation = Violation::new(
                            ViolationKind::Deadlock,
                            format!("no thread can run (blocked or waiting: {})", blocked),
                        );
                        return Ok(self.violation(violation, path, id, depth, state));
                    }
                    return Ok(Arrival::Leaf);
                }
                if self.config.max_depth.is_some_and(|max| depth >= max) {
                    debug!(depth, "depth limit reached");
                    self.bound.get_or_insert(BoundReason::DepthLimit);
                    return Ok(Arrival::Leaf);
                }
                Ok(Arrival::Expand(Node {
                    state,
                    id,
                    generator,
                    depth,
                    applied: 0,
                }))
            }
            StepOutcome::Continued => Err(SearchError::Protocol {
                message: "Continued reached the state matcher".to_string(),
            }),
        }
    }

    fn violation(
        &mut self,
        violation: Violation,
        path: &[PathStep],
        state_id: Option<StateId>,
        depth: usize,
        state: ExecutionState,
    ) -> Arrival {
        info!(kind = %violation.kind, depth, "violation found");
        let report = ViolationReport {
            violation,
            path: path.to_vec(),
            state_id,
            depth,
            state,
        };
        for l in &mut self.listeners {
            l.property_violated(&report);
        }
        self.violations.push(report);
        if self.config.halt_on_first_error {
            Arrival::Halt
        } else {
            Arrival::Leaf
        }
    }

    /// Safe-point check of every budget.
    pub(crate) fn check_budget(&mut self) -> Option<BoundReason> {
        if let Some(flag) = &self.stop_flag {
            if flag.load(Ordering::Relaxed) {
                info!("stop requested");
                return Some(BoundReason::Stopped);
            }
        }
        if let Some(max) = self.config.max_states {
            if self.matcher.len() >= max {
                info!(states = self.matcher.len(), "reached state limit");
                return Some(BoundReason::StateLimit);
            }
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            info!("reached time limit");
            return Some(BoundReason::TimeLimit);
        }
        if let Some(limit) = self.config.memory_limit_mb {
            if self.stats.transitions >= self.next_memory_check {
                self.next_memory_check = self.stats.transitions + MEMORY_CHECK_INTERVAL;
                if let Some(memory_mb) = current_memory_mb() {
                    if memory_mb >= limit {
                        info!(memory_mb, limit_mb = limit, "reached memory limit");
                        return Some(BoundReason::MemoryLimit { memory_mb });
                    }
                }
            }
        }
        None
    }

    pub(crate) fn update_frontier(&self, len: usize) {
        if let Some(p) = &self.config.progress {
            p.frontier.store(len, Ordering::Relaxed);
        }
    }
}

pub(crate) fn path_step(generator: &ChoiceGenerator, choice: Choice) -> PathStep {
    PathStep {
        label: generator.label().to_string(),
        kind: generator.kind(),
        choice,
        index: generator.cursor().unwrap_or(0),
        total: generator.total(),
    }
}
