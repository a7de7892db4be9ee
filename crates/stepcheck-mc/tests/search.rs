//! Search driver tests against a small scripted interpreter.

use std::convert::Infallible;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use stepcheck_mc::{
    BoundReason, Choice, ChoiceGenerator, Heuristic, Interpreter, SearchConfig, SearchDriver,
    SearchListener, SearchReport, SearchStrategy, StateEvent, StepOutcome, Verdict, Violation,
    ViolationKind, ViolationReport,
};
use stepcheck_state::{ClassTable, ExecutionState, Frame, ThreadId};

/// `threads` threads, each taking `steps` single-step transitions.
///
/// Optionally flags a violation when the per-thread progress equals `bad`,
/// and optionally interrupts every step once with `Continued`.
struct Steppers {
    classes: ClassTable,
    state: ExecutionState,
    threads: usize,
    steps: usize,
    bad: Option<Vec<usize>>,
    interrupt: bool,
    interrupted: bool,
    restores: usize,
}

impl Steppers {
    fn new(threads: usize, steps: usize) -> Self {
        Self {
            classes: ClassTable::new(),
            state: ExecutionState::new(),
            threads,
            steps,
            bad: None,
            interrupt: false,
            interrupted: false,
            restores: 0,
        }
    }

    fn progress(&self) -> Vec<usize> {
        self.state
            .threads
            .values()
            .map(|t| t.top_frame().map_or(self.steps, |f| f.pc))
            .collect()
    }

    fn outcome(&self) -> StepOutcome {
        if self.bad.as_ref() == Some(&self.progress()) {
            return StepOutcome::PropertyViolated(Violation::new(
                ViolationKind::AssertionFailed,
                format!("reached {:?}", self.progress()),
            ));
        }
        if self.state.all_terminated() {
            StepOutcome::Terminated
        } else {
            StepOutcome::ChoicePoint(ChoiceGenerator::threads(
                "schedule",
                self.state.runnable_threads(),
            ))
        }
    }
}

impl Interpreter for Steppers {
    type Error = Infallible;

    fn classes(&self) -> &ClassTable {
        &self.classes
    }

    fn start(&mut self) -> Result<StepOutcome, Infallible> {
        self.state = ExecutionState::new();
        for i in 0..self.threads {
            let t = self.state.add_thread(format!("t{}", i));
            let thread = self.state.thread_mut(t).unwrap();
            if self.steps == 0 {
                thread.terminate();
            } else {
                thread.frames.push(Frame::new("run", vec![]));
            }
        }
        Ok(self.outcome())
    }

    fn step(&mut self, choice: &Choice) -> Result<StepOutcome, Infallible> {
        if self.interrupt && !self.interrupted {
            self.interrupted = true;
            return Ok(StepOutcome::Continued);
        }
        self.interrupted = false;
        let t = choice.as_thread().unwrap();
        let steps = self.steps;
        let thread = self.state.thread_mut(t).unwrap();
        let frame = thread.top_frame_mut().unwrap();
        frame.pc += 1;
        if frame.pc == steps {
            thread.terminate();
        }
        Ok(self.outcome())
    }

    fn capture_state(&self) -> ExecutionState {
        self.state.clone()
    }

    fn restore_state(&mut self, state: &ExecutionState) -> Result<(), Infallible> {
        self.state = state.clone();
        self.interrupted = false;
        self.restores += 1;
        Ok(())
    }
}

#[derive(Default)]
struct Recorded {
    started: usize,
    finished: usize,
    advanced: Vec<(usize, bool)>,
    backtracked: usize,
    violations: usize,
}

#[derive(Clone, Default)]
struct Recorder(Arc<Mutex<Recorded>>);

impl SearchListener for Recorder {
    fn search_started(&mut self, _config: &SearchConfig) {
        self.0.lock().unwrap().started += 1;
    }

    fn state_advanced(&mut self, event: &StateEvent<'_>) {
        self.0
            .lock()
            .unwrap()
            .advanced
            .push((event.depth, event.is_new));
    }

    fn state_backtracked(&mut self, _event: &StateEvent<'_>) {
        self.0.lock().unwrap().backtracked += 1;
    }

    fn property_violated(&mut self, _report: &ViolationReport) {
        self.0.lock().unwrap().violations += 1;
    }

    fn search_finished(&mut self, _report: &SearchReport) {
        self.0.lock().unwrap().finished += 1;
    }
}

fn run(interp: Steppers, config: SearchConfig) -> SearchReport {
    SearchDriver::new(interp, config).run().unwrap()
}

#[test]
fn test_two_single_step_threads() {
    let report = run(Steppers::new(2, 1), SearchConfig::default());
    assert_eq!(report.verdict(), Verdict::PropertyHolds);
    assert_eq!(report.stats.unique_states, 4);
    assert_eq!(report.stats.revisited, 1);
    assert_eq!(report.stats.end_states, 1);
    assert_eq!(report.stats.transitions, 4);
    assert_eq!(report.stats.max_depth, 2);
}

#[test]
fn test_grid_state_count() {
    // (steps + 1)^threads distinct progress vectors.
    let report = run(Steppers::new(3, 2), SearchConfig::default());
    assert_eq!(report.stats.unique_states, 27);
    assert!(report.is_complete());
}

#[test]
fn test_no_threads_is_immediately_done() {
    let report = run(Steppers::new(2, 0), SearchConfig::default());
    assert_eq!(report.stats.unique_states, 1);
    assert_eq!(report.stats.end_states, 1);
    assert_eq!(report.stats.transitions, 0);
}

#[test]
fn test_violation_path_and_halt() {
    let mut interp = Steppers::new(2, 2);
    interp.bad = Some(vec![0, 1]);
    let report = run(interp, SearchConfig::default());
    assert_eq!(report.verdict(), Verdict::ViolationFound);
    assert_eq!(report.violations.len(), 1);
    let v = &report.violations[0];
    assert_eq!(v.violation.kind, ViolationKind::AssertionFailed);
    assert_eq!(
        v.path.iter().map(|s| s.choice).collect::<Vec<_>>(),
        vec![Choice::Thread(ThreadId(1))]
    );
    assert_eq!(v.depth, 1);
    assert!(report.to_string().starts_with("violation found at path schedule=T1 (2/2)"));
}

#[test]
fn test_continue_after_violation() {
    let mut interp = Steppers::new(2, 2);
    interp.bad = Some(vec![1, 1]);
    let config = SearchConfig {
        halt_on_first_error: false,
        ..Default::default()
    };
    let report = run(interp, config);
    // [1, 1] is reached from [0, 1] and from [1, 0].
    assert_eq!(report.violations.len(), 2);
    assert!(report.is_complete());
}

#[test]
fn test_depth_first_order_prefers_lower_thread() {
    let recorder = Recorder::default();
    let mut driver = SearchDriver::new(Steppers::new(2, 1), SearchConfig::default());
    driver.add_listener(Box::new(recorder.clone()));
    driver.run().unwrap();
    let rec = recorder.0.lock().unwrap();
    assert_eq!(rec.started, 1);
    assert_eq!(rec.finished, 1);
    // root, T0, T0;T1, T1, T1;T0 (revisit)
    assert_eq!(
        rec.advanced,
        vec![(0, true), (1, true), (2, true), (1, true), (2, false)]
    );
    assert_eq!(rec.backtracked, 1);
}

#[test]
fn test_restores_before_each_later_alternative() {
    let mut driver = SearchDriver::new(Steppers::new(2, 1), SearchConfig::default());
    driver.run().unwrap();
    assert_eq!(driver.interpreter().restores, 1);
}

#[test]
fn test_continued_steps_are_resumed() {
    let mut interp = Steppers::new(2, 1);
    interp.interrupt = true;
    let report = run(interp, SearchConfig::default());
    assert_eq!(report.stats.unique_states, 4);
    assert_eq!(report.stats.transitions, 8);
}

#[test]
fn test_state_limit_is_incomplete() {
    let config = SearchConfig {
        max_states: Some(5),
        ..Default::default()
    };
    let report = run(Steppers::new(3, 2), config);
    assert_eq!(report.bound, Some(BoundReason::StateLimit));
    assert_eq!(report.verdict(), Verdict::Incomplete);
    assert_eq!(report.stats.unique_states, 5);
    assert!(report.to_string().contains("result incomplete"));
}

#[test]
fn test_depth_limit_is_incomplete() {
    let config = SearchConfig {
        max_depth: Some(2),
        ..Default::default()
    };
    let report = run(Steppers::new(2, 3), config);
    assert_eq!(report.bound, Some(BoundReason::DepthLimit));
    assert_eq!(report.stats.max_depth, 2);
}

#[test]
fn test_stop_flag() {
    let mut driver = SearchDriver::new(Steppers::new(2, 2), SearchConfig::default());
    driver.set_stop_flag(Arc::new(AtomicBool::new(true)));
    let report = driver.run().unwrap();
    assert_eq!(report.bound, Some(BoundReason::Stopped));
    assert_eq!(report.verdict(), Verdict::Incomplete);
}

#[test]
fn test_time_limit_is_incomplete() {
    for strategy in [
        SearchStrategy::DepthFirst,
        SearchStrategy::Heuristic(Heuristic::BreadthFirst),
    ] {
        let config = SearchConfig {
            strategy,
            max_time_secs: Some(0),
            ..Default::default()
        };
        let report = run(Steppers::new(3, 2), config);
        assert_eq!(report.bound, Some(BoundReason::TimeLimit), "{strategy:?}");
        assert_eq!(report.verdict(), Verdict::Incomplete);
        assert_eq!(report.stats.unique_states, 1);
    }
}

#[test]
fn test_heuristics_cover_same_states() {
    for heuristic in [
        Heuristic::BreadthFirst,
        Heuristic::MostBlocked,
        Heuristic::Random { seed: 3 },
    ] {
        let config = SearchConfig {
            strategy: SearchStrategy::Heuristic(heuristic),
            ..Default::default()
        };
        let report = run(Steppers::new(3, 2), config);
        assert_eq!(report.stats.unique_states, 27, "{heuristic:?}");
        assert!(report.is_complete());
    }
}

#[test]
fn test_breadth_first_finds_shallow_violation_first() {
    let mut interp = Steppers::new(2, 3);
    interp.bad = Some(vec![1, 0]);
    let config = SearchConfig {
        strategy: SearchStrategy::Heuristic(Heuristic::BreadthFirst),
        ..Default::default()
    };
    let report = run(interp, config);
    assert_eq!(report.violations[0].depth, 1);
    assert!(report.stats.unique_states <= 3);
}

#[test]
fn test_random_heuristic_is_reproducible() {
    let order = |seed| {
        let recorder = Recorder::default();
        let config = SearchConfig {
            strategy: SearchStrategy::Heuristic(Heuristic::Random { seed }),
            ..Default::default()
        };
        let mut driver = SearchDriver::new(Steppers::new(3, 2), config);
        driver.add_listener(Box::new(recorder.clone()));
        driver.run().unwrap();
        let advanced = recorder.0.lock().unwrap().advanced.clone();
        advanced
    };
    assert_eq!(order(42), order(42));
}

#[test]
fn test_queue_limit_drops_nodes() {
    let config = SearchConfig {
        strategy: SearchStrategy::Heuristic(Heuristic::BreadthFirst),
        queue_limit: Some(1),
        ..Default::default()
    };
    let report = run(Steppers::new(3, 2), config);
    assert_eq!(report.bound, Some(BoundReason::QueueLimit));
    assert!(report.stats.unique_states < 27);
}

#[test]
fn test_hash_only_matching_counts_same_states() {
    let config = SearchConfig {
        match_mode: stepcheck_mc::MatchMode::HashOnly,
        ..Default::default()
    };
    let report = run(Steppers::new(3, 2), config);
    assert_eq!(report.stats.unique_states, 27);
    assert!(report.to_string().contains("hash-only"));
}

#[test]
fn test_run_twice_resets() {
    let mut driver = SearchDriver::new(Steppers::new(2, 1), SearchConfig::default());
    let first = driver.run().unwrap();
    let second = driver.run().unwrap();
    assert_eq!(first.stats.unique_states, second.stats.unique_states);
    assert_eq!(second.stats.revisited, 1);
}
