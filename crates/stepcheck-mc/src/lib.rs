//! Explicit-state search engine for the stepcheck model checker.

pub mod choice;
pub mod config;
pub mod fingerprint;
pub mod heuristic;
pub mod interp;
pub mod linearize;
pub mod listener;
pub mod matcher;
pub mod report;
pub mod search;
pub mod visited;

pub use choice::{Choice, ChoiceGenerator, ChoiceKind, ChoiceSource};
pub use config::{Heuristic, MatchMode, ProgressCounters, SearchConfig, SearchStrategy};
pub use fingerprint::{Digest, Fingerprint};
pub use interp::{Interpreter, StepOutcome, Violation, ViolationKind};
pub use linearize::{FieldFilter, LinearizeError, Linearizer};
pub use listener::{PathStep, SearchListener, StateEvent, TracingListener};
pub use matcher::{MatchResult, StateMatcher};
pub use report::{BoundReason, SearchReport, SearchStats, Verdict, ViolationReport};
pub use search::{SearchDriver, SearchError, SearchResult};
pub use visited::{StateId, Visit, VisitedStateTable};
