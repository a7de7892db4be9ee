//! Choice generators: the points of nondeterminism in a search.
//!
//! A generator enumerates its alternatives in a fixed order. Scheduling
//! generators list runnable threads by ascending id; data generators list
//! booleans as `false, true`, ranges ascending and explicit sets in
//! declaration order. Runs are reproducible because this order is.

use std::fmt;
use stepcheck_state::ThreadId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChoiceKind {
    Scheduling,
    Data,
}

impl fmt::Display for ChoiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChoiceKind::Scheduling => "scheduling",
            ChoiceKind::Data => "data",
        })
    }
}

/// One alternative of a generator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Choice {
    Thread(ThreadId),
    Bool(bool),
    Int(i64),
}

impl Choice {
    pub fn as_thread(self) -> Option<ThreadId> {
        match self {
            Choice::Thread(t) => Some(t),
            _ => None,
        }
    }
}

impl fmt::Display for Choice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Choice::Thread(t) => write!(f, "{}", t),
            Choice::Bool(b) => write!(f, "{}", b),
            Choice::Int(n) => write!(f, "{}", n),
        }
    }
}

/// Where a generator's alternatives come from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChoiceSource {
    /// Sorted, deduplicated.
    Threads(Vec<ThreadId>),
    Bools,
    /// `lo, lo + step, ...` up to and including `hi`. `step > 0`.
    IntRange { lo: i64, hi: i64, step: i64 },
    IntSet(Vec<i64>),
    /// `start, start + step, ...` without end.
    IntSequence { start: i64, step: i64 },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChoiceGenerator {
    label: String,
    source: ChoiceSource,
    cursor: Option<usize>,
    processed: usize,
}

impl ChoiceGenerator {
    pub fn new(label: impl Into<String>, source: ChoiceSource) -> Self {
        let source = match source {
            ChoiceSource::Threads(mut threads) => {
                threads.sort_unstable();
                threads.dedup();
                ChoiceSource::Threads(threads)
            }
            ChoiceSource::IntRange { lo, hi, step } => ChoiceSource::IntRange {
                lo,
                hi,
                step: step.max(1),
            },
            ChoiceSource::IntSequence { start, step } => ChoiceSource::IntSequence {
                start,
                step: if step == 0 { 1 } else { step },
            },
            other => other,
        };
        Self {
            label: label.into(),
            source,
            cursor: None,
            processed: 0,
        }
    }

    /// Scheduling choice over `threads`, enumerated in ascending id order.
    pub fn threads(label: impl Into<String>, threads: Vec<ThreadId>) -> Self {
        Self::new(label, ChoiceSource::Threads(threads))
    }

    pub fn bools(label: impl Into<String>) -> Self {
        Self::new(label, ChoiceSource::Bools)
    }

    /// Integers `lo..=hi`.
    pub fn int_range(label: impl Into<String>, lo: i64, hi: i64) -> Self {
        Self::new(label, ChoiceSource::IntRange { lo, hi, step: 1 })
    }

    pub fn int_set(label: impl Into<String>, values: Vec<i64>) -> Self {
        Self::new(label, ChoiceSource::IntSet(values))
    }

    pub fn int_sequence(label: impl Into<String>, start: i64, step: i64) -> Self {
        Self::new(label, ChoiceSource::IntSequence { start, step })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn kind(&self) -> ChoiceKind {
        match self.source {
            ChoiceSource::Threads(_) => ChoiceKind::Scheduling,
            _ => ChoiceKind::Data,
        }
    }

    pub fn source(&self) -> &ChoiceSource {
        &self.source
    }

    /// Number of alternatives, `None` for unbounded sequences.
    pub fn total(&self) -> Option<usize> {
        match &self.source {
            ChoiceSource::Threads(threads) => Some(threads.len()),
            ChoiceSource::Bools => Some(2),
            ChoiceSource::IntRange { lo, hi, step } => {
                if hi < lo {
                    Some(0)
                } else {
                    let span = (*hi as i128 - *lo as i128) / *step as i128;
                    Some(usize::try_from(span + 1).unwrap_or(usize::MAX))
                }
            }
            ChoiceSource::IntSet(values) => Some(values.len()),
            ChoiceSource::IntSequence { .. } => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.total() == Some(0)
    }

    /// The alternative at `index`, if there is one.
    pub fn alternative(&self, index: usize) -> Option<Choice> {
        if self.total().is_some_and(|n| index >= n) {
            return None;
        }
        match &self.source {
            ChoiceSource::Threads(threads) => threads.get(index).copied().map(Choice::Thread),
            ChoiceSource::Bools => Some(Choice::Bool(index == 1)),
            ChoiceSource::IntRange { lo, step, .. } => (index as i64)
                .checked_mul(*step)
                .and_then(|off| lo.checked_add(off))
                .map(Choice::Int),
            ChoiceSource::IntSet(values) => values.get(index).copied().map(Choice::Int),
            ChoiceSource::IntSequence { start, step } => i64::try_from(index)
                .ok()
                .and_then(|i| i.checked_mul(*step))
                .and_then(|off| start.checked_add(off))
                .map(Choice::Int),
        }
    }

    /// Move to the next alternative and return it, or `None` once exhausted.
    pub fn advance(&mut self) -> Option<Choice> {
        let next = self.cursor.map_or(0, |c| c + 1);
        let choice = self.alternative(next)?;
        self.cursor = Some(next);
        self.processed += 1;
        Some(choice)
    }

    /// The alternative at the cursor.
    pub fn current(&self) -> Option<Choice> {
        self.cursor.and_then(|c| self.alternative(c))
    }

    /// Index of the alternative at the cursor.
    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    /// Returns true once every alternative has been visited. Unbounded
    /// sequences are exhausted only when the next value would overflow.
    pub fn is_done(&self) -> bool {
        let next = self.cursor.map_or(0, |c| c + 1);
        self.alternative(next).is_none()
    }

    /// Number of alternatives handed out since the last reset.
    pub fn processed(&self) -> usize {
        self.processed
    }

    pub fn reset(&mut self) {
        self.cursor = None;
        self.processed = 0;
    }
}

impl fmt::Display for ChoiceGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}'", self.kind(), self.label)?;
        match self.total() {
            Some(n) => write!(f, " [{}/{}]", self.processed, n),
            None => write!(f, " [{}/..]", self.processed),
        }
    }
}
