//! State matching: canonical fingerprints plus the visited table.

use crate::config::MatchMode;
use crate::fingerprint::Fingerprint;
use crate::linearize::{FieldFilter, LinearizeError, Linearizer};
use crate::visited::{Visit, VisitedStateTable};
use stepcheck_state::{ClassTable, ExecutionState};

#[derive(Clone, Debug)]
pub struct MatchResult {
    pub fingerprint: Fingerprint,
    pub visit: Visit,
}

pub struct StateMatcher {
    filter: FieldFilter,
    table: VisitedStateTable,
}

impl StateMatcher {
    pub fn new(mode: MatchMode, excluded_fields: &[String]) -> Self {
        Self {
            filter: FieldFilter::new(excluded_fields),
            table: VisitedStateTable::new(mode),
        }
    }

    pub fn filter(&self) -> &FieldFilter {
        &self.filter
    }

    pub fn table(&self) -> &VisitedStateTable {
        &self.table
    }

    pub fn fingerprint(
        &self,
        classes: &ClassTable,
        state: &ExecutionState,
    ) -> Result<Fingerprint, LinearizeError> {
        Linearizer::new(classes, &self.filter).linearize_state(state)
    }

    /// Returns true if an isomorphic state was already recorded.
    pub fn is_visited(
        &self,
        classes: &ClassTable,
        state: &ExecutionState,
    ) -> Result<bool, LinearizeError> {
        Ok(self.table.contains(&self.fingerprint(classes, state)?))
    }

    /// Fingerprint `state` and record it.
    pub fn check(
        &mut self,
        classes: &ClassTable,
        state: &ExecutionState,
    ) -> Result<MatchResult, LinearizeError> {
        let fingerprint = self.fingerprint(classes, state)?;
        let visit = self.table.insert(fingerprint.clone());
        Ok(MatchResult { fingerprint, visit })
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Start over, for a new run.
    pub fn reset(&mut self) {
        let mode = self.table.mode();
        self.table.clear(mode);
    }
}
