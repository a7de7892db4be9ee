//! Best-first search over a priority frontier.
//!
//! Every expanded node is stored with its snapshot and the path that reached
//! it. Nodes are taken lowest priority value first, ties in insertion order.
//! Because consecutive nodes are unrelated, the interpreter is restored before
//! every alternative.

use crate::config::Heuristic;
use crate::interp::Interpreter;
use crate::listener::PathStep;
use crate::report::BoundReason;
use crate::search::{path_step, Arrival, Node, SearchDriver, SearchResult};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use stepcheck_state::ExecutionState;
use tracing::{debug, trace};

struct FrontierNode {
    node: Node,
    path: Vec<PathStep>,
}

/// Assigns frontier priorities; smaller values are explored first.
pub struct Prioritizer {
    heuristic: Heuristic,
    rng: Option<StdRng>,
}

impl Prioritizer {
    pub fn new(heuristic: Heuristic) -> Self {
        let rng = match heuristic {
            Heuristic::Random { seed } => Some(StdRng::seed_from_u64(seed)),
            Heuristic::BreadthFirst | Heuristic::MostBlocked => None,
        };
        Self { heuristic, rng }
    }

    pub fn priority(&mut self, state: &ExecutionState, depth: usize) -> i64 {
        match (&self.heuristic, &mut self.rng) {
            (Heuristic::BreadthFirst, _) => depth as i64,
            (Heuristic::MostBlocked, _) => -(state.num_blocked_or_waiting() as i64),
            (Heuristic::Random { .. }, Some(rng)) => rng.gen::<u32>() as i64,
            (Heuristic::Random { .. }, None) => 0,
        }
    }
}

impl<I: Interpreter> SearchDriver<I> {
    pub(crate) fn best_first(&mut self, root: Node, heuristic: Heuristic) -> SearchResult<()> {
        let mut prioritizer = Prioritizer::new(heuristic);
        let mut frontier: BTreeMap<(i64, u64), FrontierNode> = BTreeMap::new();
        let mut seq: u64 = 0;
        // The interpreter still sits at the root when the search begins.
        let mut in_place = true;
        let root_priority = prioritizer.priority(&root.state, root.depth);
        frontier.insert(
            (root_priority, seq),
            FrontierNode {
                node: root,
                path: Vec::new(),
            },
        );

        'search: while let Some((_, entry)) = frontier.pop_first() {
            let FrontierNode { mut node, path } = entry;
            trace!(id = ?node.id, depth = node.depth, "expanding");

            loop {
                if let Some(reason) = self.check_budget() {
                    self.bound = Some(reason);
                    break 'search;
                }
                self.update_frontier(frontier.len() + 1);
                let Some(choice) = node.generator.advance() else {
                    break;
                };
                if !in_place {
                    self.restore(&node, &path)?;
                }
                in_place = false;
                node.applied += 1;

                let mut child_path = path.clone();
                child_path.push(path_step(&node.generator, choice));

                let Some(outcome) = self.apply(&choice)? else {
                    break 'search;
                };
                match self.arrive(outcome, &child_path, node.depth + 1)? {
                    Arrival::Expand(child) => {
                        seq += 1;
                        let priority = prioritizer.priority(&child.state, child.depth);
                        frontier.insert(
                            (priority, seq),
                            FrontierNode {
                                node: child,
                                path: child_path,
                            },
                        );
                        if self.config.queue_limit.is_some_and(|max| frontier.len() > max) {
                            frontier.pop_last();
                            debug!(limit = ?self.config.queue_limit, "frontier full, dropped worst node");
                            self.bound.get_or_insert(BoundReason::QueueLimit);
                        }
                    }
                    Arrival::Leaf => {}
                    Arrival::Halt => break 'search,
                }
            }
            self.stats.backtracks += 1;
        }
        Ok(())
    }
}
