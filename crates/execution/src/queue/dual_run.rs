//! Comparison of primary and shadow runs in dual-run mode.

use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use tokio::sync::Mutex;
use uuid::Uuid;

const MAX_MISMATCHES: usize = 50;

/// How one copy of a job ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Succeeded,
    Failed(String),
}

impl RunOutcome {
    fn same_kind(&self, other: &Self) -> bool {
        matches!(
            (self, other),
            (Self::Succeeded, Self::Succeeded) | (Self::Failed(_), Self::Failed(_))
        )
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Mismatch {
    pub job_id: Uuid,
    pub job_type: String,
    pub primary: RunOutcome,
    pub shadow: RunOutcome,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DualRunReport {
    pub matched: u64,
    pub mismatched: u64,
    /// Jobs with only one side finished so far.
    pub awaiting_pair: usize,
    /// Most recent mismatches, oldest first.
    pub recent_mismatches: Vec<Mismatch>,
}

#[derive(Default)]
struct State {
    /// Outcome of whichever side finished first, keyed by job id.
    halves: HashMap<Uuid, (bool, RunOutcome)>,
    matched: u64,
    mismatched: u64,
    mismatches: VecDeque<Mismatch>,
}

/// Pairs the outcome of a job with the outcome of its shadow copy.
///
/// Pairing is by job id and best effort only: a side that never finishes
/// leaves its half waiting forever and nothing is double-committed because
/// shadow handlers run dry.
#[derive(Default)]
pub struct DualRunTracker {
    state: Mutex<State>,
}

impl DualRunTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, job_id: Uuid, job_type: &str, shadow: bool, outcome: RunOutcome) {
        let mut state = self.state.lock().await;
        match state.halves.remove(&job_id) {
            Some((other_shadow, other)) if other_shadow != shadow => {
                let (primary, shadow_outcome) = if shadow { (other, outcome) } else { (outcome, other) };
                if primary.same_kind(&shadow_outcome) {
                    state.matched += 1;
                } else {
                    state.mismatched += 1;
                    tracing::warn!(job_id = %job_id, job_type = job_type, "Dual-run outcomes differ");
                    state.mismatches.push_back(Mismatch {
                        job_id,
                        job_type: job_type.to_string(),
                        primary,
                        shadow: shadow_outcome,
                    });
                    if state.mismatches.len() > MAX_MISMATCHES {
                        state.mismatches.pop_front();
                    }
                }
            }
            // A retried side finishing again replaces its own half.
            Some(_) | None => {
                state.halves.insert(job_id, (shadow, outcome));
            }
        }
    }

    pub async fn report(&self) -> DualRunReport {
        let state = self.state.lock().await;
        DualRunReport {
            matched: state.matched,
            mismatched: state.mismatched,
            awaiting_pair: state.halves.len(),
            recent_mismatches: state.mismatches.iter().cloned().collect(),
        }
    }
}
