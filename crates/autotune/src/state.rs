//! In-progress search state.

use crate::candidate::{Candidate, CandidateSpace};
use crate::evaluator::CandidateResult;
use crate::scorer::{rank, ScorePolicy};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Where the two-pass search currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchPhase {
    Pass1Running,
    Pass1Complete,
    Pass2Running,
    Pass2Complete,
    Done,
    Interrupted,
    Failed,
}

impl SearchPhase {
    pub fn is_running(&self) -> bool {
        matches!(self, SearchPhase::Pass1Running | SearchPhase::Pass2Running)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SearchPhase::Done | SearchPhase::Interrupted | SearchPhase::Failed
        )
    }

    fn in_pass2(&self) -> bool {
        matches!(
            self,
            SearchPhase::Pass2Running | SearchPhase::Pass2Complete | SearchPhase::Done
        )
    }
}

impl fmt::Display for SearchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SearchPhase::Pass1Running => "pass1-running",
            SearchPhase::Pass1Complete => "pass1-complete",
            SearchPhase::Pass2Running => "pass2-running",
            SearchPhase::Pass2Complete => "pass2-complete",
            SearchPhase::Done => "done",
            SearchPhase::Interrupted => "interrupted",
            SearchPhase::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Results gathered so far. Each candidate appears at most once per pass, and
/// only candidates with a pass-1 result may appear in pass 2.
#[derive(Debug, Clone)]
pub struct SearchState {
    pub phase: SearchPhase,
    pass1: Vec<CandidateResult>,
    pass2: Vec<CandidateResult>,
    /// Anchor of the pass currently being ranked.
    pub baseline: Option<CandidateResult>,
    pub best: Option<CandidateResult>,
}

impl Default for SearchState {
    fn default() -> Self {
        Self::new()
    }
}

impl SearchState {
    pub fn new() -> Self {
        Self {
            phase: SearchPhase::Pass1Running,
            pass1: Vec::new(),
            pass2: Vec::new(),
            baseline: None,
            best: None,
        }
    }

    /// Rebuild state from checkpointed results, keeping only candidates that
    /// still belong to `space`. Duplicates keep their first occurrence.
    pub fn resume(
        pass1: Vec<CandidateResult>,
        pass2: Vec<CandidateResult>,
        space: &CandidateSpace,
    ) -> Self {
        let mut state = Self::new();
        for result in pass1 {
            if space.contains(&result.candidate) {
                state.record_pass1(result);
            }
        }
        for result in pass2 {
            if space.contains(&result.candidate) {
                state.record_pass2(result);
            }
        }
        state
    }

    pub fn pass1(&self) -> &[CandidateResult] {
        &self.pass1
    }

    pub fn pass2(&self) -> &[CandidateResult] {
        &self.pass2
    }

    pub fn pass1_result(&self, candidate: &Candidate) -> Option<&CandidateResult> {
        self.pass1.iter().find(|r| r.candidate == *candidate)
    }

    pub fn pass2_result(&self, candidate: &Candidate) -> Option<&CandidateResult> {
        self.pass2.iter().find(|r| r.candidate == *candidate)
    }

    pub fn pass1_candidates(&self) -> HashSet<Candidate> {
        self.pass1.iter().map(|r| r.candidate).collect()
    }

    /// Returns `false` if the candidate already had a pass-1 result.
    pub fn record_pass1(&mut self, result: CandidateResult) -> bool {
        if self.pass1_result(&result.candidate).is_some() {
            return false;
        }
        self.pass1.push(result);
        true
    }

    /// Returns `false` if the candidate is already in pass 2 or was never
    /// measured in pass 1.
    pub fn record_pass2(&mut self, result: CandidateResult) -> bool {
        if self.pass2_result(&result.candidate).is_some()
            || self.pass1_result(&result.candidate).is_none()
        {
            return false;
        }
        self.pass2.push(result);
        true
    }

    /// Recompute the best-so-far result of the active pass against that
    /// pass's baseline, when the baseline has been measured.
    ///
    /// Pass-2 results are never scored against the pass-1 baseline: until the
    /// baseline is re-measured in pass 2, `best` and `baseline` are unset.
    pub fn refresh_best(&mut self, baseline: &Candidate, policy: &ScorePolicy) {
        let (results, anchor) = if self.phase.in_pass2() {
            (&self.pass2, self.pass2_result(baseline).cloned())
        } else {
            (&self.pass1, self.pass1_result(baseline).cloned())
        };

        let Some(anchor) = anchor else {
            if self.phase.in_pass2() {
                self.best = None;
                self.baseline = None;
            }
            return;
        };
        let best = rank(results.iter(), &anchor, policy)
            .first()
            .map(|ranked| ranked.result.clone());
        if best.is_some() {
            self.best = best;
        }
        self.baseline = Some(anchor);
    }
}
