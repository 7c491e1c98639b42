//! Search configuration.
//!
//! Everything the search needs is carried in these structures and handed to
//! the controller explicitly. Nothing is read from the process environment.

use crate::candidate::{Candidate, SearchRanges};
use crate::error::{Result, TuneError};
use crate::scorer::ScorePolicy;
use serde::{Deserialize, Serialize};

/// One size-measurement input: an input file and the quality level to encode it at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    pub input: String,
    pub quality: u32,
}

impl TestCase {
    pub fn new(input: impl Into<String>, quality: u32) -> Self {
        Self {
            input: input.into(),
            quality,
        }
    }
}

/// Tunable parameters of the two-pass search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    pub ranges: SearchRanges,
    /// Reference point all ratios are computed against.
    pub baseline: Candidate,
    /// How many pass-1 leaders are re-measured in pass 2.
    pub top_k: usize,
    /// Latency samples per candidate in the coarse pass.
    pub samples_pass1: usize,
    /// Latency samples per candidate in the refined pass.
    pub samples_pass2: usize,
    pub policy: ScorePolicy,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            ranges: SearchRanges::default(),
            baseline: Candidate::new(15, 31),
            top_k: 6,
            samples_pass1: 1,
            samples_pass2: 3,
            policy: ScorePolicy::default(),
        }
    }
}

impl SearchConfig {
    /// Number of candidates carried into pass 2 (never less than one).
    pub fn effective_top_k(&self) -> usize {
        self.top_k.max(1)
    }

    pub fn validate(&self) -> Result<()> {
        if self.samples_pass1 == 0 || self.samples_pass2 == 0 {
            return Err(TuneError::Configuration(
                "latency sample counts must be >= 1".into(),
            ));
        }
        if !self.baseline.is_valid() {
            return Err(TuneError::Configuration(format!(
                "baseline {} is outside the valid parameter domain",
                self.baseline
            )));
        }
        if !(self.policy.max_decode_ratio.is_finite() && self.policy.max_decode_ratio > 0.0) {
            return Err(TuneError::Configuration(format!(
                "max_decode_ratio must be a positive number (got {})",
                self.policy.max_decode_ratio
            )));
        }
        if !(self.policy.penalty_weight.is_finite() && self.policy.penalty_weight >= 0.0) {
            return Err(TuneError::Configuration(format!(
                "penalty_weight must be a non-negative number (got {})",
                self.policy.penalty_weight
            )));
        }
        Ok(())
    }
}
