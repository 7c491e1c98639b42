//! Candidate grid enumeration.

use crate::error::{Result, TuneError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Valid range of the low split point in the underlying pipeline.
pub const LOW_DOMAIN: (i32, i32) = (1, 61);
/// Valid range of the mid split point in the underlying pipeline.
pub const MID_DOMAIN: (i32, i32) = (2, 62);

/// One point in the search grid: a pair of band split points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Candidate {
    pub low_end: i32,
    pub mid_end: i32,
}

impl Candidate {
    pub fn new(low_end: i32, mid_end: i32) -> Self {
        Self { low_end, mid_end }
    }

    /// Whether the pair is orderable and inside the pipeline's domain bounds.
    pub fn is_valid(&self) -> bool {
        (LOW_DOMAIN.0..=LOW_DOMAIN.1).contains(&self.low_end)
            && (MID_DOMAIN.0..=MID_DOMAIN.1).contains(&self.mid_end)
            && self.mid_end > self.low_end
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "low={} mid={}", self.low_end, self.mid_end)
    }
}

/// Inclusive search ranges for both parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRanges {
    pub low_min: i32,
    pub low_max: i32,
    pub mid_min: i32,
    pub mid_max: i32,
    pub step: i32,
}

impl Default for SearchRanges {
    fn default() -> Self {
        Self {
            low_min: 8,
            low_max: 24,
            mid_min: 24,
            mid_max: 48,
            step: 2,
        }
    }
}

/// Ordered, duplicate-free list of candidates with the baseline first when it
/// falls outside the natural grid.
#[derive(Debug, Clone)]
pub struct CandidateSpace {
    candidates: Vec<Candidate>,
    members: HashSet<Candidate>,
    baseline: Candidate,
}

impl CandidateSpace {
    /// Enumerate the grid in ascending `low`, then ascending `mid` order.
    pub fn generate(ranges: &SearchRanges, baseline: Candidate) -> Result<Self> {
        if ranges.step < 1 {
            return Err(TuneError::Configuration(format!(
                "step must be >= 1 (got {})",
                ranges.step
            )));
        }
        let step = ranges.step as usize;

        // Walk only the part of each range that intersects the domain, keeping
        // the grid aligned to the operator's starting values.
        let mut candidates = Vec::new();
        let low_start = aligned_start(ranges.low_min, LOW_DOMAIN.0, ranges.step);
        let low_end = i64::from(ranges.low_max.min(LOW_DOMAIN.1));
        for low in (low_start..=low_end).step_by(step) {
            let low = low as i32;
            let mid_base = ranges.mid_min.max(low.saturating_add(1));
            let mid_start = aligned_start(mid_base, MID_DOMAIN.0, ranges.step);
            let mid_end = i64::from(ranges.mid_max.min(MID_DOMAIN.1));
            for mid in (mid_start..=mid_end).step_by(step) {
                let candidate = Candidate::new(low, mid as i32);
                if candidate.is_valid() {
                    candidates.push(candidate);
                }
            }
        }

        if candidates.is_empty() {
            return Err(TuneError::Configuration(format!(
                "no candidates generated from low=[{}, {}] mid=[{}, {}] step={}; check the ranges",
                ranges.low_min, ranges.low_max, ranges.mid_min, ranges.mid_max, ranges.step
            )));
        }

        if !candidates.contains(&baseline) {
            candidates.insert(0, baseline);
        }

        let members = candidates.iter().copied().collect();
        Ok(Self {
            candidates,
            members,
            baseline,
        })
    }

    pub fn baseline(&self) -> Candidate {
        self.baseline
    }

    pub fn contains(&self, candidate: &Candidate) -> bool {
        self.members.contains(candidate)
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Candidate> {
        self.candidates.iter()
    }

    pub fn as_slice(&self) -> &[Candidate] {
        &self.candidates
    }
}

/// First value `>= floor` on the grid `start + k * step`.
fn aligned_start(start: i32, floor: i32, step: i32) -> i64 {
    let (start, floor, step) = (i64::from(start), i64::from(floor), i64::from(step));
    if start >= floor {
        start
    } else {
        start + (floor - start + step - 1) / step * step
    }
}
