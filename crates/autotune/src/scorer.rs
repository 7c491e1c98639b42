//! Composite scoring of measured candidates against a baseline.
//!
//! Lower is better on both axes. A candidate earns its size ratio, plus a
//! penalty proportional to how far its decode slowdown exceeds the allowed
//! envelope. Slow candidates are not disqualified; the penalty grows without
//! bound and `penalty_weight` decides how hard it bites.

use crate::evaluator::CandidateResult;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Operator-tunable constraint on decode slowdown.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScorePolicy {
    /// Allowed decode slowdown versus baseline (1.05 = +5%).
    pub max_decode_ratio: f64,
    /// Score added per unit of slowdown past `max_decode_ratio`.
    pub penalty_weight: f64,
}

impl Default for ScorePolicy {
    fn default() -> Self {
        Self {
            max_decode_ratio: 1.05,
            penalty_weight: 8.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub composite: f64,
    pub size_ratio: f64,
    pub decode_ratio: f64,
    pub penalty: f64,
}

impl Score {
    /// Ranking order: composite score, then size ratio.
    pub fn rank_cmp(&self, other: &Score) -> Ordering {
        self.composite
            .total_cmp(&other.composite)
            .then_with(|| self.size_ratio.total_cmp(&other.size_ratio))
    }

    pub fn within_envelope(&self, policy: &ScorePolicy) -> bool {
        self.decode_ratio <= policy.max_decode_ratio
    }
}

pub fn score(result: &CandidateResult, baseline: &CandidateResult, policy: &ScorePolicy) -> Score {
    let size_ratio = result.total_bytes as f64 / baseline.total_bytes as f64;
    let decode_ratio = result.decode_ms / baseline.decode_ms;
    let penalty = (decode_ratio - policy.max_decode_ratio).max(0.0) * policy.penalty_weight;
    Score {
        composite: size_ratio + penalty,
        size_ratio,
        decode_ratio,
        penalty,
    }
}

#[derive(Debug, Clone)]
pub struct Ranked<'a> {
    pub result: &'a CandidateResult,
    pub score: Score,
}

/// Sort results best-first. Equal scores keep their input order.
pub fn rank<'a, I>(results: I, baseline: &CandidateResult, policy: &ScorePolicy) -> Vec<Ranked<'a>>
where
    I: IntoIterator<Item = &'a CandidateResult>,
{
    let mut ranked: Vec<Ranked<'a>> = results
        .into_iter()
        .map(|result| Ranked {
            result,
            score: score(result, baseline, policy),
        })
        .collect();
    ranked.sort_by(|a, b| a.score.rank_cmp(&b.score));
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::Candidate;
    use test_case::test_case;

    fn result(low: i32, mid: i32, total_bytes: u64, decode_ms: f64) -> CandidateResult {
        CandidateResult {
            candidate: Candidate::new(low, mid),
            total_bytes,
            decode_ms,
            decode_samples: vec![decode_ms],
        }
    }

    const EPS: f64 = 1e-9;

    #[test]
    fn test_envelope_beats_raw_size() {
        let baseline = result(15, 31, 1000, 10.0);
        let a = result(8, 24, 950, 10.4);
        let b = result(10, 26, 900, 11.5);
        let policy = ScorePolicy {
            max_decode_ratio: 1.05,
            penalty_weight: 8.0,
        };

        let sa = score(&a, &baseline, &policy);
        let sb = score(&b, &baseline, &policy);
        assert!((sa.composite - 0.95).abs() < EPS);
        assert_eq!(sa.penalty, 0.0);
        assert!((sb.penalty - 0.8).abs() < EPS);
        assert!((sb.composite - 1.7).abs() < EPS);

        let order = rank([&b, &a], &baseline, &policy);
        assert_eq!(order[0].result.candidate, a.candidate);
        assert_eq!(order[1].result.candidate, b.candidate);
    }

    #[test]
    fn test_size_is_monotonic() {
        let baseline = result(15, 31, 1000, 10.0);
        let policy = ScorePolicy::default();
        let mut previous: Option<Score> = None;
        for bytes in [500u64, 900, 1000, 1001, 2000] {
            let s = score(&result(8, 24, bytes, 12.0), &baseline, &policy);
            if let Some(p) = previous {
                assert!(s.size_ratio > p.size_ratio);
                assert!(s.composite >= p.composite);
            }
            previous = Some(s);
        }
    }

    #[test_case(9.0 ; "faster than baseline")]
    #[test_case(10.0 ; "equal to baseline")]
    #[test_case(10.5 ; "at the envelope")]
    fn test_no_penalty_inside_envelope(decode_ms: f64) {
        let baseline = result(15, 31, 1000, 10.0);
        let s = score(&result(8, 24, 990, decode_ms), &baseline, &ScorePolicy::default());
        assert_eq!(s.penalty, 0.0);
        assert!(s.within_envelope(&ScorePolicy::default()));
    }

    #[test]
    fn test_penalty_is_linear_in_weight() {
        let baseline = result(15, 31, 1000, 10.0);
        let slow = result(8, 24, 990, 12.0);
        let at = |weight: f64| {
            score(
                &slow,
                &baseline,
                &ScorePolicy {
                    max_decode_ratio: 1.05,
                    penalty_weight: weight,
                },
            )
            .penalty
        };
        assert!(at(1.0) > 0.0);
        assert!((at(2.0) - 2.0 * at(1.0)).abs() < EPS);
        assert!((at(8.0) - 8.0 * at(1.0)).abs() < EPS);
    }

    #[test]
    fn test_ties_break_on_size_ratio() {
        let policy = ScorePolicy {
            max_decode_ratio: 1.0,
            penalty_weight: 1.0,
        };
        let baseline = result(15, 31, 1000, 8.0);
        // Both land on composite 1.0: 0.75 + 0.25 and 1.0 + 0.0.
        let slower_smaller = result(8, 24, 750, 10.0);
        let plain = result(10, 26, 1000, 8.0);
        let order = rank([&plain, &slower_smaller], &baseline, &policy);
        assert_eq!(order[0].result.candidate, slower_smaller.candidate);
    }
}
