//! Candidate evaluation: build, measure size, sample decode latency.

use crate::candidate::Candidate;
use crate::config::TestCase;
use crate::error::{Result, TuneError};
use crate::toolchain::{CommandOutput, Toolchain};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tracing::{debug, error, warn};

/// Measured outcome of one candidate in one pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateResult {
    #[serde(flatten)]
    pub candidate: Candidate,
    /// Size statistic summed over every test case.
    pub total_bytes: u64,
    /// Median of `decode_samples`.
    pub decode_ms: f64,
    #[serde(default)]
    pub decode_samples: Vec<f64>,
}

fn total_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^TOTAL\s+(\d+)\s+").expect("valid TOTAL pattern"))
}

fn decode_ms_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"Average Decode Time:\s*([-+]?\d+(?:\.\d+)?)\s*ms")
            .expect("valid decode time pattern")
    })
}

/// Extract the `TOTAL <bytes>` statistic from size-program output.
pub fn parse_total_bytes(output: &str) -> Option<u64> {
    total_re()
        .captures(output)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Extract a decode latency sample; `None` unless finite and strictly positive.
pub fn parse_decode_ms(output: &str) -> Option<f64> {
    decode_ms_re()
        .captures(output)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .filter(|ms| ms.is_finite() && *ms > 0.0)
}

/// Attempts allowed when collecting `samples` valid latency samples.
pub fn latency_attempt_budget(samples: usize) -> usize {
    samples.saturating_mul(5).max(4)
}

pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        Some(sorted[mid])
    } else {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    }
}

pub struct Evaluator<T> {
    toolchain: T,
}

impl<T: Toolchain> Evaluator<T> {
    pub fn new(toolchain: T) -> Self {
        Self { toolchain }
    }

    pub fn toolchain(&self) -> &T {
        &self.toolchain
    }

    pub fn toolchain_mut(&mut self) -> &mut T {
        &mut self.toolchain
    }

    pub fn into_toolchain(self) -> T {
        self.toolchain
    }

    /// Rebuild the pipeline for `candidate` and measure it.
    ///
    /// Any failure aborts the evaluation; no partial result is produced.
    pub fn evaluate(
        &mut self,
        candidate: Candidate,
        test_cases: &[TestCase],
        latency_samples: usize,
    ) -> Result<CandidateResult> {
        if latency_samples == 0 {
            return Err(TuneError::Configuration(
                "latency sample count must be >= 1".into(),
            ));
        }

        let configured = self.toolchain.configure(&candidate);
        check_build_step(candidate, "configure", configured)?;
        let built = self.toolchain.build();
        check_build_step(candidate, "build", built)?;

        let total_bytes = self.measure_total_bytes(candidate, test_cases)?;
        let decode_samples = self.collect_latency_samples(candidate, latency_samples)?;
        let decode_ms = median(&decode_samples)
            .ok_or_else(|| TuneError::measurement(candidate, "no decode samples collected"))?;

        Ok(CandidateResult {
            candidate,
            total_bytes,
            decode_ms,
            decode_samples,
        })
    }

    fn measure_total_bytes(&mut self, candidate: Candidate, test_cases: &[TestCase]) -> Result<u64> {
        let mut total = 0u64;
        for case in test_cases {
            let output = self
                .toolchain
                .measure_size(case)
                .map_err(|e| TuneError::measurement(candidate, e.to_string()))?;
            if !output.success {
                return Err(TuneError::measurement(
                    candidate,
                    format!(
                        "size program failed for {} Q{} ({}): {}",
                        case.input,
                        case.quality,
                        output.status,
                        output.stderr.trim()
                    ),
                ));
            }
            let bytes = parse_total_bytes(&output.stdout).ok_or_else(|| {
                TuneError::measurement(
                    candidate,
                    format!("TOTAL not found in size output for {} Q{}", case.input, case.quality),
                )
            })?;
            debug!(input = %case.input, quality = case.quality, bytes, "size measured");
            total += bytes;
        }
        Ok(total)
    }

    fn collect_latency_samples(&mut self, candidate: Candidate, wanted: usize) -> Result<Vec<f64>> {
        let budget = latency_attempt_budget(wanted);
        let mut samples = Vec::with_capacity(wanted);
        let mut attempts = 0;

        while samples.len() < wanted && attempts < budget {
            attempts += 1;
            let output = self
                .toolchain
                .measure_latency()
                .map_err(|e| TuneError::measurement(candidate, e.to_string()))?;
            if !output.success {
                return Err(TuneError::measurement(
                    candidate,
                    format!(
                        "latency program failed ({}): {}",
                        output.status,
                        output.stderr.trim()
                    ),
                ));
            }
            match parse_decode_ms(&output.stdout) {
                Some(ms) => samples.push(ms),
                None => warn!(
                    low = candidate.low_end,
                    mid = candidate.mid_end,
                    attempt = attempts,
                    budget,
                    "discarding invalid decode sample"
                ),
            }
        }

        if samples.len() < wanted {
            return Err(TuneError::measurement(
                candidate,
                format!(
                    "failed to collect decode runs: got {} / {} after {} attempts",
                    samples.len(),
                    wanted,
                    attempts
                ),
            ));
        }
        Ok(samples)
    }
}

fn check_build_step(
    candidate: Candidate,
    step: &'static str,
    outcome: Result<CommandOutput>,
) -> Result<()> {
    let output = match outcome {
        Ok(output) => output,
        Err(e) => CommandOutput::failed(format!("could not start: {e}"), "", ""),
    };
    if output.success {
        return Ok(());
    }
    error!(
        low = candidate.low_end,
        mid = candidate.mid_end,
        status = %output.status,
        stdout = %output.stdout,
        stderr = %output.stderr,
        "{} step failed",
        step
    );
    Err(TuneError::Build {
        candidate,
        step,
        status: output.status,
        stdout: output.stdout,
        stderr: output.stderr,
    })
}
