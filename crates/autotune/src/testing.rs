//! In-memory toolchain for exercising the search without external tools.
//!
//! [`ScriptedToolchain`] answers every collaborator call from a deterministic
//! size/latency model keyed by candidate, and can be told to fail, garble its
//! output, or raise the interrupt flag at chosen points.

use crate::candidate::Candidate;
use crate::config::TestCase;
use crate::error::Result;
use crate::toolchain::{CommandOutput, Toolchain};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Per-candidate behaviour of the modelled pipeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineModel {
    /// Size reported for every test case.
    pub bytes_per_case: u64,
    pub decode_ms: f64,
}

#[derive(Debug, Clone, Copy)]
enum LatencyFallback {
    Model,
    Fixed(f64),
    Garbage,
}

pub struct ScriptedToolchain {
    models: HashMap<Candidate, PipelineModel>,
    configured: Option<Candidate>,
    built: Option<Candidate>,
    latency_script: VecDeque<Option<f64>>,
    latency_fallback: LatencyFallback,
    failing_builds: HashSet<Candidate>,
    garbled_inputs: HashSet<String>,
    interrupt: Option<(usize, Arc<AtomicBool>)>,
    build_log: Vec<Candidate>,
    size_calls: usize,
    latency_calls: usize,
}

impl Default for ScriptedToolchain {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedToolchain {
    pub fn new() -> Self {
        Self {
            models: HashMap::new(),
            configured: None,
            built: None,
            latency_script: VecDeque::new(),
            latency_fallback: LatencyFallback::Model,
            failing_builds: HashSet::new(),
            garbled_inputs: HashSet::new(),
            interrupt: None,
            build_log: Vec::new(),
            size_calls: 0,
            latency_calls: 0,
        }
    }

    /// Pin the model for one candidate.
    pub fn with_model(mut self, candidate: Candidate, bytes_per_case: u64, decode_ms: f64) -> Self {
        self.models.insert(
            candidate,
            PipelineModel {
                bytes_per_case,
                decode_ms,
            },
        );
        self
    }

    /// Model used for `candidate`; unpinned candidates get a smooth synthetic
    /// surface where wider low bands shrink output and cost decode time.
    pub fn model(&self, candidate: &Candidate) -> PipelineModel {
        if let Some(model) = self.models.get(candidate) {
            return *model;
        }
        let low = candidate.low_end as i64;
        let mid = candidate.mid_end as i64;
        let bytes = 10_000 - 20 * low + 4 * (mid - 31).abs();
        PipelineModel {
            bytes_per_case: bytes.max(1) as u64,
            decode_ms: 10.0 + 0.01 * (low as f64) + 0.002 * (mid as f64),
        }
    }

    pub fn model_bytes(&self, candidate: &Candidate) -> u64 {
        self.model(candidate).bytes_per_case
    }

    /// Latency outputs to hand out before falling back; `None` produces
    /// output without a parsable sample.
    pub fn set_latency_script(&mut self, script: Vec<Option<f64>>) {
        self.latency_script = script.into();
    }

    /// Behaviour once the script is exhausted: `Some(ms)` reports a fixed
    /// sample, `None` reports garbage forever.
    pub fn set_latency_fallback(&mut self, value: Option<f64>) {
        self.latency_fallback = match value {
            Some(ms) => LatencyFallback::Fixed(ms),
            None => LatencyFallback::Garbage,
        };
    }

    pub fn fail_build_for(&mut self, candidate: Candidate) {
        self.failing_builds.insert(candidate);
    }

    pub fn garble_size_for(&mut self, input: &str) {
        self.garbled_inputs.insert(input.to_string());
    }

    /// Raise `flag` and fail the build on the `nth` build (1-based), the way a
    /// terminal interrupt kills the running child.
    pub fn interrupt_on_build(&mut self, nth: usize, flag: Arc<AtomicBool>) {
        self.interrupt = Some((nth, flag));
    }

    pub fn builds(&self) -> usize {
        self.build_log.len()
    }

    /// Candidates in the order they were built.
    pub fn build_log(&self) -> &[Candidate] {
        &self.build_log
    }

    pub fn size_calls(&self) -> usize {
        self.size_calls
    }

    pub fn latency_calls(&self) -> usize {
        self.latency_calls
    }
}

impl Toolchain for ScriptedToolchain {
    fn configure(&mut self, candidate: &Candidate) -> Result<CommandOutput> {
        self.configured = Some(*candidate);
        self.built = None;
        Ok(CommandOutput::ok(format!("-- configured {candidate}\n")))
    }

    fn build(&mut self) -> Result<CommandOutput> {
        let Some(candidate) = self.configured else {
            return Ok(CommandOutput::failed("exit status: 1", "", "build before configure"));
        };
        self.build_log.push(candidate);

        if let Some((nth, flag)) = &self.interrupt {
            if self.build_log.len() == *nth {
                flag.store(true, Ordering::SeqCst);
                return Ok(CommandOutput::failed("signal: 2 (SIGINT)", "", "interrupted"));
            }
        }
        if self.failing_builds.contains(&candidate) {
            return Ok(CommandOutput::failed(
                "exit status: 2",
                "[ 50%] Building CXX object",
                "scripted build failure",
            ));
        }
        self.built = Some(candidate);
        Ok(CommandOutput::ok("[100%] Built target\n"))
    }

    fn measure_size(&mut self, case: &TestCase) -> Result<CommandOutput> {
        self.size_calls += 1;
        let Some(candidate) = self.built else {
            return Ok(CommandOutput::failed("exit status: 127", "", "program not built"));
        };
        if self.garbled_inputs.contains(&case.input) {
            return Ok(CommandOutput::ok("segments: 12\n"));
        }
        let bytes = self.model_bytes(&candidate);
        Ok(CommandOutput::ok(format!(
            "== {} Q{} ==\nTOTAL {} bytes (100.00%)\n",
            case.input, case.quality, bytes
        )))
    }

    fn measure_latency(&mut self) -> Result<CommandOutput> {
        self.latency_calls += 1;
        let Some(candidate) = self.built else {
            return Ok(CommandOutput::failed("exit status: 127", "", "program not built"));
        };
        let sample = match self.latency_script.pop_front() {
            Some(scripted) => scripted,
            None => match self.latency_fallback {
                LatencyFallback::Model => Some(self.model(&candidate).decode_ms),
                LatencyFallback::Fixed(ms) => Some(ms),
                LatencyFallback::Garbage => None,
            },
        };
        Ok(match sample {
            Some(ms) => CommandOutput::ok(format!("Average Decode Time: {ms:.4} ms\n")),
            None => CommandOutput::ok("Average Decode Time: nan ms\n"),
        })
    }
}
