//! Two-pass search controller.
//!
//! Pass 1 measures every candidate cheaply. Pass 2 re-measures the pass-1
//! leaders (and the baseline) with more latency samples, and the final
//! recommendation comes from the pass-2 ranking. State is checkpointed after
//! every evaluation so an interrupted or failed run can be resumed.

use crate::candidate::{Candidate, CandidateSpace};
use crate::checkpoint::{CheckpointStore, RunStatus};
use crate::config::{SearchConfig, TestCase};
use crate::error::{Result, TuneError};
use crate::evaluator::{CandidateResult, Evaluator};
use crate::scorer::{rank, Score};
use crate::state::{SearchPhase, SearchState};
use crate::toolchain::Toolchain;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

/// A result together with its score against the relevant baseline.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredResult {
    pub result: CandidateResult,
    pub score: Score,
}

#[derive(Debug, Clone)]
pub struct SearchSummary {
    /// Pass-1 baseline measurement.
    pub pass1_baseline: CandidateResult,
    /// Pass-1 leaders carried into pass 2, best first.
    pub pass1_top: Vec<ScoredResult>,
    /// Pass-2 baseline measurement that anchors the final ranking.
    pub baseline: CandidateResult,
    /// Every pass-2 result, best first.
    pub ranking: Vec<ScoredResult>,
    pub recommended: ScoredResult,
    /// Evaluator calls made by this run (resumed results excluded).
    pub evaluations: usize,
    pub elapsed_sec: f64,
}

#[derive(Debug, Clone)]
pub enum SearchOutcome {
    Completed(SearchSummary),
    /// The operator interrupted the run; partial state was checkpointed.
    Interrupted { stage: String },
}

enum Flow {
    Finished(SearchSummary),
    Interrupted(String),
}

pub struct SearchController<T> {
    config: SearchConfig,
    test_cases: Vec<TestCase>,
    evaluator: Evaluator<T>,
    store: Option<CheckpointStore>,
    interrupt: Arc<AtomicBool>,
    state: SearchState,
    evaluations: usize,
}

impl<T: Toolchain> SearchController<T> {
    pub fn new(config: SearchConfig, test_cases: Vec<TestCase>, toolchain: T) -> Self {
        Self {
            config,
            test_cases,
            evaluator: Evaluator::new(toolchain),
            store: None,
            interrupt: Arc::new(AtomicBool::new(false)),
            state: SearchState::new(),
            evaluations: 0,
        }
    }

    /// Persist progress through `store` after every evaluation.
    pub fn with_checkpoint(mut self, store: CheckpointStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Flag checked between evaluations; raising it stops the search.
    pub fn with_interrupt_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = flag;
        self
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn state(&self) -> &SearchState {
        &self.state
    }

    pub fn evaluator(&self) -> &Evaluator<T> {
        &self.evaluator
    }

    pub fn into_toolchain(self) -> T {
        self.evaluator.into_toolchain()
    }

    /// Run the whole search. With `resume`, results already recorded in the
    /// checkpoint are reused instead of being measured again.
    pub fn run(&mut self, resume: bool) -> Result<SearchOutcome> {
        self.config.validate()?;
        if self.test_cases.is_empty() {
            return Err(TuneError::Configuration(
                "at least one test case is required".into(),
            ));
        }
        let space = CandidateSpace::generate(&self.config.ranges, self.config.baseline)?;

        self.state = SearchState::new();
        self.evaluations = 0;
        if resume {
            let store = self.store.as_ref().ok_or_else(|| {
                TuneError::Configuration("resume requires a checkpoint path".into())
            })?;
            let (pass1, pass2) = CheckpointStore::load(store.path())?;
            let loaded = (pass1.len(), pass2.len());
            self.state = SearchState::resume(pass1, pass2, &space);
            info!(
                path = %store.path().display(),
                pass1 = self.state.pass1().len(),
                pass2 = self.state.pass2().len(),
                dropped_pass1 = loaded.0 - self.state.pass1().len(),
                dropped_pass2 = loaded.1 - self.state.pass2().len(),
                "resuming from checkpoint"
            );
        }

        info!(
            candidates = space.len(),
            cases = self.test_cases.len(),
            baseline = %space.baseline(),
            top_k = self.config.effective_top_k(),
            "starting band split search"
        );

        match self.drive(&space) {
            Ok(Flow::Finished(summary)) => Ok(SearchOutcome::Completed(summary)),
            Ok(Flow::Interrupted(stage)) => self.mark_interrupted(stage),
            Err(e) if self.interrupt.load(Ordering::SeqCst) => {
                warn!(error = %e, "evaluation aborted by interrupt");
                self.mark_interrupted(format!("interrupted ({})", e.kind()))
            }
            Err(e) => {
                error!(error = %e, phase = %self.state.phase, "search failed");
                self.state.phase = SearchPhase::Failed;
                if let Err(save_err) =
                    self.persist(RunStatus::Failed, "failed", Some(&e.to_string()))
                {
                    error!(error = %save_err, "could not record failed checkpoint");
                }
                Err(e)
            }
        }
    }

    fn drive(&mut self, space: &CandidateSpace) -> Result<Flow> {
        let baseline = space.baseline();

        // Pass 1: every candidate, cheap latency sampling.
        self.state.phase = SearchPhase::Pass1Running;
        let recorded = self.state.pass1_candidates();
        let total = space.len();
        for (idx, candidate) in space.iter().enumerate() {
            if recorded.contains(candidate) {
                info!("[pass1 {}/{}] {} ... skip(resume)", idx + 1, total, candidate);
                continue;
            }
            if self.interrupted() {
                return Ok(Flow::Interrupted(format!("pass1 ({}/{})", idx, total)));
            }
            info!("[pass1 {}/{}] {} ...", idx + 1, total, candidate);
            let result = self.evaluate(*candidate, self.config.samples_pass1)?;
            self.state.record_pass1(result);
            self.state.refresh_best(&baseline, &self.config.policy);
            let stage = format!("pass1 ({}/{})", self.state.pass1().len(), total);
            self.persist(RunStatus::Running, &stage, None)?;
        }

        self.state.phase = SearchPhase::Pass1Complete;
        let pass1_baseline = anchor(self.state.pass1(), &baseline)?;
        let pass1_top: Vec<ScoredResult> = rank(
            self.state.pass1().iter(),
            &pass1_baseline,
            &self.config.policy,
        )
        .into_iter()
        .take(self.config.effective_top_k())
        .map(|ranked| ScoredResult {
            result: ranked.result.clone(),
            score: ranked.score,
        })
        .collect();
        for scored in &pass1_top {
            info!(
                low = scored.result.candidate.low_end,
                mid = scored.result.candidate.mid_end,
                score = scored.score.composite,
                size_ratio = scored.score.size_ratio,
                decode_ratio = scored.score.decode_ratio,
                "selected for pass 2"
            );
        }

        // Pass 2: re-measure the leaders, then make sure the baseline is anchored.
        self.state.phase = SearchPhase::Pass2Running;
        let selected: Vec<Candidate> = pass1_top.iter().map(|s| s.result.candidate).collect();
        for (idx, candidate) in selected.iter().enumerate() {
            if self.state.pass2_result(candidate).is_some() {
                info!("[pass2 {}/{}] {} ... skip(resume)", idx + 1, selected.len(), candidate);
                continue;
            }
            if self.interrupted() {
                return Ok(Flow::Interrupted(format!("pass2 ({}/{})", idx, selected.len())));
            }
            info!("[pass2 {}/{}] {} ...", idx + 1, selected.len(), candidate);
            let result = self.evaluate(*candidate, self.config.samples_pass2)?;
            self.state.record_pass2(result);
            self.state.refresh_best(&baseline, &self.config.policy);
            let stage = format!("pass2 ({}/{})", self.state.pass2().len(), selected.len());
            self.persist(RunStatus::Running, &stage, None)?;
        }
        if self.state.pass2_result(&baseline).is_none() {
            if self.interrupted() {
                return Ok(Flow::Interrupted("pass2 (baseline)".into()));
            }
            info!("[pass2 baseline] {} ...", baseline);
            let result = self.evaluate(baseline, self.config.samples_pass2)?;
            self.state.record_pass2(result);
            self.state.refresh_best(&baseline, &self.config.policy);
            self.persist(RunStatus::Running, "pass2 (baseline)", None)?;
        }

        self.state.phase = SearchPhase::Pass2Complete;
        let pass2_baseline = anchor(self.state.pass2(), &baseline)?;
        let ranking: Vec<ScoredResult> = rank(
            self.state.pass2().iter(),
            &pass2_baseline,
            &self.config.policy,
        )
        .into_iter()
        .map(|ranked| ScoredResult {
            result: ranked.result.clone(),
            score: ranked.score,
        })
        .collect();
        let recommended = ranking
            .first()
            .cloned()
            .ok_or(TuneError::MissingBaseline(baseline))?;

        self.state.baseline = Some(pass2_baseline.clone());
        self.state.best = Some(recommended.result.clone());
        self.state.phase = SearchPhase::Done;
        self.persist(RunStatus::Completed, "done", None)?;

        info!(
            low = recommended.result.candidate.low_end,
            mid = recommended.result.candidate.mid_end,
            score = recommended.score.composite,
            evaluations = self.evaluations,
            "search complete"
        );

        Ok(Flow::Finished(SearchSummary {
            pass1_baseline,
            pass1_top,
            baseline: pass2_baseline,
            ranking,
            recommended,
            evaluations: self.evaluations,
            elapsed_sec: self.store.as_ref().map(|s| s.elapsed_sec()).unwrap_or(0.0),
        }))
    }

    fn evaluate(&mut self, candidate: Candidate, samples: usize) -> Result<CandidateResult> {
        let result = self.evaluator.evaluate(candidate, &self.test_cases, samples)?;
        self.evaluations += 1;
        info!(
            low = candidate.low_end,
            mid = candidate.mid_end,
            total_bytes = result.total_bytes,
            decode_ms = result.decode_ms,
            samples = result.decode_samples.len(),
            "candidate measured"
        );
        Ok(result)
    }

    fn interrupted(&self) -> bool {
        self.interrupt.load(Ordering::SeqCst)
    }

    fn mark_interrupted(&mut self, stage: String) -> Result<SearchOutcome> {
        warn!(stage = %stage, "search interrupted; saving partial checkpoint");
        self.state.phase = SearchPhase::Interrupted;
        self.persist(RunStatus::Interrupted, "interrupted", None)?;
        Ok(SearchOutcome::Interrupted { stage })
    }

    fn persist(&self, status: RunStatus, stage: &str, error: Option<&str>) -> Result<()> {
        match &self.store {
            Some(store) => store.save(&self.state, status, stage, error),
            None => Ok(()),
        }
    }
}

/// Baseline measurement among `results`, usable as a ratio denominator.
fn anchor(results: &[CandidateResult], baseline: &Candidate) -> Result<CandidateResult> {
    let found = results
        .iter()
        .find(|r| r.candidate == *baseline)
        .cloned()
        .ok_or(TuneError::MissingBaseline(*baseline))?;
    if found.total_bytes == 0 || !(found.decode_ms.is_finite() && found.decode_ms > 0.0) {
        return Err(TuneError::measurement(
            *baseline,
            format!(
                "baseline cannot anchor ratios (total_bytes={}, decode_ms={})",
                found.total_bytes, found.decode_ms
            ),
        ));
    }
    Ok(found)
}
