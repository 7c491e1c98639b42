//! CLI wiring for the band split tuner.

use crate::session::{SessionOptions, TuningSession};
use anyhow::{Context, Result};
use bandtune_autotune::report::render_summary;
use bandtune_autotune::{
    Candidate, CandidateSpace, CmakeConfig, ScorePolicy, SearchConfig, SearchOutcome,
    SearchRanges, TuneError,
};
use clap::Parser;
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::warn;

/// Exit status of a run stopped by the operator.
pub const EXIT_INTERRUPTED: u8 = 130;

#[derive(Parser, Debug, Clone, Serialize)]
#[command(name = "bandtune", about = "Tune band split points of a compression pipeline")]
pub struct Cli {
    /// Project root configured and built for every candidate.
    #[arg(long, default_value = ".")]
    pub repo: PathBuf,
    /// Build directory, relative to the repo unless absolute.
    #[arg(long, default_value = "build_band_tune")]
    pub build_dir: PathBuf,
    /// Input measured by the size program (repeatable).
    #[arg(long = "image")]
    pub images: Vec<String>,
    /// Quality level applied to every input (repeatable).
    #[arg(long = "quality")]
    pub qualities: Vec<u32>,
    #[arg(long, default_value_t = 8)]
    pub low_min: i32,
    #[arg(long, default_value_t = 24)]
    pub low_max: i32,
    #[arg(long, default_value_t = 24)]
    pub mid_min: i32,
    #[arg(long, default_value_t = 48)]
    pub mid_max: i32,
    #[arg(long, default_value_t = 2)]
    pub step: i32,
    /// Pass-1 leaders re-measured in pass 2.
    #[arg(long, default_value_t = 6)]
    pub topk: usize,
    #[arg(long, default_value_t = 1)]
    pub decode_runs_pass1: usize,
    #[arg(long, default_value_t = 3)]
    pub decode_runs_pass2: usize,
    /// Parallel build jobs (defaults to available cores minus one).
    #[arg(long)]
    pub jobs: Option<usize>,
    /// Allowed decode slowdown versus baseline (1.05 = +5%).
    #[arg(long, default_value_t = 1.05)]
    pub max_decode_ratio: f64,
    /// Score penalty per unit of slowdown past the allowed ratio.
    #[arg(long, default_value_t = 8.0)]
    pub penalty_weight: f64,
    /// Checkpoint and result file, relative to the repo unless absolute.
    #[arg(long)]
    pub json_out: Option<PathBuf>,
    /// Reuse results recorded in the --json-out checkpoint.
    #[arg(long, default_value_t = false)]
    pub resume: bool,
    /// Extra cmake configure argument (repeatable).
    #[arg(long = "cmake-arg", allow_hyphen_values = true)]
    pub cmake_args: Vec<String>,
    #[arg(long, default_value_t = 15)]
    pub baseline_low: i32,
    #[arg(long, default_value_t = 31)]
    pub baseline_mid: i32,
    /// Prefix of the project's cmake cache variables.
    #[arg(long, default_value = "HAKONYANS")]
    pub define_prefix: String,
}

impl Cli {
    pub fn search_config(&self) -> SearchConfig {
        SearchConfig {
            ranges: SearchRanges {
                low_min: self.low_min,
                low_max: self.low_max,
                mid_min: self.mid_min,
                mid_max: self.mid_max,
                step: self.step,
            },
            baseline: Candidate::new(self.baseline_low, self.baseline_mid),
            top_k: self.topk,
            samples_pass1: self.decode_runs_pass1,
            samples_pass2: self.decode_runs_pass2,
            policy: ScorePolicy {
                max_decode_ratio: self.max_decode_ratio,
                penalty_weight: self.penalty_weight,
            },
        }
    }

    pub fn cmake_config(&self, repo: PathBuf) -> CmakeConfig {
        let defaults = CmakeConfig::default();
        CmakeConfig {
            repo,
            build_dir: self.build_dir.clone(),
            jobs: self.jobs.unwrap_or(defaults.jobs).max(1),
            extra_args: self.cmake_args.clone(),
            define_prefix: self.define_prefix.clone(),
            ..defaults
        }
    }

    pub fn session_options(&self, repo: PathBuf) -> Result<SessionOptions> {
        if self.resume && self.json_out.is_none() {
            return Err(TuneError::Configuration("--resume requires --json-out".into()).into());
        }
        Ok(SessionOptions {
            repo,
            inputs: self.images.clone(),
            qualities: self.qualities.clone(),
            checkpoint: self.json_out.clone(),
            resume: self.resume,
            args: serde_json::to_value(self).context("failed to serialize arguments")?,
        })
    }
}

pub fn run_cli(cli: Cli) -> Result<ExitCode> {
    let _ = tracing_subscriber::fmt::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .try_init();

    let repo = fs::canonicalize(&cli.repo)
        .with_context(|| format!("repository root {} not found", cli.repo.display()))?;
    let config = cli.search_config();
    let cmake = cli.cmake_config(repo.clone());
    let options = cli.session_options(repo.clone())?;
    let space = CandidateSpace::generate(&config.ranges, config.baseline)?;

    println!("=== Band Split Tuner ===");
    println!("repo: {}", repo.display());
    println!("build_dir: {}", cmake.resolved_build_dir().display());
    let cases: Vec<String> = options
        .test_cases()
        .iter()
        .map(|case| format!("{} Q{}", case.input, case.quality))
        .collect();
    println!("cases: {}", cases.join(", "));
    println!("candidates: {}", space.len());
    println!("baseline: {}", config.baseline);
    if let Some(path) = options.checkpoint_path().filter(|_| options.resume) {
        println!("resume: {}", path.display());
    }
    println!();

    let checkpoint = options.checkpoint_path();
    let max_decode_ratio = config.policy.max_decode_ratio;
    let mut session = TuningSession::new(config, cmake, options);
    if let Err(e) = session.install_interrupt_handler() {
        warn!(error = %e, "continuing without interrupt handling");
    }

    match session.run()? {
        SearchOutcome::Completed(summary) => {
            print!("{}", render_summary(&summary, max_decode_ratio));
            if let Some(path) = checkpoint {
                println!("JSON saved: {}", path.display());
            }
            Ok(ExitCode::SUCCESS)
        }
        SearchOutcome::Interrupted { stage } => {
            println!("Interrupted during {stage}. Partial checkpoint saved.");
            Ok(ExitCode::from(EXIT_INTERRUPTED))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_search_defaults() {
        let cli = Cli::try_parse_from(["bandtune"]).unwrap();
        assert_eq!(cli.search_config(), SearchConfig::default());
        assert!(cli.images.is_empty());
        assert!(!cli.resume);
    }

    #[test]
    fn test_repeatable_flags() {
        let cli = Cli::try_parse_from([
            "bandtune",
            "--image",
            "a.ppm",
            "--image",
            "b.ppm",
            "--quality",
            "50",
            "--quality",
            "90",
            "--cmake-arg",
            "-DCMAKE_BUILD_TYPE=Release",
            "--topk",
            "2",
            "--jobs",
            "4",
        ])
        .unwrap();
        assert_eq!(cli.images, vec!["a.ppm", "b.ppm"]);
        assert_eq!(cli.qualities, vec![50, 90]);
        assert_eq!(cli.search_config().top_k, 2);

        let cmake = cli.cmake_config(PathBuf::from("/src"));
        assert_eq!(cmake.jobs, 4);
        assert_eq!(cmake.extra_args, vec!["-DCMAKE_BUILD_TYPE=Release"]);
        assert_eq!(cmake.build_dir, PathBuf::from("build_band_tune"));
    }

    #[test]
    fn test_resume_requires_json_out() {
        let cli = Cli::try_parse_from(["bandtune", "--resume"]).unwrap();
        let err = cli.session_options(PathBuf::from(".")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TuneError>(),
            Some(TuneError::Configuration(_))
        ));
    }

    #[test]
    fn test_arguments_recorded_for_checkpoint() {
        let cli = Cli::try_parse_from(["bandtune", "--json-out", "tune.json", "--topk", "3"])
            .unwrap();
        let options = cli.session_options(PathBuf::from("/src")).unwrap();
        assert_eq!(options.args["topk"], 3);
        assert_eq!(options.args["json_out"], "tune.json");
        assert_eq!(
            options.checkpoint_path(),
            Some(PathBuf::from("/src/tune.json"))
        );
    }
}
