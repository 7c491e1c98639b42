//! Tuning session orchestration.

use anyhow::{Context, Result};
use bandtune_autotune::{
    CheckpointStore, CmakeConfig, CmakeToolchain, SearchConfig, SearchController, SearchOutcome,
    TestCase, Toolchain,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Input measured when the operator names none.
pub const DEFAULT_INPUT: &str = "test_images/photo/nature_01.ppm";
pub const DEFAULT_QUALITY: u32 = 50;

#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Root that relative inputs and the checkpoint path are resolved against.
    pub repo: PathBuf,
    pub inputs: Vec<String>,
    pub qualities: Vec<u32>,
    pub checkpoint: Option<PathBuf>,
    pub resume: bool,
    /// Invocation parameters recorded in every checkpoint.
    pub args: serde_json::Value,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            repo: PathBuf::from("."),
            inputs: Vec::new(),
            qualities: Vec::new(),
            checkpoint: None,
            resume: false,
            args: serde_json::Value::Null,
        }
    }
}

impl SessionOptions {
    /// Every input crossed with every quality, inputs resolved against the repo.
    pub fn test_cases(&self) -> Vec<TestCase> {
        let inputs: Vec<String> = if self.inputs.is_empty() {
            vec![DEFAULT_INPUT.to_string()]
        } else {
            self.inputs.clone()
        };
        let qualities = if self.qualities.is_empty() {
            vec![DEFAULT_QUALITY]
        } else {
            self.qualities.clone()
        };

        let mut cases = Vec::with_capacity(inputs.len() * qualities.len());
        for input in &inputs {
            let resolved = resolve_input_path(&self.repo, input);
            for &quality in &qualities {
                cases.push(TestCase::new(resolved.clone(), quality));
            }
        }
        cases
    }

    pub fn checkpoint_path(&self) -> Option<PathBuf> {
        self.checkpoint.as_ref().map(|path| {
            if path.is_absolute() {
                path.clone()
            } else {
                self.repo.join(path)
            }
        })
    }
}

/// Absolute path of `input` when it exists under `repo`; otherwise `input`
/// unchanged, leaving the measuring program to resolve it from its own
/// working directory.
pub fn resolve_input_path(repo: &Path, input: &str) -> String {
    let path = Path::new(input);
    if path.is_absolute() {
        return input.to_string();
    }
    let joined = repo.join(path);
    if joined.exists() {
        joined
            .canonicalize()
            .unwrap_or(joined)
            .display()
            .to_string()
    } else {
        input.to_string()
    }
}

pub struct TuningSession<T> {
    controller: SearchController<T>,
    interrupt: Arc<AtomicBool>,
    resume: bool,
}

impl TuningSession<CmakeToolchain> {
    /// Session that rebuilds the project with cmake for every candidate.
    pub fn new(config: SearchConfig, cmake: CmakeConfig, options: SessionOptions) -> Self {
        info!(
            repo = %cmake.repo.display(),
            build_dir = %cmake.resolved_build_dir().display(),
            jobs = cmake.jobs,
            "using cmake toolchain"
        );
        Self::with_toolchain(config, CmakeToolchain::new(cmake), options)
    }
}

impl<T: Toolchain> TuningSession<T> {
    pub fn with_toolchain(config: SearchConfig, toolchain: T, options: SessionOptions) -> Self {
        let interrupt = Arc::new(AtomicBool::new(false));
        let cases = options.test_cases();
        for case in &cases {
            info!(input = %case.input, quality = case.quality, "test case");
        }

        let mut controller =
            SearchController::new(config, cases, toolchain).with_interrupt_flag(interrupt.clone());
        if let Some(path) = options.checkpoint_path() {
            controller = controller.with_checkpoint(CheckpointStore::new(path, options.args));
        }
        Self {
            controller,
            interrupt,
            resume: options.resume,
        }
    }

    /// Share an externally owned interrupt flag.
    pub fn with_interrupt_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.controller = self.controller.with_interrupt_flag(flag.clone());
        self.interrupt = flag;
        self
    }

    /// Flag the search polls between evaluations.
    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        self.interrupt.clone()
    }

    /// Route Ctrl+C (and termination signals) to the interrupt flag. Can only
    /// succeed once per process.
    pub fn install_interrupt_handler(&self) -> Result<()> {
        let flag = self.interrupt.clone();
        ctrlc::set_handler(move || {
            if !flag.swap(true, Ordering::SeqCst) {
                warn!("interrupt received; stopping after the current step");
            }
        })
        .context("failed to install interrupt handler")
    }

    pub fn run(&mut self) -> Result<SearchOutcome> {
        self.controller
            .run(self.resume)
            .context("band split search failed")
    }

    pub fn controller(&self) -> &SearchController<T> {
        &self.controller
    }

    pub fn into_toolchain(self) -> T {
        self.controller.into_toolchain()
    }
}
