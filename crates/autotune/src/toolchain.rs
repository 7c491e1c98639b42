//! External build and measurement collaborators.
//!
//! The evaluator never spawns processes itself; it talks to a [`Toolchain`].
//! [`CmakeToolchain`] drives a real CMake tree, while
//! [`crate::testing::ScriptedToolchain`] stands in for it in tests.

use crate::candidate::Candidate;
use crate::config::TestCase;
use crate::error::{Result, TuneError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tracing::debug;

/// Captured outcome of one collaborator invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    /// Human-readable exit status.
    pub status: String,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            status: "exit status: 0".into(),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(status: impl Into<String>, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            status: status.into(),
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    fn from_process(output: Output) -> Self {
        Self {
            success: output.status.success(),
            status: output.status.to_string(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}

/// Capability interface over the pipeline's build and measurement programs.
///
/// Implementations only report what happened; deciding whether an outcome is
/// fatal and parsing the numbers is the evaluator's job.
pub trait Toolchain {
    /// Point the build at the candidate's parameter values.
    fn configure(&mut self, candidate: &Candidate) -> Result<CommandOutput>;

    /// Produce both measurement programs for the last configured candidate.
    fn build(&mut self) -> Result<CommandOutput>;

    fn measure_size(&mut self, case: &TestCase) -> Result<CommandOutput>;

    fn measure_latency(&mut self) -> Result<CommandOutput>;
}

/// Settings for the CMake-driven pipeline build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CmakeConfig {
    /// Source tree root; relative test inputs are resolved against it.
    pub repo: PathBuf,
    /// Build tree; relative paths are taken from `repo`.
    pub build_dir: PathBuf,
    pub jobs: usize,
    /// Extra `cmake` configure arguments, passed through verbatim.
    pub extra_args: Vec<String>,
    /// Prefix of the project's cache variables (`<prefix>_BAND_LOW_END`, ...).
    pub define_prefix: String,
    pub size_program: String,
    pub latency_program: String,
}

impl Default for CmakeConfig {
    fn default() -> Self {
        let jobs = std::thread::available_parallelism()
            .map(|n| n.get().saturating_sub(1))
            .unwrap_or(3)
            .max(1);
        Self {
            repo: PathBuf::from("."),
            build_dir: PathBuf::from("build_band_tune"),
            jobs,
            extra_args: Vec::new(),
            define_prefix: "HAKONYANS".into(),
            size_program: "bench_bit_accounting".into(),
            latency_program: "bench_decode".into(),
        }
    }
}

impl CmakeConfig {
    pub fn resolved_build_dir(&self) -> PathBuf {
        if self.build_dir.is_absolute() {
            self.build_dir.clone()
        } else {
            self.repo.join(&self.build_dir)
        }
    }

    pub fn low_define(&self) -> String {
        format!("{}_BAND_LOW_END", self.define_prefix)
    }

    pub fn mid_define(&self) -> String {
        format!("{}_BAND_MID_END", self.define_prefix)
    }

    /// Arguments of the configure step for `candidate`.
    pub fn configure_args(&self, candidate: &Candidate) -> Vec<String> {
        let prefix = &self.define_prefix;
        let mut args = vec![
            "-S".to_string(),
            self.repo.display().to_string(),
            "-B".to_string(),
            self.resolved_build_dir().display().to_string(),
            format!("-D{prefix}_BUILD_TESTS=OFF"),
            format!("-D{prefix}_BUILD_TOOLS=OFF"),
            format!("-D{prefix}_BUILD_BENCH=ON"),
            format!("-D{}={}", self.low_define(), candidate.low_end),
            format!("-D{}={}", self.mid_define(), candidate.mid_end),
        ];
        args.extend(self.extra_args.iter().cloned());
        args
    }

    pub fn build_args(&self) -> Vec<String> {
        vec![
            "--build".to_string(),
            self.resolved_build_dir().display().to_string(),
            "-j".to_string(),
            self.jobs.max(1).to_string(),
            "--target".to_string(),
            self.size_program.clone(),
            self.latency_program.clone(),
        ]
    }
}

/// Toolchain backed by `cmake` and the two benchmark executables it builds.
pub struct CmakeToolchain {
    config: CmakeConfig,
    build_dir: PathBuf,
}

impl CmakeToolchain {
    pub fn new(config: CmakeConfig) -> Self {
        let build_dir = config.resolved_build_dir();
        Self { config, build_dir }
    }

    pub fn config(&self) -> &CmakeConfig {
        &self.config
    }

    pub fn build_dir(&self) -> &Path {
        &self.build_dir
    }
}

impl Toolchain for CmakeToolchain {
    fn configure(&mut self, candidate: &Candidate) -> Result<CommandOutput> {
        let mut command = Command::new("cmake");
        command
            .args(self.config.configure_args(candidate))
            .current_dir(&self.config.repo);
        run_command(&mut command, "cmake configure")
    }

    fn build(&mut self) -> Result<CommandOutput> {
        let mut command = Command::new("cmake");
        command
            .args(self.config.build_args())
            .current_dir(&self.config.repo);
        run_command(&mut command, "cmake build")
    }

    fn measure_size(&mut self, case: &TestCase) -> Result<CommandOutput> {
        let mut command = Command::new(self.build_dir.join(&self.config.size_program));
        command
            .arg(&case.input)
            .arg("--lossy")
            .arg("--quality")
            .arg(case.quality.to_string())
            .current_dir(&self.build_dir);
        run_command(&mut command, &self.config.size_program)
    }

    fn measure_latency(&mut self) -> Result<CommandOutput> {
        let mut command = Command::new(self.build_dir.join(&self.config.latency_program));
        command.current_dir(&self.build_dir);
        run_command(&mut command, &self.config.latency_program)
    }
}

fn run_command(command: &mut Command, description: &str) -> Result<CommandOutput> {
    debug!(command = ?command, "running {}", description);
    command
        .output()
        .map(CommandOutput::from_process)
        .map_err(|source| TuneError::Spawn {
            program: description.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configure_args_carry_candidate_defines() {
        let config = CmakeConfig {
            repo: PathBuf::from("/src/codec"),
            extra_args: vec!["-DCMAKE_BUILD_TYPE=Release".into()],
            ..CmakeConfig::default()
        };
        let args = config.configure_args(&Candidate::new(12, 30));
        assert_eq!(args[0], "-S");
        assert_eq!(args[1], "/src/codec");
        assert_eq!(args[3], "/src/codec/build_band_tune");
        assert!(args.contains(&"-DHAKONYANS_BAND_LOW_END=12".to_string()));
        assert!(args.contains(&"-DHAKONYANS_BAND_MID_END=30".to_string()));
        assert!(args.contains(&"-DHAKONYANS_BUILD_BENCH=ON".to_string()));
        assert_eq!(args.last().unwrap(), "-DCMAKE_BUILD_TYPE=Release");
    }

    #[test]
    fn test_absolute_build_dir_is_kept() {
        let config = CmakeConfig {
            repo: PathBuf::from("/src/codec"),
            build_dir: PathBuf::from("/tmp/tune"),
            ..CmakeConfig::default()
        };
        assert_eq!(config.resolved_build_dir(), PathBuf::from("/tmp/tune"));
    }

    #[test]
    fn test_build_args_name_both_programs() {
        let config = CmakeConfig {
            jobs: 0,
            ..CmakeConfig::default()
        };
        let args = config.build_args();
        assert_eq!(&args[2..4], &["-j".to_string(), "1".to_string()]);
        assert!(args.ends_with(&["bench_bit_accounting".to_string(), "bench_decode".to_string()]));
    }

    #[test]
    fn test_missing_program_is_spawn_error() {
        let mut toolchain = CmakeToolchain::new(CmakeConfig {
            repo: std::env::temp_dir(),
            build_dir: PathBuf::from("bandtune-definitely-missing-build-dir"),
            ..CmakeConfig::default()
        });
        let err = toolchain.measure_latency().unwrap_err();
        assert!(matches!(err, TuneError::Spawn { .. }));
    }
}
