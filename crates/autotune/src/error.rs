//! Error taxonomy for the tuning harness.

use crate::candidate::Candidate;
use std::path::PathBuf;

/// Every failure the search can surface.
///
/// Configuration errors happen before anything runs. Build and measurement
/// errors abort the whole search: later candidates cannot be trusted once a
/// build or measurement has gone wrong.
#[derive(Debug, thiserror::Error)]
pub enum TuneError {
    /// The search space or search parameters are unusable.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The configure or build step exited unsuccessfully.
    #[error("{step} failed for {candidate} ({status})\n--- stdout ---\n{stdout}\n--- stderr ---\n{stderr}")]
    Build {
        candidate: Candidate,
        /// Which build step failed (`configure` or `build`).
        step: &'static str,
        status: String,
        stdout: String,
        stderr: String,
    },

    /// A measurement program produced no usable number.
    #[error("measurement failed for {candidate}: {detail}")]
    Measurement { candidate: Candidate, detail: String },

    /// The baseline candidate has no result where one is required.
    #[error("baseline candidate {0} was not measured")]
    MissingBaseline(Candidate),

    /// A child process could not be started at all.
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("checkpoint I/O failed at {path}: {source}")]
    Checkpoint {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("checkpoint at {path} is not valid JSON: {source}")]
    CheckpointFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl TuneError {
    pub fn measurement(candidate: Candidate, detail: impl Into<String>) -> Self {
        TuneError::Measurement {
            candidate,
            detail: detail.into(),
        }
    }

    /// Short classification used in checkpoint stage labels and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            TuneError::Configuration(_) => "configuration",
            TuneError::Build { .. } => "build",
            TuneError::Measurement { .. } => "measurement",
            TuneError::MissingBaseline(_) => "missing-baseline",
            TuneError::Spawn { .. } => "spawn",
            TuneError::Checkpoint { .. } | TuneError::CheckpointFormat { .. } => "checkpoint",
        }
    }
}

pub type Result<T> = std::result::Result<T, TuneError>;
