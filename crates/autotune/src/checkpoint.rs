//! Durable, atomically written search checkpoints.

use crate::error::{Result, TuneError};
use crate::evaluator::CandidateResult;
use crate::state::{SearchPhase, SearchState};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    #[default]
    Running,
    Completed,
    Interrupted,
    Failed,
}

/// On-disk checkpoint document. Serves both as resume input and as the final
/// audit record of a search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    #[serde(default)]
    pub status: RunStatus,
    #[serde(default)]
    pub stage: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<SearchPhase>,
    #[serde(default)]
    pub baseline: Option<CandidateResult>,
    #[serde(default)]
    pub best: Option<CandidateResult>,
    #[serde(default)]
    pub pass1: Vec<CandidateResult>,
    #[serde(default)]
    pub pass2: Vec<CandidateResult>,
    /// Invocation parameters of the run that wrote this checkpoint.
    #[serde(default)]
    pub args: serde_json::Value,
    #[serde(default)]
    pub elapsed_sec: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Single writer of the checkpoint file.
pub struct CheckpointStore {
    path: PathBuf,
    args: serde_json::Value,
    started: Instant,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>, args: serde_json::Value) -> Self {
        Self {
            path: path.into(),
            args,
            started: Instant::now(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn elapsed_sec(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    /// Snapshot `state` to disk. Readers see either the previous checkpoint or
    /// this one, never a partial write.
    pub fn save(
        &self,
        state: &SearchState,
        status: RunStatus,
        stage: &str,
        error: Option<&str>,
    ) -> Result<()> {
        let checkpoint = Checkpoint {
            status,
            stage: stage.to_string(),
            phase: Some(state.phase),
            baseline: state.baseline.clone(),
            best: state.best.clone(),
            pass1: state.pass1().to_vec(),
            pass2: state.pass2().to_vec(),
            args: self.args.clone(),
            elapsed_sec: self.elapsed_sec(),
            error: error.map(str::to_string),
        };
        let blob = serde_json::to_vec_pretty(&checkpoint).map_err(|source| {
            TuneError::CheckpointFormat {
                path: self.path.clone(),
                source,
            }
        })?;
        write_atomic(&self.path, &blob)?;
        debug!(path = %self.path.display(), ?status, stage, "checkpoint saved");
        Ok(())
    }

    /// Read a checkpoint; a missing file is `Ok(None)`.
    pub fn read(path: &Path) -> Result<Option<Checkpoint>> {
        if !path.exists() {
            return Ok(None);
        }
        let data = fs::read(path).map_err(|source| TuneError::Checkpoint {
            path: path.to_path_buf(),
            source,
        })?;
        let checkpoint = serde_json::from_slice(&data).map_err(|source| {
            TuneError::CheckpointFormat {
                path: path.to_path_buf(),
                source,
            }
        })?;
        Ok(Some(checkpoint))
    }

    /// Pass-1 and pass-2 results recorded at `path`, empty if there is none.
    pub fn load(path: &Path) -> Result<(Vec<CandidateResult>, Vec<CandidateResult>)> {
        Ok(Self::read(path)?
            .map(|checkpoint| (checkpoint.pass1, checkpoint.pass2))
            .unwrap_or_default())
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let io_err = |source| TuneError::Checkpoint {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
    }

    let mut tmp_name = path.as_os_str().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    let mut file = File::create(&tmp_path).map_err(io_err)?;
    file.write_all(bytes).map_err(io_err)?;
    file.sync_all().map_err(io_err)?;
    drop(file);

    fs::rename(&tmp_path, path).map_err(io_err)?;
    Ok(())
}
