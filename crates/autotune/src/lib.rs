//! Two-pass band split tuning for compression pipelines.
//!
//! The harness rebuilds the pipeline for each candidate pair of split points,
//! measures output size and decode latency through external programs, and
//! recommends the candidate with the best size/latency trade-off.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────┐     ┌──────────────┐     ┌───────────┐
//! │ CandidateSpace │────▶│  Evaluator   │────▶│  Scorer   │
//! │ (grid)         │     │ (Toolchain)  │     │ (ranking) │
//! └────────────────┘     └──────────────┘     └───────────┘
//!          ▲                     │
//!          │            ┌────────▼─────────┐
//!          └────────────│ SearchController │──▶ CheckpointStore
//!                       └──────────────────┘
//! ```
//!
//! # Key Components
//!
//! - [`candidate::CandidateSpace`]: ordered, validated candidate grid
//! - [`evaluator::Evaluator`]: build + size + latency measurement of one candidate
//! - [`scorer::score`]: composite size/latency score against a baseline
//! - [`search::SearchController`]: the two-pass state machine
//! - [`checkpoint::CheckpointStore`]: atomic persistence and resume

pub mod candidate;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod report;
pub mod scorer;
pub mod search;
pub mod state;
pub mod testing;
pub mod toolchain;

pub use candidate::{Candidate, CandidateSpace, SearchRanges};
pub use checkpoint::{Checkpoint, CheckpointStore, RunStatus};
pub use config::{SearchConfig, TestCase};
pub use error::TuneError;
pub use evaluator::{CandidateResult, Evaluator};
pub use scorer::{Score, ScorePolicy};
pub use search::{ScoredResult, SearchController, SearchOutcome, SearchSummary};
pub use state::{SearchPhase, SearchState};
pub use toolchain::{CmakeConfig, CmakeToolchain, CommandOutput, Toolchain};
