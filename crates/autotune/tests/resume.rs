use anyhow::Result;
use bandtune_autotune::testing::ScriptedToolchain;
use bandtune_autotune::{
    Candidate, CheckpointStore, RunStatus, SearchConfig, SearchController, SearchOutcome,
    SearchRanges, TestCase,
};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

fn config() -> SearchConfig {
    SearchConfig {
        ranges: SearchRanges {
            low_min: 8,
            low_max: 12,
            mid_min: 24,
            mid_max: 26,
            step: 2,
        },
        baseline: Candidate::new(15, 31),
        top_k: 2,
        samples_pass1: 1,
        samples_pass2: 3,
        ..SearchConfig::default()
    }
}

fn cases() -> Vec<TestCase> {
    vec![TestCase::new("nature_01.ppm", 50), TestCase::new("anime_01.ppm", 75)]
}

#[test]
fn resume_skips_completed_pass1_candidates() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("band_tune.json");

    // 1 baseline + 3 lows x 2 mids.
    let total = 7;
    let done = 4;

    let flag = Arc::new(AtomicBool::new(false));
    let mut toolchain = ScriptedToolchain::new();
    toolchain.interrupt_on_build(done + 1, flag.clone());
    let mut first = SearchController::new(config(), cases(), toolchain)
        .with_checkpoint(CheckpointStore::new(&path, serde_json::json!({ "run": 1 })))
        .with_interrupt_flag(flag);
    let outcome = first.run(false)?;
    assert!(matches!(outcome, SearchOutcome::Interrupted { .. }));
    let first_log = first.evaluator().toolchain().build_log().to_vec();

    let checkpoint = CheckpointStore::read(&path)?.expect("checkpoint written");
    assert_eq!(checkpoint.status, RunStatus::Interrupted);
    assert_eq!(checkpoint.pass1.len(), done);

    let mut second = SearchController::new(config(), cases(), ScriptedToolchain::new())
        .with_checkpoint(CheckpointStore::new(&path, serde_json::json!({ "run": 2 })));
    let SearchOutcome::Completed(summary) = second.run(true)? else {
        panic!("resumed search did not complete");
    };

    let second_log = second.evaluator().toolchain().build_log().to_vec();
    let pass1_rebuilt = &second_log[..total - done];
    for candidate in pass1_rebuilt {
        assert!(
            !first_log[..done].contains(candidate),
            "{candidate} was measured twice"
        );
    }
    // The interrupted candidate is measured again on resume.
    assert_eq!(pass1_rebuilt[0], first_log[done]);

    // Pass 2: top-2 plus the baseline unless it made the cut.
    let baseline_selected = summary
        .pass1_top
        .iter()
        .any(|s| s.result.candidate == Candidate::new(15, 31));
    let pass2_builds = if baseline_selected { 2 } else { 3 };
    assert_eq!(summary.evaluations, total - done + pass2_builds);
    assert_eq!(second.state().pass1().len(), total);

    let finished = CheckpointStore::read(&path)?.expect("checkpoint written");
    assert_eq!(finished.status, RunStatus::Completed);
    assert_eq!(finished.stage, "done");
    assert_eq!(finished.args["run"], 2);
    assert_eq!(
        finished.best.map(|b| b.candidate),
        Some(summary.recommended.result.candidate)
    );
    Ok(())
}

#[test]
fn resume_ignores_results_outside_current_ranges() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("band_tune.json");

    let mut wide = config();
    wide.ranges.low_max = 20;
    let mut first = SearchController::new(wide, cases(), ScriptedToolchain::new())
        .with_checkpoint(CheckpointStore::new(&path, serde_json::Value::Null));
    assert!(matches!(first.run(false)?, SearchOutcome::Completed(_)));

    let mut narrow = config();
    narrow.ranges.low_max = 8;
    let mut second = SearchController::new(narrow, cases(), ScriptedToolchain::new())
        .with_checkpoint(CheckpointStore::new(&path, serde_json::Value::Null));
    let SearchOutcome::Completed(summary) = second.run(true)? else {
        panic!("resumed search did not complete");
    };

    for result in second.state().pass1() {
        assert!(result.candidate.low_end == 8 || result.candidate == Candidate::new(15, 31));
    }
    // Pass 1 is fully covered. The baseline is one of the narrow leaders and
    // its pass-2 result carries over, so only (8, 26) is measured.
    assert!(summary
        .pass1_top
        .iter()
        .any(|s| s.result.candidate == Candidate::new(15, 31)));
    assert_eq!(summary.evaluations, 1);
    assert_eq!(
        second.evaluator().toolchain().build_log(),
        &[Candidate::new(8, 26)]
    );
    assert_eq!(second.state().pass1().len(), 3);
    Ok(())
}

#[test]
fn exhausted_latency_attempts_record_nothing() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("band_tune.json");

    let mut toolchain = ScriptedToolchain::new();
    toolchain.set_latency_fallback(None);
    let mut controller = SearchController::new(config(), cases(), toolchain)
        .with_checkpoint(CheckpointStore::new(&path, serde_json::Value::Null));

    let err = controller.run(false).unwrap_err();
    assert_eq!(err.kind(), "measurement");
    assert!(controller.state().pass1().is_empty());

    let checkpoint = CheckpointStore::read(&path)?.expect("failed checkpoint written");
    assert_eq!(checkpoint.status, RunStatus::Failed);
    assert!(checkpoint.pass1.is_empty());
    Ok(())
}
