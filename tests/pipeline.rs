use anyhow::Result;
use bandtune_autotune::report::render_summary;
use bandtune_autotune::testing::ScriptedToolchain;
use bandtune_autotune::{Candidate, SearchOutcome};
use bandtune_driver::cli::Cli;
use bandtune_driver::session::TuningSession;
use clap::Parser;
use std::fs;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

fn modelled() -> ScriptedToolchain {
    ScriptedToolchain::new()
        .with_model(Candidate::new(15, 31), 1000, 10.0)
        .with_model(Candidate::new(8, 24), 950, 10.4)
        .with_model(Candidate::new(8, 26), 900, 11.5)
        .with_model(Candidate::new(10, 24), 990, 9.0)
        .with_model(Candidate::new(10, 26), 1010, 10.0)
}

fn parse(json_out: &str, extra: &[&str]) -> Cli {
    let mut argv = vec![
        "bandtune",
        "--low-min",
        "8",
        "--low-max",
        "10",
        "--mid-min",
        "24",
        "--mid-max",
        "26",
        "--topk",
        "2",
        "--json-out",
        json_out,
    ];
    argv.extend_from_slice(extra);
    Cli::parse_from(argv)
}

#[test]
fn pipeline_recommends_smallest_within_envelope() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let cli = parse("tune.json", &["--image", "nature_01.ppm"]);
    let config = cli.search_config();
    let options = cli.session_options(dir.path().to_path_buf())?;

    let mut session = TuningSession::with_toolchain(config.clone(), modelled(), options);
    let SearchOutcome::Completed(summary) = session.run()? else {
        panic!("search did not complete");
    };
    assert_eq!(summary.recommended.result.candidate, Candidate::new(8, 24));
    assert_eq!(summary.evaluations, 8);

    let raw: serde_json::Value = serde_json::from_slice(&fs::read(dir.path().join("tune.json"))?)?;
    assert_eq!(raw["status"], "completed");
    assert_eq!(raw["stage"], "done");
    assert_eq!(raw["pass1"].as_array().map(Vec::len), Some(5));
    assert_eq!(raw["pass2"].as_array().map(Vec::len), Some(3));
    assert_eq!(raw["best"]["low_end"], 8);
    assert_eq!(raw["best"]["mid_end"], 24);
    assert_eq!(raw["baseline"]["total_bytes"], 1000);
    assert_eq!(raw["args"]["topk"], 2);
    assert_eq!(raw["args"]["images"][0], "nature_01.ppm");
    assert!(raw["elapsed_sec"].as_f64().is_some());
    assert!(raw.get("error").is_none());

    let report = render_summary(&summary, config.policy.max_decode_ratio);
    assert!(report.contains("=== Pass1 Top Candidates ==="));
    assert!(report.contains("=== Recommended Split ===\nlow= 8 mid=24"));
    assert!(!report.contains("low= 8 mid=26"));
    Ok(())
}

#[test]
fn pipeline_resume_completes_without_remeasuring() -> Result<()> {
    let dir = tempfile::tempdir()?;

    let first = parse("tune.json", &[]);
    let mut session = TuningSession::with_toolchain(
        first.search_config(),
        modelled(),
        first.session_options(dir.path().to_path_buf())?,
    );
    assert!(matches!(session.run()?, SearchOutcome::Completed(_)));

    let second = parse("tune.json", &["--resume"]);
    let mut session = TuningSession::with_toolchain(
        second.search_config(),
        modelled(),
        second.session_options(dir.path().to_path_buf())?,
    );
    let SearchOutcome::Completed(summary) = session.run()? else {
        panic!("resumed search did not complete");
    };
    assert_eq!(summary.evaluations, 0);
    assert_eq!(summary.recommended.result.candidate, Candidate::new(8, 24));
    assert_eq!(session.into_toolchain().builds(), 0);
    Ok(())
}

#[test]
fn pipeline_interrupt_keeps_partial_checkpoint() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let cli = parse("out/tune.json", &[]);

    let flag = Arc::new(AtomicBool::new(false));
    let mut toolchain = modelled();
    toolchain.interrupt_on_build(3, flag.clone());
    let mut session = TuningSession::with_toolchain(
        cli.search_config(),
        toolchain,
        cli.session_options(dir.path().to_path_buf())?,
    )
    .with_interrupt_flag(flag);

    let outcome = session.run()?;
    assert!(matches!(outcome, SearchOutcome::Interrupted { .. }));

    let raw: serde_json::Value =
        serde_json::from_slice(&fs::read(dir.path().join("out").join("tune.json"))?)?;
    assert_eq!(raw["status"], "interrupted");
    assert_eq!(raw["stage"], "interrupted");
    assert_eq!(raw["pass1"].as_array().map(Vec::len), Some(2));
    assert!(raw["pass2"].as_array().is_some_and(Vec::is_empty));
    Ok(())
}
