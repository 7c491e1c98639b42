//! Human-readable rendering of search results.

use crate::evaluator::CandidateResult;
use crate::search::SearchSummary;
use std::fmt::Write;

/// One table row: parameters, size and decode time relative to `baseline`,
/// and whether the decode slowdown stays inside the envelope.
pub fn format_row(
    result: &CandidateResult,
    baseline: &CandidateResult,
    max_decode_ratio: f64,
) -> String {
    let size_pct = (result.total_bytes as f64 / baseline.total_bytes as f64 - 1.0) * 100.0;
    let decode_ratio = result.decode_ms / baseline.decode_ms;
    let decode_pct = (decode_ratio - 1.0) * 100.0;
    let verdict = if decode_ratio <= max_decode_ratio {
        "OK"
    } else {
        "SLOW"
    };
    format!(
        "low={:2} mid={:2} | bytes={:9} ({:+6.2}%) | decode={:7.3}ms ({:+6.2}%) | {}",
        result.candidate.low_end,
        result.candidate.mid_end,
        result.total_bytes,
        size_pct,
        result.decode_ms,
        decode_pct,
        verdict
    )
}

/// Full text report of a completed search.
pub fn render_summary(summary: &SearchSummary, max_decode_ratio: f64) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== Pass1 Top Candidates ===");
    for scored in &summary.pass1_top {
        let _ = writeln!(
            out,
            "{}",
            format_row(&scored.result, &summary.pass1_baseline, max_decode_ratio)
        );
    }

    let _ = writeln!(out, "\n=== Final Ranking (Pass2) ===");
    for scored in &summary.ranking {
        let _ = writeln!(
            out,
            "{} | score={:.4}",
            format_row(&scored.result, &summary.baseline, max_decode_ratio),
            scored.score.composite
        );
    }

    let _ = writeln!(out, "\n=== Recommended Split ===");
    let _ = writeln!(
        out,
        "{}",
        format_row(&summary.recommended.result, &summary.baseline, max_decode_ratio)
    );
    let _ = writeln!(
        out,
        "Evaluations: {} | Elapsed: {:.1}s",
        summary.evaluations, summary.elapsed_sec
    );
    out
}
