//! Rebase heuristic engine.
//!
//! Scores a finished task attempt against six independent "messy run"
//! indicators and recommends regenerating the task from scratch when at
//! least two fire. Purely advisory: nothing here touches the backlog.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::RegexSet;

use crate::domain::models::{
    BatchRebaseReport, ExecutionResult, RebaseIndicator, RebaseRecommendation, RebaseThresholds,
    Task,
};

/// Number of indicators that must fire before a rebase is recommended.
pub const REBASE_INDICATOR_QUORUM: usize = 2;

/// Log patterns that mark an attempt as having fought the toolchain.
pub const ERROR_PATTERNS: &[&str] = &[
    r"error\[E\d{4}\]",
    r"(?i)panicked at",
    r"(?i)test result: FAILED",
    r"(?i)\bCONFLICT \(",
    r"(?i)cannot find (?:value|type|function|module|crate)",
    r"(?i)traceback \(most recent call last\)",
    r"(?i)segmentation fault",
    r"(?i)\bfatal:",
];

fn error_patterns() -> &'static RegexSet {
    static SET: OnceLock<RegexSet> = OnceLock::new();
    SET.get_or_init(|| RegexSet::new(ERROR_PATTERNS).expect("error patterns are valid"))
}

/// Whether the log matches any known error pattern.
pub fn log_has_error_patterns(log: &str) -> bool {
    error_patterns().is_match(log)
}

/// Evaluate one attempt.
pub fn should_rebase(result: &ExecutionResult, thresholds: &RebaseThresholds) -> RebaseRecommendation {
    let indicators: BTreeMap<RebaseIndicator, bool> = RebaseIndicator::ALL
        .iter()
        .map(|&indicator| {
            let fired = match indicator {
                RebaseIndicator::HighAttempts => result.attempts >= thresholds.attempts,
                RebaseIndicator::LargeContext => result.context_size_bytes > thresholds.context_bytes,
                RebaseIndicator::LongDuration => result.duration_secs > thresholds.duration_secs,
                RebaseIndicator::ErrorPatterns => log_has_error_patterns(&result.log),
                RebaseIndicator::ManyCommits => result.commit_count > thresholds.commits,
                RebaseIndicator::TaskFailed => result.failed,
            };
            (indicator, fired)
        })
        .collect();

    recommendation_from(result.task_id.clone(), indicators)
}

/// Build a recommendation from already-evaluated indicators.
pub fn recommendation_from(
    task_id: String,
    indicators: BTreeMap<RebaseIndicator, bool>,
) -> RebaseRecommendation {
    let fired: Vec<&str> = indicators
        .iter()
        .filter(|(_, &on)| on)
        .map(|(indicator, _)| indicator.as_str())
        .collect();
    let should_rebase = fired.len() >= REBASE_INDICATOR_QUORUM;

    let reason = if fired.is_empty() {
        "no messy-run indicators fired".to_string()
    } else if should_rebase {
        format!(
            "{} of {} indicators fired: {}",
            fired.len(),
            RebaseIndicator::ALL.len(),
            fired.join(", ")
        )
    } else {
        format!(
            "only {} indicator fired ({}), below quorum of {REBASE_INDICATOR_QUORUM}",
            fired.len(),
            fired.join(", ")
        )
    };

    RebaseRecommendation {
        task_id,
        should_rebase,
        indicators,
        reason,
    }
}

/// Evaluate every result; never stops early.
pub fn analyze_batch(results: &[ExecutionResult], thresholds: &RebaseThresholds) -> BatchRebaseReport {
    let recommendations: Vec<RebaseRecommendation> =
        results.iter().map(|r| should_rebase(r, thresholds)).collect();
    let recommended = recommendations.iter().filter(|r| r.should_rebase).count();

    BatchRebaseReport {
        analyzed: recommendations.len(),
        recommended,
        recommendations,
    }
}

/// Fresh-start instructions for a task whose attempt should be discarded.
///
/// The text is meant to be saved as a new spec version, never substituted
/// into the existing one. The prior failure is named by its kind only: the
/// full error text can quote other task ids or residue phrases, and the new
/// version has to pass the same hygiene gates as any other prompt.
pub fn generate_rebase_prompt(
    task: &Task,
    recommendation: &RebaseRecommendation,
    failure_kind: Option<&str>,
) -> String {
    let mut prompt = format!("# {}: {} (fresh start)\n\n", task.id, task.title);
    prompt.push_str(
        "The previous attempt at this task was discarded. Start over from a clean \
         checkout. Do not patch, extend, or reuse the previous attempt's changes.\n\n",
    );

    prompt.push_str("## Why the previous attempt was discarded\n\n");
    let failure = match failure_kind {
        Some(kind) => kind.replace('_', " "),
        None if recommendation.indicators.get(&RebaseIndicator::TaskFailed) == Some(&true) => {
            "the attempt failed".to_string()
        }
        None => "no explicit failure, but the run was judged messy".to_string(),
    };
    prompt.push_str(&format!("- Failure reason: {failure}\n"));
    prompt.push_str(&format!("- Assessment: {}\n", recommendation.reason));

    prompt.push_str("\n## Task\n\n");
    prompt.push_str(task.spec.trim_end());
    prompt.push_str("\n\n## Acceptance Criteria\n\n");
    for criterion in &task.acceptance_criteria {
        prompt.push_str(&format!("- {criterion}\n"));
    }

    prompt.push_str(
        "\n## Approach\n\n\
         - Re-read the acceptance criteria before writing code.\n\
         - Keep the change minimal and focused on this task only.\n\
         - Commit once the criteria pass.\n",
    );

    prompt
}
