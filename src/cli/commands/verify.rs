//! `verify` command: run the context hygiene gates over a transcript file.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;

use crate::cli::output::{output, CommandOutput};
use crate::domain::models::{Config, ContextMetrics};
use crate::services::hygiene_verifier::{is_implementation_phase, IMPLEMENTATION_PHASE};
use crate::services::HygieneVerifier;

#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Transcript or prompt file to check
    pub file: PathBuf,

    /// Phase name; gates apply to implementation phases only
    #[arg(short, long, default_value = IMPLEMENTATION_PHASE)]
    pub phase: String,
}

#[derive(Debug, Serialize)]
pub struct Violation {
    pub kind: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyOutput {
    pub file: String,
    pub phase: String,
    pub gated: bool,
    pub passed: bool,
    pub budget_bytes: usize,
    pub metrics: ContextMetrics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub violation: Option<Violation>,
}

impl CommandOutput for VerifyOutput {
    fn to_human(&self) -> String {
        let m = &self.metrics;
        let verdict = match (&self.violation, self.gated) {
            (Some(v), _) => format!("FAILED ({}): {}", v.kind, v.message),
            (None, true) => "clean".to_string(),
            (None, false) => "not gated in this phase".to_string(),
        };
        let task_ids: Vec<&str> = m.task_ids.iter().map(String::as_str).collect();
        [
            format!("File: {} (phase {})", self.file, self.phase),
            format!("Result: {verdict}"),
            format!("  Size:             {} / {} bytes", m.size_bytes, self.budget_bytes),
            format!("  File references:  {}", m.file_references),
            format!(
                "  Task ids:         {}",
                if task_ids.is_empty() { "-".to_string() } else { task_ids.join(", ") }
            ),
            format!("  Residue hits:     {}", m.residue_hits),
            format!("  Longest file run: {} lines", m.longest_file_block),
        ]
        .join("\n")
    }
}

/// Check `text` and build the report.
pub fn check(verifier: &HygieneVerifier, file: String, phase: String, text: &str) -> VerifyOutput {
    let gated = is_implementation_phase(&phase);
    let (metrics, violation) = match verifier.verify_clean(text, &phase) {
        Ok(metrics) => (metrics, None),
        Err(e) => (
            verifier.extractor().extract(text),
            Some(Violation {
                kind: e.kind(),
                message: e.to_string(),
            }),
        ),
    };
    VerifyOutput {
        file,
        phase,
        gated,
        passed: violation.is_none(),
        budget_bytes: verifier.budget_bytes(),
        metrics,
        violation,
    }
}

pub async fn execute(args: VerifyArgs, config: &Config, json_mode: bool) -> Result<ExitCode> {
    let text = tokio::fs::read_to_string(&args.file)
        .await
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let verifier = HygieneVerifier::new(&config.context).context("Invalid context configuration")?;

    let report = check(&verifier, args.file.display().to_string(), args.phase, &text);
    output(&report, json_mode);
    Ok(if report.passed {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
