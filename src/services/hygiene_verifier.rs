//! Context hygiene verifier.
//!
//! Applies hard gates to transcripts before a phase transition is allowed.
//! Gates fail closed on the first violation, each with its own error variant
//! carrying the offending metric values.

use std::time::Duration;

use tracing::{debug, error, instrument, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{ContextConfig, ContextMetrics};
use crate::domain::ports::{AgentRuntime, ExecutionHandle};
use crate::services::context_metrics::ContextMetricsExtractor;

/// Phase prefix that turns on the hard gates.
pub const IMPLEMENTATION_PHASE: &str = "implementation";

/// Whether a phase name denotes an implementation phase.
pub fn is_implementation_phase(phase: &str) -> bool {
    phase.starts_with(IMPLEMENTATION_PHASE)
}

/// Gatekeeper for context given to, and produced by, agent executions.
#[derive(Debug, Clone)]
pub struct HygieneVerifier {
    extractor: ContextMetricsExtractor,
    budget_bytes: usize,
    deletion_check_delay: Duration,
}

impl HygieneVerifier {
    pub fn new(config: &ContextConfig) -> DomainResult<Self> {
        Ok(Self {
            extractor: ContextMetricsExtractor::new(config)?,
            budget_bytes: config.budget_bytes,
            deletion_check_delay: Duration::from_millis(config.deletion_check_delay_ms),
        })
    }

    pub fn extractor(&self) -> &ContextMetricsExtractor {
        &self.extractor
    }

    pub fn budget_bytes(&self) -> usize {
        self.budget_bytes
    }

    /// Compute metrics and, for implementation phases, enforce the gates:
    /// byte budget, zero residue, exactly one task id, no embedded file body.
    #[instrument(skip(self, transcript), fields(phase = %phase, size = transcript.len()))]
    pub fn verify_clean(&self, transcript: &str, phase: &str) -> DomainResult<ContextMetrics> {
        let metrics = self.extractor.extract(transcript);

        if !is_implementation_phase(phase) {
            debug!(
                size_bytes = metrics.size_bytes,
                task_ids = metrics.distinct_task_count(),
                "Non-implementation phase, metrics only"
            );
            return Ok(metrics);
        }

        if metrics.size_bytes > self.budget_bytes {
            warn!(
                size_bytes = metrics.size_bytes,
                budget_bytes = self.budget_bytes,
                "Context budget exceeded"
            );
            return Err(DomainError::ContextBudgetExceeded {
                size_bytes: metrics.size_bytes,
                budget_bytes: self.budget_bytes,
            });
        }

        if metrics.has_residue() {
            warn!(hits = metrics.residue_hits, phrases = ?metrics.residue_phrases, "Planning residue detected");
            return Err(DomainError::PlanningResidueDetected {
                hits: metrics.residue_hits,
                phrases: metrics.residue_phrases,
            });
        }

        if metrics.distinct_task_count() != 1 {
            warn!(task_ids = ?metrics.task_ids, "Transcript does not reference exactly one task");
            return Err(DomainError::CrossTaskContamination {
                task_ids: metrics.task_ids,
            });
        }

        if metrics.embeds_full_file {
            warn!(
                lines = metrics.longest_file_block,
                max_lines = self.extractor.max_embedded_file_lines(),
                "Full file body embedded in context"
            );
            return Err(DomainError::FullFileEmbeddingDetected {
                lines: metrics.longest_file_block,
                max_lines: self.extractor.max_embedded_file_lines(),
            });
        }

        debug!(size_bytes = metrics.size_bytes, "Context is clean");
        Ok(metrics)
    }

    /// Assert that a deleted execution is really gone.
    ///
    /// Polls once after the configured delay. "Not found" is success even
    /// if the identifier is reused later; "still present" is a leak.
    #[instrument(skip(self, runtime), fields(handle = %handle))]
    pub async fn verify_deleted(
        &self,
        runtime: &dyn AgentRuntime,
        handle: &ExecutionHandle,
    ) -> DomainResult<()> {
        if !self.deletion_check_delay.is_zero() {
            tokio::time::sleep(self.deletion_check_delay).await;
        }

        match runtime.status(handle).await? {
            None => {
                debug!("Execution deletion verified");
                Ok(())
            }
            Some(status) => {
                error!(status = ?status, "Agent execution still present after deletion");
                Err(DomainError::SessionLeak {
                    handle: handle.to_string(),
                })
            }
        }
    }
}
