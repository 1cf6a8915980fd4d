//! Drift detection across repeated context measurements.
//!
//! One detector instance lives for one batch run. It keeps a baseline per
//! `(task, phase)` pair; a new run starts from a fresh detector or `reset()`.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{ContextMetrics, DriftConfig};
use crate::services::hygiene_verifier::is_implementation_phase;

/// Key of a baseline entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DriftKey {
    pub task_id: String,
    pub phase: String,
}

impl DriftKey {
    pub fn new(task_id: impl Into<String>, phase: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            phase: phase.into(),
        }
    }
}

/// Tracks per-(task, phase) baselines and flags abnormal growth or contamination.
#[derive(Debug, Clone)]
pub struct DriftDetector {
    max_growth: f64,
    baselines: HashMap<DriftKey, ContextMetrics>,
}

impl DriftDetector {
    pub fn new(config: &DriftConfig) -> Self {
        Self {
            max_growth: config.max_growth,
            baselines: HashMap::new(),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(&DriftConfig::default())
    }

    /// Compare `metrics` against the stored baseline.
    ///
    /// The first observation for a key only records the baseline and never
    /// fails. Later observations fail on growth beyond `max_growth`, on more
    /// than one task id, and on residue in implementation phases.
    pub fn check_drift(
        &mut self,
        task_id: &str,
        phase: &str,
        metrics: &ContextMetrics,
    ) -> DomainResult<()> {
        let key = DriftKey::new(task_id, phase);
        if !self.baselines.contains_key(&key) {
            debug!(task_id, phase, size_bytes = metrics.size_bytes, "Recording drift baseline");
            self.baselines.insert(key, metrics.clone());
            return Ok(());
        }
        let baseline = &self.baselines[&key];

        // Empty baselines have no meaningful ratio
        if baseline.size_bytes > 0 {
            let growth = (metrics.size_bytes as f64 - baseline.size_bytes as f64)
                / baseline.size_bytes as f64;
            if growth > self.max_growth {
                warn!(
                    task_id,
                    phase,
                    baseline_bytes = baseline.size_bytes,
                    current_bytes = metrics.size_bytes,
                    "Context drift exceeded"
                );
                return Err(DomainError::ContextDriftExceeded {
                    task_id: task_id.to_string(),
                    phase: phase.to_string(),
                    baseline_bytes: baseline.size_bytes,
                    current_bytes: metrics.size_bytes,
                    growth_percent: growth * 100.0,
                    max_percent: self.max_growth * 100.0,
                });
            }
        }

        if metrics.distinct_task_count() > 1 {
            warn!(task_id, phase, task_ids = ?metrics.task_ids, "Cross-task contamination across checks");
            return Err(DomainError::CrossTaskContamination {
                task_ids: metrics.task_ids.clone(),
            });
        }

        if is_implementation_phase(phase) && metrics.has_residue() {
            warn!(task_id, phase, hits = metrics.residue_hits, "Planning residue in implementation phase");
            return Err(DomainError::PlanningResidueDetected {
                hits: metrics.residue_hits,
                phrases: metrics.residue_phrases.clone(),
            });
        }

        Ok(())
    }

    pub fn baseline(&self, task_id: &str, phase: &str) -> Option<&ContextMetrics> {
        self.baselines.get(&DriftKey::new(task_id, phase))
    }

    pub fn tracked(&self) -> usize {
        self.baselines.len()
    }

    /// Drop every baseline.
    pub fn reset(&mut self) {
        self.baselines.clear();
    }
}
