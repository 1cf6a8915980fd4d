//! Context metrics computed from a transcript.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Size and contamination signals for one piece of transcript text.
///
/// Computed fresh on every verification and never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextMetrics {
    /// Exact UTF-8 byte length of the text
    pub size_bytes: usize,
    /// Number of distinct file paths referenced
    pub file_references: usize,
    /// Distinct task identifiers found in the text
    pub task_ids: BTreeSet<String>,
    /// Total planning-residue lexicon hits (every occurrence counts)
    pub residue_hits: usize,
    /// Distinct residue phrases that matched
    pub residue_phrases: Vec<String>,
    /// Longest run of lines following a `file:` marker
    pub longest_file_block: usize,
    /// Whether that run exceeds the configured limit
    pub embeds_full_file: bool,
}

impl ContextMetrics {
    pub fn has_residue(&self) -> bool {
        self.residue_hits > 0
    }

    pub fn distinct_task_count(&self) -> usize {
        self.task_ids.len()
    }
}
