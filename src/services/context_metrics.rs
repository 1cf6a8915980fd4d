//! Context metrics extraction.
//!
//! Computes size and contamination signals from raw transcript text. Pure:
//! the same text always yields the same metrics.

use std::collections::{BTreeSet, HashSet};
use std::sync::OnceLock;

use regex::Regex;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{ContextConfig, ContextMetrics};

/// Phrases that indicate exploratory reasoning rather than a clean
/// instruction or result. Matched case-insensitively.
pub const RESIDUE_PHRASES: &[&str] = &[
    "we explored",
    "on second thought",
    "let me reconsider",
    "scratch that",
    "after exploring",
    "initially i thought",
    "alternatively we could",
    "let me think about",
    "we considered",
    "dead end",
];

fn file_path_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?:[A-Za-z0-9_.-]+/)*[A-Za-z0-9_-]+\.(?:rs|toml|ts|tsx|js|jsx|py|go|java|kt|rb|md|json|ya?ml|css|html|sh|sql|c|h|cpp|hpp)\b",
        )
        .expect("file path regex is valid")
    })
}

fn file_marker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*(?:[#>*-]+\s*)?file:\s*\S+").expect("file marker regex is valid")
    })
}

/// Extracts [`ContextMetrics`] from transcript text.
#[derive(Debug, Clone)]
pub struct ContextMetricsExtractor {
    task_id: Regex,
    lexicon: Vec<String>,
    max_embedded_file_lines: usize,
}

impl ContextMetricsExtractor {
    pub fn new(config: &ContextConfig) -> DomainResult<Self> {
        let task_id = Regex::new(&config.task_id_pattern).map_err(|e| {
            DomainError::InvalidConfiguration(format!(
                "task_id_pattern '{}': {e}",
                config.task_id_pattern
            ))
        })?;

        let mut lexicon: Vec<String> = RESIDUE_PHRASES.iter().map(|p| (*p).to_string()).collect();
        for keyword in &config.residue_keywords {
            let keyword = keyword.trim().to_lowercase();
            if !keyword.is_empty() && !lexicon.contains(&keyword) {
                lexicon.push(keyword);
            }
        }

        Ok(Self {
            task_id,
            lexicon,
            max_embedded_file_lines: config.max_embedded_file_lines,
        })
    }

    pub fn with_defaults() -> Self {
        Self::new(&ContextConfig::default()).expect("default context config is valid")
    }

    /// The full planning-residue lexicon (built-in phrases plus keywords).
    pub fn lexicon(&self) -> &[String] {
        &self.lexicon
    }

    pub fn max_embedded_file_lines(&self) -> usize {
        self.max_embedded_file_lines
    }

    /// Compute metrics for a piece of text.
    pub fn extract(&self, text: &str) -> ContextMetrics {
        let files: HashSet<&str> = file_path_regex().find_iter(text).map(|m| m.as_str()).collect();

        let task_ids: BTreeSet<String> = self
            .task_id
            .find_iter(text)
            .map(|m| m.as_str().to_string())
            .collect();

        let (residue_hits, residue_phrases) = self.count_residue(text);
        let longest_file_block = longest_file_block(text);

        ContextMetrics {
            size_bytes: text.len(),
            file_references: files.len(),
            task_ids,
            residue_hits,
            residue_phrases,
            longest_file_block,
            embeds_full_file: longest_file_block > self.max_embedded_file_lines,
        }
    }

    fn count_residue(&self, text: &str) -> (usize, Vec<String>) {
        let lowered = text.to_lowercase();
        let mut hits = 0;
        let mut phrases = Vec::new();
        for phrase in &self.lexicon {
            let count = lowered.matches(phrase.as_str()).count();
            if count > 0 {
                hits += count;
                phrases.push(phrase.clone());
            }
        }
        (hits, phrases)
    }
}

/// Longest run of lines following a `file:` marker.
///
/// A fenced block directly after the marker counts up to its closing fence;
/// otherwise the run ends at the first blank line or the next marker.
fn longest_file_block(text: &str) -> usize {
    let marker = file_marker_regex();
    let lines: Vec<&str> = text.lines().collect();
    let mut longest = 0;
    let mut i = 0;

    while i < lines.len() {
        if !marker.is_match(lines[i]) {
            i += 1;
            continue;
        }

        let mut j = i + 1;
        let mut count = 0;
        if j < lines.len() && lines[j].trim_start().starts_with("```") {
            j += 1;
            while j < lines.len() && !lines[j].trim_start().starts_with("```") {
                count += 1;
                j += 1;
            }
        } else {
            while j < lines.len() && !lines[j].trim().is_empty() && !marker.is_match(lines[j]) {
                count += 1;
                j += 1;
            }
        }

        longest = longest.max(count);
        i = j.max(i + 1);
    }

    longest
}
