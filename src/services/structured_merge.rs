//! Deterministic structured merge of planning documents.
//!
//! Combines the requirements, architecture and risk documents into one plan
//! by textual extraction only. Identical inputs always produce byte-identical
//! output, so a plan can be regenerated at any time.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

/// Steps emitted when no source document contains a numbered list.
pub const FALLBACK_STEPS: [&str; 4] = [
    "Set up the module structure and core types",
    "Implement the core logic behind the requirements",
    "Add tests covering every acceptance criterion",
    "Integrate the feature and verify it end to end",
];

/// Which section of which input lands under which merged heading.
struct SectionRule {
    source: Source,
    heading: &'static str,
    title: &'static str,
}

#[derive(Clone, Copy)]
enum Source {
    Requirements,
    Architecture,
    Risks,
}

const SECTION_RULES: &[SectionRule] = &[
    SectionRule {
        source: Source::Requirements,
        heading: "Requirements",
        title: "Requirements",
    },
    SectionRule {
        source: Source::Requirements,
        heading: "Acceptance Criteria",
        title: "Acceptance Criteria",
    },
    SectionRule {
        source: Source::Architecture,
        heading: "Architecture",
        title: "Architecture",
    },
    SectionRule {
        source: Source::Architecture,
        heading: "Components",
        title: "Components",
    },
    SectionRule {
        source: Source::Risks,
        heading: "Risks",
        title: "Risks",
    },
    SectionRule {
        source: Source::Risks,
        heading: "Mitigations",
        title: "Mitigations",
    },
];

fn heading_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(#{1,6})\s+(.+?)\s*#*\s*$").expect("heading regex is valid"))
}

fn numbered_item_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*\d+[.)]\s+(.+?)\s*$").expect("numbered item regex is valid"))
}

/// Placeholder emitted for a heading that is absent from its document.
pub fn section_placeholder(heading: &str) -> String {
    format!("_Section not found: {heading}_")
}

/// Parse a markdown heading line into `(level, text)`.
fn parse_heading(line: &str) -> Option<(usize, &str)> {
    let caps = heading_regex().captures(line)?;
    let level = caps.get(1)?.as_str().len();
    let text = caps.get(2)?.as_str();
    Some((level, text))
}

/// Extract the body under `heading`, up to the next heading of the same or
/// higher level. Heading text is matched case-insensitively.
pub fn extract_section(doc: &str, heading: &str) -> Option<String> {
    let wanted = heading.trim().to_lowercase();
    let mut lines = doc.lines();
    let mut level = None;

    for line in lines.by_ref() {
        if let Some((lvl, text)) = parse_heading(line) {
            if text.to_lowercase() == wanted {
                level = Some(lvl);
                break;
            }
        }
    }
    let level = level?;

    let mut body = Vec::new();
    let mut in_fence = false;
    for line in lines {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
        }
        if !in_fence {
            if let Some((lvl, _)) = parse_heading(line) {
                if lvl <= level {
                    break;
                }
            }
        }
        body.push(line);
    }

    Some(body.join("\n").trim().to_string())
}

/// Numbered list items of a document, in order of appearance.
pub fn numbered_items(doc: &str) -> Vec<String> {
    doc.lines()
        .filter_map(|line| numbered_item_regex().captures(line))
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

/// Collect numbered items from the given documents, drop exact duplicates
/// (first occurrence wins) and renumber from 1. Falls back to the generic
/// steps when there are none.
pub fn synthesize_steps(docs: &[&str]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut steps: Vec<String> = docs
        .iter()
        .flat_map(|doc| numbered_items(doc))
        .filter(|item| seen.insert(item.clone()))
        .collect();

    if steps.is_empty() {
        steps = FALLBACK_STEPS.iter().map(|s| (*s).to_string()).collect();
    }

    steps
        .into_iter()
        .enumerate()
        .map(|(i, step)| format!("{}. {step}", i + 1))
        .collect()
}

/// Merge the three planning documents into one plan. Never fails.
pub fn merge_plans(requirements: &str, architecture: &str, risks: &str) -> String {
    let mut out = String::from("# Implementation Plan\n");

    for rule in SECTION_RULES {
        let doc = match rule.source {
            Source::Requirements => requirements,
            Source::Architecture => architecture,
            Source::Risks => risks,
        };
        let body = extract_section(doc, rule.heading)
            .filter(|b| !b.is_empty())
            .unwrap_or_else(|| section_placeholder(rule.heading));
        out.push_str(&format!("\n## {}\n\n{body}\n", rule.title));
    }

    out.push_str("\n## Implementation Steps\n\n");
    for step in synthesize_steps(&[requirements, architecture]) {
        out.push_str(&step);
        out.push('\n');
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQUIREMENTS: &str = "\
# Feature

## Requirements

Users can export reports.

### Formats

CSV and JSON.

## Acceptance Criteria

1. Export CSV
2. Export JSON

## Notes

ignored
";

    const ARCHITECTURE: &str = "\
## Architecture

An exporter trait with one impl per format.

## Components

1. Export CSV
2) Add exporter trait
";

    const RISKS: &str = "\
# Risks

Large reports may exhaust memory.

# Mitigations

Stream rows.
";

    #[test]
    fn test_extract_section_keeps_nested_headings() {
        let body = extract_section(REQUIREMENTS, "requirements").unwrap();
        assert_eq!(body, "Users can export reports.\n\n### Formats\n\nCSV and JSON.");
    }

    #[test]
    fn test_extract_section_missing_heading() {
        assert!(extract_section(REQUIREMENTS, "Timeline").is_none());
    }

    #[test]
    fn test_heading_inside_code_fence_does_not_end_section() {
        let doc = "## Architecture\n```\n# not a heading\n```\nafter\n## Next\n";
        let body = extract_section(doc, "Architecture").unwrap();
        assert_eq!(body, "```\n# not a heading\n```\nafter");
    }

    #[test]
    fn test_synthesis_dedupes_and_renumbers() {
        let steps = synthesize_steps(&[REQUIREMENTS, ARCHITECTURE]);
        assert_eq!(
            steps,
            vec!["1. Export CSV", "2. Export JSON", "3. Add exporter trait"]
        );
    }

    #[test]
    fn test_synthesis_fallback() {
        let steps = synthesize_steps(&["no lists here", "- bullet only"]);
        assert_eq!(steps.len(), 4);
        assert!(steps[0].starts_with("1. Set up"));
        assert!(steps[3].starts_with("4. "));
    }

    #[test]
    fn test_merge_is_deterministic() {
        let a = merge_plans(REQUIREMENTS, ARCHITECTURE, RISKS);
        let b = merge_plans(REQUIREMENTS, ARCHITECTURE, RISKS);
        assert_eq!(a, b);
        assert!(a.contains("## Risks\n\nLarge reports may exhaust memory."));
        assert!(a.contains("## Mitigations\n\nStream rows."));
    }

    #[test]
    fn test_merge_with_missing_risks_uses_placeholder() {
        let merged = merge_plans(REQUIREMENTS, ARCHITECTURE, "# Something else\n\ntext\n");
        assert!(merged.contains("## Risks\n\n_Section not found: Risks_"));
        assert!(merged.contains("## Implementation Steps"));
        assert!(merged.contains("## Requirements\n\nUsers can export reports."));
    }

    #[test]
    fn test_merge_of_empty_documents_still_complete() {
        let merged = merge_plans("", "", "");
        for rule in SECTION_RULES {
            assert!(merged.contains(&section_placeholder(rule.heading)));
        }
        assert!(merged.contains("4. Integrate the feature"));
    }
}
