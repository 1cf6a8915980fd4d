//! Task classification and model selection.
//!
//! An exhaustive keyword classifier over task title and spec text. The
//! resulting [`TaskKind`] only picks the model selector handed to the agent
//! runtime; it never changes scheduling.

use serde::Serialize;

use crate::domain::models::Task;

/// Closed set of task kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Planning,
    Implementation,
    Testing,
    Documentation,
    Refactor,
    Bugfix,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planning => "planning",
            Self::Implementation => "implementation",
            Self::Testing => "testing",
            Self::Documentation => "documentation",
            Self::Refactor => "refactor",
            Self::Bugfix => "bugfix",
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keyword rules, checked in order; the first kind with a match wins.
const RULES: &[(TaskKind, &[&str])] = &[
    (TaskKind::Bugfix, &["fix", "bug", "regression", "crash", "broken"]),
    (TaskKind::Refactor, &["refactor", "cleanup", "clean up", "restructure", "rename"]),
    (TaskKind::Testing, &["test", "coverage", "benchmark", "fixture"]),
    (TaskKind::Documentation, &["document", "docs", "readme", "changelog", "guide"]),
    (
        TaskKind::Planning,
        &["design", "plan", "architecture", "investigate", "research", "spike"],
    ),
];

/// Classify a task by its title first, then its spec text.
pub fn classify(task: &Task) -> TaskKind {
    let title = task.title.to_lowercase();
    let spec = task.spec.to_lowercase();
    [title, spec]
        .iter()
        .find_map(|text| classify_text(text))
        .unwrap_or(TaskKind::Implementation)
}

fn classify_text(text: &str) -> Option<TaskKind> {
    let words: Vec<&str> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    RULES.iter().find_map(|(kind, keywords)| {
        keywords
            .iter()
            .any(|kw| {
                if kw.contains(' ') {
                    text.contains(kw)
                } else {
                    words.iter().any(|w| w.starts_with(kw))
                }
            })
            .then_some(*kind)
    })
}

/// Model selector for a task kind.
pub fn model_for(kind: TaskKind) -> &'static str {
    match kind {
        TaskKind::Planning => "opus",
        TaskKind::Implementation | TaskKind::Refactor | TaskKind::Bugfix => "sonnet",
        TaskKind::Testing | TaskKind::Documentation => "haiku",
    }
}

/// Model selector for a task attempt; retries escalate one step.
pub fn select_model(task: &Task) -> &'static str {
    let base = model_for(classify(task));
    if task.attempts <= 1 {
        return base;
    }
    match base {
        "haiku" => "sonnet",
        _ => "opus",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(title: &str, spec: &str) -> Task {
        Task::new("T01", title, spec).with_criterion("done")
    }

    #[test]
    fn test_title_keywords() {
        assert_eq!(classify(&task("Fix crash on empty input", "")), TaskKind::Bugfix);
        assert_eq!(classify(&task("Refactor storage layer", "")), TaskKind::Refactor);
        assert_eq!(classify(&task("Add tests for parser", "")), TaskKind::Testing);
        assert_eq!(classify(&task("Update README", "")), TaskKind::Documentation);
        assert_eq!(classify(&task("Design cache architecture", "")), TaskKind::Planning);
    }

    #[test]
    fn test_title_wins_over_spec() {
        let t = task("Write docs for exporter", "Fix the broken links too");
        assert_eq!(classify(&t), TaskKind::Documentation);
    }

    #[test]
    fn test_spec_used_when_title_is_neutral() {
        let t = task("Exporter", "Add a benchmark for large reports");
        assert_eq!(classify(&t), TaskKind::Testing);
    }

    #[test]
    fn test_default_is_implementation() {
        let t = task("Add CSV exporter", "Write rows to a file");
        assert_eq!(classify(&t), TaskKind::Implementation);
        assert_eq!(select_model(&t), "sonnet");
    }

    #[test]
    fn test_keywords_match_word_prefixes_only() {
        // "prefix" contains "fix" but does not start with it
        assert_eq!(classify(&task("Strip prefix from keys", "")), TaskKind::Implementation);
    }

    #[test]
    fn test_retry_escalates_model() {
        let mut t = task("Update README", "");
        assert_eq!(select_model(&t), "haiku");
        t.attempts = 2;
        assert_eq!(select_model(&t), "sonnet");
    }
}
