//! Task dependency graph checks.
//!
//! Backlog invariants that depend on the shape of the graph: unique ids,
//! resolvable dependencies and acyclicity, plus a stable topological order.

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::task::Task;
use std::collections::{HashMap, HashSet};

/// Service for resolving task dependencies and detecting circular dependencies
#[derive(Debug, Clone, Default)]
pub struct DependencyResolver;

// Standalone helper for cycle detection (no self needed)
fn detect_cycle_util<'a>(
    node: &'a str,
    graph: &HashMap<&'a str, Vec<&'a str>>,
    visited: &mut HashSet<&'a str>,
    rec_stack: &mut HashSet<&'a str>,
    path: &mut Vec<&'a str>,
) -> bool {
    visited.insert(node);
    rec_stack.insert(node);
    path.push(node);

    if let Some(neighbors) = graph.get(node) {
        for &neighbor in neighbors {
            if !visited.contains(neighbor) {
                if detect_cycle_util(neighbor, graph, visited, rec_stack, path) {
                    return true;
                }
            } else if rec_stack.contains(neighbor) {
                // Cycle detected; close the loop so the path reads A -> B -> A
                if let Some(cycle_start) = path.iter().position(|&id| id == neighbor) {
                    path.drain(0..cycle_start);
                    path.push(neighbor);
                    return true;
                }
            }
        }
    }

    rec_stack.remove(node);
    path.pop();
    false
}

impl DependencyResolver {
    pub fn new() -> Self {
        Self
    }

    /// Validate every backlog invariant on the task graph.
    ///
    /// Checks, in order: unique ids, non-empty acceptance criteria, every
    /// dependency resolves, and the graph is acyclic.
    pub fn validate_graph(&self, tasks: &[Task]) -> DomainResult<()> {
        let mut seen = HashSet::new();
        for task in tasks {
            if !seen.insert(task.id.as_str()) {
                return Err(DomainError::DuplicateTaskId(task.id.clone()));
            }
        }

        for task in tasks {
            if task.acceptance_criteria.is_empty() {
                return Err(DomainError::EmptyAcceptanceCriteria(task.id.clone()));
            }
            self.validate_dependencies(task, tasks)?;
        }

        if let Some(cycle) = self.detect_cycle(tasks) {
            return Err(DomainError::DependencyCycle(cycle));
        }

        Ok(())
    }

    /// Validate that all dependencies exist
    pub fn validate_dependencies(&self, task: &Task, available_tasks: &[Task]) -> DomainResult<()> {
        let available_ids: HashSet<&str> = available_tasks.iter().map(|t| t.id.as_str()).collect();

        for dep_id in &task.depends_on {
            if !available_ids.contains(dep_id.as_str()) {
                return Err(DomainError::UnknownDependency {
                    task_id: task.id.clone(),
                    dependency: dep_id.clone(),
                });
            }
        }
        Ok(())
    }

    /// Detect circular dependencies in a set of tasks
    pub fn detect_cycle(&self, tasks: &[Task]) -> Option<Vec<String>> {
        let mut graph: HashMap<&str, Vec<&str>> = HashMap::new();

        // Build adjacency list
        for task in tasks {
            graph
                .entry(task.id.as_str())
                .or_default()
                .extend(task.depends_on.iter().map(String::as_str));
        }

        // DFS-based cycle detection, in insertion order so reports are stable
        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();
        let mut path = Vec::new();

        for task in tasks {
            let id = task.id.as_str();
            if !visited.contains(id)
                && detect_cycle_util(id, &graph, &mut visited, &mut rec_stack, &mut path)
            {
                return Some(path.into_iter().map(str::to_string).collect());
            }
        }

        None
    }

    /// Perform topological sort on tasks based on dependencies
    /// Returns task ids in dependency order (dependencies before dependents)
    pub fn topological_sort(&self, tasks: &[Task]) -> DomainResult<Vec<String>> {
        // Check for cycles first
        if let Some(cycle) = self.detect_cycle(tasks) {
            return Err(DomainError::DependencyCycle(cycle));
        }

        let mut in_degree: HashMap<&str, usize> = HashMap::new();
        let mut graph: HashMap<&str, Vec<&str>> = HashMap::new();

        // Build graph and calculate in-degrees
        for task in tasks {
            in_degree.entry(task.id.as_str()).or_insert(0);
            for dep_id in &task.depends_on {
                graph.entry(dep_id.as_str()).or_default().push(task.id.as_str());
                *in_degree.entry(task.id.as_str()).or_insert(0) += 1;
            }
        }

        // Kahn's algorithm; seed in insertion order for a stable result
        let mut queue: std::collections::VecDeque<&str> = tasks
            .iter()
            .map(|t| t.id.as_str())
            .filter(|id| in_degree.get(id).copied() == Some(0))
            .collect();

        let mut sorted = Vec::new();

        while let Some(node_id) = queue.pop_front() {
            sorted.push(node_id.to_string());

            if let Some(neighbors) = graph.get(node_id) {
                for &neighbor in neighbors {
                    if let Some(degree) = in_degree.get_mut(neighbor) {
                        *degree -= 1;
                        if *degree == 0 {
                            queue.push_back(neighbor);
                        }
                    }
                }
            }
        }

        if sorted.len() != tasks.len() {
            return Err(DomainError::DependencyCycle(Vec::new()));
        }

        Ok(sorted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_task(id: &str, dependencies: &[&str]) -> Task {
        let mut task = Task::new(id, "Test", "Description").with_criterion("done");
        task.depends_on = dependencies.iter().map(|d| (*d).to_string()).collect();
        task
    }

    #[test]
    fn test_validate_dependencies_success() {
        let resolver = DependencyResolver::new();
        let task1 = create_test_task("T01", &[]);
        let task2 = create_test_task("T02", &["T01"]);

        let available = vec![task1];
        assert!(resolver.validate_dependencies(&task2, &available).is_ok());
    }

    #[test]
    fn test_validate_dependencies_missing() {
        let resolver = DependencyResolver::new();
        let task = create_test_task("T01", &["T02"]);

        assert!(matches!(
            resolver.validate_dependencies(&task, &[]),
            Err(DomainError::UnknownDependency { .. })
        ));
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let resolver = DependencyResolver::new();
        let tasks = vec![create_test_task("T01", &["T01"])];
        assert_eq!(
            resolver.detect_cycle(&tasks),
            Some(vec!["T01".to_string(), "T01".to_string()])
        );
    }

    #[test]
    fn test_detect_cycle_no_cycle() {
        let resolver = DependencyResolver::new();
        let tasks = vec![create_test_task("T01", &[]), create_test_task("T02", &["T01"])];
        assert!(resolver.detect_cycle(&tasks).is_none());
    }

    #[test]
    fn test_detect_cycle_with_cycle() {
        let resolver = DependencyResolver::new();
        let tasks = vec![create_test_task("T01", &["T02"]), create_test_task("T02", &["T01"])];
        let cycle = resolver.detect_cycle(&tasks).unwrap();
        assert_eq!(cycle, vec!["T01", "T02", "T01"]);
    }

    #[test]
    fn test_validate_graph_rejects_duplicates_and_empty_criteria() {
        let resolver = DependencyResolver::new();
        let dup = vec![create_test_task("T01", &[]), create_test_task("T01", &[])];
        assert!(matches!(
            resolver.validate_graph(&dup),
            Err(DomainError::DuplicateTaskId(id)) if id == "T01"
        ));

        let no_criteria = vec![Task::new("T01", "Test", "Description")];
        assert!(matches!(
            resolver.validate_graph(&no_criteria),
            Err(DomainError::EmptyAcceptanceCriteria(_))
        ));
    }

    #[test]
    fn test_topological_sort_simple() {
        let resolver = DependencyResolver::new();
        let tasks = vec![
            create_test_task("T03", &["T02"]),
            create_test_task("T01", &[]),
            create_test_task("T02", &["T01"]),
        ];
        let sorted = resolver.topological_sort(&tasks).unwrap();
        assert_eq!(sorted, vec!["T01", "T02", "T03"]);
    }

    #[test]
    fn test_topological_sort_with_cycle() {
        let resolver = DependencyResolver::new();
        let tasks = vec![create_test_task("T01", &["T02"]), create_test_task("T02", &["T01"])];
        assert!(resolver.topological_sort(&tasks).is_err());
    }
}
