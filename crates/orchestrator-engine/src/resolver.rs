//! # Dependency Resolver (C5)
//!
//! Builds a workflow's dependency graph at submission time — validating
//! task-id uniqueness, dependency existence, self-dependencies, cycles,
//! and parameter-reference transitivity — and, after each task
//! completion, computes the set of newly-ready dependents (§4.5).

use once_cell::sync::Lazy;
use orchestrator_shared::errors::{SharedError, SharedResult};
use orchestrator_shared::models::task::Task;
use regex::Regex;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

static PARAM_REF: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\?\$\{([^}]+)\}").unwrap());

/// One task's position within a workflow's dependency graph.
#[derive(Debug, Clone)]
pub struct GraphNode {
    pub task_uuid: Uuid,
    pub display_id: String,
    pub dependencies: HashSet<Uuid>,
    pub dependents: HashSet<Uuid>,
    /// Longest-path depth from a root (no-dependency) task (§4.5).
    pub depth: u32,
}

/// A workflow's resolved dependency graph.
#[derive(Debug, Clone, Default)]
pub struct WorkflowGraph {
    pub nodes: HashMap<Uuid, GraphNode>,
    pub display_to_uuid: HashMap<String, Uuid>,
}

impl WorkflowGraph {
    pub fn fan_out(&self, task_uuid: Uuid) -> usize {
        self.nodes
            .get(&task_uuid)
            .map(|n| n.dependents.len())
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

pub struct DependencyResolver;

impl DependencyResolver {
    /// Builds and validates the dependency graph for a set of tasks that
    /// make up one workflow (§4.5 `buildGraph`).
    pub fn build_graph(tasks: &[Task]) -> SharedResult<WorkflowGraph> {
        let mut display_to_uuid = HashMap::new();
        for task in tasks {
            if display_to_uuid.insert(task.display_id.clone(), task.task_uuid).is_some() {
                return Err(SharedError::DuplicateTaskId(task.display_id.clone()));
            }
        }

        let mut nodes: HashMap<Uuid, GraphNode> = tasks
            .iter()
            .map(|t| {
                (
                    t.task_uuid,
                    GraphNode {
                        task_uuid: t.task_uuid,
                        display_id: t.display_id.clone(),
                        dependencies: HashSet::new(),
                        dependents: HashSet::new(),
                        depth: 0,
                    },
                )
            })
            .collect();

        for task in tasks {
            for dep_display in &task.dependencies {
                if dep_display == &task.display_id {
                    return Err(SharedError::SelfDependency {
                        task: task.display_id.clone(),
                    });
                }
                let dep_uuid = display_to_uuid.get(dep_display).copied().ok_or_else(|| {
                    SharedError::UnknownDependency {
                        task: task.display_id.clone(),
                        dependency: dep_display.clone(),
                    }
                })?;
                nodes.get_mut(&task.task_uuid).unwrap().dependencies.insert(dep_uuid);
                nodes.get_mut(&dep_uuid).unwrap().dependents.insert(task.task_uuid);
            }
        }

        let mut graph = WorkflowGraph {
            nodes,
            display_to_uuid,
        };

        detect_cycle(&graph)?;
        compute_depths(&mut graph);
        validate_parameter_references(&graph, tasks)?;

        Ok(graph)
    }

    /// The initial ready set at submission: tasks with no dependencies.
    pub fn initial_ready_set(graph: &WorkflowGraph) -> Vec<Uuid> {
        graph
            .nodes
            .values()
            .filter(|n| n.dependencies.is_empty())
            .map(|n| n.task_uuid)
            .collect()
    }

    /// After `just_finished` reaches a terminal state, returns its direct
    /// dependents whose *every* dependency is now terminal (§4.5, §4.8
    /// Failure: under continue-on-error a dependent of a failed task still
    /// becomes ready so substitution can fail it with
    /// `UnsatisfiedReference` if it actually references the failed
    /// result).
    pub fn newly_ready(graph: &WorkflowGraph, terminal: &HashSet<Uuid>, just_finished: Uuid) -> Vec<Uuid> {
        let Some(node) = graph.nodes.get(&just_finished) else {
            return Vec::new();
        };
        node.dependents
            .iter()
            .filter(|dependent| {
                graph
                    .nodes
                    .get(dependent)
                    .map(|d| d.dependencies.iter().all(|dep| terminal.contains(dep)))
                    .unwrap_or(false)
            })
            .copied()
            .collect()
    }
}

fn detect_cycle(graph: &WorkflowGraph) -> SharedResult<()> {
    let mut color: HashMap<Uuid, Color> = graph.nodes.keys().map(|id| (*id, Color::White)).collect();
    let mut path = Vec::new();

    for &start in graph.nodes.keys() {
        if color[&start] == Color::White {
            if let Some(cycle) = visit(graph, start, &mut color, &mut path) {
                return Err(SharedError::DependencyCycle(cycle));
            }
        }
    }
    Ok(())
}

fn visit(
    graph: &WorkflowGraph,
    node_id: Uuid,
    color: &mut HashMap<Uuid, Color>,
    path: &mut Vec<Uuid>,
) -> Option<Vec<String>> {
    color.insert(node_id, Color::Gray);
    path.push(node_id);

    // Dependency edges point from a task to what it depends on; a cycle
    // is detected by walking dependencies and re-encountering a gray node.
    for &dep in &graph.nodes[&node_id].dependencies {
        match color[&dep] {
            Color::White => {
                if let Some(cycle) = visit(graph, dep, color, path) {
                    return Some(cycle);
                }
            }
            Color::Gray => {
                let start_idx = path.iter().position(|id| *id == dep).unwrap();
                let mut cycle: Vec<String> = path[start_idx..]
                    .iter()
                    .map(|id| graph.nodes[id].display_id.clone())
                    .collect();
                cycle.push(graph.nodes[&dep].display_id.clone());
                return Some(cycle);
            }
            Color::Black => {}
        }
    }

    path.pop();
    color.insert(node_id, Color::Black);
    None
}

fn compute_depths(graph: &mut WorkflowGraph) {
    let order = topological_order(graph);
    for id in order {
        let depth = graph.nodes[&id]
            .dependencies
            .iter()
            .map(|dep| graph.nodes[dep].depth + 1)
            .max()
            .unwrap_or(0);
        graph.nodes.get_mut(&id).unwrap().depth = depth;
    }
}

/// Dependency-first topological order (a task appears after everything it
/// depends on). Graph is already known acyclic at this point.
fn topological_order(graph: &WorkflowGraph) -> Vec<Uuid> {
    let mut visited = HashSet::new();
    let mut order = Vec::with_capacity(graph.nodes.len());

    fn dfs(graph: &WorkflowGraph, id: Uuid, visited: &mut HashSet<Uuid>, order: &mut Vec<Uuid>) {
        if !visited.insert(id) {
            return;
        }
        for &dep in &graph.nodes[&id].dependencies {
            dfs(graph, dep, visited, order);
        }
        order.push(id);
    }

    for &id in graph.nodes.keys() {
        dfs(graph, id, &mut visited, &mut order);
    }
    order
}

/// Walks every task's `params` tree for `${task-id...}` references and
/// verifies the referenced task exists and is a (transitive) dependency
/// of the referrer, so missing transitive dependencies surface as
/// submission-time errors rather than silent runtime gaps (§4.5, §4.6).
fn validate_parameter_references(graph: &WorkflowGraph, tasks: &[Task]) -> SharedResult<()> {
    for task in tasks {
        let ancestors = transitive_dependencies(graph, task.task_uuid);
        for reference in collect_references(&task.params) {
            let target_id = reference.split('.').next().unwrap_or(&reference);
            let Some(&target_uuid) = graph.display_to_uuid.get(target_id) else {
                return Err(SharedError::UnknownDependency {
                    task: task.display_id.clone(),
                    dependency: target_id.to_string(),
                });
            };
            if target_uuid != task.task_uuid && !ancestors.contains(&target_uuid) {
                return Err(SharedError::UndeclaredParameterDependency {
                    referrer: task.display_id.clone(),
                    target: target_id.to_string(),
                });
            }
        }
    }
    Ok(())
}

fn transitive_dependencies(graph: &WorkflowGraph, task_uuid: Uuid) -> HashSet<Uuid> {
    let mut visited = HashSet::new();
    let mut stack: Vec<Uuid> = graph
        .nodes
        .get(&task_uuid)
        .map(|n| n.dependencies.iter().copied().collect())
        .unwrap_or_default();
    while let Some(id) = stack.pop() {
        if visited.insert(id) {
            if let Some(node) = graph.nodes.get(&id) {
                stack.extend(node.dependencies.iter().copied());
            }
        }
    }
    visited
}

/// Collects the `task-id` portion of every non-escaped `${...}` reference
/// found anywhere in `value`.
fn collect_references(value: &Value) -> Vec<String> {
    let mut out = Vec::new();
    collect_references_into(value, &mut out);
    out
}

fn collect_references_into(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => {
            for m in PARAM_REF.captures_iter(s) {
                if m.get(0).unwrap().as_str().starts_with('\\') {
                    continue;
                }
                out.push(m[1].to_string());
            }
        }
        Value::Array(items) => items.iter().for_each(|v| collect_references_into(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_references_into(v, out)),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchestrator_shared::models::task::{Priority, RetryConfig};

    fn make_task(workflow_id: Uuid, display_id: &str, deps: &[&str], params: Value) -> Task {
        Task::new(
            workflow_id,
            display_id,
            display_id,
            "llm/v1",
            "generate",
            params,
            Priority::Normal,
            deps.iter().map(|s| s.to_string()).collect(),
            None,
            RetryConfig::default(),
        )
    }

    #[test]
    fn diamond_dag_computes_depths_and_fan_out() {
        let wf = Uuid::new_v4();
        let a = make_task(wf, "a", &[], serde_json::json!({}));
        let b = make_task(wf, "b", &["a"], serde_json::json!({}));
        let c = make_task(wf, "c", &["a"], serde_json::json!({}));
        let d = make_task(wf, "d", &["b", "c"], serde_json::json!({}));
        let tasks = vec![a.clone(), b.clone(), c.clone(), d.clone()];
        let graph = DependencyResolver::build_graph(&tasks).unwrap();
        assert_eq!(graph.nodes[&a.task_uuid].depth, 0);
        assert_eq!(graph.nodes[&d.task_uuid].depth, 2);
        assert_eq!(graph.fan_out(a.task_uuid), 2);
        assert_eq!(
            DependencyResolver::initial_ready_set(&graph),
            vec![a.task_uuid]
        );
    }

    #[test]
    fn cycle_is_detected() {
        let wf = Uuid::new_v4();
        let a = make_task(wf, "a", &["b"], serde_json::json!({}));
        let b = make_task(wf, "b", &["a"], serde_json::json!({}));
        let err = DependencyResolver::build_graph(&[a, b]).unwrap_err();
        assert!(matches!(err, SharedError::DependencyCycle(_)));
    }

    #[test]
    fn self_dependency_is_rejected() {
        let wf = Uuid::new_v4();
        let a = make_task(wf, "a", &["a"], serde_json::json!({}));
        assert!(matches!(
            DependencyResolver::build_graph(&[a]),
            Err(SharedError::SelfDependency { .. })
        ));
    }

    #[test]
    fn unknown_dependency_is_rejected() {
        let wf = Uuid::new_v4();
        let a = make_task(wf, "a", &["ghost"], serde_json::json!({}));
        assert!(matches!(
            DependencyResolver::build_graph(&[a]),
            Err(SharedError::UnknownDependency { .. })
        ));
    }

    #[test]
    fn parameter_reference_to_non_ancestor_is_rejected() {
        let wf = Uuid::new_v4();
        let a = make_task(wf, "a", &[], serde_json::json!({}));
        // `b` references `a`'s result but never declares it as a dependency.
        let b = make_task(wf, "b", &[], serde_json::json!({"x": "${a.value}"}));
        let err = DependencyResolver::build_graph(&[a, b]).unwrap_err();
        assert!(matches!(err, SharedError::UndeclaredParameterDependency { .. }));
    }

    #[test]
    fn parameter_reference_to_declared_ancestor_is_accepted() {
        let wf = Uuid::new_v4();
        let a = make_task(wf, "a", &[], serde_json::json!({}));
        let b = make_task(wf, "b", &["a"], serde_json::json!({"x": "${a.value}"}));
        assert!(DependencyResolver::build_graph(&[a, b]).is_ok());
    }

    #[test]
    fn newly_ready_requires_all_dependencies_terminal() {
        let wf = Uuid::new_v4();
        let a = make_task(wf, "a", &[], serde_json::json!({}));
        let b = make_task(wf, "b", &[], serde_json::json!({}));
        let c = make_task(wf, "c", &["a", "b"], serde_json::json!({}));
        let graph = DependencyResolver::build_graph(&[a.clone(), b.clone(), c.clone()]).unwrap();
        let mut terminal = HashSet::new();
        terminal.insert(a.task_uuid);
        assert!(DependencyResolver::newly_ready(&graph, &terminal, a.task_uuid).is_empty());
        terminal.insert(b.task_uuid);
        assert_eq!(
            DependencyResolver::newly_ready(&graph, &terminal, b.task_uuid),
            vec![c.task_uuid]
        );
    }
}
