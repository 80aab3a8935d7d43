//! Validation of a parsed `ComposeDocument` before it is handed to the
//! DAG executor: undefined references, prompt-source ambiguity, and
//! dependency cycles.

use std::collections::{HashMap, HashSet};

use swarm_core::error::{Error, Result};

use crate::model::{ComposeDocument, DependencyEdge};

/// Validate `doc`, returning every problem found (not just the first),
/// matching the retrieved `watchdag-cli` convention of reporting a full
/// dry-run diagnostic rather than stopping at the first error.
pub fn validate(doc: &ComposeDocument) -> Result<()> {
    let mut errors = Vec::new();

    if doc.tasks.is_empty() && doc.pipelines.is_empty() {
        errors.push("compose document defines no tasks or pipelines".to_string());
    }

    for (collision, _) in doc.tasks.iter().filter(|(name, _)| doc.pipelines.contains_key(*name)) {
        errors.push(format!(
            "'{collision}' is defined as both a task and a pipeline; the pipeline wins at \
             runtime, but this is almost certainly a mistake"
        ));
    }

    for (name, task) in &doc.tasks {
        validate_prompt_source(name, task, &mut errors);
        validate_edges(name, &task.depends_on, doc, &mut errors);
        if task.parallelism == 0 {
            errors.push(format!("task '{name}': parallelism must be at least 1"));
        }
        if task.concurrency == Some(0) {
            errors.push(format!("task '{name}': concurrency must be at least 1"));
        }
    }

    for (name, pipeline) in &doc.pipelines {
        if pipeline.tasks.is_empty() {
            errors.push(format!("pipeline '{name}': must reference at least one task"));
        }
        for task_name in &pipeline.tasks {
            if !doc.tasks.contains_key(task_name) {
                errors.push(format!(
                    "pipeline '{name}': references undefined task '{task_name}'"
                ));
            }
        }
        if pipeline.parallelism == 0 {
            errors.push(format!("pipeline '{name}': parallelism must be at least 1"));
        }
    }

    if let Some(cycle) = find_cycle(doc) {
        errors.push(format!("dependency cycle detected: {}", cycle.join(" -> ")));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(Error::Config(errors.join("; ")))
    }
}

fn validate_prompt_source(
    name: &str,
    task: &crate::model::TaskSpec,
    errors: &mut Vec<String>,
) {
    let set = [
        task.preset.is_some(),
        task.prompt.is_some(),
        task.prompt_file.is_some(),
    ]
    .iter()
    .filter(|b| **b)
    .count();

    match set {
        0 => errors.push(format!(
            "task '{name}': must set exactly one of prompt/prompt-file/prompt-string (none set)"
        )),
        1 => {}
        _ => errors.push(format!(
            "task '{name}': must set exactly one of prompt/prompt-file/prompt-string (multiple set)"
        )),
    }
}

fn validate_edges(
    owner: &str,
    edges: &[DependencyEdge],
    doc: &ComposeDocument,
    errors: &mut Vec<String>,
) {
    for edge in edges {
        if edge.on == owner {
            errors.push(format!("'{owner}' depends on itself"));
            continue;
        }
        if !doc.tasks.contains_key(&edge.on) && !doc.pipelines.contains_key(&edge.on) {
            errors.push(format!(
                "'{owner}': depends_on references undefined node '{}'",
                edge.on
            ));
        }
    }
}

/// DFS cycle detection over the combined task+pipeline dependency
/// graph. Returns the cycle's node path if one exists.
fn find_cycle(doc: &ComposeDocument) -> Option<Vec<String>> {
    let mut edges: HashMap<&str, Vec<&str>> = HashMap::new();
    for (name, task) in &doc.tasks {
        edges
            .entry(name.as_str())
            .or_default()
            .extend(task.depends_on.iter().map(|e| e.on.as_str()));
    }
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Visiting,
        Done,
    }

    let mut marks: HashMap<&str, Mark> = HashMap::new();
    let mut stack: Vec<&str> = Vec::new();

    fn visit<'a>(
        node: &'a str,
        edges: &HashMap<&'a str, Vec<&'a str>>,
        marks: &mut HashMap<&'a str, Mark>,
        stack: &mut Vec<&'a str>,
    ) -> Option<Vec<String>> {
        if let Some(Mark::Done) = marks.get(node) {
            return None;
        }
        if let Some(Mark::Visiting) = marks.get(node) {
            let start = stack.iter().position(|n| *n == node).unwrap_or(0);
            let mut cycle: Vec<String> = stack[start..].iter().map(|s| s.to_string()).collect();
            cycle.push(node.to_string());
            return Some(cycle);
        }
        marks.insert(node, Mark::Visiting);
        stack.push(node);
        if let Some(deps) = edges.get(node) {
            for dep in deps {
                if let Some(cycle) = visit(dep, edges, marks, stack) {
                    return Some(cycle);
                }
            }
        }
        stack.pop();
        marks.insert(node, Mark::Done);
        None
    }

    let all_nodes: HashSet<&str> = edges.keys().copied().collect();
    for node in all_nodes {
        if let Some(cycle) = visit(node, &edges, &mut marks, &mut stack) {
            return Some(cycle);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EdgeCondition, TaskSpec};

    fn bare_task(preset: &str) -> TaskSpec {
        TaskSpec {
            preset: Some(preset.to_string()),
            prompt: None,
            prompt_file: None,
            prompt_prefix: None,
            prompt_suffix: None,
            model: None,
            iterations: None,
            parallelism: 1,
            concurrency: None,
            name: None,
            depends_on: vec![],
            env: vec![],
            on_complete: None,
            labels: Default::default(),
            iteration_timeout_secs: None,
            total_timeout_secs: None,
        }
    }

    #[test]
    fn empty_document_is_rejected() {
        let doc = ComposeDocument::default();
        assert!(validate(&doc).is_err());
    }

    #[test]
    fn missing_prompt_source_is_rejected() {
        let mut doc = ComposeDocument::default();
        let mut task = bare_task("x");
        task.preset = None;
        doc.tasks.insert("a".into(), task);
        assert!(validate(&doc).is_err());
    }

    #[test]
    fn dangling_dependency_is_rejected() {
        let mut doc = ComposeDocument::default();
        let mut task = bare_task("x");
        task.depends_on.push(DependencyEdge {
            on: "ghost".into(),
            condition: EdgeCondition::Success,
        });
        doc.tasks.insert("a".into(), task);
        assert!(validate(&doc).is_err());
    }

    #[test]
    fn two_node_cycle_is_detected() {
        let mut doc = ComposeDocument::default();
        let mut a = bare_task("a");
        a.depends_on.push(DependencyEdge {
            on: "b".into(),
            condition: EdgeCondition::Success,
        });
        let mut b = bare_task("b");
        b.depends_on.push(DependencyEdge {
            on: "a".into(),
            condition: EdgeCondition::Success,
        });
        doc.tasks.insert("a".into(), a);
        doc.tasks.insert("b".into(), b);
        assert!(validate(&doc).is_err());
    }

    #[test]
    fn valid_document_passes() {
        let mut doc = ComposeDocument::default();
        doc.tasks.insert("build".into(), bare_task("build"));
        let mut test_task = bare_task("test");
        test_task.depends_on.push(DependencyEdge {
            on: "build".into(),
            condition: EdgeCondition::Success,
        });
        doc.tasks.insert("test".into(), test_task);
        assert!(validate(&doc).is_ok());
    }
}
