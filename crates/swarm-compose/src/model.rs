//! The typed compose document model: what a `swarm.yaml` file
//! deserializes into before validation.
//!
//! Grounded on the retrieved `watchdag-cli` DAG-from-config shape
//! (named nodes with `depends_on` edges, root seeding, scheduler
//! config), adapted to this spec's task/pipeline vocabulary and prompt
//! sources.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComposeDocument {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub tasks: HashMap<String, TaskSpec>,
    #[serde(default)]
    pub pipelines: HashMap<String, PipelineSpec>,
}

/// A leaf unit of work: one agent definition, possibly fanned out to
/// `parallelism` concurrent instances.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    /// References a prompt preset by name. Wire key is `prompt`, matching
    /// the compose schema's "reference to a named preset" sense of the
    /// word; the field is named `preset` here to keep it distinct from
    /// the inline `prompt` (wire key `prompt-string`) below.
    #[serde(default, rename = "prompt")]
    pub preset: Option<String>,
    #[serde(default, rename = "prompt-string")]
    pub prompt: Option<String>,
    #[serde(default, rename = "prompt-file")]
    pub prompt_file: Option<PathBuf>,
    #[serde(default)]
    pub prompt_prefix: Option<String>,
    #[serde(default)]
    pub prompt_suffix: Option<String>,

    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub iterations: Option<u64>,
    #[serde(default = "one_u32")]
    pub parallelism: u32,
    /// At most this many instances of this task may be running at once
    /// across the whole process — used to serialize planner-style nodes
    /// that shouldn't fan out freely even when `parallelism > 1`
    /// `None` means unbounded.
    #[serde(default)]
    pub concurrency: Option<u32>,
    /// Stable override for the agent `name` this task's instances are
    /// registered under; defaults to the task's own compose key when
    /// unset.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub depends_on: Vec<DependencyEdge>,
    #[serde(default)]
    pub env: Vec<String>,
    #[serde(default)]
    pub on_complete: Option<String>,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub iteration_timeout_secs: Option<u64>,
    #[serde(default)]
    pub total_timeout_secs: Option<u64>,
}

fn one_u32() -> u32 {
    1
}

/// An ordered sequence of task names run as one unit, optionally fanned
/// out to `parallelism` concurrent pipeline instances.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSpec {
    pub tasks: Vec<String>,
    /// Number of times the task DAG is cycled; 0 means unbounded.
    #[serde(default)]
    pub iterations: u64,
    #[serde(default = "one_u32")]
    pub parallelism: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeCondition {
    Success,
    Failure,
    Any,
    Always,
}

impl Default for EdgeCondition {
    fn default() -> Self {
        EdgeCondition::Success
    }
}

/// A dependency edge. Accepts either a bare node-name string (shorthand
/// for `{task: <name>, condition: success}`) or an explicit map — the
/// same shorthand-or-object flexibility the retrieved DAG config
/// examples give their edge lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyEdge {
    pub on: String,
    pub condition: EdgeCondition,
}

impl Serialize for DependencyEdge {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        #[derive(Serialize)]
        struct Full {
            task: String,
            condition: EdgeCondition,
        }
        Full {
            task: self.on.clone(),
            condition: self.condition,
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for DependencyEdge {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Shorthand {
            Name(String),
            Full {
                task: String,
                #[serde(default)]
                condition: EdgeCondition,
            },
        }

        Ok(match Shorthand::deserialize(deserializer)? {
            Shorthand::Name(on) => DependencyEdge {
                on,
                condition: EdgeCondition::Success,
            },
            Shorthand::Full { task, condition } => DependencyEdge { on: task, condition },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shorthand_edge_defaults_to_success() {
        let yaml = "\"build\"";
        let edge: DependencyEdge = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(edge.on, "build");
        assert_eq!(edge.condition, EdgeCondition::Success);
    }

    #[test]
    fn full_edge_parses_explicit_condition() {
        let yaml = "task: build\ncondition: failure\n";
        let edge: DependencyEdge = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(edge.on, "build");
        assert_eq!(edge.condition, EdgeCondition::Failure);
    }

    #[test]
    fn parses_a_minimal_compose_document() {
        let yaml = r#"
tasks:
  build:
    prompt: build-prompt
  test:
    prompt: test-prompt
    depends_on: ["build"]
pipelines:
  ci:
    tasks: [build, test]
"#;
        let doc: ComposeDocument = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(doc.tasks.len(), 2);
        assert_eq!(doc.pipelines["ci"].tasks, vec!["build", "test"]);
        assert_eq!(doc.tasks["test"].depends_on[0].on, "build");
    }
}
