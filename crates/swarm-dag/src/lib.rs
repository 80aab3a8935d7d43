//! The Compose/DAG Executor: runs a `swarm.yaml` pipeline's task graph,
//! honoring conditional edges, per-task concurrency, and parallel
//! pipeline instances.

pub mod executor;
pub mod graph;
pub mod names;
pub mod prompt;

pub use executor::{run_dag_iteration, run_pipeline_instance, DefaultPromptSource, ExecutorConfig, PromptSource};
pub use graph::{DagGraph, NodeOutcome, NodeState};
