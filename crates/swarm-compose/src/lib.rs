//! Compose document parsing and validation: the typed model a
//! `swarm.yaml` file deserializes into, and the checks that must pass
//! before it is handed to the DAG executor.

pub mod model;
pub mod validate;

pub use model::{ComposeDocument, DependencyEdge, EdgeCondition, PipelineSpec, TaskSpec};
pub use validate::validate;

use swarm_core::error::{Error, Result};

/// Parse and validate a compose document from its YAML source text.
pub fn parse(source: &str) -> Result<ComposeDocument> {
    let doc: ComposeDocument =
        serde_yaml::from_str(source).map_err(|e| Error::Config(format!("parsing compose file: {e}")))?;
    validate(&doc)?;
    Ok(doc)
}
