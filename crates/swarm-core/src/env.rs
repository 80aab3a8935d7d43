//! Environment variable names injected into a backend child's process,
//! shared between the CLI launcher and the DAG executor so both sides
//! agree on the wire names without duplicating string literals.

pub const AGENT_ID: &str = "SWARM_AGENT_ID";
pub const TASK_ID: &str = "SWARM_TASK_ID";
pub const STATE_DIR: &str = "SWARM_STATE_DIR";
