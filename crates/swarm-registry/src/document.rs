//! The on-disk shape of the registry file: one JSON document holding
//! every tracked agent, keyed by its opaque id.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use swarm_core::record::AgentRecord;

const CURRENT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryDocument {
    #[serde(default = "current_version")]
    pub version: u32,
    #[serde(default)]
    pub agents: HashMap<String, AgentRecord>,
}

fn current_version() -> u32 {
    CURRENT_VERSION
}

impl Default for RegistryDocument {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            agents: HashMap::new(),
        }
    }
}
