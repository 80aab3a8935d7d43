//! Shared wiring every command handler needs: the merged config, a
//! handle to the registry, and the invocation's working directory (the
//! project scope that `--all` opts out of).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use swarm_core::record::AgentRecord;
use swarm_core::Config;
use swarm_registry::Registry;

pub struct Context {
    pub config: Config,
    pub registry: Arc<Registry>,
    pub cwd: PathBuf,
}

impl Context {
    pub fn load(config_path: Option<&Path>) -> anyhow::Result<Self> {
        let path = config_path
            .map(Path::to_path_buf)
            .unwrap_or_else(Config::default_path);
        let config = Config::load(&path)?;
        let registry = Arc::new(Registry::open(config.registry_path()));
        let cwd = std::env::current_dir()?;
        Ok(Self { config, registry, cwd })
    }

    /// Resolve a user-typed identifier to exactly one record.
    pub fn resolve(&self, token: &str) -> anyhow::Result<AgentRecord> {
        Ok(self.registry.resolve(token)?)
    }

    /// Every tracked record, restricted to this invocation's working
    /// directory unless `all` is set, oldest first.
    pub fn scoped(&self, all: bool) -> anyhow::Result<Vec<AgentRecord>> {
        let mut records = self.registry.list()?;
        if !all {
            records.retain(|r| r.working_dir == self.cwd);
        }
        records.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        Ok(records)
    }
}

/// A short, stable one-line rendering of a record for table output.
pub fn format_row(rec: &AgentRecord) -> String {
    let name = rec.name.as_deref().unwrap_or("-");
    let pause = match rec.derived_pause_state() {
        swarm_core::record::PauseState::Running => "",
        swarm_core::record::PauseState::Pausing => " (pausing)",
        swarm_core::record::PauseState::Paused => " (paused)",
    };
    let state = match (rec.status, rec.exit_reason) {
        (swarm_core::record::AgentStatus::Running, _) => format!("running{pause}"),
        (swarm_core::record::AgentStatus::Terminated, Some(reason)) => reason.to_string(),
        (swarm_core::record::AgentStatus::Terminated, None) => "terminated".to_string(),
    };
    format!(
        "{:<12} {:<20} {:<10} {:>5}/{:<5} {}",
        rec.id,
        name,
        state,
        rec.current_iter.saturating_sub(1),
        if rec.iterations == 0 {
            "∞".to_string()
        } else {
            rec.iterations.to_string()
        },
        rec.working_dir.display(),
    )
}
