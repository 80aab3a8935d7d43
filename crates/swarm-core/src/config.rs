//! Layered configuration: built-in defaults, overridden by an optional
//! TOML file, overridden by CLI flags/env vars (the CLI crate owns the
//! clap side; this module owns the file layer and the merge).
//!
//! Mirrors the `oddurs`-style `dirs` + `toml` config-file idiom pulled
//! into this workspace's ambient stack.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

fn default_model() -> String {
    "claude-sonnet-4-5".to_string()
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

fn default_kill_grace_secs() -> u64 {
    10
}

fn default_iterations() -> u64 {
    0
}

fn default_backend_args() -> Vec<String> {
    vec![
        "-p".to_string(),
        "{{prompt}}".to_string(),
        "--model".to_string(),
        "{{model}}".to_string(),
    ]
}

/// On-disk / merged configuration for the whole `swarm` binary.
///
/// Every field has a built-in default, so a totally absent config file
/// is a valid, fully-functional configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root directory for the registry file, per-agent log files, and
    /// DAG per-iteration state directories. Defaults to
    /// `$XDG_STATE_HOME/swarm` (or platform equivalent via `dirs`).
    pub state_dir: PathBuf,

    /// Model identifier passed to the backend command when an agent's
    /// own record doesn't specify one.
    pub default_model: String,

    /// Default `iterations` for newly launched agents. `0` means
    /// unbounded everywhere in this system (Open Question, pinned).
    pub default_iterations: u64,

    /// Default per-iteration timeout in seconds. `None` means no
    /// per-iteration timeout.
    pub default_iteration_timeout_secs: Option<u64>,

    /// Default total-runtime timeout in seconds. `None` means no cap.
    pub default_total_timeout_secs: Option<u64>,

    /// How often the iteration loop polls the registry for a
    /// control-intent change while paused or between iterations.
    pub poll_interval_ms: u64,

    /// Grace period between SIGTERM and SIGKILL when terminating an
    /// agent process.
    pub kill_grace_secs: u64,

    /// The backend command template, e.g. `"claude"` — the executable
    /// the iteration loop invokes once per iteration.
    pub backend_command: String,

    /// Argv template passed to `backend_command`. The literal tokens
    /// `{{prompt}}` and `{{model}}` are substituted per iteration.
    pub backend_args: Vec<String>,

    /// `tracing` env-filter directive string, e.g. `"info"` or
    /// `"swarm_runner=debug,swarm_dag=info"`.
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            default_model: default_model(),
            default_iterations: default_iterations(),
            default_iteration_timeout_secs: None,
            default_total_timeout_secs: None,
            poll_interval_ms: default_poll_interval_ms(),
            kill_grace_secs: default_kill_grace_secs(),
            backend_command: "claude".to_string(),
            backend_args: default_backend_args(),
            log_level: "info".to_string(),
        }
    }
}

fn default_state_dir() -> PathBuf {
    dirs::state_dir()
        .or_else(dirs::data_local_dir)
        .map(|p| p.join("swarm"))
        .unwrap_or_else(|| {
            dirs::home_dir()
                .map(|h| h.join(".swarm"))
                .unwrap_or_else(|| PathBuf::from(".swarm"))
        })
}

impl Config {
    /// Load the config file at `path` if it exists, layered over
    /// defaults. A missing file is not an error; a malformed one is.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    /// The default config file location: `~/.config/swarm/config.toml`
    /// (via `dirs::config_dir`).
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .map(|p| p.join("swarm").join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("swarm.toml"))
    }

    /// Path to the registry JSON file inside `state_dir`.
    pub fn registry_path(&self) -> PathBuf {
        self.state_dir.join("registry.json")
    }

    /// Directory that holds per-agent log files.
    pub fn logs_dir(&self) -> PathBuf {
        self.state_dir.join("logs")
    }

    /// Directory that holds per-iteration DAG state.
    pub fn dag_state_dir(&self) -> PathBuf {
        self.state_dir.join("dag")
    }

    /// Directory that holds named prompt presets (`<name>.md`), read by
    /// `swarm prompts` and the `preset:` prompt source.
    pub fn prompts_dir(&self) -> PathBuf {
        self.state_dir.join("prompts")
    }

    /// Directory that holds sidecar launch parameters for detached
    /// workers — backend argv and timeouts an `AgentRecord` itself
    /// doesn't carry.
    pub fn launch_params_dir(&self) -> PathBuf {
        self.state_dir.join("launch")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_zero_config_ready() {
        let cfg = Config::default();
        assert_eq!(cfg.default_iterations, 0);
        assert!(!cfg.backend_command.is_empty());
        assert!(cfg.registry_path().ends_with("registry.json"));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = Config::load(Path::new("/nonexistent/path/swarm.toml")).unwrap();
        assert_eq!(cfg.default_model, default_model());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("swarm.toml");
        std::fs::write(&path, "this is not valid toml {{{").unwrap();
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn well_formed_partial_file_overlays_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("swarm.toml");
        std::fs::write(&path, "default_model = \"claude-opus-4\"\n").unwrap();
        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.default_model, "claude-opus-4");
        assert_eq!(cfg.poll_interval_ms, default_poll_interval_ms());
    }
}
