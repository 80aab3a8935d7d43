//! The hidden re-entrant worker entry points.
//!
//! A launcher never runs an agent's iteration loop itself — it registers
//! the record, then re-invokes `std::env::current_exe()` detached
//! (`swarm_process::spawn_detached`) so the loop survives the launching
//! process's exit. The re-invocation is this same `swarm` binary called
//! with a hidden subcommand; these functions are what that subcommand
//! runs once it lands in the new, detached process.
//!
//! A single agent's resolved launch parameters (backend argv with its
//! prompt already substituted, timeouts, capture path) don't fit
//! anywhere on `AgentRecord` itself, so they cross the re-exec boundary
//! through a one-shot sidecar JSON file in `Config::launch_params_dir()`
//! rather than being reconstructed. A pipeline instance needs no such
//! sidecar — its `ExecutorConfig` is fully derivable from the config
//! file and the compose document, both reachable by path alone.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use swarm_core::Config;
use swarm_registry::Registry;
use swarm_runner::{ClaudeCliUsageParser, IterationConfig};

use super::compose_ops;

/// Sidecar launch parameters for one detached single-agent worker,
/// written by the launcher before it spawns the worker and removed by
/// the worker itself once the loop exits.
#[derive(Debug, Serialize, Deserialize)]
pub struct AgentLaunchParams {
    pub backend_command: String,
    pub backend_args: Vec<String>,
    pub working_dir: PathBuf,
    pub log_file: PathBuf,
    pub iteration_timeout_secs: Option<u64>,
    pub total_timeout_secs: Option<u64>,
    pub poll_interval_ms: u64,
    pub capture_path: Option<PathBuf>,
    pub env: Vec<(String, String)>,
}

fn sidecar_path(dir: &Path, token: &str) -> PathBuf {
    dir.join(format!("{token}.json"))
}

pub fn write_launch_params(dir: &Path, token: &str, params: &AgentLaunchParams) -> anyhow::Result<()> {
    std::fs::create_dir_all(dir)?;
    let raw = serde_json::to_string(params)?;
    std::fs::write(sidecar_path(dir, token), raw)?;
    Ok(())
}

fn read_launch_params(dir: &Path, token: &str) -> anyhow::Result<AgentLaunchParams> {
    let raw = std::fs::read_to_string(sidecar_path(dir, token))
        .map_err(|e| anyhow::anyhow!("reading launch params for token {token}: {e}"))?;
    Ok(serde_json::from_str(&raw)?)
}

fn remove_launch_params(dir: &Path, token: &str) {
    let _ = std::fs::remove_file(sidecar_path(dir, token));
}

/// Entry point for `swarm __worker`. Runs one agent's iteration loop to
/// completion and exits; the launching process has already returned by
/// the time this runs.
pub async fn run_agent_worker(
    config_path: Option<PathBuf>,
    agent_id: String,
    launch_token: String,
) -> anyhow::Result<i32> {
    let config = Config::load(&config_path.unwrap_or_else(Config::default_path))?;
    let registry = Arc::new(Registry::open(config.registry_path()));
    let params_dir = config.launch_params_dir();
    let params = read_launch_params(&params_dir, &launch_token)?;

    let iteration_config = IterationConfig {
        agent_id: agent_id.clone(),
        backend_command: params.backend_command,
        backend_args: params.backend_args,
        working_dir: params.working_dir,
        log_file: params.log_file,
        iteration_timeout: params.iteration_timeout_secs.map(Duration::from_secs),
        total_timeout: params.total_timeout_secs.map(Duration::from_secs),
        poll_interval: Duration::from_millis(params.poll_interval_ms),
        capture_path: params.capture_path,
        env: params.env,
    };

    let outcome = swarm_runner::run(registry, iteration_config, Arc::new(ClaudeCliUsageParser)).await;
    remove_launch_params(&params_dir, &launch_token);
    outcome?;
    Ok(0)
}

/// Entry point for `swarm __pipeline-worker`. Runs one pipeline
/// instance's loop (iterations over its task DAG) to completion.
pub async fn run_pipeline_worker(
    config_path: Option<PathBuf>,
    compose_path: PathBuf,
    pipeline_name: String,
    instance_index: u32,
) -> anyhow::Result<i32> {
    let config = Config::load(&config_path.unwrap_or_else(Config::default_path))?;
    let registry = Arc::new(Registry::open(config.registry_path()));
    let doc = compose_ops::load_compose(&compose_path)?;
    let pipeline = doc
        .pipelines
        .get(&pipeline_name)
        .ok_or_else(|| anyhow::anyhow!("compose file no longer defines pipeline '{pipeline_name}'"))?
        .clone();

    let ctx = super::context::Context {
        config,
        registry: registry.clone(),
        cwd: compose_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    };
    let exec_cfg = compose_ops::executor_config(&ctx, &compose_path);
    let presets = compose_ops::load_presets(&ctx.config.prompts_dir());
    let prompt_source = Arc::new(swarm_dag::DefaultPromptSource { presets });

    swarm_dag::run_pipeline_instance(
        registry,
        exec_cfg,
        prompt_source,
        Arc::new(ClaudeCliUsageParser),
        Arc::new(doc),
        pipeline_name,
        pipeline,
        instance_index,
    )
    .await?;

    Ok(0)
}
