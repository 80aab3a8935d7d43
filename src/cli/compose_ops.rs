//! Shared helpers for anything that touches a compose document or a
//! prompt preset: loading `swarm.yaml`, loading the preset library, and
//! building the `ExecutorConfig` a pipeline worker runs against.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use swarm_compose::ComposeDocument;
use swarm_dag::ExecutorConfig;

use super::context::Context;

pub const DEFAULT_COMPOSE_FILE: &str = "swarm.yaml";

pub fn load_compose(path: &Path) -> anyhow::Result<ComposeDocument> {
    let source = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("reading {}: {e}", path.display()))?;
    Ok(swarm_compose::parse(&source)?)
}

/// Every `<name>.md` file in the preset directory, keyed by file stem.
pub fn load_presets(dir: &Path) -> HashMap<String, String> {
    let mut presets = HashMap::new();
    let Ok(entries) = std::fs::read_dir(dir) else {
        return presets;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("md") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if let Ok(contents) = std::fs::read_to_string(&path) {
            presets.insert(stem.to_string(), contents);
        }
    }
    presets
}

/// Build the config a pipeline worker executes against. `working_dir` is
/// the compose file's own directory, not the invoking shell's cwd — a
/// detached pipeline worker's cwd is whatever the launcher happened to
/// pass, but the compose file's location is the one stable anchor both
/// the launcher and the worker can independently derive from its path.
pub fn executor_config(ctx: &Context, compose_path: &Path) -> ExecutorConfig {
    let working_dir = compose_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| ctx.cwd.clone());
    ExecutorConfig {
        working_dir,
        state_root: ctx.config.dag_state_dir(),
        log_dir: ctx.config.logs_dir(),
        backend_command: ctx.config.backend_command.clone(),
        backend_args: ctx.config.backend_args.clone(),
        default_model: ctx.config.default_model.clone(),
        default_iteration_timeout: ctx
            .config
            .default_iteration_timeout_secs
            .map(Duration::from_secs),
    }
}

/// The absolute path a relative `--file` argument (or the default
/// `swarm.yaml`) resolves to, rooted at the invocation's cwd.
pub fn resolve_compose_path(ctx: &Context, file: Option<&PathBuf>) -> PathBuf {
    let relative = file
        .cloned()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_COMPOSE_FILE));
    if relative.is_absolute() {
        relative
    } else {
        ctx.cwd.join(relative)
    }
}
