//! Launcher commands: `run`, `restart`, `clone`, `replay`, `up`.
//!
//! Every single-agent launch funnels through [`launch_detached`]: resolve
//! a prompt to literal text, register the record, write the sidecar
//! launch parameters the re-entrant worker needs, then detach it.

use std::collections::HashMap;
use std::io::Read as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Args;

use swarm_core::record::{AgentRecord, PromptLabel};
use swarm_process::LaunchSpec;

use super::compose_ops;
use super::context::Context;
use super::worker::AgentLaunchParams;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Working directory the agent runs in; defaults to the current one.
    pub working_dir: Option<PathBuf>,
    /// Stable name, unique among currently-running agents.
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long)]
    pub model: Option<String>,
    /// Number of iterations to run; 0 (the default) means unbounded.
    #[arg(long)]
    pub iterations: Option<u64>,
    #[arg(long = "iteration-timeout")]
    pub iteration_timeout_secs: Option<u64>,
    #[arg(long = "total-timeout")]
    pub total_timeout_secs: Option<u64>,
    /// Inline prompt text.
    #[arg(long, group = "prompt_source")]
    pub prompt: Option<String>,
    #[arg(long = "prompt-file", group = "prompt_source")]
    pub prompt_file: Option<PathBuf>,
    #[arg(long = "preset", group = "prompt_source")]
    pub preset: Option<String>,
    /// Read the prompt text from stdin.
    #[arg(long, group = "prompt_source")]
    pub stdin: bool,
    #[arg(long = "on-complete")]
    pub on_complete: Option<String>,
    /// `key=value`, may be repeated.
    #[arg(long = "label", value_parser = parse_label)]
    pub labels: Vec<(String, String)>,
    /// Run the iteration loop in this process instead of detaching.
    #[arg(long)]
    pub foreground: bool,
}

fn parse_label(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got '{s}'"))
}

/// What's needed to launch one agent, independent of whether it came
/// from fresh CLI flags (`run`) or an existing record (`restart`/
/// `clone`/`replay`).
struct LaunchPlan {
    working_dir: PathBuf,
    prompt_label: PromptLabel,
    prompt_text: String,
    model: String,
    iterations: u64,
    iteration_timeout_secs: Option<u64>,
    total_timeout_secs: Option<u64>,
    name: Option<String>,
    on_complete: Option<String>,
    labels: HashMap<String, String>,
}

pub async fn run(ctx: &Context, args: RunArgs) -> anyhow::Result<i32> {
    let working_dir = args
        .working_dir
        .clone()
        .map(|p| if p.is_absolute() { p } else { ctx.cwd.join(p) })
        .unwrap_or_else(|| ctx.cwd.clone());

    let (prompt_label, prompt_text) = resolve_prompt_flags(ctx, &args)?;

    let plan = LaunchPlan {
        working_dir,
        prompt_label,
        prompt_text,
        model: args.model.unwrap_or_else(|| ctx.config.default_model.clone()),
        iterations: args.iterations.unwrap_or(ctx.config.default_iterations),
        iteration_timeout_secs: args.iteration_timeout_secs,
        total_timeout_secs: args.total_timeout_secs,
        name: args.name,
        on_complete: args.on_complete,
        labels: args.labels.into_iter().collect(),
    };

    launch(ctx, plan, args.foreground).await
}

fn resolve_prompt_flags(ctx: &Context, args: &RunArgs) -> anyhow::Result<(PromptLabel, String)> {
    if let Some(text) = &args.prompt {
        return Ok((PromptLabel::Inline, text.clone()));
    }
    if let Some(path) = &args.prompt_file {
        let text = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("reading prompt file {}: {e}", path.display()))?;
        return Ok((PromptLabel::File(path.clone()), text));
    }
    if let Some(name) = &args.preset {
        let presets = compose_ops::load_presets(&ctx.config.prompts_dir());
        let text = presets
            .get(name)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("unknown prompt preset: {name}"))?;
        return Ok((PromptLabel::Preset(name.clone()), text));
    }
    if args.stdin {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text)?;
        return Ok((PromptLabel::Stdin, text));
    }
    anyhow::bail!("specify exactly one of --prompt, --prompt-file, --preset, or --stdin")
}

/// Build a [`LaunchPlan`] that reproduces an existing record's
/// configuration. `Inline`/`Stdin` prompt sources can't be reproduced —
/// their literal text is never persisted past the sidecar file the
/// original worker deleted on exit.
fn plan_from_record(ctx: &Context, rec: &AgentRecord, iterations_override: Option<u64>) -> anyhow::Result<LaunchPlan> {
    let (prompt_label, prompt_text) = match &rec.prompt_label {
        PromptLabel::Preset(name) | PromptLabel::Combined(name) => {
            let presets = compose_ops::load_presets(&ctx.config.prompts_dir());
            let text = presets
                .get(name)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("prompt preset '{name}' no longer exists"))?;
            (PromptLabel::Preset(name.clone()), text)
        }
        PromptLabel::File(path) => {
            let text = std::fs::read_to_string(path)
                .map_err(|e| anyhow::anyhow!("reading prompt file {}: {e}", path.display()))?;
            (PromptLabel::File(path.clone()), text)
        }
        PromptLabel::Inline | PromptLabel::Stdin => anyhow::bail!(
            "agent {} was launched with an inline/stdin prompt; its text was not persisted, \
             so it cannot be relaunched this way — use `swarm run` instead",
            rec.id
        ),
    };

    Ok(LaunchPlan {
        working_dir: rec.working_dir.clone(),
        prompt_label,
        prompt_text,
        model: rec.model.clone(),
        iterations: iterations_override.unwrap_or(rec.iterations),
        iteration_timeout_secs: None,
        total_timeout_secs: None,
        name: rec.name.clone(),
        on_complete: rec.on_complete.clone(),
        labels: rec.labels.clone(),
    })
}

#[derive(Args, Debug)]
pub struct RestartArgs {
    pub id: String,
    #[arg(long)]
    pub foreground: bool,
}

pub async fn restart(ctx: &Context, args: RestartArgs) -> anyhow::Result<i32> {
    let rec = ctx.resolve(&args.id)?;
    if rec.is_running() {
        anyhow::bail!("agent {} is still running; kill it first or use `swarm clone`", rec.id);
    }
    let plan = plan_from_record(ctx, &rec, None)?;
    launch(ctx, plan, args.foreground).await
}

#[derive(Args, Debug)]
pub struct CloneArgs {
    pub id: String,
    #[arg(long)]
    pub foreground: bool,
}

pub async fn clone(ctx: &Context, args: CloneArgs) -> anyhow::Result<i32> {
    let rec = ctx.resolve(&args.id)?;
    let plan = plan_from_record(ctx, &rec, None)?;
    launch(ctx, plan, args.foreground).await
}

#[derive(Args, Debug)]
pub struct ReplayArgs {
    pub id: String,
    #[arg(long)]
    pub foreground: bool,
}

/// Relaunch an agent's exact configuration for one iteration only — a
/// cheap way to re-run what an agent just did without committing to a
/// full unbounded run again.
pub async fn replay(ctx: &Context, args: ReplayArgs) -> anyhow::Result<i32> {
    let rec = ctx.resolve(&args.id)?;
    let plan = plan_from_record(ctx, &rec, Some(1))?;
    launch(ctx, plan, args.foreground).await
}

async fn launch(ctx: &Context, plan: LaunchPlan, foreground: bool) -> anyhow::Result<i32> {
    let mut record = AgentRecord::new(plan.working_dir.clone(), plan.prompt_label, plan.model);
    record.name = plan.name;
    record.iterations = plan.iterations;
    record.on_complete = plan.on_complete;
    record.labels = plan.labels;
    record.env_names = vec![swarm_core::env::AGENT_ID.to_string()];

    let agent_id = ctx.registry.register(record)?;
    let log_file = ctx.config.logs_dir().join(format!("{agent_id}.log"));

    let backend_args: Vec<String> = ctx
        .config
        .backend_args
        .iter()
        .map(|a| a.replace("{{prompt}}", &plan.prompt_text))
        .collect();

    if foreground {
        let iteration_config = swarm_runner::IterationConfig {
            agent_id: agent_id.clone(),
            backend_command: ctx.config.backend_command.clone(),
            backend_args,
            working_dir: plan.working_dir,
            log_file,
            iteration_timeout: plan
                .iteration_timeout_secs
                .map(Duration::from_secs)
                .or(ctx.config.default_iteration_timeout_secs.map(Duration::from_secs)),
            total_timeout: plan
                .total_timeout_secs
                .map(Duration::from_secs)
                .or(ctx.config.default_total_timeout_secs.map(Duration::from_secs)),
            poll_interval: Duration::from_millis(ctx.config.poll_interval_ms),
            capture_path: None,
            env: vec![(swarm_core::env::AGENT_ID.to_string(), agent_id.clone())],
        };
        println!("{agent_id}");
        let outcome = swarm_runner::run(
            ctx.registry.clone(),
            iteration_config,
            std::sync::Arc::new(swarm_runner::ClaudeCliUsageParser),
        )
        .await?;
        return Ok(exit_code_for(outcome));
    }

    let params = AgentLaunchParams {
        backend_command: ctx.config.backend_command.clone(),
        backend_args,
        working_dir: plan.working_dir.clone(),
        log_file: log_file.clone(),
        iteration_timeout_secs: plan
            .iteration_timeout_secs
            .or(ctx.config.default_iteration_timeout_secs),
        total_timeout_secs: plan.total_timeout_secs.or(ctx.config.default_total_timeout_secs),
        poll_interval_ms: ctx.config.poll_interval_ms,
        capture_path: None,
        env: vec![(swarm_core::env::AGENT_ID.to_string(), agent_id.clone())],
    };
    super::worker::write_launch_params(&ctx.config.launch_params_dir(), &agent_id, &params)?;

    let exe = std::env::current_exe()?;
    let spec = LaunchSpec {
        program: exe,
        args: vec![
            "__worker".to_string(),
            "--config".to_string(),
            config_path_arg(ctx),
            "--agent-id".to_string(),
            agent_id.clone(),
            "--launch-token".to_string(),
            agent_id.clone(),
        ],
        working_dir: plan.working_dir,
        log_file,
        env: vec![],
    };
    let pid = swarm_process::spawn_detached(&spec)?;
    ctx.registry.update(&agent_id, |r| r.pid = Some(pid))?;

    println!("{agent_id}");
    Ok(0)
}

fn exit_code_for(outcome: swarm_runner::Outcome) -> i32 {
    match outcome {
        swarm_runner::Outcome::Completed | swarm_runner::Outcome::Killed => 0,
        swarm_runner::Outcome::TotalTimeout => 124,
        swarm_runner::Outcome::Signal => 0,
    }
}

fn config_path_arg(ctx: &Context) -> String {
    // The worker re-derives everything else from this same file, so a
    // relative default path must still resolve the same way it did here.
    let _ = ctx;
    swarm_core::Config::default_path().display().to_string()
}

#[derive(Args, Debug)]
pub struct UpArgs {
    #[arg(short = 'f', long = "file")]
    pub file: Option<PathBuf>,
    /// Only (re)launch this pipeline, not every pipeline in the file.
    #[arg(long)]
    pub pipeline: Option<String>,
    /// Run the (single) selected pipeline's instance in this process.
    #[arg(long)]
    pub foreground: bool,
}

pub async fn up(ctx: &Context, args: UpArgs) -> anyhow::Result<i32> {
    let compose_path = compose_ops::resolve_compose_path(ctx, args.file.as_ref());
    let doc = compose_ops::load_compose(&compose_path)?;

    let targets: Vec<(String, swarm_compose::PipelineSpec)> = match &args.pipeline {
        Some(name) => {
            let spec = doc
                .pipelines
                .get(name)
                .ok_or_else(|| anyhow::anyhow!("no pipeline named '{name}' in {}", compose_path.display()))?
                .clone();
            vec![(name.clone(), spec)]
        }
        None => doc.pipelines.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
    };
    if targets.is_empty() {
        anyhow::bail!("compose file defines no pipelines");
    }

    if args.foreground {
        if targets.len() != 1 {
            anyhow::bail!("--foreground requires --pipeline to select exactly one");
        }
        let (name, pipeline) = targets.into_iter().next().unwrap();
        let exec_cfg = compose_ops::executor_config(ctx, &compose_path);
        let presets = compose_ops::load_presets(&ctx.config.prompts_dir());
        let prompt_source = std::sync::Arc::new(swarm_dag::DefaultPromptSource { presets });
        let id = swarm_dag::run_pipeline_instance(
            ctx.registry.clone(),
            exec_cfg,
            prompt_source,
            std::sync::Arc::new(swarm_runner::ClaudeCliUsageParser),
            std::sync::Arc::new(doc),
            name,
            pipeline,
            1,
        )
        .await?;
        println!("{id}");
        return Ok(0);
    }

    let existing = ctx.scoped(false)?;
    for (name, pipeline) in &targets {
        reconcile_pipeline_instances(ctx, &compose_path, name, pipeline, &existing)?;
    }
    Ok(0)
}

fn reconcile_pipeline_instances(
    ctx: &Context,
    compose_path: &Path,
    pipeline_name: &str,
    pipeline: &swarm_compose::PipelineSpec,
    existing: &[AgentRecord],
) -> anyhow::Result<()> {
    let base = format!("pipeline:{pipeline_name}");
    let running: Vec<AgentRecord> = existing.iter().filter(|r| r.is_running()).cloned().collect();
    let present = swarm_dag::names::matching(&running, &base, &ctx.cwd);
    let present_indices: std::collections::HashSet<u32> =
        present.iter().map(|r| swarm_dag::names::instance_index(r.name.as_deref().unwrap_or(""))).collect();

    for idx in 1..=pipeline.parallelism.max(1) {
        if present_indices.contains(&idx) {
            continue;
        }
        spawn_pipeline_worker(ctx, compose_path, pipeline_name, idx)?;
    }

    for rec in swarm_dag::names::plan_scale_down(&running, &base, pipeline.parallelism.max(1), &ctx.cwd) {
        super::control::terminate_one(ctx, &rec, swarm_core::record::TerminateMode::Immediate, true)?;
        for child in ctx.registry.get_descendants(&rec.id)? {
            if child.is_running() {
                super::control::terminate_one(ctx, &child, swarm_core::record::TerminateMode::Immediate, true)?;
            }
        }
    }
    Ok(())
}

fn spawn_pipeline_worker(
    ctx: &Context,
    compose_path: &Path,
    pipeline_name: &str,
    instance_index: u32,
) -> anyhow::Result<()> {
    let exe = std::env::current_exe()?;
    let log_file = ctx
        .config
        .logs_dir()
        .join(format!("pipeline-{pipeline_name}-{instance_index}.log"));
    let spec = LaunchSpec {
        program: exe,
        args: vec![
            "__pipeline-worker".to_string(),
            "--config".to_string(),
            config_path_arg(ctx),
            "--compose".to_string(),
            compose_path.display().to_string(),
            "--pipeline".to_string(),
            pipeline_name.to_string(),
            "--instance".to_string(),
            instance_index.to_string(),
        ],
        working_dir: ctx.cwd.clone(),
        log_file,
        env: vec![],
    };
    swarm_process::spawn_detached(&spec)?;
    Ok(())
}
