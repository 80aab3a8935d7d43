//! Everything else: registry maintenance (`prune`, `doctor`), one-time
//! setup (`init`), static listings (`prompts`, `models`), shell
//! completion generation, and the compose-scoped teardown commands
//! (`down`, `compose-stop`, `compose-logs`).

use std::path::PathBuf;

use clap::Args;

use swarm_core::record::AgentRecord;

use super::compose_ops;
use super::context::Context;

#[derive(Args, Debug)]
pub struct PruneArgs {
    /// Remove terminated records older than this many hours.
    #[arg(long, default_value_t = 24 * 7)]
    pub older_than_hours: i64,
}

pub async fn prune(ctx: &Context, args: PruneArgs) -> anyhow::Result<i32> {
    let removed = ctx
        .registry
        .prune_older_than(chrono::Duration::hours(args.older_than_hours))?;
    println!("removed {} record(s)", removed.len());
    Ok(0)
}

#[derive(Args, Debug)]
pub struct DoctorArgs {
    /// Actually rewrite stale records instead of just reporting them.
    #[arg(long)]
    pub fix: bool,
}

/// Reconcile every record claiming to be running against OS-level pid
/// liveness. Without `--fix` this is a dry-run report; process death
/// while a `swarm` process wasn't around to observe it (machine reboot,
/// OOM kill) is the case this exists for.
pub async fn doctor(ctx: &Context, args: DoctorArgs) -> anyhow::Result<i32> {
    if args.fix {
        let fixed = ctx.registry.reconcile(swarm_process::is_alive)?;
        for id in &fixed {
            println!("marked {id} terminated (process no longer alive)");
        }
        if fixed.is_empty() {
            println!("nothing to fix");
        }
        return Ok(0);
    }

    let records = ctx.registry.list()?;
    let mut stale: Vec<&AgentRecord> = records
        .iter()
        .filter(|r| r.is_running() && !r.pid.map(swarm_process::is_alive).unwrap_or(false))
        .collect();
    stale.sort_by(|a, b| a.id.cmp(&b.id));
    if stale.is_empty() {
        println!("registry looks consistent");
        return Ok(0);
    }
    for rec in &stale {
        println!("{} claims running but pid {:?} is not alive", rec.id, rec.pid);
    }
    println!("run `swarm doctor --fix` to reconcile");
    Ok(0)
}

pub async fn init(ctx: &Context) -> anyhow::Result<i32> {
    for dir in [
        ctx.config.logs_dir(),
        ctx.config.dag_state_dir(),
        ctx.config.prompts_dir(),
        ctx.config.launch_params_dir(),
    ] {
        std::fs::create_dir_all(&dir)?;
    }
    let config_path = swarm_core::Config::default_path();
    if !config_path.exists() {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let default = swarm_core::Config::default();
        std::fs::write(&config_path, toml::to_string_pretty(&default)?)?;
        println!("wrote default config to {}", config_path.display());
    } else {
        println!("config already exists at {}", config_path.display());
    }
    println!("state directory: {}", ctx.config.state_dir.display());
    Ok(0)
}

pub async fn prompts(ctx: &Context) -> anyhow::Result<i32> {
    let presets = compose_ops::load_presets(&ctx.config.prompts_dir());
    if presets.is_empty() {
        println!("no presets in {}", ctx.config.prompts_dir().display());
        return Ok(0);
    }
    let mut names: Vec<&String> = presets.keys().collect();
    names.sort();
    for name in names {
        println!("{name}");
    }
    Ok(0)
}

/// Model aliases this build knows how to pass straight through to the
/// backend command's `{{model}}` substitution.
const KNOWN_MODELS: &[&str] = &[
    "claude-opus-4-1",
    "claude-sonnet-4-5",
    "claude-haiku-4-5",
];

pub async fn models() -> anyhow::Result<i32> {
    for model in KNOWN_MODELS {
        println!("{model}");
    }
    Ok(0)
}

#[derive(Args, Debug)]
pub struct CompletionArgs {
    #[arg(value_enum)]
    pub shell: clap_complete::Shell,
}

pub async fn completion(args: CompletionArgs, mut cmd: clap::Command) -> anyhow::Result<i32> {
    let name = cmd.get_name().to_string();
    clap_complete::generate(args.shell, &mut cmd, name, &mut std::io::stdout());
    Ok(0)
}

#[derive(Args, Debug)]
pub struct DownArgs {
    pub pipeline: Option<String>,
    #[arg(short = 'f', long = "file")]
    pub file: Option<PathBuf>,
}

/// Scale every matching pipeline instance to zero: `swarm down` without
/// a name tears down every pipeline the current compose file defines,
/// `swarm down <name>` (== `swarm compose-stop <name>`) only that one.
///
/// Matched records AND their transitive descendants are force-killed —
/// signalled directly, not merely asked to stop at their next boundary —
/// per the spec's "down" contract.
pub async fn down(ctx: &Context, args: DownArgs) -> anyhow::Result<i32> {
    let compose_path = compose_ops::resolve_compose_path(ctx, args.file.as_ref());
    let doc = compose_ops::load_compose(&compose_path)?;
    let running = ctx.scoped(false)?;

    let names: Vec<String> = match &args.pipeline {
        Some(name) => vec![name.clone()],
        None => doc.pipelines.keys().cloned().collect(),
    };
    let mut stopped = 0usize;
    for name in names {
        let base = format!("pipeline:{name}");
        for rec in swarm_dag::names::matching(&running, &base, &ctx.cwd) {
            if rec.is_running() {
                super::control::terminate_one(
                    ctx,
                    &rec,
                    swarm_core::record::TerminateMode::Immediate,
                    true,
                )?;
                for child in ctx.registry.get_descendants(&rec.id)? {
                    if child.is_running() {
                        super::control::terminate_one(
                            ctx,
                            &child,
                            swarm_core::record::TerminateMode::Immediate,
                            true,
                        )?;
                    }
                }
                stopped += 1;
            }
        }
    }
    println!("stopped {stopped} pipeline instance(s)");
    Ok(0)
}

#[derive(Args, Debug)]
pub struct ComposeStopArgs {
    pub pipeline: String,
    #[arg(short = 'f', long = "file")]
    pub file: Option<PathBuf>,
}

pub async fn compose_stop(ctx: &Context, args: ComposeStopArgs) -> anyhow::Result<i32> {
    down(
        ctx,
        DownArgs {
            pipeline: Some(args.pipeline),
            file: args.file,
        },
    )
    .await
}

#[derive(Args, Debug)]
pub struct ComposeLogsArgs {
    pub pipeline: String,
    #[arg(short = 'f', long = "file")]
    pub file: Option<PathBuf>,
    #[arg(long)]
    pub follow: bool,
    #[arg(short = 'n', long, default_value_t = 50)]
    pub lines: usize,
}

pub async fn compose_logs(ctx: &Context, args: ComposeLogsArgs) -> anyhow::Result<i32> {
    let base = format!("pipeline:{}", args.pipeline);
    let records = ctx.scoped(true)?;
    let matches = swarm_dag::names::matching(&records, &base, &ctx.cwd);
    if matches.is_empty() {
        anyhow::bail!("no running instances of pipeline '{}'", args.pipeline);
    }
    for rec in matches {
        println!("== {} ({}) ==", rec.name.as_deref().unwrap_or(&rec.id), rec.id);
        if let Some(path) = &rec.log_file {
            let contents = std::fs::read_to_string(path).unwrap_or_default();
            let all: Vec<&str> = contents.lines().collect();
            let start = all.len().saturating_sub(args.lines);
            for line in &all[start..] {
                println!("{line}");
            }
        }
    }
    if args.follow {
        eprintln!("note: --follow only tails a single instance; pick one with `swarm logs <id>`");
    }
    Ok(0)
}
