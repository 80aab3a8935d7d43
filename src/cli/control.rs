//! Control-plane commands: writes to an `AgentRecord`'s control-intent
//! fields (`paused`, `terminate_mode`), optionally paired with a direct
//! signal to the process for faster teardown.

use std::time::Duration;

use clap::Args;

use swarm_core::record::{AgentRecord, TerminateMode};

use super::context::Context;

pub(crate) fn terminate_one(ctx: &Context, rec: &AgentRecord, mode: TerminateMode, force: bool) -> anyhow::Result<()> {
    ctx.registry.set_terminate_mode(&rec.id, mode)?;
    if force {
        if let Some(pid) = rec.pid {
            swarm_process::terminate_graceful(pid, Duration::from_secs(ctx.config.kill_grace_secs))?;
        }
    }
    Ok(())
}

#[derive(Args, Debug)]
pub struct KillArgs {
    pub id: String,
    /// Send SIGTERM/SIGKILL directly instead of waiting for the loop to
    /// notice the control-plane write.
    #[arg(long)]
    pub force: bool,
    /// Let the current iteration finish before stopping.
    #[arg(long = "after-iteration")]
    pub after_iteration: bool,
    /// Also terminate every agent this one transitively launched.
    #[arg(long)]
    pub down: bool,
}

pub async fn kill(ctx: &Context, args: KillArgs) -> anyhow::Result<i32> {
    let rec = ctx.resolve(&args.id)?;
    let mode = if args.after_iteration {
        TerminateMode::AfterIteration
    } else {
        TerminateMode::Immediate
    };
    terminate_one(ctx, &rec, mode, args.force)?;
    if args.down {
        for child in ctx.registry.get_descendants(&rec.id)? {
            if child.is_running() {
                terminate_one(ctx, &child, mode, args.force)?;
            }
        }
    }
    Ok(0)
}

#[derive(Args, Debug)]
pub struct ScopeArgs {
    /// Act on every tracked agent, not just this directory's.
    #[arg(long)]
    pub all: bool,
}

pub async fn kill_all(ctx: &Context, args: ScopeArgs) -> anyhow::Result<i32> {
    for rec in ctx.scoped(args.all)? {
        if rec.is_running() {
            ctx.registry.set_terminate_mode(&rec.id, TerminateMode::Immediate)?;
        }
    }
    Ok(0)
}

pub async fn stop_all(ctx: &Context, args: ScopeArgs) -> anyhow::Result<i32> {
    for rec in ctx.scoped(args.all)? {
        if rec.is_running() {
            ctx.registry.set_terminate_mode(&rec.id, TerminateMode::AfterIteration)?;
        }
    }
    Ok(0)
}

#[derive(Args, Debug)]
pub struct StartArgs {
    pub id: String,
}

pub async fn start(ctx: &Context, args: StartArgs) -> anyhow::Result<i32> {
    let rec = ctx.resolve(&args.id)?;
    ctx.registry.set_paused(&rec.id, false)?;
    Ok(0)
}

pub async fn start_all(ctx: &Context, args: ScopeArgs) -> anyhow::Result<i32> {
    for rec in ctx.scoped(args.all)? {
        if rec.is_running() && rec.paused {
            ctx.registry.set_paused(&rec.id, false)?;
        }
    }
    Ok(0)
}

pub async fn pause_all(ctx: &Context, args: ScopeArgs) -> anyhow::Result<i32> {
    for rec in ctx.scoped(args.all)? {
        if rec.is_running() && !rec.paused {
            ctx.registry.set_paused(&rec.id, true)?;
        }
    }
    Ok(0)
}

#[derive(Args, Debug)]
pub struct ControlArgs {
    pub id: String,
    #[arg(long)]
    pub pause: bool,
    #[arg(long)]
    pub resume: bool,
    #[arg(long)]
    pub model: Option<String>,
    #[arg(long)]
    pub iterations: Option<u64>,
    #[arg(long = "terminate-mode", value_enum)]
    pub terminate_mode: Option<TerminateModeArg>,
}

#[derive(clap::ValueEnum, Debug, Clone, Copy)]
pub enum TerminateModeArg {
    Unset,
    Immediate,
    AfterIteration,
}

impl From<TerminateModeArg> for TerminateMode {
    fn from(v: TerminateModeArg) -> Self {
        match v {
            TerminateModeArg::Unset => TerminateMode::Unset,
            TerminateModeArg::Immediate => TerminateMode::Immediate,
            TerminateModeArg::AfterIteration => TerminateMode::AfterIteration,
        }
    }
}

/// Generic control-intent writer backing both `swarm update` and its
/// `swarm control` alias.
pub async fn control(ctx: &Context, args: ControlArgs) -> anyhow::Result<i32> {
    if args.pause && args.resume {
        anyhow::bail!("--pause and --resume are mutually exclusive");
    }
    let rec = ctx.resolve(&args.id)?;

    if args.pause {
        ctx.registry.set_paused(&rec.id, true)?;
    }
    if args.resume {
        ctx.registry.set_paused(&rec.id, false)?;
    }
    if let Some(mode) = args.terminate_mode {
        ctx.registry.set_terminate_mode(&rec.id, mode.into())?;
    }
    if args.model.is_some() || args.iterations.is_some() {
        ctx.registry.update(&rec.id, |r| {
            if let Some(model) = &args.model {
                r.model = model.clone();
            }
            if let Some(iterations) = args.iterations {
                r.iterations = iterations;
            }
        })?;
    }
    Ok(0)
}
