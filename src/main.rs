//! `swarm` — supervisor CLI for long-running, iteration-based agent
//! processes.

mod cli;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use cli::context::Context;
use cli::{control, housekeeping, inspect, launch};

#[derive(Parser)]
#[command(name = "swarm", about = "Supervise long-running, iteration-based agent processes")]
struct Cli {
    /// Config file to use instead of the default `~/.config/swarm/config.toml`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Launch a new agent.
    Run(launch::RunArgs),
    /// Relaunch a terminated agent's exact configuration.
    Restart(launch::RestartArgs),
    /// Launch a new agent from an existing one's configuration.
    Clone(launch::CloneArgs),
    /// Relaunch an agent's configuration for a single iteration.
    Replay(launch::ReplayArgs),
    /// Bring a compose file's pipelines up to their declared parallelism.
    Up(launch::UpArgs),
    /// Tear down a compose file's pipeline instances.
    Down(housekeeping::DownArgs),

    /// Request termination of one agent.
    Kill(control::KillArgs),
    /// Request termination of every tracked agent.
    KillAll(control::ScopeArgs),
    /// Request every tracked agent finish its current iteration, then stop.
    StopAll(control::ScopeArgs),
    /// Resume a paused agent.
    Start(control::StartArgs),
    /// Resume every paused agent.
    StartAll(control::ScopeArgs),
    /// Pause every running agent.
    PauseAll(control::ScopeArgs),
    /// Write one or more control intents to an agent.
    Update(control::ControlArgs),
    /// Alias for `update`.
    Control(control::ControlArgs),

    /// List tracked agents.
    #[command(alias = "ps")]
    List(inspect::ListArgs),
    /// Show a single agent's full record.
    #[command(alias = "view")]
    Inspect(inspect::InspectArgs),
    /// Print (and optionally follow) an agent's backend log.
    Logs(inspect::LogsArgs),
    /// Print aggregate counts and cost across tracked agents.
    Summary(inspect::SummaryArgs),
    /// Print per-agent token/cost stats.
    Stats(inspect::SummaryArgs),
    /// Compare two agents' records field by field.
    Diff(inspect::DiffArgs),
    /// Show currently-running agents, optionally refreshing.
    Top(inspect::TopArgs),
    /// Block until an agent terminates, or time out.
    Wait(inspect::WaitArgs),

    /// Remove old terminated records from the registry.
    Prune(housekeeping::PruneArgs),
    /// Reconcile registry state against actual process liveness.
    Doctor(housekeeping::DoctorArgs),
    /// Create the default config file and state directories.
    Init,
    /// List available prompt presets.
    Prompts,
    /// List known model identifiers.
    Models,
    /// Generate shell completion scripts.
    Completion(housekeeping::CompletionArgs),
    /// Tear down a single named pipeline (alias for `down <name>`).
    ComposeStop(housekeeping::ComposeStopArgs),
    /// Tail logs for every instance of a named pipeline.
    ComposeLogs(housekeeping::ComposeLogsArgs),

    /// Hidden re-entry point for a detached single-agent worker.
    #[command(name = "__worker", hide = true)]
    Worker {
        #[arg(long)]
        agent_id: String,
        #[arg(long)]
        launch_token: String,
    },
    /// Hidden re-entry point for a detached pipeline-instance worker.
    #[command(name = "__pipeline-worker", hide = true)]
    PipelineWorker {
        #[arg(long)]
        compose: PathBuf,
        #[arg(long)]
        pipeline: String,
        #[arg(long)]
        instance: u32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // The two hidden worker subcommands run before a `Context` exists —
    // they load their own `Config` independently since they're invoked
    // by re-exec, not by a user shell with a live working directory tied
    // to any particular compose/launch session.
    match &cli.command {
        Commands::Worker { agent_id, launch_token } => {
            tracing_subscriber::fmt()
                .with_env_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
                )
                .init();
            let code = cli::worker::run_agent_worker(cli.config.clone(), agent_id.clone(), launch_token.clone()).await?;
            std::process::exit(code);
        }
        Commands::PipelineWorker { compose, pipeline, instance } => {
            tracing_subscriber::fmt()
                .with_env_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
                )
                .init();
            let code =
                cli::worker::run_pipeline_worker(cli.config.clone(), compose.clone(), pipeline.clone(), *instance)
                    .await?;
            std::process::exit(code);
        }
        _ => {}
    }

    let ctx = Context::load(cli.config.as_deref())?;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| ctx.config.log_level.clone().into()),
        )
        .init();
    tracing::debug!(command = ?cli.command, "dispatching command");

    let code = match cli.command {
        Commands::Run(args) => launch::run(&ctx, args).await,
        Commands::Restart(args) => launch::restart(&ctx, args).await,
        Commands::Clone(args) => launch::clone(&ctx, args).await,
        Commands::Replay(args) => launch::replay(&ctx, args).await,
        Commands::Up(args) => launch::up(&ctx, args).await,
        Commands::Down(args) => housekeeping::down(&ctx, args).await,

        Commands::Kill(args) => control::kill(&ctx, args).await,
        Commands::KillAll(args) => control::kill_all(&ctx, args).await,
        Commands::StopAll(args) => control::stop_all(&ctx, args).await,
        Commands::Start(args) => control::start(&ctx, args).await,
        Commands::StartAll(args) => control::start_all(&ctx, args).await,
        Commands::PauseAll(args) => control::pause_all(&ctx, args).await,
        Commands::Update(args) => control::control(&ctx, args).await,
        Commands::Control(args) => control::control(&ctx, args).await,

        Commands::List(args) => inspect::list(&ctx, args).await,
        Commands::Inspect(args) => inspect::inspect(&ctx, args).await,
        Commands::Logs(args) => inspect::logs(&ctx, args).await,
        Commands::Summary(args) => inspect::summary(&ctx, args).await,
        Commands::Stats(args) => inspect::stats(&ctx, args).await,
        Commands::Diff(args) => inspect::diff(&ctx, args).await,
        Commands::Top(args) => inspect::top(&ctx, args).await,
        Commands::Wait(args) => inspect::wait(&ctx, args).await,

        Commands::Prune(args) => housekeeping::prune(&ctx, args).await,
        Commands::Doctor(args) => housekeeping::doctor(&ctx, args).await,
        Commands::Init => housekeeping::init(&ctx).await,
        Commands::Prompts => housekeeping::prompts(&ctx).await,
        Commands::Models => housekeeping::models().await,
        Commands::Completion(args) => housekeeping::completion(args, <Cli as clap::CommandFactory>::command()).await,
        Commands::ComposeStop(args) => housekeeping::compose_stop(&ctx, args).await,
        Commands::ComposeLogs(args) => housekeeping::compose_logs(&ctx, args).await,

        Commands::Worker { .. } | Commands::PipelineWorker { .. } => unreachable!("handled above"),
    }?;

    std::process::exit(code);
}
