//! Read-only inspection commands: `list`/`ps`, `inspect`/`view`, `logs`,
//! `summary`, `stats`, `diff`, `top`, `wait`.

use std::io::{Seek, SeekFrom};
use std::time::{Duration, Instant};

use clap::Args;

use swarm_core::record::AgentRecord;

use super::context::{format_row, Context};

#[derive(Args, Debug)]
pub struct ListArgs {
    #[arg(long)]
    pub all: bool,
}

pub async fn list(ctx: &Context, args: ListArgs) -> anyhow::Result<i32> {
    let records = ctx.scoped(args.all)?;
    if records.is_empty() {
        println!("no tracked agents");
        return Ok(0);
    }
    for rec in &records {
        println!("{}", format_row(rec));
    }
    Ok(0)
}

#[derive(Args, Debug)]
pub struct InspectArgs {
    pub id: String,
    /// Print the raw registry record as JSON instead of a formatted view.
    #[arg(long)]
    pub json: bool,
}

pub async fn inspect(ctx: &Context, args: InspectArgs) -> anyhow::Result<i32> {
    let rec = ctx.resolve(&args.id)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&rec)?);
        return Ok(0);
    }
    print_record_detail(&rec);
    Ok(0)
}

fn print_record_detail(rec: &AgentRecord) {
    println!("id:            {}", rec.id);
    println!("name:          {}", rec.name.as_deref().unwrap_or("-"));
    println!("status:        {}", rec.status);
    if let Some(reason) = rec.exit_reason {
        println!("exit_reason:   {reason}");
    }
    println!("prompt:        {}", rec.prompt_label);
    println!("model:         {}", rec.model);
    println!(
        "iterations:    {}/{}",
        rec.current_iter.saturating_sub(1),
        if rec.iterations == 0 { "∞".to_string() } else { rec.iterations.to_string() }
    );
    println!("successful:    {}", rec.successful_iters);
    println!("failed:        {}", rec.failed_iters);
    if let Some(err) = &rec.last_error {
        println!("last_error:    {err}");
    }
    println!("tokens:        in={} out={}", rec.input_tokens, rec.output_tokens);
    println!("cost:          ${:.4}", rec.total_cost);
    println!("working_dir:   {}", rec.working_dir.display());
    println!("started_at:    {}", rec.started_at);
    if let Some(t) = rec.terminated_at {
        println!("terminated_at: {t}");
    }
    if !rec.labels.is_empty() {
        let mut keys: Vec<_> = rec.labels.keys().collect();
        keys.sort();
        let rendered: Vec<String> = keys.iter().map(|k| format!("{k}={}", rec.labels[*k])).collect();
        println!("labels:        {}", rendered.join(","));
    }
}

#[derive(Args, Debug)]
pub struct LogsArgs {
    pub id: String,
    /// Follow the log file as it grows, like `tail -f`.
    #[arg(short, long)]
    pub follow: bool,
    /// Only print the last N lines before following.
    #[arg(short = 'n', long, default_value_t = 50)]
    pub lines: usize,
}

pub async fn logs(ctx: &Context, args: LogsArgs) -> anyhow::Result<i32> {
    let rec = ctx.resolve(&args.id)?;
    let Some(path) = &rec.log_file else {
        anyhow::bail!("agent {} has no recorded log file", rec.id);
    };
    print_tail(path, args.lines)?;
    if args.follow {
        follow(path).await?;
    }
    Ok(0)
}

fn print_tail(path: &std::path::Path, lines: usize) -> anyhow::Result<()> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("reading log file {}: {e}", path.display()))?;
    let all: Vec<&str> = contents.lines().collect();
    let start = all.len().saturating_sub(lines);
    for line in &all[start..] {
        println!("{line}");
    }
    Ok(())
}

async fn follow(path: &std::path::Path) -> anyhow::Result<()> {
    use std::io::Read;
    let mut file = std::fs::File::open(path)?;
    file.seek(SeekFrom::End(0))?;
    loop {
        let mut buf = String::new();
        let n = file.read_to_string(&mut buf)?;
        if n > 0 {
            print!("{buf}");
        } else {
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    }
}

#[derive(Args, Debug)]
pub struct SummaryArgs {
    #[arg(long)]
    pub all: bool,
}

pub async fn summary(ctx: &Context, args: SummaryArgs) -> anyhow::Result<i32> {
    let records = ctx.scoped(args.all)?;
    let running = records.iter().filter(|r| r.is_running()).count();
    let terminated = records.len() - running;
    let total_cost: f64 = records.iter().map(|r| r.total_cost).sum();
    let total_iters: u64 = records.iter().map(|r| r.successful_iters + r.failed_iters).sum();
    println!("tracked:    {}", records.len());
    println!("running:    {running}");
    println!("terminated: {terminated}");
    println!("iterations: {total_iters}");
    println!("total cost: ${total_cost:.4}");
    Ok(0)
}

pub async fn stats(ctx: &Context, args: SummaryArgs) -> anyhow::Result<i32> {
    let records = ctx.scoped(args.all)?;
    for rec in &records {
        println!(
            "{:<12} in={:<8} out={:<8} cost=${:<8.4} iters={}/{}",
            rec.id,
            rec.input_tokens,
            rec.output_tokens,
            rec.total_cost,
            rec.successful_iters,
            rec.failed_iters
        );
    }
    Ok(0)
}

#[derive(Args, Debug)]
pub struct DiffArgs {
    pub first: String,
    pub second: String,
}

pub async fn diff(ctx: &Context, args: DiffArgs) -> anyhow::Result<i32> {
    let a = ctx.resolve(&args.first)?;
    let b = ctx.resolve(&args.second)?;
    println!("{:<16} {:<24} {:<24}", "field", a.id, b.id);
    println!("{:<16} {:<24} {:<24}", "name", a.name.as_deref().unwrap_or("-"), b.name.as_deref().unwrap_or("-"));
    println!("{:<16} {:<24} {:<24}", "status", a.status.to_string(), b.status.to_string());
    println!("{:<16} {:<24} {:<24}", "model", a.model, b.model);
    println!("{:<16} {:<24} {:<24}", "prompt", a.prompt_label.to_string(), b.prompt_label.to_string());
    println!("{:<16} {:<24} {:<24}", "iterations", format!("{}/{}", a.current_iter.saturating_sub(1), a.iterations), format!("{}/{}", b.current_iter.saturating_sub(1), b.iterations));
    println!("{:<16} {:<24} {:<24}", "cost", format!("${:.4}", a.total_cost), format!("${:.4}", b.total_cost));
    Ok(0)
}

#[derive(Args, Debug)]
pub struct TopArgs {
    #[arg(long)]
    pub all: bool,
    /// Refresh every N seconds instead of printing once.
    #[arg(long)]
    pub watch: Option<u64>,
}

pub async fn top(ctx: &Context, args: TopArgs) -> anyhow::Result<i32> {
    loop {
        let records = ctx.scoped(args.all)?;
        let running: Vec<&AgentRecord> = records.iter().filter(|r| r.is_running()).collect();
        println!("{} running", running.len());
        for rec in &running {
            println!("{}", format_row(rec));
        }
        match args.watch {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => break,
        }
        println!();
    }
    Ok(0)
}

#[derive(Args, Debug)]
pub struct WaitArgs {
    pub id: String,
    #[arg(long)]
    pub timeout_secs: Option<u64>,
}

/// Poll until the agent is terminated, or time out. Exit code 2 on
/// timeout (the convention every inspection command that can time out
/// uses), distinct from 1 for a genuine error.
pub async fn wait(ctx: &Context, args: WaitArgs) -> anyhow::Result<i32> {
    let deadline = args.timeout_secs.map(|s| Instant::now() + Duration::from_secs(s));
    loop {
        let rec = ctx.resolve(&args.id)?;
        if !rec.is_running() {
            return Ok(0);
        }
        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                return Ok(2);
            }
        }
        tokio::time::sleep(Duration::from_millis(ctx.config.poll_interval_ms)).await;
    }
}
