//! The Agent Iteration Loop: the state machine that runs inside the
//! detached worker process, invoking the backend command once per
//! iteration and publishing progress back to the registry.
//!
//! Grounded on the retrieved `ralph` run-loop's `Outcome` taxonomy and
//! on the `agenticlaw` consciousness watcher's poll-loop shape (a fixed
//! interval, a vector of targets to re-check, an async `run()` that
//! keeps going until told to stop).

use std::io::Write as _;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::io::AsyncReadExt as _;
use swarm_core::error::Result;
use swarm_core::record::{AgentStatus, ExitReason, TerminateMode, TimeoutReason};
use swarm_registry::{ProgressUpdate, Registry};

use crate::log;
use crate::usage::UsageParser;

pub struct IterationConfig {
    pub agent_id: String,
    pub backend_command: String,
    /// Each arg is substituted for the literal token `{{model}}` with the
    /// record's current `model` field immediately before each iteration's
    /// child is spawned, so a `swarm update --model` control-intent
    /// write takes effect on the very next iteration without the loop
    /// needing to be restarted.
    pub backend_args: Vec<String>,
    pub working_dir: PathBuf,
    pub log_file: PathBuf,
    pub iteration_timeout: Option<Duration>,
    pub total_timeout: Option<Duration>,
    /// Busy-wait interval while an agent is paused and between boundary
    /// checks generally — how quickly a `swarm update`/`pause`/`resume`
    /// control-intent write is noticed.
    pub poll_interval: Duration,
    /// If set, each successful iteration's combined stdout is written
    /// (overwriting any previous content) to this path — the DAG
    /// executor's output-capture mechanism for `{{output:task}}`
    /// directives.
    pub capture_path: Option<PathBuf>,
    /// Extra environment variables set on the backend child, beyond
    /// whatever this process's own environment already carries —
    /// `SWARM_AGENT_ID`/`SWARM_TASK_ID`/`SWARM_STATE_DIR` and the like.
    pub env: Vec<(String, String)>,
}

/// Why the loop stopped. `Completed` covers both "ran its configured
/// iterations" and "every iteration timed out" — per the pinned Open
/// Question, `failed_iters` is the real signal for the latter, not a
/// distinct exit reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Killed,
    TotalTimeout,
    Signal,
}

pub async fn run(
    registry: Arc<Registry>,
    config: IterationConfig,
    usage_parser: Arc<dyn UsageParser>,
) -> Result<Outcome> {
    let started_at = Utc::now();
    let mut log_file = open_log_file(&config.log_file)?;
    log::info(
        &mut log_file,
        &config.agent_id,
        None,
        "iteration loop starting",
    );

    let signalled = spawn_signal_watcher();

    let outcome = loop {
        let record = registry.get(&config.agent_id)?;

        if signalled.load(std::sync::atomic::Ordering::Relaxed) {
            registry.merge_update(
                &config.agent_id,
                ProgressUpdate {
                    status: Some(AgentStatus::Terminated),
                    exit_reason: Some(Some(ExitReason::Signal)),
                    terminated_at: Some(Some(Utc::now())),
                    ..Default::default()
                },
            )?;
            log::info(&mut log_file, &config.agent_id, Some(record.current_iter), "signal received");
            break Outcome::Signal;
        }

        if let Some(outcome) = check_termination(&record) {
            registry.merge_update(
                &config.agent_id,
                ProgressUpdate {
                    status: Some(AgentStatus::Terminated),
                    exit_reason: Some(Some(ExitReason::Killed)),
                    terminated_at: Some(Some(Utc::now())),
                    ..Default::default()
                },
            )?;
            log::info(
                &mut log_file,
                &config.agent_id,
                Some(record.current_iter),
                format!("stopping: {outcome:?}"),
            );
            break outcome;
        }

        if record.derived_pause_state() != swarm_core::record::PauseState::Running {
            registry.mark_paused_at_boundary(&config.agent_id)?;
            log::info(
                &mut log_file,
                &config.agent_id,
                Some(record.current_iter),
                "paused",
            );
            tokio::time::sleep(config.poll_interval).await;
            continue;
        }

        if let Some(total_timeout) = config.total_timeout {
            let elapsed = Utc::now().signed_duration_since(started_at);
            if elapsed.to_std().unwrap_or(Duration::ZERO) >= total_timeout {
                registry.merge_update(
                    &config.agent_id,
                    ProgressUpdate {
                        status: Some(AgentStatus::Terminated),
                        exit_reason: Some(Some(ExitReason::Timeout)),
                        timeout_reason: Some(Some(TimeoutReason::Total)),
                        terminated_at: Some(Some(Utc::now())),
                        ..Default::default()
                    },
                )?;
                log::warn(
                    &mut log_file,
                    &config.agent_id,
                    Some(record.current_iter),
                    "total timeout reached",
                );
                break Outcome::TotalTimeout;
            }
        }

        // Read from the live record, not `config.iterations`: a CLI
        // `swarm update --iterations` write must take effect at the very
        // next boundary, not only at loop start.
        if record.iterations != 0 && record.current_iter > record.iterations {
            registry.merge_update(
                &config.agent_id,
                ProgressUpdate {
                    status: Some(AgentStatus::Terminated),
                    exit_reason: Some(Some(ExitReason::Completed)),
                    terminated_at: Some(Some(Utc::now())),
                    ..Default::default()
                },
            )?;
            break Outcome::Completed;
        }

        run_one_iteration(&registry, &config, &record, &usage_parser, &mut log_file).await?;
    };

    log::info(&mut log_file, &config.agent_id, None, "iteration loop exited");

    if let Ok(record) = registry.get(&config.agent_id) {
        run_on_complete_hook(&record, &config, &mut log_file);
    }

    Ok(outcome)
}

/// `after_iteration` only takes effect from iteration 2 onward —
/// iteration 1 is always allowed to finish. `immediate` takes effect at
/// the very next boundary regardless of how many iterations have run.
fn check_termination(record: &swarm_core::record::AgentRecord) -> Option<Outcome> {
    match record.terminate_mode {
        TerminateMode::Unset => None,
        TerminateMode::Immediate => Some(Outcome::Killed),
        TerminateMode::AfterIteration if record.current_iter > 1 => Some(Outcome::Killed),
        TerminateMode::AfterIteration => None,
    }
}

/// Best-effort `on_complete` shell hook: failures are a warning, never
/// an error.
fn run_on_complete_hook(
    record: &swarm_core::record::AgentRecord,
    config: &IterationConfig,
    log_file: &mut std::fs::File,
) {
    let Some(hook) = &record.on_complete else {
        return;
    };
    match std::process::Command::new("/bin/sh")
        .arg("-c")
        .arg(hook)
        .current_dir(&config.working_dir)
        .status()
    {
        Ok(status) if status.success() => {
            log::info(log_file, &config.agent_id, None, "on_complete hook succeeded");
        }
        Ok(status) => {
            log::warn(
                log_file,
                &config.agent_id,
                None,
                format!("on_complete hook exited with {status}"),
            );
        }
        Err(e) => {
            log::warn(log_file, &config.agent_id, None, format!("on_complete hook failed to spawn: {e}"));
        }
    }
}

/// Install a Unix-signal watcher that flips the returned flag when
/// either `SIGINT` or `SIGTERM` is received, for the loop to observe at
/// its next boundary check.
fn spawn_signal_watcher() -> Arc<std::sync::atomic::AtomicBool> {
    let flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let flag_clone = flag.clone();
    tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(_) => return,
        };
        let mut int = match signal(SignalKind::interrupt()) {
            Ok(s) => s,
            Err(_) => return,
        };
        tokio::select! {
            _ = term.recv() => {}
            _ = int.recv() => {}
        }
        flag_clone.store(true, std::sync::atomic::Ordering::Relaxed);
    });
    flag
}

async fn run_one_iteration(
    registry: &Arc<Registry>,
    config: &IterationConfig,
    record: &swarm_core::record::AgentRecord,
    usage_parser: &Arc<dyn UsageParser>,
    log_file: &mut std::fs::File,
) -> Result<()> {
    let current_iter = record.current_iter;
    log::info(log_file, &config.agent_id, Some(current_iter), "iteration starting");

    let args: Vec<String> = config
        .backend_args
        .iter()
        .map(|a| a.replace("{{model}}", &record.model))
        .collect();

    let child = tokio::process::Command::new(&config.backend_command)
        .args(&args)
        .current_dir(&config.working_dir)
        .envs(config.env.iter().cloned())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn();

    let (success, output_text, error_text) = match child {
        Err(e) => {
            tracing::error!(agent_id = %config.agent_id, iter = current_iter, error = %e, "failed to spawn backend");
            (false, String::new(), format!("failed to spawn backend: {e}"))
        }
        Ok(mut child) => {
            let stdout = child.stdout.take().expect("stdout piped at spawn");
            let stderr = child.stderr.take().expect("stderr piped at spawn");
            let stdout_log = log_file.try_clone().map_err(swarm_core::error::Error::Io)?;
            let stderr_log = log_file.try_clone().map_err(swarm_core::error::Error::Io)?;
            let stdout_task = tokio::spawn(tee_stream(stdout, stdout_log));
            let stderr_task = tokio::spawn(tee_stream(stderr, stderr_log));

            let run = async {
                let status = child.wait().await?;
                let out = stdout_task.await.unwrap_or_default();
                let err = stderr_task.await.unwrap_or_default();
                Ok::<_, std::io::Error>((status, out, err))
            };

            match config.iteration_timeout {
                Some(timeout) => match tokio::time::timeout(timeout, run).await {
                    Ok(Ok((status, out, err))) => (status.success(), out, err),
                    Ok(Err(e)) => (false, String::new(), format!("backend io error: {e}")),
                    Err(_) => {
                        let _ = child.start_kill();
                        (false, String::new(), "iteration timed out".to_string())
                    }
                },
                None => match run.await {
                    Ok((status, out, err)) => (status.success(), out, err),
                    Err(e) => (false, String::new(), format!("backend io error: {e}")),
                },
            }
        }
    };

    let usage = usage_parser.parse(&output_text);

    if success {
        log::info(log_file, &config.agent_id, Some(current_iter), "iteration succeeded");
        if let Some(capture_path) = &config.capture_path {
            if let Some(parent) = capture_path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            let _ = std::fs::write(capture_path, &output_text);
        }
    } else {
        log::error(
            log_file,
            &config.agent_id,
            Some(current_iter),
            format!("iteration failed: {error_text}"),
        );
    }
    let _ = log_file.flush();

    registry.update(&config.agent_id, |rec| {
        rec.current_iter += 1;
        if success {
            rec.successful_iters += 1;
            rec.last_error = None;
        } else {
            rec.failed_iters += 1;
            rec.last_error = Some(error_text);
        }
        rec.input_tokens += usage.input_tokens;
        rec.output_tokens += usage.output_tokens;
        rec.total_cost += usage.cost;
    })?;

    Ok(())
}

/// Copy `stream` to `log` verbatim as it arrives (the backend is the log
/// file's real writer, per spec) while also accumulating it in memory
/// for usage-parsing/`capture_path`.
async fn tee_stream(mut stream: impl tokio::io::AsyncRead + Unpin, mut log: std::fs::File) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let _ = log.write_all(&chunk[..n]);
                buf.extend_from_slice(&chunk[..n]);
            }
        }
    }
    String::from_utf8_lossy(&buf).to_string()
}

fn open_log_file(path: &PathBuf) -> Result<std::fs::File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(swarm_core::error::Error::Io)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use swarm_core::record::{AgentRecord, PromptLabel};

    fn new_agent(registry: &Registry, dir: &std::path::Path) -> String {
        let mut rec = AgentRecord::new(dir.to_path_buf(), PromptLabel::Inline, "sonnet");
        rec.iterations = 2;
        registry.register(rec).unwrap()
    }

    #[tokio::test]
    async fn loop_runs_configured_iterations_then_completes() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(Registry::open(dir.path().join("registry.json")));
        let id = new_agent(&registry, dir.path());

        let config = IterationConfig {
            agent_id: id.clone(),
            backend_command: "/bin/echo".to_string(),
            backend_args: vec!["ok".to_string()],
            working_dir: dir.path().to_path_buf(),
            log_file: dir.path().join("agent.log"),
            iteration_timeout: Some(Duration::from_secs(5)),
            total_timeout: None,
            poll_interval: Duration::from_millis(10),
            capture_path: None,
            env: vec![],
        };

        let outcome = run(registry.clone(), config, Arc::new(crate::usage::ClaudeCliUsageParser))
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Completed);

        let rec = registry.get(&id).unwrap();
        assert_eq!(rec.successful_iters, 2);
        assert_eq!(rec.status, AgentStatus::Terminated);
        assert_eq!(rec.exit_reason, Some(ExitReason::Completed));
    }

    #[tokio::test]
    async fn terminate_mode_stops_loop_before_next_iteration() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(Registry::open(dir.path().join("registry.json")));
        let mut rec = AgentRecord::new(dir.path().to_path_buf(), PromptLabel::Inline, "sonnet");
        rec.iterations = 0;
        let id = registry.register(rec).unwrap();
        registry
            .set_terminate_mode(&id, TerminateMode::Immediate)
            .unwrap();

        let config = IterationConfig {
            agent_id: id.clone(),
            backend_command: "/bin/echo".to_string(),
            backend_args: vec![],
            working_dir: dir.path().to_path_buf(),
            log_file: dir.path().join("agent.log"),
            iteration_timeout: None,
            total_timeout: None,
            poll_interval: Duration::from_millis(10),
            capture_path: None,
            env: vec![],
        };

        let outcome = run(registry, config, Arc::new(crate::usage::ClaudeCliUsageParser))
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Killed);
    }

    #[tokio::test]
    async fn failing_backend_counts_as_a_failed_iteration_not_a_stop() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(Registry::open(dir.path().join("registry.json")));
        let mut rec = AgentRecord::new(dir.path().to_path_buf(), PromptLabel::Inline, "sonnet");
        rec.iterations = 1;
        let id = registry.register(rec).unwrap();

        let config = IterationConfig {
            agent_id: id.clone(),
            backend_command: "/bin/sh".to_string(),
            backend_args: vec!["-c".to_string(), "exit 1".to_string()],
            working_dir: dir.path().to_path_buf(),
            log_file: dir.path().join("agent.log"),
            iteration_timeout: Some(Duration::from_secs(5)),
            total_timeout: None,
            poll_interval: Duration::from_millis(10),
            capture_path: None,
            env: vec![],
        };

        let outcome = run(registry.clone(), config, Arc::new(crate::usage::ClaudeCliUsageParser))
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Completed);

        let rec = registry.get(&id).unwrap();
        assert_eq!(rec.failed_iters, 1);
        assert_eq!(rec.exit_reason, Some(ExitReason::Completed));
    }

    #[tokio::test]
    async fn after_iteration_kill_lets_the_first_iteration_finish() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(Registry::open(dir.path().join("registry.json")));
        let mut rec = AgentRecord::new(dir.path().to_path_buf(), PromptLabel::Inline, "sonnet");
        rec.iterations = 5;
        let id = registry.register(rec).unwrap();
        registry
            .set_terminate_mode(&id, TerminateMode::AfterIteration)
            .unwrap();

        let config = IterationConfig {
            agent_id: id.clone(),
            backend_command: "/bin/echo".to_string(),
            backend_args: vec!["ok".to_string()],
            working_dir: dir.path().to_path_buf(),
            log_file: dir.path().join("agent.log"),
            iteration_timeout: Some(Duration::from_secs(5)),
            total_timeout: None,
            poll_interval: Duration::from_millis(10),
            capture_path: None,
            env: vec![],
        };

        let outcome = run(registry.clone(), config, Arc::new(crate::usage::ClaudeCliUsageParser))
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Killed);

        let rec = registry.get(&id).unwrap();
        assert_eq!(rec.successful_iters, 1);
        assert_eq!(rec.exit_reason, Some(ExitReason::Killed));
    }

    #[tokio::test]
    async fn backend_args_receive_the_live_model_substitution() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(Registry::open(dir.path().join("registry.json")));
        let mut rec = AgentRecord::new(dir.path().to_path_buf(), PromptLabel::Inline, "claude-opus-4");
        rec.iterations = 1;
        let id = registry.register(rec).unwrap();

        let capture_path = dir.path().join("capture.txt");
        let config = IterationConfig {
            agent_id: id.clone(),
            backend_command: "/bin/sh".to_string(),
            backend_args: vec!["-c".to_string(), "printf '%s' \"$1\"".to_string(), "--".to_string(), "{{model}}".to_string()],
            working_dir: dir.path().to_path_buf(),
            log_file: dir.path().join("agent.log"),
            iteration_timeout: Some(Duration::from_secs(5)),
            total_timeout: None,
            poll_interval: Duration::from_millis(10),
            capture_path: Some(capture_path.clone()),
            env: vec![],
        };

        run(registry.clone(), config, Arc::new(crate::usage::ClaudeCliUsageParser))
            .await
            .unwrap();

        let captured = std::fs::read_to_string(&capture_path).unwrap();
        assert_eq!(captured, "claude-opus-4");
    }

    #[tokio::test]
    async fn on_complete_hook_runs_best_effort_after_loop_exit() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(Registry::open(dir.path().join("registry.json")));
        let marker = dir.path().join("hook-ran");
        let mut rec = AgentRecord::new(dir.path().to_path_buf(), PromptLabel::Inline, "sonnet");
        rec.iterations = 1;
        rec.on_complete = Some(format!("touch {}", marker.display()));
        let id = registry.register(rec).unwrap();

        let config = IterationConfig {
            agent_id: id.clone(),
            backend_command: "/bin/echo".to_string(),
            backend_args: vec![],
            working_dir: dir.path().to_path_buf(),
            log_file: dir.path().join("agent.log"),
            iteration_timeout: Some(Duration::from_secs(5)),
            total_timeout: None,
            poll_interval: Duration::from_millis(10),
            capture_path: None,
            env: vec![],
        };

        run(registry, config, Arc::new(crate::usage::ClaudeCliUsageParser))
            .await
            .unwrap();

        assert!(marker.exists());
    }
}
