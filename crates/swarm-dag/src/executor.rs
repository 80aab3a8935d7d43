//! The DAG Executor: runs a pipeline's task graph for `N` iterations,
//! launching each ready node as a tracked child agent and waiting for
//! completions to recompute the ready set.
//!
//! Grounded on the retrieved `watchdag-cli`'s split between a pure
//! scheduler (`dag` module, here `crate::graph`) and an async runtime
//! shell that drives it over an `mpsc` completion channel — adapted
//! from watchdag's file-trigger events to this system's task-completion
//! events, and from its single long-lived process per task to this
//! system's one-iteration-per-firing `swarm-runner` agents.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, Semaphore};

use swarm_compose::{ComposeDocument, PipelineSpec, TaskSpec};
use swarm_core::error::{Error, Result};
use swarm_core::record::{
    AgentRecord, AgentStatus, ExitReason, PauseState, PromptLabel, TerminateMode,
};
use swarm_registry::{ProgressUpdate, Registry};
use swarm_runner::{IterationConfig, UsageParser};

use crate::graph::{DagGraph, NodeOutcome, NodeState};
use crate::names;
use crate::prompt;

const PAUSE_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Resolves a task's prompt source to literal text. Loading the prompt
/// itself (reading a preset by name or a file path) sits outside this
/// crate's scope — this trait is the seam the CLI/config layer plugs an
/// implementation into.
pub trait PromptSource: Send + Sync {
    fn resolve(&self, task: &TaskSpec) -> Result<String>;
}

/// The trivial resolver: `prompt` is used verbatim, `prompt_file` is
/// read from disk, `preset` is looked up in a caller-supplied map.
pub struct DefaultPromptSource {
    pub presets: HashMap<String, String>,
}

impl PromptSource for DefaultPromptSource {
    fn resolve(&self, task: &TaskSpec) -> Result<String> {
        if let Some(inline) = &task.prompt {
            return Ok(inline.clone());
        }
        if let Some(path) = &task.prompt_file {
            return std::fs::read_to_string(path).map_err(Error::Io);
        }
        if let Some(name) = &task.preset {
            return self
                .presets
                .get(name)
                .cloned()
                .ok_or_else(|| Error::Config(format!("unknown prompt preset: {name}")));
        }
        Err(Error::Config("task has no prompt source".to_string()))
    }
}

#[derive(Clone)]
pub struct ExecutorConfig {
    pub working_dir: PathBuf,
    pub state_root: PathBuf,
    pub log_dir: PathBuf,
    pub backend_command: String,
    /// Backend argv template; the literal tokens `{{model}}` and
    /// `{{prompt}}` are substituted per node before spawning.
    pub backend_args: Vec<String>,
    pub default_model: String,
    pub default_iteration_timeout: Option<Duration>,
}

/// Run one DAG iteration (one firing of every task in `task_keys`) to
/// quiescence. Returns `true` if every task that actually ran finished
/// with a successful outcome (skipped tasks don't count against this).
#[allow(clippy::too_many_arguments)]
pub async fn run_dag_iteration(
    registry: Arc<Registry>,
    cfg: &ExecutorConfig,
    prompt_source: &dyn PromptSource,
    usage_parser: Arc<dyn UsageParser>,
    doc: &ComposeDocument,
    task_keys: &[String],
    pipeline_instance_id: &str,
    state_dir: &Path,
    concurrency: &mut HashMap<String, Arc<Semaphore>>,
) -> Result<bool> {
    std::fs::create_dir_all(state_dir)?;

    let mut edges = HashMap::new();
    for key in task_keys {
        let task = doc
            .tasks
            .get(key)
            .ok_or_else(|| Error::Config(format!("pipeline references undefined task '{key}'")))?;
        edges.insert(key.clone(), task.depends_on.clone());
    }
    let mut graph = DagGraph::new(task_keys.to_vec(), edges);

    let (tx, mut rx) = mpsc::unbounded_channel::<(String, NodeOutcome)>();
    let mut running: usize = 0;

    loop {
        graph.advance();
        if graph.is_quiescent() {
            break;
        }

        for key in graph.ready() {
            let task = doc.tasks.get(&key).expect("validated above").clone();
            graph.mark_running(&key);
            running += 1;

            let sem = concurrency
                .entry(key.clone())
                .or_insert_with(|| {
                    Arc::new(Semaphore::new(task.concurrency.unwrap_or(u32::MAX) as usize))
                })
                .clone();

            let prompt_text = match prompt_source.resolve(&task) {
                Ok(text) => text,
                Err(e) => {
                    // A task whose prompt source cannot be resolved fails
                    // outright rather than panicking the executor.
                    tracing::error!(task = %key, error = %e, "failed to resolve prompt source");
                    let _ = tx.send((key.clone(), NodeOutcome::Failure));
                    continue;
                }
            };
            let (resolved_text, warnings) = prompt::resolve_output_directives(&prompt_text, state_dir);
            for w in warnings {
                tracing::warn!(task = %key, "{w}");
            }
            let composed = prompt::compose(
                &resolved_text,
                task.prompt_prefix.as_deref(),
                task.prompt_suffix.as_deref(),
            );

            let tx = tx.clone();
            let registry = registry.clone();
            let cfg = cfg.clone();
            let pipeline_instance_id_owned = pipeline_instance_id.to_string();
            let state_dir_owned = state_dir.to_path_buf();
            let usage_parser = usage_parser.clone();
            let key_for_task = key.clone();

            tokio::spawn(async move {
                let outcome = launch_task_node(
                    registry,
                    &cfg,
                    &pipeline_instance_id_owned,
                    &key_for_task,
                    &task,
                    &composed,
                    &state_dir_owned,
                    usage_parser,
                    sem,
                )
                .await
                .unwrap_or(NodeOutcome::Failure);
                let _ = tx.send((key_for_task, outcome));
            });
        }

        if running == 0 {
            return Err(Error::Internal(
                "DAG scheduler stalled: no ready nodes and none running".to_string(),
            ));
        }

        let (key, outcome) = rx
            .recv()
            .await
            .ok_or_else(|| Error::Internal("DAG executor completion channel closed early".to_string()))?;
        running -= 1;
        graph.mark_finished(&key, outcome);
    }

    let succeeded = task_keys
        .iter()
        .all(|k| !matches!(graph.state_of(k), NodeState::Finished(NodeOutcome::Failure)));
    Ok(succeeded)
}

/// Launch every one of a task's `parallelism` instances concurrently
/// (subject to its `concurrency` cap) and fold their outcomes: the task
/// node succeeds only if every instance does.
#[allow(clippy::too_many_arguments)]
async fn launch_task_node(
    registry: Arc<Registry>,
    cfg: &ExecutorConfig,
    pipeline_instance_id: &str,
    task_key: &str,
    task: &TaskSpec,
    composed_prompt: &str,
    state_dir: &Path,
    usage_parser: Arc<dyn UsageParser>,
    concurrency: Arc<Semaphore>,
) -> Result<NodeOutcome> {
    let parallelism = task.parallelism.max(1);
    let task_name = task.name.clone().unwrap_or_else(|| task_key.to_string());
    let model = task.model.clone().unwrap_or_else(|| cfg.default_model.clone());
    let iteration_timeout = task
        .iteration_timeout_secs
        .map(Duration::from_secs)
        .or(cfg.default_iteration_timeout);

    let mut handles = Vec::with_capacity(parallelism as usize);
    for idx in 1..=parallelism {
        let registry = registry.clone();
        let cfg = cfg.clone();
        let pipeline_instance_id = pipeline_instance_id.to_string();
        let name = names::task_instance_name(&task_name, idx, parallelism);
        let model = model.clone();
        let prompt_text = composed_prompt.to_string();
        let state_dir = state_dir.to_path_buf();
        let usage_parser = usage_parser.clone();
        // Captured under the task's own DAG key, not its display-name
        // override, so `{{output:task_key}}` directives always resolve.
        let capture_path = Some(state_dir.join(task_key));
        let concurrency = concurrency.clone();
        let iteration_timeout = iteration_timeout;
        let env = vec![
            (swarm_core::env::TASK_ID.to_string(), pipeline_instance_id.to_string()),
            (swarm_core::env::STATE_DIR.to_string(), state_dir.display().to_string()),
        ];

        handles.push(tokio::spawn(async move {
            let _permit = concurrency.acquire().await;
            run_single_instance(
                registry,
                &cfg,
                &pipeline_instance_id,
                &name,
                model,
                &prompt_text,
                capture_path,
                iteration_timeout,
                usage_parser,
                env,
            )
            .await
        }));
    }

    let mut any_failure = false;
    for handle in handles {
        match handle.await {
            Ok(Ok(NodeOutcome::Success)) => {}
            Ok(Ok(NodeOutcome::Failure)) => any_failure = true,
            Ok(Err(_)) | Err(_) => any_failure = true,
        }
    }

    Ok(if any_failure {
        NodeOutcome::Failure
    } else {
        NodeOutcome::Success
    })
}

#[allow(clippy::too_many_arguments)]
async fn run_single_instance(
    registry: Arc<Registry>,
    cfg: &ExecutorConfig,
    pipeline_instance_id: &str,
    name: &str,
    model: String,
    prompt_text: &str,
    capture_path: Option<PathBuf>,
    iteration_timeout: Option<Duration>,
    usage_parser: Arc<dyn UsageParser>,
    mut env: Vec<(String, String)>,
) -> Result<NodeOutcome> {
    let mut record = AgentRecord::new(cfg.working_dir.clone(), PromptLabel::Combined(name.to_string()), model);
    record.name = Some(name.to_string());
    record.parent_id = Some(pipeline_instance_id.to_string());
    record.iterations = 1;
    record.env_names = vec![
        swarm_core::env::AGENT_ID.to_string(),
        swarm_core::env::TASK_ID.to_string(),
        swarm_core::env::STATE_DIR.to_string(),
    ];

    let agent_id = registry.register(record)?;
    env.push((swarm_core::env::AGENT_ID.to_string(), agent_id.clone()));

    let args: Vec<String> = cfg
        .backend_args
        .iter()
        .map(|a| a.replace("{{prompt}}", prompt_text))
        .collect();

    let config = IterationConfig {
        agent_id: agent_id.clone(),
        backend_command: cfg.backend_command.clone(),
        backend_args: args,
        working_dir: cfg.working_dir.clone(),
        log_file: cfg.log_dir.join(format!("{agent_id}.log")),
        iteration_timeout,
        total_timeout: None,
        poll_interval: PAUSE_POLL_INTERVAL,
        capture_path,
        env,
    };

    swarm_runner::run(registry.clone(), config, usage_parser).await?;

    let rec = registry.get(&agent_id)?;
    Ok(if rec.failed_iters > 0 {
        NodeOutcome::Failure
    } else {
        NodeOutcome::Success
    })
}

/// Run one pipeline instance end to end: register its own tracked
/// `AgentRecord`, then cycle `pipeline.iterations` DAG iterations (0 =
/// unbounded), honoring pause/terminate control intents on the
/// pipeline-instance record itself at each iteration boundary — the
/// same checkpoint discipline `swarm-runner`'s loop uses for a plain
/// agent.
pub async fn run_pipeline_instance(
    registry: Arc<Registry>,
    cfg: ExecutorConfig,
    prompt_source: Arc<dyn PromptSource>,
    usage_parser: Arc<dyn UsageParser>,
    doc: Arc<ComposeDocument>,
    pipeline_name: String,
    pipeline: PipelineSpec,
    instance_index: u32,
) -> Result<String> {
    let name = names::pipeline_instance_name(&pipeline_name, instance_index, pipeline.parallelism);

    let mut record = AgentRecord::new(
        cfg.working_dir.clone(),
        PromptLabel::Combined(pipeline_name.clone()),
        cfg.default_model.clone(),
    );
    record.name = Some(name);
    record.iterations = pipeline.iterations;
    let pipeline_id = registry.register(record)?;

    let mut concurrency: HashMap<String, Arc<Semaphore>> = HashMap::new();

    loop {
        let rec = registry.get(&pipeline_id)?;

        if rec.terminate_mode != TerminateMode::Unset
            && (rec.terminate_mode == TerminateMode::Immediate || rec.current_iter > 1)
        {
            registry.merge_update(
                &pipeline_id,
                ProgressUpdate {
                    status: Some(AgentStatus::Terminated),
                    exit_reason: Some(Some(ExitReason::Killed)),
                    terminated_at: Some(Some(Utc::now())),
                    ..Default::default()
                },
            )?;
            break;
        }

        if rec.derived_pause_state() != PauseState::Running {
            registry.mark_paused_at_boundary(&pipeline_id)?;
            tokio::time::sleep(PAUSE_POLL_INTERVAL).await;
            continue;
        }

        if pipeline.iterations != 0 && rec.current_iter > pipeline.iterations {
            registry.merge_update(
                &pipeline_id,
                ProgressUpdate {
                    status: Some(AgentStatus::Terminated),
                    exit_reason: Some(Some(ExitReason::Completed)),
                    terminated_at: Some(Some(Utc::now())),
                    ..Default::default()
                },
            )?;
            break;
        }

        let state_dir = cfg
            .state_root
            .join(&pipeline_id)
            .join(rec.current_iter.to_string());

        let succeeded = run_dag_iteration(
            registry.clone(),
            &cfg,
            prompt_source.as_ref(),
            usage_parser.clone(),
            &doc,
            &pipeline.tasks,
            &pipeline_id,
            &state_dir,
            &mut concurrency,
        )
        .await?;

        registry.update(&pipeline_id, |r| {
            r.current_iter += 1;
            if succeeded {
                r.successful_iters += 1;
            } else {
                r.failed_iters += 1;
            }
        })?;
    }

    Ok(pipeline_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use swarm_compose::{DependencyEdge, EdgeCondition};
    use swarm_runner::ClaudeCliUsageParser;

    fn task(prompt: &str, depends_on: Vec<DependencyEdge>) -> TaskSpec {
        TaskSpec {
            preset: None,
            prompt: Some(prompt.to_string()),
            prompt_file: None,
            prompt_prefix: None,
            prompt_suffix: None,
            model: None,
            iterations: None,
            parallelism: 1,
            concurrency: None,
            name: None,
            depends_on,
            env: vec![],
            on_complete: None,
            labels: Default::default(),
            iteration_timeout_secs: None,
            total_timeout_secs: None,
        }
    }

    fn exec_config(dir: &Path) -> ExecutorConfig {
        ExecutorConfig {
            working_dir: dir.to_path_buf(),
            state_root: dir.join("state"),
            log_dir: dir.join("logs"),
            backend_command: "/bin/sh".to_string(),
            backend_args: vec!["-c".to_string(), "echo \"$1\"".to_string(), "--".to_string(), "{{prompt}}".to_string()],
            default_model: "sonnet".to_string(),
            default_iteration_timeout: Some(Duration::from_secs(5)),
        }
    }

    /// A small DAG with conditional edges end to end through the
    /// executor: a failing `A` skips `C` (success edge) and still runs
    /// `B` (failure edge).
    #[tokio::test]
    async fn dag_iteration_honors_conditional_edges_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(Registry::open(dir.path().join("registry.json")));

        let mut doc = ComposeDocument::default();
        doc.tasks.insert("a".to_string(), task("exit 1", vec![]));
        doc.tasks.insert(
            "b".to_string(),
            task(
                "echo b-ran",
                vec![DependencyEdge { on: "a".to_string(), condition: EdgeCondition::Failure }],
            ),
        );
        doc.tasks.insert(
            "c".to_string(),
            task(
                "echo c-ran",
                vec![DependencyEdge { on: "a".to_string(), condition: EdgeCondition::Success }],
            ),
        );

        // "a"'s body is a shell exit code, not an echo — give it its own
        // prompt source that actually exits non-zero via the backend.
        let mut failing_doc_tasks = doc.tasks.clone();
        failing_doc_tasks.insert("a".to_string(), task("__fail__", vec![]));
        doc.tasks = failing_doc_tasks;

        let prompt_source = DefaultPromptSource { presets: HashMap::new() };
        let cfg = ExecutorConfig {
            backend_args: vec![
                "-c".to_string(),
                "if [ \"$1\" = \"__fail__\" ]; then exit 1; else echo \"$1\"; fi".to_string(),
                "--".to_string(),
                "{{prompt}}".to_string(),
            ],
            ..exec_config(dir.path())
        };

        let mut concurrency = HashMap::new();
        let succeeded = run_dag_iteration(
            registry.clone(),
            &cfg,
            &prompt_source,
            Arc::new(ClaudeCliUsageParser),
            &doc,
            &["a".to_string(), "b".to_string(), "c".to_string()],
            "pipeline-root",
            &dir.path().join("state").join("1"),
            &mut concurrency,
        )
        .await
        .unwrap();

        assert!(!succeeded);

        let all = registry.list().unwrap();
        let find = |n: &str| all.iter().find(|r| r.name.as_deref() == Some(n)).unwrap();
        assert_eq!(find("a").failed_iters, 1);
        assert_eq!(find("b").successful_iters, 1);
        assert!(all.iter().all(|r| r.name.as_deref() != Some("c")));
    }

    #[tokio::test]
    async fn independent_root_tasks_both_run() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(Registry::open(dir.path().join("registry.json")));

        let mut doc = ComposeDocument::default();
        doc.tasks.insert("x".to_string(), task("x-body", vec![]));
        doc.tasks.insert("y".to_string(), task("y-body", vec![]));

        let prompt_source = DefaultPromptSource { presets: HashMap::new() };
        let cfg = exec_config(dir.path());
        let mut concurrency = HashMap::new();

        let succeeded = run_dag_iteration(
            registry.clone(),
            &cfg,
            &prompt_source,
            Arc::new(ClaudeCliUsageParser),
            &doc,
            &["x".to_string(), "y".to_string()],
            "pipeline-root",
            &dir.path().join("state").join("1"),
            &mut concurrency,
        )
        .await
        .unwrap();

        assert!(succeeded);
        let all = registry.list().unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(|r| r.successful_iters == 1));
    }
}
