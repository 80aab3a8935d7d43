//! `AgentRecord` — the single source of truth for one supervised agent.
//!
//! Grouped by concern (identity, process, plan, progress, timing,
//! lifecycle, control intents, labels) so the struct reads as a
//! checklist, not an arbitrary bag of fields.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `prompt_label` — a tagged variant in memory, round-tripped through
/// the registry file as sentinel strings for on-disk compatibility.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptLabel {
    Preset(String),
    File(PathBuf),
    Inline,
    Stdin,
    /// A preset combined with a prefix/suffix or other modifiers —
    /// used by DAG tasks whose prompt is `preset + prefix/suffix`.
    Combined(String),
}

impl PromptLabel {
    fn as_wire_string(&self) -> String {
        match self {
            PromptLabel::Preset(name) => format!("preset:{name}"),
            PromptLabel::File(path) => format!("file:{}", path.display()),
            PromptLabel::Inline => "<string>".to_string(),
            PromptLabel::Stdin => "<stdin>".to_string(),
            PromptLabel::Combined(name) => format!("combined:{name}"),
        }
    }

    fn from_wire_string(s: &str) -> Self {
        if s == "<string>" {
            PromptLabel::Inline
        } else if s == "<stdin>" {
            PromptLabel::Stdin
        } else if let Some(rest) = s.strip_prefix("preset:") {
            PromptLabel::Preset(rest.to_string())
        } else if let Some(rest) = s.strip_prefix("file:") {
            PromptLabel::File(PathBuf::from(rest))
        } else if let Some(rest) = s.strip_prefix("combined:") {
            PromptLabel::Combined(rest.to_string())
        } else {
            // Unknown/legacy shape: preserve it verbatim as a preset name
            // rather than losing data on round-trip.
            PromptLabel::Preset(s.to_string())
        }
    }
}

impl std::fmt::Display for PromptLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_wire_string())
    }
}

impl Serialize for PromptLabel {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.as_wire_string())
    }
}

impl<'de> Deserialize<'de> for PromptLabel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(PromptLabel::from_wire_string(&s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Running,
    Terminated,
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Terminated => write!(f, "terminated"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    Completed,
    Killed,
    Signal,
    Timeout,
    Failed,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Killed => write!(f, "killed"),
            Self::Signal => write!(f, "signal"),
            Self::Timeout => write!(f, "timeout"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutReason {
    Iteration,
    Total,
}

/// Control intent: whether/how a running agent should terminate.
/// `Unset` is the steady state; the CLI writes `Immediate` or
/// `AfterIteration` to request termination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminateMode {
    #[default]
    Unset,
    Immediate,
    AfterIteration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    // Identity
    pub id: String,
    pub name: Option<String>,
    pub parent_id: Option<String>,

    // Process
    pub pid: Option<u32>,
    pub log_file: Option<PathBuf>,
    pub working_dir: PathBuf,

    // Plan
    pub prompt_label: PromptLabel,
    pub model: String,
    #[serde(default)]
    pub env_names: Vec<String>,
    #[serde(default)]
    pub on_complete: Option<String>,

    // Progress
    #[serde(default)]
    pub iterations: u64,
    #[serde(default = "one")]
    pub current_iter: u64,
    #[serde(default)]
    pub successful_iters: u64,
    #[serde(default)]
    pub failed_iters: u64,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub total_cost: f64,
    #[serde(default)]
    pub current_task: Option<String>,

    // Timing
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub terminated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub paused_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub timeout_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub timeout_reason: Option<TimeoutReason>,

    // Lifecycle
    pub status: AgentStatus,
    #[serde(default)]
    pub exit_reason: Option<ExitReason>,

    // Control intents
    #[serde(default)]
    pub paused: bool,
    #[serde(default)]
    pub terminate_mode: TerminateMode,

    // Labels
    #[serde(default)]
    pub labels: HashMap<String, String>,

    /// Fields this build of `swarm` doesn't know about, preserved
    /// verbatim so an older/newer binary's registry writes round-trip
    /// rather than silently losing data (spec: "unknown fields on read
    /// are preserved and round-tripped").
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

fn one() -> u64 {
    1
}

impl AgentRecord {
    /// Build a fresh, running record. `id` is filled by the registry on
    /// `Register` if left empty.
    pub fn new(working_dir: PathBuf, prompt_label: PromptLabel, model: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            name: None,
            parent_id: None,
            pid: None,
            log_file: None,
            working_dir,
            prompt_label,
            model: model.into(),
            env_names: Vec::new(),
            on_complete: None,
            iterations: 0,
            current_iter: 1,
            successful_iters: 0,
            failed_iters: 0,
            last_error: None,
            input_tokens: 0,
            output_tokens: 0,
            total_cost: 0.0,
            current_task: None,
            started_at: Utc::now(),
            terminated_at: None,
            paused_at: None,
            timeout_at: None,
            timeout_reason: None,
            status: AgentStatus::Running,
            exit_reason: None,
            paused: false,
            terminate_mode: TerminateMode::Unset,
            labels: HashMap::new(),
            extra: HashMap::new(),
        }
    }

    /// Derived status: never stored, always computed from `paused`/`paused_at`.
    pub fn derived_pause_state(&self) -> PauseState {
        match (self.paused, self.paused_at.is_some()) {
            (true, false) => PauseState::Pausing,
            (true, true) => PauseState::Paused,
            (false, _) => PauseState::Running,
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == AgentStatus::Running
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseState {
    Running,
    Pausing,
    Paused,
}
