//! The Agent Registry: the single authoritative store of `AgentRecord`s,
//! file-backed and safe for concurrent access from independent `swarm`
//! processes.

use chrono::Utc;
use swarm_core::error::{Error, Result};
use swarm_core::record::{AgentRecord, AgentStatus, ExitReason, TerminateMode, TimeoutReason};

use crate::resolve;
use crate::store::Store;

pub struct Registry {
    store: Store,
}

/// A partial update applied to the progress/timing/lifecycle fields of
/// a record without touching its control-intent fields (`paused`,
/// `terminate_mode`). Used by the iteration loop to publish progress
/// without racing a concurrent `swarm kill`/`swarm pause` write —
/// progress publishing must never clobber control-intent fields
/// written by another process.
#[derive(Debug, Default, Clone)]
pub struct ProgressUpdate {
    pub pid: Option<Option<u32>>,
    pub current_iter: Option<u64>,
    pub successful_iters: Option<u64>,
    pub failed_iters: Option<u64>,
    pub last_error: Option<Option<String>>,
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
    pub total_cost: Option<f64>,
    pub current_task: Option<Option<String>>,
    pub status: Option<AgentStatus>,
    pub exit_reason: Option<Option<ExitReason>>,
    pub terminated_at: Option<Option<chrono::DateTime<Utc>>>,
    pub timeout_at: Option<Option<chrono::DateTime<Utc>>>,
    pub timeout_reason: Option<Option<TimeoutReason>>,
}

impl ProgressUpdate {
    fn apply(self, rec: &mut AgentRecord) {
        if let Some(v) = self.pid {
            rec.pid = v;
        }
        if let Some(v) = self.current_iter {
            rec.current_iter = v;
        }
        if let Some(v) = self.successful_iters {
            rec.successful_iters = v;
        }
        if let Some(v) = self.failed_iters {
            rec.failed_iters = v;
        }
        if let Some(v) = self.last_error {
            rec.last_error = v;
        }
        if let Some(v) = self.input_tokens {
            rec.input_tokens = v;
        }
        if let Some(v) = self.output_tokens {
            rec.output_tokens = v;
        }
        if let Some(v) = self.total_cost {
            rec.total_cost = v;
        }
        if let Some(v) = self.current_task {
            rec.current_task = v;
        }
        if let Some(v) = self.status {
            rec.status = v;
        }
        if let Some(v) = self.exit_reason {
            rec.exit_reason = v;
        }
        if let Some(v) = self.terminated_at {
            rec.terminated_at = v;
        }
        if let Some(v) = self.timeout_at {
            rec.timeout_at = v;
        }
        if let Some(v) = self.timeout_reason {
            rec.timeout_reason = v;
        }
    }
}

impl Registry {
    pub fn open(registry_path: impl Into<std::path::PathBuf>) -> Self {
        Self {
            store: Store::new(registry_path),
        }
    }

    /// Register a new agent. If `record.id` is empty, one is generated.
    /// Rejects a name collision against a currently-running agent; a
    /// name shared only with terminated agents is allowed (disambiguated
    /// by "prefer running" at resolve time).
    pub fn register(&self, mut record: AgentRecord) -> Result<String> {
        self.store.with_locked(|doc| {
            if record.id.is_empty() {
                loop {
                    let candidate = swarm_core::id::generate();
                    if !doc.agents.contains_key(&candidate) {
                        record.id = candidate;
                        break;
                    }
                }
            } else if doc.agents.contains_key(&record.id) {
                return Err(Error::Internal(format!("id collision: {}", record.id)));
            }

            if let Some(name) = &record.name {
                let collision = doc
                    .agents
                    .values()
                    .any(|r| r.name.as_deref() == Some(name.as_str()) && r.is_running());
                if collision {
                    return Err(Error::NameInUse(name.clone()));
                }
            }

            let id = record.id.clone();
            doc.agents.insert(id.clone(), record.clone());
            Ok(id)
        })
    }

    /// Resolve `token` (id, name, prefix, or `@last`/`_`) and return a
    /// clone of the matching record.
    pub fn resolve(&self, token: &str) -> Result<AgentRecord> {
        let doc = self.store.read_snapshot()?;
        resolve::resolve(&doc, token).cloned()
    }

    pub fn get(&self, id: &str) -> Result<AgentRecord> {
        let doc = self.store.read_snapshot()?;
        doc.agents.get(id).cloned().ok_or_else(|| Error::not_found(id))
    }

    /// Snapshot of every record, for `list`/`ps`/`summary`-style read
    /// paths. Callers filter by scope/status themselves.
    pub fn list(&self) -> Result<Vec<AgentRecord>> {
        let doc = self.store.read_snapshot()?;
        Ok(doc.agents.into_values().collect())
    }

    /// Apply a progress-only update, re-reading the latest document
    /// under lock so we never overwrite a concurrent control-intent
    /// write with a stale snapshot.
    pub fn merge_update(&self, id: &str, update: ProgressUpdate) -> Result<()> {
        self.store.with_locked(|doc| {
            let rec = doc.agents.get_mut(id).ok_or_else(|| Error::not_found(id))?;
            update.apply(rec);
            Ok(())
        })
    }

    /// Arbitrary read-modify-write over a single record, for callers
    /// that need more than `ProgressUpdate` covers (e.g. the CLI
    /// setting labels). Control-intent fields are fair game here since
    /// these calls originate from the CLI itself, not a background
    /// loop racing it.
    pub fn update(&self, id: &str, f: impl FnOnce(&mut AgentRecord)) -> Result<AgentRecord> {
        self.store.with_locked(|doc| {
            let rec = doc.agents.get_mut(id).ok_or_else(|| Error::not_found(id))?;
            f(rec);
            Ok(rec.clone())
        })
    }

    /// Request that a running agent pause. Sets the `paused` intent;
    /// the iteration loop is responsible for observing it and setting
    /// `paused_at` once actually suspended (`paused_at` is never set
    /// directly by a control-plane write).
    pub fn set_paused(&self, id: &str, paused: bool) -> Result<AgentRecord> {
        self.store.with_locked(|doc| {
            let rec = doc.agents.get_mut(id).ok_or_else(|| Error::not_found(id))?;
            rec.paused = paused;
            if !paused {
                rec.paused_at = None;
            }
            Ok(rec.clone())
        })
    }

    /// Record that the loop has actually suspended at an iteration
    /// boundary (as opposed to merely having been asked to).
    pub fn mark_paused_at_boundary(&self, id: &str) -> Result<()> {
        self.store.with_locked(|doc| {
            let rec = doc.agents.get_mut(id).ok_or_else(|| Error::not_found(id))?;
            if rec.paused {
                rec.paused_at = Some(Utc::now());
            }
            Ok(())
        })
    }

    pub fn set_terminate_mode(&self, id: &str, mode: TerminateMode) -> Result<AgentRecord> {
        self.store.with_locked(|doc| {
            let rec = doc.agents.get_mut(id).ok_or_else(|| Error::not_found(id))?;
            rec.terminate_mode = mode;
            Ok(rec.clone())
        })
    }

    /// Every agent transitively launched by `id` (via `parent_id`
    /// chains), for `kill --down`-style cascades.
    pub fn get_descendants(&self, id: &str) -> Result<Vec<AgentRecord>> {
        let doc = self.store.read_snapshot()?;
        let mut out = Vec::new();
        let mut frontier = vec![id.to_string()];
        while let Some(current) = frontier.pop() {
            for rec in doc.agents.values() {
                if rec.parent_id.as_deref() == Some(current.as_str()) {
                    frontier.push(rec.id.clone());
                    out.push(rec.clone());
                }
            }
        }
        Ok(out)
    }

    /// Remove a record outright. Refuses to remove a running agent
    /// (invariant: you must terminate before you can forget).
    pub fn remove(&self, id: &str) -> Result<()> {
        self.store.with_locked(|doc| {
            match doc.agents.get(id) {
                None => return Err(Error::not_found(id)),
                Some(rec) if rec.is_running() => return Err(Error::StillRunning(id.to_string())),
                Some(_) => {}
            }
            doc.agents.remove(id);
            Ok(())
        })
    }

    /// Remove every terminated record older than `max_age`, returning
    /// the ids removed. Backs `swarm prune`.
    pub fn prune_older_than(&self, max_age: chrono::Duration) -> Result<Vec<String>> {
        self.store.with_locked(|doc| {
            let cutoff = Utc::now() - max_age;
            let stale: Vec<String> = doc
                .agents
                .values()
                .filter(|r| {
                    !r.is_running()
                        && r.terminated_at.map(|t| t < cutoff).unwrap_or(false)
                })
                .map(|r| r.id.clone())
                .collect();
            for id in &stale {
                doc.agents.remove(id);
            }
            Ok(stale)
        })
    }

    /// Reconcile `status`/`pid` against OS-level liveness for every
    /// record that claims to be running but whose pid no longer
    /// answers — backs `swarm doctor`. `is_alive` is injected so this
    /// crate doesn't need to depend on `swarm-process` directly.
    pub fn reconcile(&self, is_alive: impl Fn(u32) -> bool) -> Result<Vec<String>> {
        self.store.with_locked(|doc| {
            let mut fixed = Vec::new();
            for rec in doc.agents.values_mut() {
                if rec.is_running() {
                    let alive = rec.pid.map(&is_alive).unwrap_or(false);
                    if !alive {
                        rec.status = AgentStatus::Terminated;
                        rec.exit_reason = Some(ExitReason::Signal);
                        rec.terminated_at = Some(Utc::now());
                        fixed.push(rec.id.clone());
                    }
                }
            }
            Ok(fixed)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use swarm_core::record::PromptLabel;

    fn new_registry() -> (tempfile::TempDir, Registry) {
        let dir = tempfile::tempdir().unwrap();
        let reg = Registry::open(dir.path().join("registry.json"));
        (dir, reg)
    }

    #[test]
    fn register_assigns_an_id_when_absent() {
        let (_dir, reg) = new_registry();
        let rec = AgentRecord::new(PathBuf::from("/tmp"), PromptLabel::Inline, "sonnet");
        let id = reg.register(rec).unwrap();
        assert_eq!(id.len(), 10);
        assert!(reg.get(&id).is_ok());
    }

    #[test]
    fn register_rejects_name_collision_with_running_agent() {
        let (_dir, reg) = new_registry();
        let mut a = AgentRecord::new(PathBuf::from("/tmp"), PromptLabel::Inline, "sonnet");
        a.name = Some("worker".into());
        reg.register(a).unwrap();

        let mut b = AgentRecord::new(PathBuf::from("/tmp"), PromptLabel::Inline, "sonnet");
        b.name = Some("worker".into());
        assert!(matches!(reg.register(b), Err(Error::NameInUse(_))));
    }

    #[test]
    fn register_allows_name_reuse_after_termination() {
        let (_dir, reg) = new_registry();
        let mut a = AgentRecord::new(PathBuf::from("/tmp"), PromptLabel::Inline, "sonnet");
        a.name = Some("worker".into());
        a.status = AgentStatus::Terminated;
        reg.register(a).unwrap();

        let mut b = AgentRecord::new(PathBuf::from("/tmp"), PromptLabel::Inline, "sonnet");
        b.name = Some("worker".into());
        assert!(reg.register(b).is_ok());
    }

    #[test]
    fn merge_update_does_not_touch_control_intents() {
        let (_dir, reg) = new_registry();
        let rec = AgentRecord::new(PathBuf::from("/tmp"), PromptLabel::Inline, "sonnet");
        let id = reg.register(rec).unwrap();
        reg.set_terminate_mode(&id, TerminateMode::AfterIteration).unwrap();

        reg.merge_update(
            &id,
            ProgressUpdate {
                current_iter: Some(2),
                ..Default::default()
            },
        )
        .unwrap();

        let after = reg.get(&id).unwrap();
        assert_eq!(after.current_iter, 2);
        assert_eq!(after.terminate_mode, TerminateMode::AfterIteration);
    }

    #[test]
    fn remove_refuses_running_agent() {
        let (_dir, reg) = new_registry();
        let rec = AgentRecord::new(PathBuf::from("/tmp"), PromptLabel::Inline, "sonnet");
        let id = reg.register(rec).unwrap();
        assert!(matches!(reg.remove(&id), Err(Error::StillRunning(_))));
    }

    #[test]
    fn descendants_follow_parent_chain() {
        let (_dir, reg) = new_registry();
        let root = AgentRecord::new(PathBuf::from("/tmp"), PromptLabel::Inline, "sonnet");
        let root_id = reg.register(root).unwrap();

        let mut child = AgentRecord::new(PathBuf::from("/tmp"), PromptLabel::Inline, "sonnet");
        child.parent_id = Some(root_id.clone());
        let child_id = reg.register(child).unwrap();

        let mut grandchild = AgentRecord::new(PathBuf::from("/tmp"), PromptLabel::Inline, "sonnet");
        grandchild.parent_id = Some(child_id.clone());
        reg.register(grandchild).unwrap();

        let descendants = reg.get_descendants(&root_id).unwrap();
        assert_eq!(descendants.len(), 2);
    }

    #[test]
    fn reconcile_marks_dead_pids_terminated() {
        let (_dir, reg) = new_registry();
        let mut rec = AgentRecord::new(PathBuf::from("/tmp"), PromptLabel::Inline, "sonnet");
        rec.pid = Some(999_999);
        let id = reg.register(rec).unwrap();

        let fixed = reg.reconcile(|_pid| false).unwrap();
        assert_eq!(fixed, vec![id.clone()]);
        assert_eq!(reg.get(&id).unwrap().status, AgentStatus::Terminated);
    }
}
