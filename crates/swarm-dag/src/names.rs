//! Naming conventions for pipeline instances and DAG task nodes, and the
//! pattern-matching rules `scale down` / `down` use to find the records
//! a given compose name refers to.

use std::path::Path;

use swarm_core::record::AgentRecord;

/// The `name` a pipeline instance's `AgentRecord` is registered under.
/// Unsuffixed when `parallelism <= 1`; `.1`..`.P` otherwise.
pub fn pipeline_instance_name(pipeline: &str, index: u32, parallelism: u32) -> String {
    if parallelism <= 1 {
        format!("pipeline:{pipeline}")
    } else {
        format!("pipeline:{pipeline}.{index}")
    }
}

/// The `name` one instance of a DAG task node is registered under.
/// `task_name` is the task's `name` override if set, else its compose
/// key. Suffixed `.k` only when the task's own `parallelism > 1`.
pub fn task_instance_name(task_name: &str, index: u32, parallelism: u32) -> String {
    if parallelism <= 1 {
        task_name.to_string()
    } else {
        format!("{task_name}.{index}")
    }
}

/// Split a registered name into `(base, Some(index))` if it carries a
/// numeric `.N` suffix, else `(base, None)` — the inverse of the two
/// naming functions above, used to match a bare compose name against
/// records that may or may not be fanned out.
fn split_suffix(name: &str) -> (&str, Option<u32>) {
    if let Some((base, suffix)) = name.rsplit_once('.') {
        if let Ok(n) = suffix.parse::<u32>() {
            return (base, Some(n));
        }
    }
    (name, None)
}

/// `true` if `record_name` is `base` itself or `base.N` for some `N`.
pub fn matches_base(record_name: &str, base: &str) -> bool {
    let (name_base, _) = split_suffix(record_name);
    name_base == base || record_name == base
}

/// The fan-out index a matched name represents: an unsuffixed name is
/// instance 1.
pub fn instance_index(record_name: &str) -> u32 {
    split_suffix(record_name).1.unwrap_or(1)
}

/// Records (already filtered to `status=running` and the current scope
/// by the caller) whose name matches `base` — e.g. `pipeline:ci` or
/// `pipeline:ci.2` — restricted to `working_dir == cwd`, for `down`
/// and reconciliation commands.
pub fn matching<'a>(records: &'a [AgentRecord], base: &str, cwd: &Path) -> Vec<&'a AgentRecord> {
    records
        .iter()
        .filter(|r| r.working_dir == cwd)
        .filter(|r| r.name.as_deref().map(|n| matches_base(n, base)).unwrap_or(false))
        .collect()
}

/// Plan a scale-down: records matching `base` whose fan-out index
/// exceeds `new_parallelism` are force-killed; the rest are left alone
/// (idempotent when parallelism is unchanged).
pub fn plan_scale_down<'a>(
    records: &'a [AgentRecord],
    base: &str,
    new_parallelism: u32,
    cwd: &Path,
) -> Vec<&'a AgentRecord> {
    matching(records, base, cwd)
        .into_iter()
        .filter(|r| {
            let idx = r.name.as_deref().map(instance_index).unwrap_or(1);
            idx > new_parallelism
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use swarm_core::record::PromptLabel;

    fn rec(name: &str, cwd: &Path) -> AgentRecord {
        let mut r = AgentRecord::new(cwd.to_path_buf(), PromptLabel::Inline, "sonnet");
        r.name = Some(name.to_string());
        r
    }

    #[test]
    fn pipeline_name_is_unsuffixed_for_single_instance() {
        assert_eq!(pipeline_instance_name("ci", 1, 1), "pipeline:ci");
    }

    #[test]
    fn pipeline_name_is_suffixed_when_fanned_out() {
        assert_eq!(pipeline_instance_name("ci", 2, 3), "pipeline:ci.2");
    }

    #[test]
    fn matches_base_accepts_unsuffixed_and_suffixed_forms() {
        assert!(matches_base("pipeline:ci", "pipeline:ci"));
        assert!(matches_base("pipeline:ci.3", "pipeline:ci"));
        assert!(!matches_base("pipeline:cifoo", "pipeline:ci"));
    }

    /// Scaling parallelism 3 -> 2 kills exactly `.3`.
    #[test]
    fn scale_down_plan_kills_only_high_indexed_instances() {
        let cwd = PathBuf::from("/work");
        let records = vec![
            rec("pipeline:ci.1", &cwd),
            rec("pipeline:ci.2", &cwd),
            rec("pipeline:ci.3", &cwd),
        ];
        let plan = plan_scale_down(&records, "pipeline:ci", 2, &cwd);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].name.as_deref(), Some("pipeline:ci.3"));
    }

    #[test]
    fn scale_down_plan_is_empty_when_parallelism_unchanged() {
        let cwd = PathBuf::from("/work");
        let records = vec![rec("pipeline:ci.1", &cwd), rec("pipeline:ci.2", &cwd)];
        let plan = plan_scale_down(&records, "pipeline:ci", 2, &cwd);
        assert!(plan.is_empty());
    }

    #[test]
    fn matching_is_restricted_to_the_given_working_dir() {
        let cwd = PathBuf::from("/work");
        let other = PathBuf::from("/elsewhere");
        let records = vec![rec("pipeline:ci", &cwd), rec("pipeline:ci", &other)];
        let matched = matching(&records, "pipeline:ci", &cwd);
        assert_eq!(matched.len(), 1);
    }
}
