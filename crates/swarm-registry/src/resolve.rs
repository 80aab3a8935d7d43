//! Identifier resolution: turn whatever the user typed on the CLI into
//! exactly one agent id, following this precedence order:
//!
//! 1. `@last` or `_` — the most recently started agent in scope.
//! 2. An exact id match.
//! 3. An exact name match (a running agent wins over a terminated one
//!    sharing the same name).
//! 4. A unique id-prefix match, at least 3 characters long.
//!
//! Anything else is `NotFound`; a prefix or name matching more than one
//! candidate at the same precedence tier is `Ambiguous`.

use swarm_core::error::{Error, Result};
use swarm_core::record::AgentRecord;

use crate::document::RegistryDocument;

const MIN_PREFIX_LEN: usize = 3;

pub fn resolve<'a>(doc: &'a RegistryDocument, token: &str) -> Result<&'a AgentRecord> {
    if token == "@last" || token == "_" {
        return most_recent(doc).ok_or_else(|| Error::not_found(token));
    }

    if let Some(rec) = doc.agents.get(token) {
        return Ok(rec);
    }

    let by_name: Vec<&AgentRecord> = doc
        .agents
        .values()
        .filter(|r| r.name.as_deref() == Some(token))
        .collect();
    if !by_name.is_empty() {
        if let Some(running) = by_name.iter().find(|r| r.is_running()) {
            return Ok(running);
        }
        if by_name.len() == 1 {
            return Ok(by_name[0]);
        }
        return Err(Error::ambiguous(token, by_name.len()));
    }

    if token.len() >= MIN_PREFIX_LEN {
        let by_prefix: Vec<&AgentRecord> = doc
            .agents
            .values()
            .filter(|r| r.id.starts_with(token))
            .collect();
        match by_prefix.len() {
            0 => {}
            1 => return Ok(by_prefix[0]),
            n => return Err(Error::ambiguous(token, n)),
        }
    }

    Err(Error::not_found(token))
}

fn most_recent(doc: &RegistryDocument) -> Option<&AgentRecord> {
    doc.agents.values().max_by_key(|r| r.started_at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use swarm_core::record::{AgentStatus, PromptLabel};

    fn rec(id: &str, name: Option<&str>, status: AgentStatus) -> AgentRecord {
        let mut r = AgentRecord::new(PathBuf::from("/tmp"), PromptLabel::Inline, "sonnet");
        r.id = id.to_string();
        r.name = name.map(str::to_string);
        r.status = status;
        r
    }

    fn doc_with(records: Vec<AgentRecord>) -> RegistryDocument {
        let mut doc = RegistryDocument::default();
        for r in records {
            doc.agents.insert(r.id.clone(), r);
        }
        doc
    }

    #[test]
    fn exact_id_wins_first() {
        let doc = doc_with(vec![rec("abcdefghij", None, AgentStatus::Running)]);
        let found = resolve(&doc, "abcdefghij").unwrap();
        assert_eq!(found.id, "abcdefghij");
    }

    #[test]
    fn exact_name_prefers_running_over_terminated() {
        let doc = doc_with(vec![
            rec("aaaaaaaaaa", Some("worker"), AgentStatus::Terminated),
            rec("bbbbbbbbbb", Some("worker"), AgentStatus::Running),
        ]);
        let found = resolve(&doc, "worker").unwrap();
        assert_eq!(found.id, "bbbbbbbbbb");
    }

    #[test]
    fn duplicate_terminated_names_are_ambiguous() {
        let doc = doc_with(vec![
            rec("aaaaaaaaaa", Some("worker"), AgentStatus::Terminated),
            rec("bbbbbbbbbb", Some("worker"), AgentStatus::Terminated),
        ]);
        assert!(matches!(resolve(&doc, "worker"), Err(Error::Ambiguous { .. })));
    }

    #[test]
    fn unique_prefix_of_at_least_three_chars_resolves() {
        let doc = doc_with(vec![rec("abcdefghij", None, AgentStatus::Running)]);
        assert!(resolve(&doc, "abc").is_ok());
        assert!(resolve(&doc, "ab").is_err());
    }

    #[test]
    fn ambiguous_prefix_is_rejected() {
        let doc = doc_with(vec![
            rec("abc111aaaa", None, AgentStatus::Running),
            rec("abc222bbbb", None, AgentStatus::Running),
        ]);
        assert!(matches!(resolve(&doc, "abc"), Err(Error::Ambiguous { .. })));
    }

    #[test]
    fn at_last_resolves_to_most_recently_started() {
        let mut older = rec("aaaaaaaaaa", None, AgentStatus::Running);
        older.started_at = chrono::Utc::now() - chrono::Duration::seconds(60);
        let newer = rec("bbbbbbbbbb", None, AgentStatus::Running);
        let doc = doc_with(vec![older, newer]);
        assert_eq!(resolve(&doc, "@last").unwrap().id, "bbbbbbbbbb");
        assert_eq!(resolve(&doc, "_").unwrap().id, "bbbbbbbbbb");
    }

    #[test]
    fn unknown_token_is_not_found() {
        let doc = doc_with(vec![]);
        assert!(matches!(resolve(&doc, "nope"), Err(Error::NotFound(_))));
    }
}
