//! Structured `[swarm]` lifecycle log lines.
//!
//! Grounded directly on `agenticlaw`'s `supervisor::log` module: a
//! small hand-rolled JSON-line emitter that sits alongside `tracing`
//! rather than replacing it. `tracing` covers developer-facing
//! diagnostics (wired up by the CLI binary); this module covers the
//! stable per-agent log file wire format that other tools are expected
//! to grep/tail.

use std::io::Write;

use chrono::Utc;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct LogEvent<'a> {
    ts: String,
    level: &'a str,
    agent_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    iter: Option<u64>,
    msg: String,
}

fn emit(out: &mut impl Write, level: &str, agent_id: &str, iter: Option<u64>, msg: String) {
    let event = LogEvent {
        ts: Utc::now().to_rfc3339(),
        level,
        agent_id,
        iter,
        msg,
    };
    if let Ok(line) = serde_json::to_string(&event) {
        let _ = writeln!(out, "[swarm] {line}");
    }
}

pub fn info(out: &mut impl Write, agent_id: &str, iter: Option<u64>, msg: impl Into<String>) {
    emit(out, "info", agent_id, iter, msg.into());
}

pub fn warn(out: &mut impl Write, agent_id: &str, iter: Option<u64>, msg: impl Into<String>) {
    emit(out, "warn", agent_id, iter, msg.into());
}

pub fn error(out: &mut impl Write, agent_id: &str, iter: Option<u64>, msg: impl Into<String>) {
    emit(out, "error", agent_id, iter, msg.into());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emitted_lines_are_prefixed_and_parseable_json() {
        let mut buf = Vec::new();
        info(&mut buf, "abc123", Some(1), "starting iteration");
        let line = String::from_utf8(buf).unwrap();
        assert!(line.starts_with("[swarm] "));
        let json_part = line.trim_start_matches("[swarm] ").trim_end();
        let parsed: serde_json::Value = serde_json::from_str(json_part).unwrap();
        assert_eq!(parsed["agent_id"], "abc123");
        assert_eq!(parsed["level"], "info");
        assert_eq!(parsed["iter"], 1);
    }
}
