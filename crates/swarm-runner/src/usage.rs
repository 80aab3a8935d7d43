//! Parsing token/cost usage out of a backend command's output, so the
//! iteration loop can accumulate `input_tokens`/`output_tokens`/
//! `total_cost` on the agent's record without the backend needing any
//! bespoke integration.
//!
//! The backend's actual output shape is an external, versioned
//! contract we don't control — so this is a trait, not a hardcoded
//! parser, the same separation drawn elsewhere between `ToolCall`
//! parsing and the transport that carries it.

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost: f64,
}

pub trait UsageParser: Send + Sync {
    /// Extract usage from one iteration's combined stdout. Returns
    /// `Usage::default()` (not an error) when no usage line is found —
    /// a backend that doesn't report usage is a degraded-but-valid
    /// state, not a failure.
    fn parse(&self, output: &str) -> Usage;
}

/// Parses the JSON usage summary line the `claude` CLI's `--output
/// json`/verbose mode emits, of the shape:
/// `{"usage":{"input_tokens":N,"output_tokens":N},"total_cost_usd":F}`
/// one such line appearing anywhere in the iteration's output. Later
/// matching lines win, so a final summary line overrides any
/// intermediate ones.
pub struct ClaudeCliUsageParser;

impl UsageParser for ClaudeCliUsageParser {
    fn parse(&self, output: &str) -> Usage {
        let mut usage = Usage::default();
        for line in output.lines() {
            let trimmed = line.trim();
            if !trimmed.starts_with('{') {
                continue;
            }
            let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) else {
                continue;
            };
            let Some(obj) = value.get("usage") else {
                continue;
            };
            usage.input_tokens = obj
                .get("input_tokens")
                .and_then(|v| v.as_u64())
                .unwrap_or(usage.input_tokens);
            usage.output_tokens = obj
                .get("output_tokens")
                .and_then(|v| v.as_u64())
                .unwrap_or(usage.output_tokens);
            if let Some(cost) = value.get("total_cost_usd").and_then(|v| v.as_f64()) {
                usage.cost = cost;
            }
        }
        usage
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_usage_line_yields_default() {
        let parser = ClaudeCliUsageParser;
        let usage = parser.parse("hello\nworld\n");
        assert_eq!(usage, Usage::default());
    }

    #[test]
    fn extracts_usage_from_a_json_line() {
        let parser = ClaudeCliUsageParser;
        let output = "some preamble\n{\"usage\":{\"input_tokens\":120,\"output_tokens\":45},\"total_cost_usd\":0.02}\ntrailing\n";
        let usage = parser.parse(output);
        assert_eq!(usage.input_tokens, 120);
        assert_eq!(usage.output_tokens, 45);
        assert!((usage.cost - 0.02).abs() < f64::EPSILON);
    }

    #[test]
    fn later_usage_line_overrides_earlier_one() {
        let parser = ClaudeCliUsageParser;
        let output = "{\"usage\":{\"input_tokens\":10,\"output_tokens\":5}}\n{\"usage\":{\"input_tokens\":30,\"output_tokens\":15},\"total_cost_usd\":0.5}\n";
        let usage = parser.parse(output);
        assert_eq!(usage.input_tokens, 30);
        assert_eq!(usage.output_tokens, 15);
    }

    #[test]
    fn non_json_lines_are_ignored_without_panicking() {
        let parser = ClaudeCliUsageParser;
        let usage = parser.parse("{not json\n{{{\n");
        assert_eq!(usage, Usage::default());
    }
}
