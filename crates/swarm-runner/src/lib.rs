//! The Agent Iteration Loop: runs inside the detached worker process,
//! invoking the backend command once per iteration, honoring
//! pause/terminate control intents and timeouts, and publishing
//! progress back to the registry.

pub mod iteration;
pub mod log;
pub mod usage;

pub use iteration::{run, IterationConfig, Outcome};
pub use usage::{ClaudeCliUsageParser, Usage, UsageParser};
