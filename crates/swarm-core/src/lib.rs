//! Shared types, errors, and configuration for the `swarm` workspace.

pub mod config;
pub mod env;
pub mod error;
pub mod id;
pub mod record;

pub use config::Config;
pub use error::{Error, Result};
pub use record::{
    AgentRecord, AgentStatus, ExitReason, PauseState, PromptLabel, TerminateMode, TimeoutReason,
};
