//! Error types shared across the swarm workspace.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("agent not found: {0}")]
    NotFound(String),

    #[error("ambiguous identifier {token}: {count} candidates")]
    Ambiguous { token: String, count: usize },

    #[error("name already in use by a running agent: {0}")]
    NameInUse(String),

    #[error("cannot remove a running agent: {0}")]
    StillRunning(String),

    #[error("registry corrupt: {0}")]
    Corrupt(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("process error: {0}")]
    Process(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn not_found(token: impl Into<String>) -> Self {
        Self::NotFound(token.into())
    }

    pub fn ambiguous(token: impl Into<String>, count: usize) -> Self {
        Self::Ambiguous {
            token: token.into(),
            count,
        }
    }
}
