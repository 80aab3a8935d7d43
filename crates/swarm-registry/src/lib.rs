//! The Agent Registry: file-backed store of `AgentRecord`s, identifier
//! resolution, and the concurrency-safe read-modify-write operations
//! the rest of the workspace builds on.

pub mod document;
pub mod registry;
pub mod resolve;
pub mod store;

pub use document::RegistryDocument;
pub use registry::{ProgressUpdate, Registry};
