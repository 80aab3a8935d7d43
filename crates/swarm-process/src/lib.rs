//! Process primitives: detached launching and signal-based lifecycle
//! control. Unix-only.

pub mod launch;
pub mod signal;

pub use launch::{spawn_detached, LaunchSpec};
pub use signal::{is_alive, pause, resume, terminate_graceful, terminate_now};
