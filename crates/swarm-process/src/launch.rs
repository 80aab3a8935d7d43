//! Detached-child launcher.
//!
//! Spawns the backend command (or a re-entrant invocation of the `swarm`
//! binary itself, for iteration-loop workers) as a new session leader so
//! it survives the launching process's exit, with stdout/stderr
//! redirected to an append-mode log file and stdin from `/dev/null`.
//!
//! Grounded on the detach/redirect pattern in the retrieved
//! `nexus` process registry (`Command` + `#[cfg(unix)]` pre-exec setsid)
//! and on the `SpawnTool` artifact-writing convention used elsewhere for
//! child process output capture.

use std::fs::{File, OpenOptions};
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use swarm_core::error::{Error, Result};

/// Parameters for launching one detached agent iteration-loop process.
pub struct LaunchSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    pub log_file: PathBuf,
    pub env: Vec<(String, String)>,
}

/// The outcome of a successful detach: the child's OS pid. The `Child`
/// handle itself is intentionally dropped — on Unix, dropping it does
/// not signal or wait on the process, and since it is now its own
/// session leader it survives our exit and is reparented to init on
/// reap, exactly as a daemonized worker should behave.
pub fn spawn_detached(spec: &LaunchSpec) -> Result<u32> {
    let log = open_append(&spec.log_file)?;
    let log_err = log
        .try_clone()
        .map_err(|e| Error::Process(format!("cloning log fd: {e}")))?;
    let devnull = File::open("/dev/null")
        .map_err(|e| Error::Process(format!("opening /dev/null: {e}")))?;

    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .current_dir(&spec.working_dir)
        .stdin(Stdio::from(devnull))
        .stdout(Stdio::from(log))
        .stderr(Stdio::from(log_err));

    for (key, value) in &spec.env {
        cmd.env(key, value);
    }

    // SAFETY: setsid(2) is async-signal-safe and takes no arguments; it
    // detaches the child from our controlling terminal and process
    // group so it is not killed when our session ends.
    unsafe {
        cmd.pre_exec(|| {
            if libc::setsid() == -1 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }

    let child = cmd
        .spawn()
        .map_err(|e| Error::Process(format!("spawning {}: {e}", spec.program.display())))?;
    let pid = child.id();
    tracing::info!(pid, log_file = %spec.log_file.display(), "detached child spawned");
    Ok(pid)
}

fn open_append(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| Error::Process(format!("opening log file {}: {e}", path.display())))
}
