//! PID liveness and termination primitives.
//!
//! Grounded directly on the retrieved `nexus` process registry's
//! `kill_graceful`/`pause`/`resume`: probe with `kill(pid, 0)`, signal
//! with `kill(pid, SIGTERM)` then escalate to `SIGKILL` after a grace
//! window, suspend/continue with `SIGSTOP`/`SIGCONT`.

use std::time::{Duration, Instant};

/// `true` if a process with this pid exists and is signalable by us.
/// Does not distinguish "exists but we lack permission" from "running" —
/// both mean "don't consider this pid free to reuse."
pub fn is_alive(pid: u32) -> bool {
    let ret = unsafe { libc::kill(pid as libc::pid_t, 0) };
    ret == 0 || (ret == -1 && std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM))
}

fn send(pid: u32, signal: libc::c_int) -> std::io::Result<()> {
    let ret = unsafe { libc::kill(pid as libc::pid_t, signal) };
    if ret == -1 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ESRCH) {
            // Already gone; not our problem.
            return Ok(());
        }
        return Err(err);
    }
    Ok(())
}

/// Send `SIGTERM`, then poll for up to `grace` for the process to exit;
/// if it is still alive after the grace window, send `SIGKILL`.
/// Returns `true` if the process exited within the grace window without
/// needing `SIGKILL`.
pub fn terminate_graceful(pid: u32, grace: Duration) -> std::io::Result<bool> {
    send(pid, libc::SIGTERM)?;

    let deadline = Instant::now() + grace;
    while Instant::now() < deadline {
        if !is_alive(pid) {
            return Ok(true);
        }
        std::thread::sleep(Duration::from_millis(100));
    }

    if is_alive(pid) {
        tracing::warn!(pid, "process still alive after SIGTERM grace window, escalating to SIGKILL");
        send(pid, libc::SIGKILL)?;
        Ok(false)
    } else {
        Ok(true)
    }
}

/// Send `SIGKILL` immediately, no grace window.
pub fn terminate_now(pid: u32) -> std::io::Result<()> {
    send(pid, libc::SIGKILL)
}

pub fn pause(pid: u32) -> std::io::Result<()> {
    send(pid, libc::SIGSTOP)
}

pub fn resume(pid: u32) -> std::io::Result<()> {
    send(pid, libc::SIGCONT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::{Command, Stdio};

    #[test]
    fn is_alive_reflects_real_process() {
        let mut child = Command::new("sleep")
            .arg("2")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .unwrap();
        let pid = child.id();
        assert!(is_alive(pid));
        child.kill().unwrap();
        child.wait().unwrap();
        // A reaped pid should no longer answer to signal 0.
        assert!(!is_alive(pid));
    }

    #[test]
    fn terminate_graceful_reaps_a_cooperative_process() {
        let child = Command::new("sleep")
            .arg("30")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .unwrap();
        let pid = child.id();
        let clean = terminate_graceful(pid, Duration::from_secs(2)).unwrap();
        assert!(clean);
        assert!(!is_alive(pid));
    }

    #[test]
    fn terminate_on_already_dead_pid_is_not_an_error() {
        let mut child = Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();
        assert!(terminate_graceful(pid, Duration::from_millis(50)).is_ok());
    }
}
