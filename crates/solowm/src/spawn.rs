//! Process supervision
//!
//! Launching list programs and the remote bridge, reaping children on
//! SIGCHLD, and re-executing the manager in place on restart. Children run
//! as independent processes; the only state kept here is the bridge pid so
//! teardown can stop it and the reaper can notice it died.

use std::io;
use std::os::unix::process::CommandExt;
use std::process::Command;
use std::sync::atomic::{AtomicI32, Ordering};

static BRIDGE_PID: AtomicI32 = AtomicI32::new(-1);

/// Split a configured command line into program and arguments.
pub fn split_command(command: &str) -> Option<(&str, Vec<&str>)> {
    let mut parts = command.split_whitespace();
    let program = parts.next()?;
    Some((program, parts.collect()))
}

/// Launch a program from the list. Failure is logged and otherwise ignored.
pub fn launch(command: &str) {
    let Some((program, args)) = split_command(command) else {
        tracing::warn!(command, "empty command, nothing to launch");
        return;
    };
    match Command::new(program).args(&args).spawn() {
        Ok(child) => tracing::info!(command, pid = child.id(), "launched program"),
        Err(e) => tracing::error!(command, error = %e, "failed to launch program"),
    }
}

/// Start the remote bridge, preferring the binary installed next to the
/// manager. Empty socket/mapping values mean the bridge's own defaults.
pub fn spawn_bridge(socket: &str, mapping: &str) {
    let sibling = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|d| d.join("solowm-remote")))
        .filter(|p| p.exists());
    let program = sibling.unwrap_or_else(|| "solowm-remote".into());

    let mut command = Command::new(&program);
    if !socket.is_empty() {
        command.arg("--socket").arg(socket);
    }
    if !mapping.is_empty() {
        command.arg("--mapping").arg(mapping);
    }
    match command.spawn() {
        Ok(child) => {
            BRIDGE_PID.store(child.id() as i32, Ordering::Relaxed);
            tracing::info!(program = %program.display(), pid = child.id(), "remote bridge started");
        }
        Err(e) => tracing::error!(program = %program.display(), error = %e, "failed to start remote bridge"),
    }
}

/// Pid of the running bridge, if any.
pub fn bridge_pid() -> Option<i32> {
    let pid = BRIDGE_PID.load(Ordering::Relaxed);
    (pid > 0).then_some(pid)
}

/// Stop the bridge on teardown. A no-op when it is not running.
pub fn stop_bridge() {
    if let Some(pid) = bridge_pid() {
        tracing::info!(pid, "stopping remote bridge");
        unsafe {
            libc::kill(pid, libc::SIGTERM);
        }
        BRIDGE_PID.store(-1, Ordering::Relaxed);
    }
}

// Async-signal-safe: only waitpid and atomics. Reaping a child that is not
// the bridge is a silent no-op.
extern "C" fn reap_children(_signal: libc::c_int) {
    loop {
        let pid = unsafe { libc::waitpid(-1, std::ptr::null_mut(), libc::WNOHANG) };
        if pid <= 0 {
            break;
        }
        if BRIDGE_PID.load(Ordering::Relaxed) == pid {
            BRIDGE_PID.store(-1, Ordering::Relaxed);
        }
    }
}

/// Install the SIGCHLD reaper. SA_RESTART keeps the blocking event read
/// from failing with EINTR every time a child exits.
pub fn install_sigchld_reaper() -> io::Result<()> {
    let mut action: libc::sigaction = unsafe { std::mem::zeroed() };
    action.sa_sigaction = reap_children as libc::sighandler_t;
    action.sa_flags = libc::SA_RESTART | libc::SA_NOCLDSTOP;
    let rc = unsafe { libc::sigaction(libc::SIGCHLD, &action, std::ptr::null_mut()) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Replace this process with a fresh copy of itself, preserving arguments.
/// Returns only on failure.
pub fn reexec() -> io::Error {
    let exe = match std::env::current_exe() {
        Ok(exe) => exe,
        Err(e) => return e,
    };
    Command::new(exe).args(std::env::args_os().skip(1)).exec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_command_separates_program_and_args() {
        assert_eq!(split_command("/usr/bin/xterm"), Some(("/usr/bin/xterm", vec![])));
        assert_eq!(
            split_command("xclock -digital -update 1"),
            Some(("xclock", vec!["-digital", "-update", "1"]))
        );
    }

    #[test]
    fn split_command_rejects_blank_lines() {
        assert_eq!(split_command(""), None);
        assert_eq!(split_command("   "), None);
    }

    #[test]
    fn bridge_pid_is_unset_by_default() {
        assert_eq!(bridge_pid(), None);
    }
}
