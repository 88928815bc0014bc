// src/core/daemon.rs

//! Process-level plumbing: detaching from the controlling terminal and
//! the PID file that keeps a node down to one daemon.

use crate::core::errors::WardenError;
use std::fs;
use std::io;
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Forks into the background, starts a new session, moves to `/`, and
/// points stdio at the null device. `keep_stderr` leaves stderr alone
/// so a foreground-style log destination keeps working.
pub fn daemonize(keep_stderr: bool) -> Result<(), WardenError> {
    match unsafe { libc::fork() } {
        -1 => {
            return Err(WardenError::SysFailure(format!(
                "fork failed: {}",
                io::Error::last_os_error()
            )));
        }
        0 => {}
        _ => std::process::exit(0),
    }

    if unsafe { libc::setsid() } == -1 {
        return Err(WardenError::SysFailure(format!(
            "setsid failed: {}",
            io::Error::last_os_error()
        )));
    }

    std::env::set_current_dir("/")
        .map_err(|e| WardenError::SysFailure(format!("chdir to / failed: {e}")))?;

    let null = fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open("/dev/null")
        .map_err(|e| WardenError::SysFailure(format!("cannot open /dev/null: {e}")))?;
    let fd = null.as_raw_fd();
    unsafe {
        libc::dup2(fd, libc::STDIN_FILENO);
        libc::dup2(fd, libc::STDOUT_FILENO);
        if !keep_stderr {
            libc::dup2(fd, libc::STDERR_FILENO);
        }
    }
    // The descriptor now backs stdio; it must outlive this function.
    std::mem::forget(null);
    Ok(())
}

/// A claimed PID file, removed again when dropped.
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Claims `path` for this process. An existing file naming a live
    /// process refuses startup; a stale file is overwritten.
    pub fn create(path: &Path) -> Result<Self, WardenError> {
        if let Ok(existing) = fs::read_to_string(path) {
            if let Ok(pid) = existing.trim().parse::<libc::pid_t>() {
                if pid > 0 && unsafe { libc::kill(pid, 0) } == 0 {
                    return Err(WardenError::BadConfig(format!(
                        "PID file {} belongs to running process {pid}",
                        path.display()
                    )));
                }
            }
        }
        fs::write(path, format!("{}\n", std::process::id())).map_err(|e| {
            WardenError::SysFailure(format!(
                "cannot write PID file {}: {e}",
                path.display()
            ))
        })?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            debug!("could not remove PID file {}: {e}", self.path.display());
        }
    }
}
