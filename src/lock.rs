//! File-based locking to prevent concurrent execution.
//!
//! Uses flock-style advisory locking so only one update runs at a time. The
//! lock file also records the holder's PID for the "already running"
//! message and for spotting leftovers of a crashed run.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::BlocksmithError;

/// A guard that holds an exclusive lock on the lock file.
/// The lock is released, and the recorded PID cleared, when the guard is
/// dropped.
#[derive(Debug)]
pub struct RunLock {
    file: File,
    path: PathBuf,
}

impl RunLock {
    /// Attempt to acquire the lock without blocking.
    ///
    /// Fails with [`BlocksmithError::AlreadyRunning`] when another process
    /// holds it.
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create lock directory {:?}", parent))?;
            }
        }

        // Open or create the lock file with read+write (not truncate)
        // This avoids a TOCTOU race between create and lock
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .with_context(|| format!("Failed to open lock file: {:?}", path))?;

        fs::set_permissions(path, fs::Permissions::from_mode(0o600))
            .context("Failed to set lock file permissions")?;

        if file.try_lock_exclusive().is_err() {
            let pid = read_pid(&mut file).unwrap_or(0);
            return Err(BlocksmithError::AlreadyRunning { pid }.into());
        }

        // The flock is ours, so whoever wrote a PID here is gone or no
        // longer holds it.
        let own_pid = std::process::id();
        if let Some(previous) = read_pid(&mut file).filter(|&p| p != own_pid) {
            if pid_is_alive(previous) {
                warn!(
                    "Lock file {:?} names PID {} which does not hold the lock; taking over",
                    path, previous
                );
            } else {
                warn!(
                    "Stale lock file {:?} from PID {} (process gone); reclaiming",
                    path, previous
                );
            }
        }

        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        write!(file, "{}", own_pid)?;
        file.sync_all()?;
        debug!("Acquired run lock {:?} (PID {})", path, own_pid);

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        // The flock itself goes away with the file descriptor
        if let Err(e) = self.file.set_len(0) {
            debug!("Failed to clear lock file {:?}: {}", self.path, e);
        }
    }
}

fn read_pid(file: &mut File) -> Option<u32> {
    let mut content = String::new();
    file.seek(SeekFrom::Start(0)).ok()?;
    file.read_to_string(&mut content).ok()?;
    content.trim().parse().ok()
}

/// Signal 0 probes for existence without delivering anything.
fn pid_is_alive(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if pid <= 0 {
        return false;
    }
    // SAFETY: kill with signal 0 performs only the permission and existence
    // checks; no signal is sent.
    let rc = unsafe { libc::kill(pid, 0) };
    rc == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}
