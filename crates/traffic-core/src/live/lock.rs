//! Bounded-wait mutual exclusion over the live segments.

use crate::error::{Result, TrafficError};
use nix::errno::Errno;
use nix::fcntl::{flock, FlockArg};
use std::fs::{self, File, OpenOptions};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Exclusive lock shared by every reader and writer of the live buffer.
pub trait SegmentLock: Send + Sync + 'static {
    /// Block for at most `timeout`, failing with [`TrafficError::LockTimeout`].
    fn acquire(&self, timeout: Duration) -> Result<LockGuard>;
}

/// Releases the lock when dropped.
pub struct LockGuard {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl LockGuard {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

/// Advisory `flock` on a named file, usable across unrelated processes.
#[derive(Debug, Clone)]
pub struct FileLock {
    path: PathBuf,
}

impl FileLock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> Result<File> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&self.path)?)
    }
}

impl SegmentLock for FileLock {
    fn acquire(&self, timeout: Duration) -> Result<LockGuard> {
        let file = self.open()?;
        let deadline = Instant::now() + timeout;

        loop {
            match flock(file.as_raw_fd(), FlockArg::LockExclusiveNonblock) {
                Ok(()) => {
                    return Ok(LockGuard::new(move || {
                        if let Err(e) = flock(file.as_raw_fd(), FlockArg::Unlock) {
                            tracing::warn!(error = %e, "Failed to release live buffer lock");
                        }
                    }));
                }
                Err(e) if e == Errno::EWOULDBLOCK || e == Errno::EINTR => {}
                Err(e) => return Err(TrafficError::Io(e.into())),
            }

            if Instant::now() >= deadline {
                return Err(TrafficError::LockTimeout(timeout.as_millis() as u64));
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

/// In-process lock for embedded use and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryLock {
    state: Arc<(Mutex<bool>, Condvar)>,
}

impl MemoryLock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SegmentLock for MemoryLock {
    fn acquire(&self, timeout: Duration) -> Result<LockGuard> {
        let (held, cvar) = &*self.state;
        let guard = held.lock().unwrap_or_else(|e| e.into_inner());
        let (mut guard, result) = cvar
            .wait_timeout_while(guard, timeout, |held| *held)
            .unwrap_or_else(|e| e.into_inner());
        if result.timed_out() && *guard {
            return Err(TrafficError::LockTimeout(timeout.as_millis() as u64));
        }
        *guard = true;
        drop(guard);

        let state = Arc::clone(&self.state);
        Ok(LockGuard::new(move || {
            let (held, cvar) = &*state;
            *held.lock().unwrap_or_else(|e| e.into_inner()) = false;
            cvar.notify_one();
        }))
    }
}
