/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: Apache-2.0 OR MIT
 */

//! C7: Locker — folder lock acquisition (spec.md §4.7). Five strategies
//! share one state machine: `Unlocked -> Acquiring -> Locked -> Unlocked`.
//! `Drop` always releases a held lock, even during unwinding, the way a
//! `std::fs::File` always closes its descriptor.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use fs4::FileExt;

use crate::config::LockWait;
use crate::error::{MailFolderError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Unlocked,
    Acquiring,
    Locked,
}

/// One acquired (or not-yet-acquired) lock on a folder. `path` is the
/// folder file (mbox) or directory (MH/Maildir) being protected; each
/// strategy derives its own sidecar name from it.
pub struct Locker {
    path: PathBuf,
    timeout: Duration,
    strategy: Box<dyn LockStrategy>,
    state: LockState,
    /// True for `LockType::None`: the strategy always "acquires", but per
    /// spec.md §4.7 "none: no-op; `is_locked` is always false" it must never
    /// report as actually holding the folder.
    noop: bool,
}

impl Locker {
    pub fn new(path: impl Into<PathBuf>, lock_type: crate::config::LockType, timeout_secs: u64) -> Self {
        let path = path.into();
        let strategy: Box<dyn LockStrategy> = match lock_type {
            crate::config::LockType::Dotlock => Box::new(Dotlock::new(&path, timeout_secs)),
            crate::config::LockType::Flock => Box::new(Flock::new(&path)),
            crate::config::LockType::Nfs => Box::new(Nfs::new(&path)),
            crate::config::LockType::Multi => {
                Box::new(Multi::new(vec![Box::new(Dotlock::new(&path, timeout_secs)), Box::new(Flock::new(&path))]))
            }
            crate::config::LockType::None => Box::new(NoLock),
        };
        Locker {
            path,
            timeout: Duration::from_secs(timeout_secs),
            strategy,
            state: LockState::Unlocked,
            noop: matches!(lock_type, crate::config::LockType::None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_locked(&self) -> bool {
        !self.noop && matches!(self.state, LockState::Locked)
    }

    pub fn has_lock(&self) -> bool {
        self.is_locked() && self.strategy.is_ours()
    }

    /// Attempts to acquire the lock, retrying until `wait` elapses.
    /// Returns `Ok(true)` on acquisition, `Ok(false)` on timeout.
    pub fn lock(&mut self, wait: LockWait) -> Result<bool> {
        if self.is_locked() {
            return Ok(true);
        }
        self.state = LockState::Acquiring;

        let deadline = match wait {
            LockWait::Seconds(s) => Some(Instant::now() + Duration::from_secs(s)),
            LockWait::NoTimeout => None,
        };

        loop {
            match self.strategy.try_acquire(self.timeout) {
                Ok(true) => {
                    self.state = LockState::Locked;
                    return Ok(true);
                }
                Ok(false) => {
                    if let Some(deadline) = deadline {
                        if Instant::now() >= deadline {
                            self.state = LockState::Unlocked;
                            return Ok(false);
                        }
                    }
                    std::thread::sleep(Duration::from_secs(1));
                }
                Err(e) => {
                    self.state = LockState::Unlocked;
                    return Err(e);
                }
            }
        }
    }

    pub fn unlock(&mut self) {
        if !matches!(self.state, LockState::Unlocked) {
            self.strategy.release();
            self.state = LockState::Unlocked;
        }
    }
}

impl Drop for Locker {
    fn drop(&mut self) {
        self.unlock();
    }
}

trait LockStrategy: Send {
    /// One attempt; `Ok(false)` means "still held by someone else, try
    /// again later", not an error.
    fn try_acquire(&mut self, timeout: Duration) -> Result<bool>;
    fn release(&mut self);
    fn is_ours(&self) -> bool;
}

struct Dotlock {
    lockfile: PathBuf,
    held: bool,
}

impl Dotlock {
    fn new(path: &Path, _timeout_secs: u64) -> Self {
        let lockfile = dotlock_path(path);
        Dotlock { lockfile, held: false }
    }
}

fn dotlock_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

impl LockStrategy for Dotlock {
    fn try_acquire(&mut self, timeout: Duration) -> Result<bool> {
        match OpenOptions::new().write(true).create_new(true).open(&self.lockfile) {
            Ok(_) => {
                self.held = true;
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                if let Ok(Ok(modified)) = fs::metadata(&self.lockfile).map(|m| m.modified()) {
                    if let Ok(age) = SystemTime::now().duration_since(modified) {
                        if age > timeout {
                            let _ = fs::remove_file(&self.lockfile);
                        }
                    }
                }
                Ok(false)
            }
            Err(e) => Err(MailFolderError::io("create dotlock", &self.lockfile, e)),
        }
    }

    fn release(&mut self) {
        if self.held {
            let _ = fs::remove_file(&self.lockfile);
            self.held = false;
        }
    }

    fn is_ours(&self) -> bool {
        self.held
    }
}

struct Flock {
    path: PathBuf,
    file: Option<File>,
}

impl Flock {
    fn new(path: &Path) -> Self {
        Flock { path: path.to_owned(), file: None }
    }
}

impl LockStrategy for Flock {
    fn try_acquire(&mut self, _timeout: Duration) -> Result<bool> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&self.path)
            .map_err(|e| MailFolderError::io("open for flock", &self.path, e))?;
        match file.try_lock_exclusive() {
            Ok(()) => {
                self.file = Some(file);
                Ok(true)
            }
            Err(fs4::lock_contended_error()) => Ok(false),
            Err(e) => Err(MailFolderError::io("flock", &self.path, e)),
        }
    }

    fn release(&mut self) {
        if let Some(file) = self.file.take() {
            let _ = FileExt::unlock(&file);
        }
    }

    fn is_ours(&self) -> bool {
        self.file.is_some()
    }
}

struct Nfs {
    canonical: PathBuf,
    unique: PathBuf,
    held: bool,
}

impl Nfs {
    fn new(path: &Path) -> Self {
        let canonical = dotlock_path(path);
        let host = gethostname::gethostname();
        let mut name = path.as_os_str().to_owned();
        name.push(format!(".lock.{}.{}", host.to_string_lossy(), std::process::id()));
        Nfs {
            canonical,
            unique: PathBuf::from(name),
            held: false,
        }
    }
}

impl LockStrategy for Nfs {
    fn try_acquire(&mut self, _timeout: Duration) -> Result<bool> {
        fs::write(&self.unique, b"")
            .map_err(|e| MailFolderError::io("create nfs unique file", &self.unique, e))?;

        let linked = fs::hard_link(&self.unique, &self.canonical);
        let acquired = match linked {
            Ok(()) => fs::metadata(&self.unique).map(|m| m.nlink() == 2).unwrap_or(false),
            Err(_) => false,
        };

        if acquired {
            self.held = true;
            Ok(true)
        } else {
            let _ = fs::remove_file(&self.unique);
            Ok(false)
        }
    }

    fn release(&mut self) {
        if self.held {
            let _ = fs::remove_file(&self.canonical);
            let _ = fs::remove_file(&self.unique);
            self.held = false;
        }
    }

    fn is_ours(&self) -> bool {
        self.held
    }
}

#[cfg(unix)]
trait NlinkExt {
    fn nlink(&self) -> u64;
}

#[cfg(unix)]
impl NlinkExt for fs::Metadata {
    fn nlink(&self) -> u64 {
        std::os::unix::fs::MetadataExt::nlink(self)
    }
}

struct Multi {
    strategies: Vec<Box<dyn LockStrategy>>,
    acquired: usize,
}

impl Multi {
    fn new(strategies: Vec<Box<dyn LockStrategy>>) -> Self {
        Multi { strategies, acquired: 0 }
    }
}

impl LockStrategy for Multi {
    fn try_acquire(&mut self, timeout: Duration) -> Result<bool> {
        while self.acquired < self.strategies.len() {
            match self.strategies[self.acquired].try_acquire(timeout)? {
                true => self.acquired += 1,
                false => {
                    for s in self.strategies[..self.acquired].iter_mut().rev() {
                        s.release();
                    }
                    self.acquired = 0;
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    fn release(&mut self) {
        for s in self.strategies[..self.acquired].iter_mut().rev() {
            s.release();
        }
        self.acquired = 0;
    }

    fn is_ours(&self) -> bool {
        self.acquired == self.strategies.len() && !self.strategies.is_empty()
    }
}

struct NoLock;

impl LockStrategy for NoLock {
    fn try_acquire(&mut self, _timeout: Duration) -> Result<bool> {
        Ok(true)
    }

    fn release(&mut self) {}

    fn is_ours(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LockType;

    #[test]
    fn dotlock_acquire_and_release() {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("mbox");
        fs::write(&folder, b"").unwrap();

        let mut locker = Locker::new(&folder, LockType::Dotlock, 3600);
        assert!(locker.lock(LockWait::Seconds(1)).unwrap());
        assert!(locker.has_lock());
        assert!(dotlock_path(&folder).exists());

        locker.unlock();
        assert!(!locker.has_lock());
        assert!(!dotlock_path(&folder).exists());
    }

    #[test]
    fn none_strategy_never_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("maildir");
        let mut locker = Locker::new(&folder, LockType::None, 3600);
        assert!(locker.lock(LockWait::Seconds(1)).unwrap());
        assert!(!locker.has_lock());
        assert!(!locker.is_locked());
    }
}
