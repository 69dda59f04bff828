//! Exclusive file lock serializing blob mutations across processes.
//!
//! `flock` on Unix, `LockFileEx` on Windows. Every acquisition opens its own
//! handle, so two threads of one process exclude each other just like two
//! processes do.

use std::fs::{File, OpenOptions};
use std::path::Path;

use certinstaller_core::storage::{StorageError, StorageResult};

/// Held for as long as the lock is owned; unlocks on drop.
#[derive(Debug)]
pub struct FileLockGuard {
    file: File,
}

impl FileLockGuard {
    /// Opens or creates the lock file at `path` and blocks until the
    /// exclusive lock is granted.
    pub fn acquire(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|err| lock_error(path, &err))?;
        lock_exclusive(&file).map_err(|err| lock_error(path, &err))?;
        Ok(Self { file })
    }
}

impl Drop for FileLockGuard {
    fn drop(&mut self) {
        let _ = unlock(&self.file);
    }
}

fn lock_error(path: &Path, err: &std::io::Error) -> StorageError {
    StorageError::Lock(format!("'{}': {err}", path.display()))
}

#[cfg(unix)]
use std::os::raw::c_int;

#[cfg(unix)]
const LOCK_EX: c_int = 2;
#[cfg(unix)]
const LOCK_UN: c_int = 8;

#[cfg(unix)]
extern "C" {
    fn flock(fd: c_int, operation: c_int) -> c_int;
}

#[cfg(unix)]
fn flock_checked(file: &File, operation: c_int) -> std::io::Result<()> {
    let fd = std::os::unix::io::AsRawFd::as_raw_fd(file);
    if unsafe { flock(fd, operation) } == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(unix)]
fn lock_exclusive(file: &File) -> std::io::Result<()> {
    flock_checked(file, LOCK_EX)
}

#[cfg(unix)]
fn unlock(file: &File) -> std::io::Result<()> {
    flock_checked(file, LOCK_UN)
}

#[cfg(windows)]
type Handle = *mut std::ffi::c_void;

#[cfg(windows)]
#[repr(C)]
#[allow(dead_code)]
struct Overlapped {
    internal: usize,
    internal_high: usize,
    offset: u32,
    offset_high: u32,
    h_event: Handle,
}

#[cfg(windows)]
const LOCKFILE_EXCLUSIVE_LOCK: u32 = 0x2;

#[cfg(windows)]
extern "system" {
    fn LockFileEx(
        h_file: Handle,
        flags: u32,
        reserved: u32,
        bytes_low: u32,
        bytes_high: u32,
        overlapped: *mut Overlapped,
    ) -> i32;
    fn UnlockFileEx(
        h_file: Handle,
        reserved: u32,
        bytes_low: u32,
        bytes_high: u32,
        overlapped: *mut Overlapped,
    ) -> i32;
}

#[cfg(windows)]
fn overlapped() -> Overlapped {
    Overlapped {
        internal: 0,
        internal_high: 0,
        offset: 0,
        offset_high: 0,
        h_event: std::ptr::null_mut(),
    }
}

#[cfg(windows)]
fn lock_exclusive(file: &File) -> std::io::Result<()> {
    let handle = std::os::windows::io::AsRawHandle::as_raw_handle(file).cast();
    let mut overlapped = overlapped();
    let result =
        unsafe { LockFileEx(handle, LOCKFILE_EXCLUSIVE_LOCK, 0, 1, 0, &mut overlapped) };
    if result == 0 {
        Err(std::io::Error::last_os_error())
    } else {
        Ok(())
    }
}

#[cfg(windows)]
fn unlock(file: &File) -> std::io::Result<()> {
    let handle = std::os::windows::io::AsRawHandle::as_raw_handle(file).cast();
    let mut overlapped = overlapped();
    let result = unsafe { UnlockFileEx(handle, 0, 1, 0, &mut overlapped) };
    if result == 0 {
        Err(std::io::Error::last_os_error())
    } else {
        Ok(())
    }
}
