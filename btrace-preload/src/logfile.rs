/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! One append session against the shared trace log.
//!
//! A session covers exactly one record: open with append semantics, take
//! the whole-file advisory write lock, stage bytes through a fixed buffer,
//! then flush, unlock, and close on drop. Concurrent traced processes
//! serialize on the lock, so complete records never interleave in the log.

use core::mem;

use libc::c_char;
use syscalls::Errno;

use crate::diag;

/// Retries `f` until it completes with something other than `EINTR`. The
/// host may have arbitrary signal dispositions; interruption is never
/// surfaced to it.
pub(crate) fn retry_eintr<T, F>(mut f: F) -> Result<T, Errno>
where
    F: FnMut() -> Result<T, Errno>,
{
    loop {
        match f() {
            Err(err) if err == Errno::EINTR => continue,
            result => return result,
        }
    }
}

const BUF_SIZE: usize = 1024;

/// An open, locked trace-log session.
pub(crate) struct LogFile {
    fd: libc::c_int,
    buf: [u8; BUF_SIZE],
    len: usize,
}

impl LogFile {
    /// Opens `path` for append and takes the whole-file write lock,
    /// blocking until it is granted. Failure to open or lock is fatal.
    pub(crate) fn open(path: *const c_char) -> LogFile {
        let fd = match retry_eintr(|| {
            Errno::result(unsafe {
                libc::open(
                    path,
                    libc::O_WRONLY | libc::O_APPEND | libc::O_CREAT | libc::O_CLOEXEC,
                    0o644 as libc::mode_t,
                )
            })
        }) {
            Ok(fd) => fd,
            Err(err) => diag::fatal_errno(b"error opening trace log for append", err),
        };

        let mut lock: libc::flock = unsafe { mem::zeroed() };
        lock.l_type = libc::F_WRLCK as libc::c_short;
        lock.l_whence = libc::SEEK_SET as libc::c_short;
        // l_start == 0 with l_len == 0 covers the whole file.
        if let Err(err) = retry_eintr(|| {
            Errno::result(unsafe { libc::fcntl(fd, libc::F_SETLKW, &lock as *const libc::flock) })
        }) {
            diag::fatal_errno(b"error locking trace log", err);
        }

        LogFile {
            fd,
            buf: [0; BUF_SIZE],
            len: 0,
        }
    }

    /// Appends one byte to the staging buffer, flushing first if full.
    pub(crate) fn write_char(&mut self, ch: u8) {
        if self.len == BUF_SIZE {
            self.flush();
        }
        self.buf[self.len] = ch;
        self.len += 1;
    }

    /// Appends a byte string.
    pub(crate) fn write_str(&mut self, text: &[u8]) {
        for &ch in text {
            self.write_char(ch);
        }
    }

    /// Writes the staged bytes in a single system call. A short write is
    /// fatal: a partial record under the session lock is exactly the
    /// corruption the lock exists to rule out.
    pub(crate) fn flush(&mut self) {
        if self.len == 0 {
            return;
        }
        match retry_eintr(|| {
            Errno::result(unsafe { libc::write(self.fd, self.buf.as_ptr().cast(), self.len) })
        }) {
            Ok(amount) if amount as usize == self.len => self.len = 0,
            Ok(_) => diag::fatal(b"short write to trace log"),
            Err(err) => diag::fatal_errno(b"error writing to trace log", err),
        }
    }
}

impl Drop for LogFile {
    fn drop(&mut self) {
        self.flush();
        let mut lock: libc::flock = unsafe { mem::zeroed() };
        lock.l_type = libc::F_UNLCK as libc::c_short;
        lock.l_whence = libc::SEEK_SET as libc::c_short;
        if let Err(err) =
            Errno::result(unsafe { libc::fcntl(self.fd, libc::F_SETLK, &lock as *const libc::flock) })
        {
            diag::fatal_errno(b"error unlocking trace log", err);
        }
        unsafe { libc::close(self.fd) };
    }
}
