/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Composition of one execution record.
//!
//! Each record is a series of lines, written atomically under the session
//! lock, in this order:
//!
//! ```text
//! exec
//! <parent pid>
//! <parent start tick since the epoch>
//! <self pid>
//! <self start tick since the epoch>
//! <working directory>
//! <exec filename>
//! <arg0> <arg1> ... <argN-1>
//! <blank line>
//! ```
//!
//! The working directory, filename, and arguments are quoted when they
//! contain a space or newline, and `\` and `"` are always backslash-escaped,
//! so a reader can split records on blank lines and fields on spaces.

use libc::c_char;
use syscalls::Errno;

use crate::diag;
use crate::logfile::{retry_eintr, LogFile};
use crate::stat;
use crate::state::{self, hidden_null};
use crate::strings::{cstr_bytes, find_byte, Decimal};

/// Writes `value`, quoted and escaped per the record grammar.
fn write_escaped(log: &mut LogFile, value: &[u8]) {
    let needs_quotes = find_byte(value, b' ').is_some() || find_byte(value, b'\n').is_some();
    if needs_quotes {
        log.write_char(b'"');
    }
    for &ch in value {
        if ch == b'\\' || ch == b'"' {
            log.write_char(b'\\');
        }
        log.write_char(ch);
    }
    if needs_quotes {
        log.write_char(b'"');
    }
}

/// Two lines of identity for `pid`: the pid, then its start tick since the
/// epoch.
fn write_identity(log: &mut LogFile, pid: u32) {
    log.write_str(Decimal::new(pid as u64).as_bytes());
    log.write_char(b'\n');
    let tick = stat::start_tick(pid, state::globals().boot_tick);
    log.write_str(Decimal::new(tick).as_bytes());
    log.write_char(b'\n');
}

/// One readlink attempt with an `N`-byte frame buffer. False when the
/// target did not fit strictly within the buffer.
fn write_link_attempt<const N: usize>(log: &mut LogFile, path: *const c_char) -> bool {
    let mut buf = [0u8; N];
    let amount = match retry_eintr(|| {
        Errno::result(unsafe { libc::readlink(path, buf.as_mut_ptr().cast(), N) })
    }) {
        Ok(amount) => amount as usize,
        Err(err) => diag::fatal_errno(b"error reading /proc/self/cwd", err),
    };
    if amount < N {
        write_escaped(log, &buf[..amount]);
        log.write_char(b'\n');
        true
    } else {
        false
    }
}

/// Writes the target of the symlink at `path` as one line, doubling the
/// frame buffer from 256 bytes until the target fits strictly within it.
/// A target that still does not fit in 1 MiB is fatal.
fn write_link_target(log: &mut LogFile, path: *const c_char) {
    macro_rules! attempt {
        ($($n:expr),+ $(,)?) => {
            $(
                if write_link_attempt::<{ $n }>(log, path) {
                    return;
                }
            )+
        };
    }
    attempt!(
        256, 512, 1024, 2048, 4096, 8192, 16384, 32768, 65536, 131072, 262144, 524288, 1048576,
    );
    diag::fatal(b"symlink target exceeds 1 MiB");
}

/// Appends one record describing `exec(filename, argv)` by this process.
/// No-op when tracing is disabled.
///
/// # Safety
///
/// `filename` must be a NUL-terminated string; `argv` must be NULL or a
/// NULL-terminated vector of NUL-terminated strings.
pub(crate) unsafe fn log_execution(filename: *const c_char, argv: *const *const c_char) {
    let globals = state::globals();
    let path = match globals.log_path() {
        Some(path) => path,
        None => return,
    };

    let mut log = LogFile::open(path);

    log.write_str(b"exec\n");
    write_identity(&mut log, libc::getppid() as u32);
    write_identity(&mut log, libc::getpid() as u32);
    write_link_target(&mut log, b"/proc/self/cwd\0".as_ptr().cast());
    write_escaped(&mut log, cstr_bytes(filename));
    log.write_char(b'\n');

    // argv may legitimately be NULL on Linux; see state::hidden_null for
    // why the comparison is not against a literal.
    if argv != hidden_null() {
        let mut i = 0;
        while *argv.add(i) != hidden_null() {
            if i > 0 {
                log.write_char(b' ');
            }
            write_escaped(&mut log, cstr_bytes(*argv.add(i)));
            i += 1;
        }
    }
    log.write_char(b'\n');

    // Record terminator.
    log.write_char(b'\n');
}
