/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Process start times from `/proc/<pid>/stat`.
//!
//! A pid alone is not a stable identity (pids recycle); the pair of pid and
//! start time is. The start time is field 22 of the stat line, measured in
//! ticks since boot. Parsing the line left to right is wrong: field 2 is
//! the executable name, parenthesized but otherwise unescaped, and the name
//! itself may contain `)` and spaces. Like `ps`, the parser takes the
//! *rightmost* `)` as the end of the name field.

use syscalls::Errno;

use crate::diag;
use crate::logfile::retry_eintr;
use crate::strings::{concat_into, find_byte, parse_u64, rfind_byte, Decimal};

/// Fields 1..=22 of a stat line always fit well inside this window; `ps`
/// reads the file with the same fixed bound.
const STAT_BUF_SIZE: usize = 1024;

/// Extracts the field-22 start time (ticks since boot) from the contents of
/// a stat file. `None` when the line falls structurally short of field 22.
pub(crate) fn starttime_from_stat(content: &[u8]) -> Option<u64> {
    // Everything up to the rightmost ')' is the executable name field;
    // skipping ") " lands on field 3.
    let close = rfind_byte(content, b')')?;
    let mut rest = content.get(close + 2..)?;

    // Hop the 19 separators between field 3 and field 22.
    for _ in 3..22 {
        let space = find_byte(rest, b' ')?;
        rest = &rest[space + 1..];
    }

    // The field must terminate inside the window.
    find_byte(rest, b' ')?;
    Some(parse_u64(rest))
}

/// Reads `/proc/<pid>/stat` and returns the process start time in ticks
/// since the epoch (`boot_tick` plus field 22). Identity is the tracer's
/// whole value proposition, so failure here is fatal.
pub(crate) fn start_tick(pid: u32, boot_tick: u64) -> u64 {
    let pid_text = Decimal::new(pid as u64);
    let mut path_buf = [0u8; 64];
    let path = concat_into(&mut path_buf, &[b"/proc/", pid_text.as_bytes(), b"/stat\0"]);

    let fd = match retry_eintr(|| {
        Errno::result(unsafe {
            libc::open(path.as_ptr().cast(), libc::O_RDONLY | libc::O_CLOEXEC)
        })
    }) {
        Ok(fd) => fd,
        Err(err) => diag::fatal_errno(b"error opening /proc/<pid>/stat", err),
    };

    let mut content = [0u8; STAT_BUF_SIZE];
    let amount = match retry_eintr(|| {
        Errno::result(unsafe { libc::read(fd, content.as_mut_ptr().cast(), STAT_BUF_SIZE - 1) })
    }) {
        Ok(amount) => amount as usize,
        Err(err) => diag::fatal_errno(b"error reading /proc/<pid>/stat", err),
    };
    unsafe { libc::close(fd) };

    match starttime_from_stat(&content[..amount]) {
        Some(ticks) => boot_tick + ticks,
        None => diag::fatal(b"malformed /proc/<pid>/stat"),
    }
}
