/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Fatal-error reporting for the intercepted path.
//!
//! Producing a corrupt or partial trace record would silently poison the
//! log for every consumer, so unexpected state stops the host process
//! instead. The message is assembled from byte fragments in a frame buffer
//! and written to stderr in one system call before the abort.

use syscalls::Errno;

use crate::strings::{concat_into, concat_len, Decimal};

const PREFIX: &[u8] = b"libbtrace_preload.so: ";

fn emit(parts: &[&[u8]]) {
    let mut buf = [0u8; 1024];
    debug_assert!(concat_len(parts) <= buf.len());
    let msg = concat_into(&mut buf, parts);
    unsafe {
        libc::write(libc::STDERR_FILENO, msg.as_ptr().cast(), msg.len());
    }
}

/// Writes one diagnostic line to stderr and aborts the host process.
pub(crate) fn fatal(message: &[u8]) -> ! {
    emit(&[PREFIX, message, b"\n"]);
    unsafe { libc::abort() }
}

/// Like [`fatal`], with the failing errno appended in decimal.
pub(crate) fn fatal_errno(message: &[u8], errno: Errno) -> ! {
    let code = Decimal::new(errno.into_raw() as u64);
    emit(&[PREFIX, message, b": errno ", code.as_bytes(), b"\n"]);
    unsafe { libc::abort() }
}

/// Like [`fatal`], with one interpolated fragment (a path or symbol name).
pub(crate) fn fatal_with(message: &[u8], what: &[u8]) -> ! {
    emit(&[PREFIX, message, what, b"\n"]);
    unsafe { libc::abort() }
}
