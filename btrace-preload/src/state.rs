/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Write-once global shim state, published during loader initialization.
//!
//! `dlsym` is not async-signal-safe, so the real entry points are resolved
//! eagerly from the library's init hook, before the host can reach any
//! interception. Everything here is written exactly once and read lock-free
//! afterwards, so hooks running on arbitrary host threads (or inside signal
//! handlers) need no synchronization.

use core::cell::UnsafeCell;
use core::ptr;
use std::fs;
use std::sync::OnceLock;

use libc::c_char;

use crate::diag;
use crate::strings::{cstr_bytes, parse_u64, starts_with};

const LOG_ENV_C: &[u8] = b"BTRACE_LOG\0";

/// Signature shared by `execve` and `execvpe`.
pub(crate) type ExecFn = unsafe extern "C" fn(
    *const c_char,
    *const *const c_char,
    *const *const c_char,
) -> libc::c_int;

/// Process-wide shim state.
pub(crate) struct Globals {
    pub(crate) real_execve: ExecFn,
    pub(crate) real_execvpe: ExecFn,
    /// NUL-terminated log path. Empty means tracing is disabled.
    log_path: [u8; 1024],
    log_path_len: usize,
    /// Kernel boot time in ticks; added to per-process start times to form
    /// an epoch-based identity that is stable across readers.
    pub(crate) boot_tick: u64,
}

impl Globals {
    /// The configured log path as a NUL-terminated pointer, or `None` when
    /// tracing is disabled.
    pub(crate) fn log_path(&self) -> Option<*const c_char> {
        if self.log_path_len == 0 {
            None
        } else {
            Some(self.log_path.as_ptr().cast())
        }
    }
}

static GLOBALS: OnceLock<Globals> = OnceLock::new();

pub(crate) fn globals() -> &'static Globals {
    match GLOBALS.get() {
        Some(globals) => globals,
        // The loader runs `init` before the host can call any export.
        None => diag::fatal(b"intercepted exec before initialization"),
    }
}

/// NULL, laundered through a volatile read.
///
/// glibc marks the argument parameters of the `execl` family `__nonnull`,
/// which licenses the optimizer to delete comparisons against a literal
/// NULL. Linux nevertheless accepts a NULL argv, and hosts do pass one, so
/// the checks have to survive optimization: a volatile load cannot be
/// constant-folded. The static is neither `pub` nor `#[no_mangle]`, so it
/// never reaches the cdylib's dynamic export list.
struct OpaqueNull(UnsafeCell<*const c_char>);

// SAFETY: never written after static initialization; every access is a
// volatile read of a plain pointer.
unsafe impl Sync for OpaqueNull {}

static HIDDEN_NULL: OpaqueNull = OpaqueNull(UnsafeCell::new(ptr::null()));

pub(crate) fn hidden_null<T>() -> *const T {
    unsafe { ptr::read_volatile(HIDDEN_NULL.0.get()) }.cast()
}

/// Loader init hook: runs once per process image, before `main` and before
/// any intercepted call can occur.
#[used]
#[link_section = ".init_array"]
static INIT: extern "C" fn() = init;

extern "C" fn init() {
    let real_execve = resolve_next(b"execve\0");
    let real_execvpe = resolve_next(b"execvpe\0");

    let mut log_path = [0u8; 1024];
    let mut log_path_len = 0;
    let value = unsafe { libc::getenv(LOG_ENV_C.as_ptr().cast()) };
    if !value.is_null() {
        let bytes = unsafe { cstr_bytes(value) };
        // An oversized value disables tracing; truncating it would trace
        // into some other path.
        if !bytes.is_empty() && bytes.len() < log_path.len() {
            log_path[..bytes.len()].copy_from_slice(bytes);
            log_path_len = bytes.len();
        }
    }

    let ticks_per_second = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
    if ticks_per_second < 1 {
        diag::fatal(b"sysconf(_SC_CLK_TCK) is not positive");
    }

    let boot_tick = read_boot_tick(ticks_per_second as u64);

    let _ = GLOBALS.set(Globals {
        real_execve,
        real_execvpe,
        log_path,
        log_path_len,
        boot_tick,
    });
}

fn resolve_next(name: &'static [u8]) -> ExecFn {
    let sym = unsafe { libc::dlsym(libc::RTLD_NEXT, name.as_ptr().cast()) };
    if sym.is_null() {
        diag::fatal_with(b"unresolvable next symbol ", &name[..name.len() - 1]);
    }
    unsafe { core::mem::transmute::<*mut libc::c_void, ExecFn>(sym) }
}

/// Boot time in ticks: the `btime` line of `/proc/stat` (seconds since the
/// epoch) times the tick rate. Captured once and treated as immutable.
fn read_boot_tick(ticks_per_second: u64) -> u64 {
    // Initialization runs outside the async-signal-safe regime, so plain
    // std::fs is fine, and /proc/stat has no fixed upper size (the
    // interrupt line grows with the CPU count).
    let content = match fs::read("/proc/stat") {
        Ok(content) => content,
        Err(_) => diag::fatal(b"error reading /proc/stat"),
    };
    match parse_boot_tick(&content, ticks_per_second) {
        Some(boot_tick) => boot_tick,
        None => diag::fatal(b"btime missing from /proc/stat"),
    }
}

fn parse_boot_tick(stat: &[u8], ticks_per_second: u64) -> Option<u64> {
    for line in stat.split(|&b| b == b'\n') {
        if starts_with(line, b"btime ") {
            let boot_tick = parse_u64(&line[6..]) * ticks_per_second;
            // Zero means the field was present but unusable.
            return if boot_tick > 0 { Some(boot_tick) } else { None };
        }
    }
    None
}
