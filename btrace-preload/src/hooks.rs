/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! The interception surface: the exported `exec` family entry points.
//!
//! Every export records the execution, then tail-calls the real
//! implementation resolved at load time. On success the call never returns;
//! on failure the real call's return value and `errno` propagate untouched.
//! The variadic forms marshal their argument lists into a frame-local
//! vector and delegate to the matching vector form.

use core::ffi::VaList;
use core::ptr;

use libc::{c_char, c_int};

extern "C" {
    #[link_name = "environ"]
    static mut environ_ptr: *const *const c_char;
}

use crate::diag;
use crate::record;
use crate::state::{self, hidden_null};

/// Ceiling on the argument count of the variadic forms. Rust has no alloca,
/// so the marshaling vector is a fixed frame allocation; exceeding it
/// aborts rather than falling back to the heap.
const MAX_EXEC_ARGS: usize = 256;

unsafe fn wrap_execve(
    path: *const c_char,
    argv: *const *const c_char,
    envp: *const *const c_char,
) -> c_int {
    record::log_execution(path, argv);
    (state::globals().real_execve)(path, argv, envp)
}

unsafe fn wrap_execvpe(
    file: *const c_char,
    argv: *const *const c_char,
    envp: *const *const c_char,
) -> c_int {
    record::log_execution(file, argv);
    (state::globals().real_execvpe)(file, argv, envp)
}

fn environ() -> *const *const c_char {
    unsafe { ptr::addr_of!(environ_ptr).read() }
}

/// Counts the leading argument plus the variadic arguments up to (not
/// including) the NULL sentinel, walking a copy of the list.
unsafe fn count_args(arg: *const c_char, ap: &mut VaList) -> usize {
    if arg == hidden_null() {
        return 0;
    }
    let mut count = 1;
    let mut ap_copy = ap.clone();
    while !unsafe { ap_copy.next_arg::<*const c_char>() }.is_null() {
        count += 1;
    }
    count
}

/// Marshals a variadic argument list into `argv`, NULL-terminated. Leaves
/// `ap` positioned just past the NULL sentinel so `execle` can read the
/// environment pointer that follows it. A NULL leading argument is itself
/// the sentinel; the resulting vector is then just the terminator.
unsafe fn collect_args(
    arg: *const c_char,
    ap: &mut VaList,
    argv: &mut [*const c_char; MAX_EXEC_ARGS + 1],
) {
    let count = count_args(arg, ap);
    if count > MAX_EXEC_ARGS {
        diag::fatal(b"too many arguments in a variadic exec call");
    }
    if count > 0 {
        argv[0] = arg;
        for slot in argv[1..count].iter_mut() {
            *slot = ap.next_arg::<*const c_char>();
        }
        // Consume the sentinel.
        ap.next_arg::<*const c_char>();
    }
    argv[count] = ptr::null();
}

/// `execv(3)`: vector form, explicit path, caller's environment.
#[no_mangle]
pub unsafe extern "C" fn execv(path: *const c_char, argv: *const *const c_char) -> c_int {
    wrap_execve(path, argv, environ())
}

/// `execvp(3)`: vector form, PATH search, caller's environment.
#[no_mangle]
pub unsafe extern "C" fn execvp(file: *const c_char, argv: *const *const c_char) -> c_int {
    wrap_execvpe(file, argv, environ())
}

/// `execve(2)`: vector form, explicit path and environment.
#[no_mangle]
pub unsafe extern "C" fn execve(
    path: *const c_char,
    argv: *const *const c_char,
    envp: *const *const c_char,
) -> c_int {
    wrap_execve(path, argv, envp)
}

/// `execvpe(3)`: vector form, PATH search, explicit environment.
#[no_mangle]
pub unsafe extern "C" fn execvpe(
    file: *const c_char,
    argv: *const *const c_char,
    envp: *const *const c_char,
) -> c_int {
    wrap_execvpe(file, argv, envp)
}

/// `execl(3)`: variadic form of `execv`.
#[no_mangle]
pub unsafe extern "C" fn execl(path: *const c_char, arg: *const c_char, mut ap: ...) -> c_int {
    let mut argv = [ptr::null(); MAX_EXEC_ARGS + 1];
    collect_args(arg, &mut ap, &mut argv);
    wrap_execve(path, argv.as_ptr(), environ())
}

/// `execlp(3)`: variadic form of `execvp`.
#[no_mangle]
pub unsafe extern "C" fn execlp(file: *const c_char, arg: *const c_char, mut ap: ...) -> c_int {
    let mut argv = [ptr::null(); MAX_EXEC_ARGS + 1];
    collect_args(arg, &mut ap, &mut argv);
    wrap_execvpe(file, argv.as_ptr(), environ())
}

/// `execle(3)`: variadic form of `execve`; the environment pointer sits in
/// the variadic list right after the NULL sentinel, and is read even when
/// the leading argument is NULL.
#[no_mangle]
pub unsafe extern "C" fn execle(path: *const c_char, arg: *const c_char, mut ap: ...) -> c_int {
    let mut argv = [ptr::null(); MAX_EXEC_ARGS + 1];
    collect_args(arg, &mut ap, &mut argv);
    let envp = ap.next_arg::<*const *const c_char>();
    wrap_execve(path, argv.as_ptr(), envp)
}
