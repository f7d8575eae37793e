/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Test stub that performs exactly one `exec` family call.
//!
//! Usage: `exec-stub <variant> <path|file> [ARGS]...`
//!
//! The integration tests spawn this binary with the shim preloaded and
//! assert on the record it leaves behind. The variadic variants accept at
//! most three arguments because each arity is a distinct call site. When
//! the exec call returns (i.e. fails), the return value and errno go to
//! stdout and the process exits with status 46, so a test can compare the
//! interposed and un-interposed behavior byte for byte.

use std::env;
use std::ffi::CString;
use std::io::Error;
use std::process;
use std::ptr;

use libc::{c_char, c_int};

extern "C" {
    #[link_name = "environ"]
    static mut environ_ptr: *const *const c_char;
}

fn usage() -> ! {
    eprintln!("usage: exec-stub <variant> <path|file> [ARGS]...");
    process::exit(2);
}

fn cstring(s: &str) -> CString {
    CString::new(s).expect("argument contains a NUL byte")
}

fn environ() -> *const *const c_char {
    unsafe { ptr::addr_of!(environ_ptr).read() }
}

unsafe fn execl_n(path: &CString, args: &[CString]) -> c_int {
    let null = ptr::null::<c_char>();
    match args {
        [] => libc::execl(path.as_ptr(), null),
        [a0] => libc::execl(path.as_ptr(), a0.as_ptr(), null),
        [a0, a1] => libc::execl(path.as_ptr(), a0.as_ptr(), a1.as_ptr(), null),
        [a0, a1, a2] => libc::execl(path.as_ptr(), a0.as_ptr(), a1.as_ptr(), a2.as_ptr(), null),
        _ => usage(),
    }
}

unsafe fn execlp_n(file: &CString, args: &[CString]) -> c_int {
    let null = ptr::null::<c_char>();
    match args {
        [] => libc::execlp(file.as_ptr(), null),
        [a0] => libc::execlp(file.as_ptr(), a0.as_ptr(), null),
        [a0, a1] => libc::execlp(file.as_ptr(), a0.as_ptr(), a1.as_ptr(), null),
        [a0, a1, a2] => libc::execlp(file.as_ptr(), a0.as_ptr(), a1.as_ptr(), a2.as_ptr(), null),
        _ => usage(),
    }
}

unsafe fn execle_n(path: &CString, args: &[CString], envp: *const *const c_char) -> c_int {
    let null = ptr::null::<c_char>();
    match args {
        // A NULL leading argument: the environment pointer still follows.
        [] => libc::execle(path.as_ptr(), null, envp),
        [a0] => libc::execle(path.as_ptr(), a0.as_ptr(), null, envp),
        [a0, a1] => libc::execle(path.as_ptr(), a0.as_ptr(), a1.as_ptr(), null, envp),
        _ => usage(),
    }
}

fn main() {
    let args: Vec<String> = env::args().skip(1).collect();
    if args.len() < 2 {
        usage();
    }
    let variant = args[0].as_str();
    let target = cstring(&args[1]);
    let rest: Vec<CString> = args[2..].iter().map(|a| cstring(a)).collect();

    let mut argv: Vec<*const c_char> = rest.iter().map(|a| a.as_ptr()).collect();
    argv.push(ptr::null());

    // Environment handed to the execle variant; the exec'd program can
    // prove it arrived by printing it.
    let marker = cstring("STUB_MARKER=execle");
    let envp: [*const c_char; 2] = [marker.as_ptr(), ptr::null()];

    let ret = unsafe {
        match variant {
            "execv" => libc::execv(target.as_ptr(), argv.as_ptr()),
            "execvp" => libc::execvp(target.as_ptr(), argv.as_ptr()),
            "execve" => libc::execve(target.as_ptr(), argv.as_ptr(), environ()),
            "execvpe" => libc::execvpe(target.as_ptr(), argv.as_ptr(), environ()),
            "execl" => execl_n(&target, &rest),
            "execlp" => execlp_n(&target, &rest),
            "execle" => execle_n(&target, &rest, envp.as_ptr()),
            _ => usage(),
        }
    };

    // Only reachable when the exec call failed.
    let errno = Error::last_os_error().raw_os_error().unwrap_or(0);
    println!("ret={ret} errno={errno}");
    process::exit(46);
}
