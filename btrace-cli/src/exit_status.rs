/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::os::unix::process::ExitStatusExt;

use nix::sys::signal::SigHandler;
use nix::sys::signal::SigSet;
use nix::sys::signal::SigmaskHow;
use nix::sys::signal::Signal;
use nix::sys::signal::{self};

/// Describes how the traced child finished.
///
/// Similar to `std::process::ExitStatus`, but with `raise_or_exit` so the
/// launcher can terminate exactly the way the child did.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ExitStatus {
    /// Program exited with an exit code.
    Exited(i32),
    /// Program was killed by a signal.
    Signaled(Signal),
}

impl ExitStatus {
    /// Propagate the exit status such that the current process exits in the
    /// same way that the child process exited.
    pub fn raise_or_exit(self) -> ! {
        match self {
            ExitStatus::Signaled(signal) => {
                // Prevent the current process from producing a core dump as
                // well when the signal is propagated.
                let limit = libc::rlimit {
                    rlim_cur: 0,
                    rlim_max: 0,
                };
                unsafe { libc::setrlimit(libc::RLIMIT_CORE, &limit) };

                // Raise the same signal, which may or may not be fatal.
                let _ = unsafe { signal::signal(signal, SigHandler::SigDfl) };
                let _ = signal::raise(signal);

                // Unblock the signal.
                let mut mask = SigSet::empty();
                mask.add(signal);
                let _ = signal::sigprocmask(SigmaskHow::SIG_UNBLOCK, Some(&mask), None);

                // In case the signal is not fatal:
                std::process::exit(signal as i32 + 128);
            }
            ExitStatus::Exited(code) => std::process::exit(code),
        }
    }
}

impl From<std::process::ExitStatus> for ExitStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        if let Some(sig) = status.signal() {
            ExitStatus::Signaled(Signal::try_from(sig).unwrap())
        } else {
            ExitStatus::Exited(status.code().unwrap_or(255))
        }
    }
}
