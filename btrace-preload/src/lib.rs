/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! An `LD_PRELOAD` interposer that records program-replacement calls.
//!
//! When this library is preloaded, every call to one of the `exec` family
//! functions appends a record to the log named by `BTRACE_LOG` before
//! control passes to the real implementation. The preload environment is
//! inherited across `exec`, so a single variable traces an entire process
//! tree: enough to reconstruct, after the fact, the parent/child
//! relationships and command lines of every process in a build.
//!
//! The `exec` functions are async-signal-safe. A process may legitimately
//! call them right after `fork` while another thread of the parent held the
//! heap lock, so these wrappers must be async-signal-safe too: no
//! allocation, no stdio, no dynamic symbol resolution, nothing that can
//! block on a lock the host might hold. The support modules here are
//! written under that contract. The only code exempt from it runs during
//! loader initialization, before the host can reach an intercepted entry
//! point.

#![feature(c_variadic)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![cfg(target_os = "linux")]

mod diag;
mod hooks;
mod logfile;
mod record;
mod stat;
mod state;
mod strings;

/// Environment variable naming the shared trace log. Unset, empty, or
/// longer than 1023 bytes disables tracing; the intercepted calls then
/// behave exactly like the real ones.
pub const LOG_ENV_VAR: &str = "BTRACE_LOG";
