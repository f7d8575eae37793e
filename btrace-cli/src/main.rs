/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! `btrace`: run a command with the exec tracer preloaded.
//!
//! Resolves the shim library, points `BTRACE_LOG` at the requested log
//! path, prepends the shim to `LD_PRELOAD`, and runs the command. Both
//! variables are inherited across `exec`, so every descendant that replaces
//! its program image leaves a record.

use std::env;
use std::ffi::OsString;
use std::io;
use std::path::PathBuf;
use std::process::Command;

use anyhow::Context;
use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod exit_status;

use crate::exit_status::ExitStatus;

/// Environment variable read by the shim.
const LOG_ENV_VAR: &str = "BTRACE_LOG";

/// Library name of the shim, searched for next to this executable when
/// `--preload` is not given.
const PRELOAD_LIB: &str = "libbtrace_preload.so";

#[derive(Debug, Parser)]
#[clap(about = "Runs a command with every exec call recorded to a shared log")]
struct Args {
    /// Path of the trace log. Created if missing; records are appended.
    #[clap(long = "log", short = 'o', value_name = "PATH")]
    log: PathBuf,

    /// Path of the preload shim. Defaults to $BTRACE_PRELOAD, then to
    /// libbtrace_preload.so next to this executable.
    #[clap(long = "preload", value_name = "PATH", env = "BTRACE_PRELOAD")]
    preload: Option<PathBuf>,

    /// Sets an environment variable for the traced command. Can be used
    /// multiple times.
    #[clap(
        long = "env",
        short = 'e',
        value_name = "ENV[=VALUE]",
        value_parser = parse_env,
        num_args = 1
    )]
    envs: Vec<(String, String)>,

    /// Path of the program to trace.
    #[clap(value_name = "PROGRAM")]
    program: OsString,

    /// Arguments to the program to trace.
    #[clap(value_name = "ARGS", trailing_var_arg = true, allow_hyphen_values = true)]
    program_args: Vec<OsString>,
}

/// Parses an environment variable command-line argument.
fn parse_env(s: &str) -> anyhow::Result<(String, String)> {
    let mut iter = s.splitn(2, '=');

    let key = iter
        .next()
        .ok_or("Invalid KEY=VALUE: string is empty")
        .map(String::from)
        .map_err(anyhow::Error::msg)?;

    let value = match iter.next() {
        Some(value) => value.to_owned(),
        None => env::var(&key).map_err(anyhow::Error::msg)?,
    };

    Ok((key, value))
}

fn resolve_preload(requested: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    let path = match requested {
        Some(path) => path,
        None => {
            let exe = env::current_exe().context("cannot locate this executable")?;
            exe.with_file_name(PRELOAD_LIB)
        }
    };
    path.canonicalize()
        .with_context(|| format!("preload shim not found at {}", path.display()))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    let preload = resolve_preload(args.preload)?;

    // Traced descendants may chdir before they exec, so the log path must
    // be absolute up front.
    let log = if args.log.is_absolute() {
        args.log.clone()
    } else {
        env::current_dir()
            .context("cannot resolve the working directory")?
            .join(&args.log)
    };

    // Coexist with any preload the caller already had.
    let mut ld_preload = preload.clone().into_os_string();
    if let Some(existing) = env::var_os("LD_PRELOAD") {
        if !existing.is_empty() {
            ld_preload.push(":");
            ld_preload.push(existing);
        }
    }

    debug!(shim = %preload.display(), log = %log.display(), "running traced command");

    let status = Command::new(&args.program)
        .args(&args.program_args)
        .env(LOG_ENV_VAR, &log)
        .env("LD_PRELOAD", &ld_preload)
        .envs(args.envs.iter().map(|(k, v)| (k, v)))
        .status()
        .with_context(|| format!("failed to run {:?}", args.program))?;

    ExitStatus::from(status).raise_or_exit()
}
