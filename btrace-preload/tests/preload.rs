/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! End-to-end tests: spawn real processes with the shim preloaded and
//! check the records they leave in the trace log.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use btrace_preload::LOG_ENV_VAR;

/// Build artifacts live one directory above the test executable
/// (`target/<profile>/deps/this-test` vs `target/<profile>/`).
fn target_dir() -> PathBuf {
    let mut dir = env::current_exe().unwrap();
    dir.pop();
    if dir.ends_with("deps") {
        dir.pop();
    }
    dir
}

fn shim_path() -> PathBuf {
    let path = target_dir().join("libbtrace_preload.so");
    assert!(path.exists(), "shim not built at {}", path.display());
    path
}

fn stub_path() -> PathBuf {
    let path = target_dir().join("exec-stub");
    assert!(path.exists(), "stub not built at {}", path.display());
    path
}

/// A target binary that tolerates an empty argument vector; coreutils
/// aborts on a NULL argv[0].
fn showenv_path() -> PathBuf {
    let path = target_dir().join("showenv");
    assert!(path.exists(), "showenv not built at {}", path.display());
    path
}

struct TraceLog {
    _dir: tempfile::TempDir,
    path: PathBuf,
}

fn trace_log() -> TraceLog {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("t.log");
    TraceLog { _dir: dir, path }
}

/// A stub invocation with the shim preloaded. `log` of `None` leaves
/// `BTRACE_LOG` unset.
fn stub_cmd(log: Option<&Path>, args: &[&str]) -> Command {
    let mut cmd = Command::new(stub_path());
    cmd.args(args);
    cmd.env("LD_PRELOAD", shim_path());
    match log {
        Some(path) => {
            cmd.env(LOG_ENV_VAR, path);
        }
        None => {
            cmd.env_remove(LOG_ENV_VAR);
        }
    }
    cmd
}

/// Splits the log into records (line vectors). Assumes no test argument
/// contains a blank-line sequence; embedded-newline quoting is covered by
/// the unit tests.
fn records(log: &Path) -> Vec<Vec<String>> {
    let content = fs::read_to_string(log).unwrap();
    content
        .split_terminator("\n\n")
        .map(|block| block.split('\n').map(str::to_owned).collect())
        .collect()
}

fn assert_record_shape(record: &[String]) {
    assert_eq!(record.len(), 8, "bad record: {record:?}");
    assert_eq!(record[0], "exec");
    for line in &record[1..5] {
        line.parse::<u64>()
            .unwrap_or_else(|_| panic!("non-decimal identity line: {line:?}"));
    }
}

/// This process's start tick since the epoch, derived independently of the
/// shim: field 22 of /proc/self/stat plus btime ticks.
fn own_start_tick() -> u64 {
    let stat = fs::read_to_string("/proc/self/stat").unwrap();
    let close = stat.rfind(')').unwrap();
    let starttime: u64 = stat[close + 2..]
        .split(' ')
        .nth(19)
        .unwrap()
        .parse()
        .unwrap();
    let btime: u64 = fs::read_to_string("/proc/stat")
        .unwrap()
        .lines()
        .find_map(|line| line.strip_prefix("btime "))
        .unwrap()
        .trim()
        .parse()
        .unwrap();
    let ticks_per_second = unsafe { libc::sysconf(libc::_SC_CLK_TCK) } as u64;
    btime * ticks_per_second + starttime
}

#[test]
fn execve_produces_one_well_formed_record() {
    let log = trace_log();
    let cwd = log._dir.path().canonicalize().unwrap();

    let mut child = stub_cmd(Some(&log.path), &["execve", "/bin/echo", "echo", "hello"])
        .current_dir(&cwd)
        .stdout(std::process::Stdio::piped())
        .spawn()
        .unwrap();
    let child_pid = child.id();
    let output = child.wait_with_output().unwrap();
    assert!(output.status.success());
    assert_eq!(output.stdout, b"hello\n");

    let records = records(&log.path);
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_record_shape(record);

    // Parent identity is this test process.
    assert_eq!(record[1], std::process::id().to_string());
    assert_eq!(record[2], own_start_tick().to_string());
    // Self identity is the stub; exec preserves the pid.
    assert_eq!(record[3], child_pid.to_string());
    assert_eq!(record[5], cwd.to_str().unwrap());
    assert_eq!(record[6], "/bin/echo");
    assert_eq!(record[7], "echo hello");
}

#[test]
fn arguments_are_quoted_and_escaped() {
    let log = trace_log();
    let status = stub_cmd(
        Some(&log.path),
        &["execve", "/bin/echo", "echo", "a b", "echo \"hi\""],
    )
    .stdout(std::process::Stdio::null())
    .status()
    .unwrap();
    assert!(status.success());

    let records = records(&log.path);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0][7], r#"echo "a b" "echo \"hi\"""#);
}

#[test]
fn execl_marshals_variadic_arguments() {
    let log = trace_log();
    let output = stub_cmd(Some(&log.path), &["execl", "/bin/echo", "echo", "a b"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(output.stdout, b"a b\n");

    let records = records(&log.path);
    assert_eq!(records.len(), 1);
    assert_record_shape(&records[0]);
    assert_eq!(records[0][6], "/bin/echo");
    assert_eq!(records[0][7], r#"echo "a b""#);
}

#[test]
fn execlp_searches_path() {
    let log = trace_log();
    let output = stub_cmd(Some(&log.path), &["execlp", "echo", "echo", "found"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(output.stdout, b"found\n");

    let records = records(&log.path);
    assert_eq!(records.len(), 1);
    // The filename line records what the caller passed, not the resolved path.
    assert_eq!(records[0][6], "echo");
}

#[test]
fn execvp_records_the_search_name() {
    let log = trace_log();
    let output = stub_cmd(
        Some(&log.path),
        &["execvp", "echo", "echo", "sh says \"hi\""],
    )
    .output()
    .unwrap();
    assert!(output.status.success());

    let records = records(&log.path);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0][6], "echo");
    assert_eq!(records[0][7], r#"echo "sh says \"hi\"""#);
}

#[test]
fn execvpe_is_interposed() {
    let log = trace_log();
    let output = stub_cmd(Some(&log.path), &["execvpe", "echo", "echo", "vpe"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(output.stdout, b"vpe\n");
    assert_eq!(records(&log.path).len(), 1);
}

#[test]
fn execle_passes_environment_after_sentinel() {
    let log = trace_log();
    let showenv = showenv_path();
    let output = stub_cmd(
        Some(&log.path),
        &["execle", showenv.to_str().unwrap(), "showenv"],
    )
    .output()
    .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("STUB_MARKER=execle"), "stdout: {stdout}");

    let records = records(&log.path);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0][7], "showenv");
}

#[test]
fn null_argument_vector_is_an_empty_line() {
    let log = trace_log();
    let showenv = showenv_path();
    // execl with a NULL leading argument: argv becomes just the terminator.
    let status = stub_cmd(Some(&log.path), &["execl", showenv.to_str().unwrap()])
        .stdout(std::process::Stdio::null())
        .status()
        .unwrap();
    assert!(status.success());

    eprintln!("DEBUG log contents: {:?}", fs::read_to_string(&log.path));
    let records = records(&log.path);
    assert_eq!(records.len(), 1);
    assert_record_shape(&records[0]);
    assert_eq!(records[0][6], showenv.to_str().unwrap());
    assert_eq!(records[0][7], "");
}

#[test]
fn execle_with_null_argument_still_reads_envp() {
    let log = trace_log();
    let showenv = showenv_path();
    let output = stub_cmd(Some(&log.path), &["execle", showenv.to_str().unwrap()])
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("STUB_MARKER=execle"), "stdout: {stdout}");

    let records = records(&log.path);
    assert_eq!(records[0][7], "");
}

#[test]
fn unset_log_env_is_passthrough() {
    let log = trace_log();
    let output = stub_cmd(None, &["execv", "/bin/echo", "echo", "quiet"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(output.stdout, b"quiet\n");
    assert!(!log.path.exists());
}

#[test]
fn empty_and_oversized_log_env_disable_tracing() {
    for value in [String::new(), "a".repeat(1500)] {
        let output = stub_cmd(None, &["execv", "/bin/echo", "echo", "ok"])
            .env(LOG_ENV_VAR, &value)
            .output()
            .unwrap();
        assert!(output.status.success());
        assert_eq!(output.stdout, b"ok\n");
    }
}

#[test]
fn failed_exec_matches_uninterposed_behavior() {
    let missing = "/nonexistent/btrace-test-binary";

    let interposed = stub_cmd(None, &["execv", missing, "x"]).output().unwrap();
    let plain = Command::new(stub_path())
        .args(["execv", missing, "x"])
        .env_remove("LD_PRELOAD")
        .env_remove(LOG_ENV_VAR)
        .output()
        .unwrap();

    assert_eq!(interposed.status.code(), Some(46));
    assert_eq!(interposed.status.code(), plain.status.code());
    assert_eq!(interposed.stdout, plain.stdout);
}

#[test]
fn concurrent_records_do_not_interleave() {
    let log = trace_log();

    let mut children = Vec::new();
    for i in 0..8 {
        let child = stub_cmd(
            Some(&log.path),
            &["execve", "/bin/echo", "echo", &format!("worker-{i}")],
        )
        .stdout(std::process::Stdio::null())
        .spawn()
        .unwrap();
        children.push(child);
    }
    for mut child in children {
        assert!(child.wait().unwrap().success());
    }

    let records = records(&log.path);
    assert_eq!(records.len(), 8);
    let mut seen: Vec<String> = Vec::new();
    for record in &records {
        assert_record_shape(record);
        assert_eq!(record[6], "/bin/echo");
        seen.push(record[7].clone());
    }
    seen.sort();
    let expected: Vec<String> = (0..8).map(|i| format!("echo worker-{i}")).collect();
    assert_eq!(seen, expected);
}

#[test]
fn tracing_propagates_across_exec_chains() {
    let log = trace_log();
    let stub = stub_path();

    let output = Command::new("/bin/sh")
        .arg("-c")
        .arg(format!("exec {} execv /bin/echo echo chained", stub.display()))
        .env("LD_PRELOAD", shim_path())
        .env(LOG_ENV_VAR, &log.path)
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(output.stdout, b"chained\n");

    let records = records(&log.path);
    assert_eq!(records.len(), 2, "records: {records:?}");

    // The shell exec'd the stub, then the stub exec'd echo, all in one
    // process: the self identity must be identical in both records.
    let (first, second) = (&records[0], &records[1]);
    assert_record_shape(first);
    assert_record_shape(second);
    assert_eq!(first[6], stub.to_str().unwrap());
    assert_eq!(second[6], "/bin/echo");
    assert_eq!(first[3], second[3]);
    assert_eq!(first[4], second[4]);
}
