/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Test helper: prints the process environment, one variable per line.
//!
//! Exists because the integration tests exec targets with an empty argument
//! vector, and coreutils binaries abort on a NULL `argv[0]`. This one does
//! not care how it was invoked.

fn main() {
    for (key, value) in std::env::vars_os() {
        println!("{}={}", key.to_string_lossy(), value.to_string_lossy());
    }
}
