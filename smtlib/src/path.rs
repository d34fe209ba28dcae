// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Locating solver binaries.

use std::{
    env,
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

fn repo_root() -> &'static Path {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    manifest.parent().unwrap_or(manifest)
}

/// Get the invocation for the solver binary `bin`.
///
/// An environment variable such as `Z3_BIN` takes priority, then a binary in
/// the repository's `solvers/` directory, and finally `bin` itself, to be
/// resolved through `$PATH`.
pub fn solver_path(bin: &str) -> String {
    let var = bin.to_uppercase() + "_BIN";
    if let Some(val) = env::var_os(var) {
        return val.to_string_lossy().into();
    }
    let local: PathBuf = repo_root().join("solvers").join(bin);
    if local.exists() {
        return local.to_string_lossy().into();
    }
    bin.to_owned()
}

/// Like [`solver_path`], but only returns a path that can actually be
/// executed on this machine.
pub fn find_solver(bin: &str) -> Option<String> {
    let path = solver_path(bin);
    let runs = Command::new(&path)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok();
    if runs {
        Some(path)
    } else {
        log::debug!("solver {bin} not found (tried {path})");
        None
    }
}
