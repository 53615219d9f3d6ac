// SPDX-License-Identifier: GPL-3.0-only

use std::process::Command;

fn main() {
    println!("cargo::rerun-if-changed=.git/HEAD");
    println!("cargo::rerun-if-env-changed=EDGECAM_VERSION");

    // Packagers may pin the version string
    let version = match std::env::var("EDGECAM_VERSION") {
        Ok(v) => v,
        Err(_) => describe_version(),
    };

    println!("cargo::rustc-env=EDGECAM_BUILD_VERSION={}", version);
}

/// "0.1.0" when built outside git, "0.1.0-abcdef1" inside a checkout
fn describe_version() -> String {
    let pkg_version = std::env::var("CARGO_PKG_VERSION").unwrap_or_else(|_| "0.0.0".into());

    match commit_hash() {
        Some(hash) => format!("{}-{}", pkg_version, hash),
        None => pkg_version,
    }
}

fn commit_hash() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()?;

    if output.status.success() {
        Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        None
    }
}
