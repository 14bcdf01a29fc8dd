use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

// Injects the firmware identity string logged at boot.
//
// Exports:
//   - FLOWBRIDGE_FW_VERSION: "<crate> <semver> (profile <profile>, <git describe|git unknown>)"

fn main() {
    // `.cargo/config.toml` already carries these when building from this
    // directory; duplicates break the memory.x include.
    let rustflags = env::var("CARGO_ENCODED_RUSTFLAGS").unwrap_or_default();
    for script in ["link.x", "defmt.x"] {
        if !rustflags.contains(script) {
            println!("cargo:rustc-link-arg=-T{script}");
        }
    }
    if !rustflags.contains("--nmagic") {
        println!("cargo:rustc-link-arg=--nmagic");
    }

    println!("cargo:rerun-if-changed=src/");
    if let Some(head) = git_head() {
        println!("cargo:rerun-if-changed={}", head.display());
    }

    let pkg_name = env::var("CARGO_PKG_NAME").unwrap_or_else(|_| "unknown".to_string());
    let pkg_ver = env::var("CARGO_PKG_VERSION").unwrap_or_else(|_| "0.0.0".to_string());
    let profile = env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string());
    let git = git_describe()
        .map(|d| format!("git {d}"))
        .unwrap_or_else(|| "git unknown".to_string());

    println!("cargo:rustc-env=FLOWBRIDGE_FW_VERSION={pkg_name} {pkg_ver} (profile {profile}, {git})");
}

fn repo_root() -> Option<PathBuf> {
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").ok()?);
    manifest_dir.parent()?.parent().map(Path::to_path_buf)
}

/// HEAD of a plain checkout or a worktree (`.git` file pointing elsewhere).
fn git_head() -> Option<PathBuf> {
    let root = repo_root()?;
    let dot_git = root.join(".git");
    let git_dir = if dot_git.is_dir() {
        dot_git
    } else {
        let contents = fs::read_to_string(&dot_git).ok()?;
        let raw = contents.lines().next()?.trim().strip_prefix("gitdir:")?.trim();
        let path = PathBuf::from(raw);
        if path.is_absolute() { path } else { root.join(path) }
    };
    let head = git_dir.join("HEAD");
    head.exists().then_some(head)
}

fn git_describe() -> Option<String> {
    let root = repo_root()?;
    let output = Command::new("git")
        .arg("-C")
        .arg(&root)
        .args(["describe", "--tags", "--dirty", "--always"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let s = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if s.is_empty() { None } else { Some(s) }
}
