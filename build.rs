use std::env;
use std::fs;
use std::path::Path;
use std::process::Command;

fn main() {
    // Release line comes from VERSION when present, else the manifest version
    let version = fs::read_to_string(Path::new("VERSION"))
        .map(|s| s.trim().to_string())
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| env::var("CARGO_PKG_VERSION").unwrap_or_else(|_| "0.1.0".to_string()));

    // CI sets BUILD_NUMBER; local builds report 0
    let build_number: u64 = env::var("BUILD_NUMBER")
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(0);

    let profile = match env::var("PROFILE").as_deref() {
        Ok("release") => "release",
        _ => "development",
    };

    let git_hash = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|o| o.status.success())
        .and_then(|o| String::from_utf8(o.stdout).ok())
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    println!("cargo:rustc-env=JERICHO_VERSION={}", version);
    println!("cargo:rustc-env=JERICHO_BUILD={}", build_number);
    println!("cargo:rustc-env=JERICHO_PROFILE={}", profile);
    println!("cargo:rustc-env=JERICHO_GIT_HASH={}", git_hash);

    println!("cargo:rerun-if-changed=VERSION");
    println!("cargo:rerun-if-env-changed=BUILD_NUMBER");
    println!("cargo:rerun-if-env-changed=PROFILE");
}
