//! Environment readiness check.

use std::path::Path;

use anyhow::Result;

use super::output;
use crate::renderer::chromium::{find_chromium, CHROMIUM_PATH_ENV};

/// Report whether a Chromium binary can be found.
pub fn run(explicit: Option<&Path>) -> Result<()> {
    let chromium = find_chromium(explicit);

    if output::is_json() {
        output::print_json(&serde_json::json!({
            "os": std::env::consts::OS,
            "arch": std::env::consts::ARCH,
            "chromium": chromium.as_ref().map(|p| p.display().to_string()),
            "ready": chromium.is_some(),
        }));
        return Ok(());
    }

    println!("markaudit doctor");
    println!("================");
    println!();
    println!("OS:   {}", std::env::consts::OS);
    println!("Arch: {}", std::env::consts::ARCH);
    println!();

    match &chromium {
        Some(path) => println!("[OK] Chromium found: {}", path.display()),
        None => println!("[!!] Chromium NOT found."),
    }

    println!();
    if chromium.is_some() {
        println!("Status: READY");
    } else {
        println!("Status: NOT READY");
        println!("  Install Chrome/Chromium, pass --chromium <path>, or set {CHROMIUM_PATH_ENV}.");
    }

    Ok(())
}
