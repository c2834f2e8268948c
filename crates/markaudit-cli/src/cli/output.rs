//! Output mode flags shared by every subcommand.
//!
//! `main` records the global `--quiet` / `--json` flags in the environment so
//! any module can check them without threading arguments through.

pub const QUIET_ENV: &str = "MARKAUDIT_QUIET";
pub const JSON_ENV: &str = "MARKAUDIT_JSON";

pub fn is_quiet() -> bool {
    std::env::var_os(QUIET_ENV).is_some()
}

pub fn is_json() -> bool {
    std::env::var_os(JSON_ENV).is_some()
}

/// Pretty-print a JSON value to stdout.
pub fn print_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(e) => eprintln!("  Error: failed to serialize output: {e}"),
    }
}

/// Print a status line to stderr unless quiet or JSON output is active.
pub fn status(line: impl std::fmt::Display) {
    if !is_quiet() && !is_json() {
        eprintln!("{line}");
    }
}
