//! CLI subcommand implementations for the markaudit binary.

pub mod audit_cmd;
pub mod doctor;
pub mod output;
pub mod validate_cmd;
