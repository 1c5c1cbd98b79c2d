//! CLI command implementations.
//!
//! Each submodule corresponds to a top-level CLI command.

pub mod call;
pub mod publish;
pub mod server;

/// Pretty-print a JSON value to stdout.
pub fn print_json(value: &serde_json::Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
    );
}
