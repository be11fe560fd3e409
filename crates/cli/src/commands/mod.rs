//! Subcommand implementations.

pub mod kitchen;
pub mod snapshot;

use serde::Serialize;

pub type CommandResult = Result<(), Box<dyn std::error::Error>>;

/// Print a command's result as pretty JSON on stdout.
///
/// Logs go to stderr, so stdout stays machine-readable.
///
/// # Errors
///
/// Returns an error if `value` cannot be serialized.
pub fn emit<T: Serialize>(value: &T) -> CommandResult {
    let json = serde_json::to_string_pretty(value)?;
    #[allow(clippy::print_stdout)]
    {
        println!("{json}");
    }
    Ok(())
}
