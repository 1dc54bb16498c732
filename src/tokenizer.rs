//! Splitting a single stage into a command name and its arguments.

use crate::error::ShellError;

/// Split `line` on runs of whitespace.
///
/// Returns the command name together with the full argument list, whose first
/// element is the command name itself (it becomes the child's `argv`).
/// No quoting, escaping or expansion is performed.
pub fn tokenize(line: &str) -> Result<(String, Vec<String>), ShellError> {
    let args: Vec<String> = line.split_whitespace().map(str::to_owned).collect();
    match args.first() {
        Some(command) => Ok((command.clone(), args)),
        None => Err(ShellError::EmptyCommand),
    }
}
