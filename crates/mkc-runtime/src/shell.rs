use anyhow::{Context, Result};
use std::process::{Command, Output};

/// Run a command on the host, capturing output.
///
/// A non-zero exit is not an error here - callers inspect `Output::status`
/// and decide what a failure means for their operation.
pub fn run_host(program: &str, args: &[String]) -> Result<Output> {
    #[cfg(test)]
    if let Some(output) = crate::shell_mock::intercept(program, args) {
        return Ok(output);
    }

    Command::new(program)
        .args(args)
        .output()
        .with_context(|| format!("failed to run: {} {}", program, args.join(" ")))
}

/// Stdout of a finished command, trimmed.
pub fn stdout_text(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// Stderr of a finished command, trimmed.
pub fn stderr_text(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_string()
}
