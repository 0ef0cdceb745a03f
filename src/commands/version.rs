//! Command: print version information.
use std::io::Write;

use anyhow::Result;

/// Version string: pinned by the build, or the crate version.
#[must_use]
pub fn string() -> &'static str {
    option_env!("SYSCFG_VERSION").unwrap_or(env!("CARGO_PKG_VERSION"))
}

/// Print the syscfg version to `out`.
///
/// # Errors
///
/// Returns an error if the write fails.
pub fn run(out: &mut impl Write) -> Result<()> {
    writeln!(out, "syscfg {}", string())?;
    Ok(())
}
