//! External command execution with captured output and redacted logging.
use anyhow::{Context as _, Result, bail};
use std::io::Write as _;
use std::process::{Command, Output, Stdio};

/// Result of a command execution.
#[derive(Debug, Clone)]
pub struct ExecResult {
    /// Captured standard output, lossily decoded.
    pub stdout: String,
    /// Captured standard output as raw bytes.
    pub stdout_bytes: Vec<u8>,
    /// Captured standard error.
    pub stderr: String,
    /// Whether the process exited with status 0.
    pub success: bool,
    /// Exit code, `None` when terminated by a signal.
    pub code: Option<i32>,
}

impl From<Output> for ExecResult {
    fn from(output: Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            stdout_bytes: output.stdout,
            success: output.status.success(),
            code: output.status.code(),
        }
    }
}

/// Abstraction over process execution so callers can be tested without
/// spawning real commands.
pub trait Executor: Send + Sync + std::fmt::Debug {
    /// Run a command and return its output. Fails if the command exits non-zero.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned or exits non-zero.
    fn run(&self, program: &str, args: &[&str]) -> Result<ExecResult>;

    /// Run a command, allowing failure (returns result without bailing).
    ///
    /// # Errors
    ///
    /// Returns an error only if the process cannot be spawned.
    fn run_unchecked(&self, program: &str, args: &[&str]) -> Result<ExecResult>;

    /// Run a command with `input` written to its standard input. Fails if the
    /// command exits non-zero.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned, its input cannot be
    /// written, or it exits non-zero.
    fn run_with_stdin(&self, program: &str, args: &[&str], input: &[u8]) -> Result<ExecResult>;

    /// Check if a program is available on PATH.
    fn which(&self, program: &str) -> bool;
}

/// Production [`Executor`] backed by [`std::process::Command`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemExecutor;

impl Executor for SystemExecutor {
    fn run(&self, program: &str, args: &[&str]) -> Result<ExecResult> {
        let result = self.run_unchecked(program, args)?;
        check(program, args, result)
    }

    fn run_unchecked(&self, program: &str, args: &[&str]) -> Result<ExecResult> {
        let label = log_label(program, args);
        tracing::debug!("$ {label}");
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("failed to execute: {program}"))?;
        let result = ExecResult::from(output);
        log_result(&label, &result);
        Ok(result)
    }

    fn run_with_stdin(&self, program: &str, args: &[&str], input: &[u8]) -> Result<ExecResult> {
        let label = log_label(program, args);
        tracing::debug!("$ {label} (with stdin)");
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to execute: {program}"))?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(input)
                .with_context(|| format!("writing stdin of {program}"))?;
        }
        let output = child
            .wait_with_output()
            .with_context(|| format!("waiting for {program}"))?;
        let result = ExecResult::from(output);
        log_result(&label, &result);
        check(program, args, result)
    }

    fn which(&self, program: &str) -> bool {
        which::which(program).is_ok()
    }
}

/// Bail with the captured (redacted) stderr when `result` is a failure.
fn check(program: &str, args: &[&str], result: ExecResult) -> Result<ExecResult> {
    if !result.success {
        bail!(
            "{} failed (exit {}): {}",
            redact(&command_line(program, args)),
            result.code.unwrap_or(-1),
            redact(result.stderr.trim())
        );
    }
    Ok(result)
}

/// The command line as it may appear in logs.
fn log_label(program: &str, args: &[&str]) -> String {
    redact(&command_line(program, args))
}

fn log_result(label: &str, result: &ExecResult) {
    tracing::debug!(
        "{label} -> exit {}",
        result.code.map_or_else(|| "signal".to_string(), |c| c.to_string())
    );
    for line in result.stdout.lines() {
        tracing::debug!("  stdout: {}", redact(line));
    }
    for line in result.stderr.lines() {
        tracing::debug!("  stderr: {}", redact(line));
    }
}

/// Render a command line for logs.
#[must_use]
pub fn command_line(program: &str, args: &[&str]) -> String {
    if args.is_empty() {
        program.to_string()
    } else {
        format!("{program} {}", args.join(" "))
    }
}

/// Keys whose values are masked by [`redact`].
const SECRET_KEYS: &[&str] = &["passphrase", "password", "psk", "secret", "token"];

/// Mask credential values in `text` before it is logged.
///
/// Any `key=value`, `key: value` or `key value`-free `key=` occurrence whose
/// key (case-insensitive, on a word boundary) is one of the known secret
/// keys has its value replaced with `***`.
///
/// # Examples
///
/// ```
/// use syscfg::exec::redact;
///
/// assert_eq!(redact("Passphrase=hunter2 ssid=home"), "Passphrase=*** ssid=home");
/// assert_eq!(redact("psk: \"abc def\""), "psk: \"***\"");
/// assert_eq!(redact("nothing here"), "nothing here");
/// ```
#[must_use]
pub fn redact(text: &str) -> String {
    let lower = text.to_ascii_lowercase();
    let mut out = String::with_capacity(text.len());
    let mut copied = 0;
    let mut prev: Option<char> = None;

    for (i, c) in text.char_indices() {
        if i < copied {
            prev = Some(c);
            continue;
        }
        let at_boundary = prev.is_none_or(|p| !p.is_alphanumeric() && p != '_');
        prev = Some(c);
        if !at_boundary {
            continue;
        }
        let Some(key) = SECRET_KEYS.iter().find(|k| lower[i..].starts_with(**k)) else {
            continue;
        };
        let Some((value_start, value_end)) = secret_value_span(text, i + key.len()) else {
            continue;
        };
        out.push_str(&text[copied..value_start]);
        out.push_str("***");
        copied = value_end;
    }
    out.push_str(&text[copied..]);
    out
}

/// Locate the value following a secret key that ends at byte `pos`.
fn secret_value_span(text: &str, pos: usize) -> Option<(usize, usize)> {
    let rest = text.get(pos..)?;
    let trimmed = rest.trim_start_matches(' ');
    let sep = trimmed.chars().next()?;
    if sep != '=' && sep != ':' {
        return None;
    }
    let after_sep = &trimmed[1..];
    let value = after_sep.trim_start_matches(' ');
    let mut start = text.len() - value.len();
    let (quoted, body) = match value.chars().next() {
        Some(q @ ('"' | '\'')) => (Some(q), &value[1..]),
        _ => (None, value),
    };
    if quoted.is_some() {
        start += 1;
    }
    let len = match quoted {
        Some(q) => body.find(q).unwrap_or(body.len()),
        None => body
            .find(|c: char| c.is_whitespace() || c == ',' || c == ';')
            .unwrap_or(body.len()),
    };
    (len > 0).then_some((start, start + len))
}
