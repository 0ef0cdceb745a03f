//! Static and runtime verification.
//!
//! Static verification inspects persisted files: a FAIL there is a
//! deployment defect. Runtime verification inspects live kernel and service
//! state: a FAIL there usually means the change has not taken effect yet.
//! The two always produce separate [`VerificationReport`]s.
pub mod checksum;
pub mod normalize;
pub mod runtime;
pub mod static_checks;

use std::fmt;

use serde::Serialize;

/// Outcome of one check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    /// As expected.
    Ok,
    /// Informational: the feature or dependency is absent. Not counted
    /// towards pass or fail.
    Info,
    /// Works now but is not persistent, or an advisory mismatch.
    Warn,
    /// A defect.
    Fail,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Self::Ok => "OK",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Fail => "FAIL",
        })
    }
}

/// One named check result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationResult {
    /// Subsystem the check belongs to.
    pub group: String,
    /// What was checked.
    pub description: String,
    /// Outcome.
    pub status: Status,
    /// Detail for the operator; empty when there is nothing to add.
    pub message: String,
}

/// Counts per status.
///
/// # Examples
///
/// ```
/// use syscfg::verify::{Status, VerificationSummary};
///
/// let summary = VerificationSummary { ok: 4, warn: 1, fail: 0, info: 2 };
/// assert_eq!(summary.overall(), Status::Warn);
/// assert!(summary.passed());
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct VerificationSummary {
    /// OK results.
    pub ok: usize,
    /// WARN results.
    pub warn: usize,
    /// FAIL results.
    pub fail: usize,
    /// INFO results.
    pub info: usize,
}

impl VerificationSummary {
    /// Tally `results`.
    #[must_use]
    pub fn from_results(results: &[VerificationResult]) -> Self {
        let mut summary = Self::default();
        for result in results {
            match result.status {
                Status::Ok => summary.ok += 1,
                Status::Warn => summary.warn += 1,
                Status::Fail => summary.fail += 1,
                Status::Info => summary.info += 1,
            }
        }
        summary
    }

    /// FAIL if anything failed, else WARN if anything warned, else OK.
    #[must_use]
    pub const fn overall(&self) -> Status {
        if self.fail > 0 {
            Status::Fail
        } else if self.warn > 0 {
            Status::Warn
        } else {
            Status::Ok
        }
    }

    /// Whether the run succeeds (no FAIL).
    #[must_use]
    pub const fn passed(&self) -> bool {
        self.fail == 0
    }
}

/// Which verifier produced a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportKind {
    /// Persisted file state.
    Static,
    /// Live kernel and service state.
    Runtime,
}

/// Results of one verifier run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationReport {
    /// Producing verifier.
    pub kind: ReportKind,
    /// Results in check order.
    pub results: Vec<VerificationResult>,
    /// Tally of `results`.
    pub summary: VerificationSummary,
    /// Overall status.
    pub overall: Status,
}

/// Accumulates results while checks run. Each verifier owns one and turns
/// it into a report with [`finish`](Self::finish).
#[derive(Debug, Default)]
pub struct VerifyContext {
    results: Vec<VerificationResult>,
}

impl VerifyContext {
    /// An empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a result.
    pub fn record(
        &mut self,
        group: &str,
        description: impl Into<String>,
        status: Status,
        message: impl Into<String>,
    ) {
        self.results.push(VerificationResult {
            group: group.to_string(),
            description: description.into(),
            status,
            message: message.into(),
        });
    }

    /// Append results produced elsewhere.
    pub fn extend(&mut self, results: impl IntoIterator<Item = VerificationResult>) {
        self.results.extend(results);
    }

    /// Results so far.
    #[must_use]
    pub fn results(&self) -> &[VerificationResult] {
        &self.results
    }

    /// Close the context into a report.
    #[must_use]
    pub fn finish(self, kind: ReportKind) -> VerificationReport {
        let summary = VerificationSummary::from_results(&self.results);
        VerificationReport {
            kind,
            overall: summary.overall(),
            results: self.results,
            summary,
        }
    }
}
