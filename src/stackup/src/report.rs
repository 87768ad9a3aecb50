//! Health checks, their outcomes, and the aggregated report.
use crate::exit_codes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Final classification of one check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    Pass,
    Warn,
    Fail,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Outcome::Pass => "PASS",
            Outcome::Warn => "WARN",
            Outcome::Fail => "FAIL",
        })
    }
}

/// What an unhealthy verdict costs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Core deployment broken: FAIL
    Fatal,
    /// Optional component degraded: WARN
    Degrading,
}

/// Raw probe result, before severity is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Healthy(String),
    Unhealthy(String),
    /// The auditor could not run the probe (client tool absent, daemon
    /// unreachable). Says nothing about the target itself.
    Unavailable(String),
}

/// How a check reaches its target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    /// GET `url`, healthy on a 2xx status
    Http { url: String },
    /// TCP connect
    Tcp { host: String, port: u16 },
    /// Run a client tool; healthy on exit 0 and, when set, `expect` in stdout
    Tool {
        program: String,
        args: Vec<String>,
        expect: Option<String>,
    },
    /// SQLite database file exists
    File { path: std::path::PathBuf },
    /// No running container reports `(unhealthy)`
    ContainerHealth { engine: String },
}

/// A named assertion against one external dependency.
#[derive(Debug, Clone)]
pub struct HealthCheck {
    /// Stable position in the report
    pub order: usize,
    pub name: String,
    pub severity: Severity,
    pub hint: String,
    pub probe: Probe,
}

impl HealthCheck {
    pub fn new(
        order: usize,
        name: impl Into<String>,
        severity: Severity,
        probe: Probe,
        hint: impl Into<String>,
    ) -> Self {
        Self {
            order,
            name: name.into(),
            severity,
            hint: hint.into(),
            probe,
        }
    }

    /// Apply the severity policy to a verdict.
    pub fn classify(&self, verdict: Verdict) -> CheckResult {
        let (outcome, detail) = match verdict {
            Verdict::Healthy(detail) => (Outcome::Pass, detail),
            Verdict::Unhealthy(detail) => match self.severity {
                Severity::Fatal => (Outcome::Fail, detail),
                Severity::Degrading => (Outcome::Warn, detail),
            },
            Verdict::Unavailable(detail) => (Outcome::Warn, format!("skipped, {}", detail)),
        };
        CheckResult {
            order: self.order,
            name: self.name.clone(),
            outcome,
            detail,
            hint: (outcome != Outcome::Pass).then(|| self.hint.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckResult {
    #[serde(skip)]
    pub order: usize,
    pub name: String,
    pub outcome: Outcome,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportCounts {
    pub total: usize,
    pub passed: usize,
    pub warnings: usize,
    pub failed: usize,
}

/// Aggregate of one verification run.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub generated_at: DateTime<Utc>,
    pub results: Vec<CheckResult>,
    pub counts: ReportCounts,
    pub exit_code: i32,
}

impl HealthReport {
    /// Build from results in any completion order; they are sorted by
    /// check order so output is reproducible.
    pub fn from_results(mut results: Vec<CheckResult>) -> Self {
        results.sort_by_key(|r| r.order);
        let count = |o: Outcome| results.iter().filter(|r| r.outcome == o).count();
        let counts = ReportCounts {
            total: results.len(),
            passed: count(Outcome::Pass),
            warnings: count(Outcome::Warn),
            failed: count(Outcome::Fail),
        };
        let exit_code = if counts.failed > 0 {
            exit_codes::FAILURE
        } else {
            exit_codes::SUCCESS
        };
        Self {
            generated_at: Utc::now(),
            results,
            counts,
            exit_code,
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.exit_code
    }

    pub fn is_healthy(&self) -> bool {
        self.counts.failed == 0
    }

    pub fn result(&self, name: &str) -> Option<&CheckResult> {
        self.results.iter().find(|r| r.name == name)
    }

    pub fn with_outcome(&self, outcome: Outcome) -> impl Iterator<Item = &CheckResult> {
        self.results.iter().filter(move |r| r.outcome == outcome)
    }

    /// Per-check lines followed by the summary block.
    pub fn render(&self) -> String {
        let mut out = String::from(
            "╔════════════════════════════════════════════════════════════════╗\n\
             ║  Deployment Verification                                       ║\n\
             ╚════════════════════════════════════════════════════════════════╝\n\n",
        );

        for result in &self.results {
            out.push_str(&format!("  [{}] {}: {}\n", result.outcome, result.name, result.detail));
            if let Some(hint) = &result.hint {
                out.push_str(&format!("         Fix: {}\n", hint));
            }
        }

        out.push_str("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n");
        out.push_str(&format!("  Total checks: {}\n", self.counts.total));
        out.push_str(&format!("  Passed:       {}\n", self.counts.passed));
        out.push_str(&format!("  Warnings:     {}\n", self.counts.warnings));
        out.push_str(&format!("  Failed:       {}\n", self.counts.failed));
        out.push_str("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n");

        if self.counts.failed > 0 {
            out.push_str("  Deployment has FAILED checks.\n");
        } else {
            out.push_str("  Deployment is healthy.\n");
        }
        if self.counts.warnings > 0 {
            out.push_str("  Reminder, warnings to review:\n");
            for result in self.with_outcome(Outcome::Warn) {
                out.push_str(&format!("    - {}: {}\n", result.name, result.detail));
            }
        }
        out
    }
}
