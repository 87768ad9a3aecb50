//! Installation targets and the per-run record of what each step did.
use serde::Serialize;
use std::fmt;

/// Observed state of an installation target at the start of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetStatus {
    Absent,
    PresentStale,
    PresentValid,
    Running,
}

/// What a step did about its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepAction {
    Created,
    Recreated,
    Reused,
    Installed,
    Started,
    Restarted,
    Verified,
    /// Nothing to do or prerequisite missing (logged, not failed)
    Skipped,
    /// Operator answered no
    Declined,
    /// Completed with a degradation worth surfacing
    Warned,
}

impl fmt::Display for StepAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StepAction::Created => "created",
            StepAction::Recreated => "recreated",
            StepAction::Reused => "reused",
            StepAction::Installed => "installed",
            StepAction::Started => "started",
            StepAction::Restarted => "restarted",
            StepAction::Verified => "verified",
            StepAction::Skipped => "skipped",
            StepAction::Declined => "declined",
            StepAction::Warned => "warning",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    pub target: String,
    pub before: TargetStatus,
    pub action: StepAction,
    pub detail: String,
}

/// Ordered record of one installer run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SetupSummary {
    pub component: String,
    pub steps: Vec<StepRecord>,
}

impl SetupSummary {
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            steps: Vec::new(),
        }
    }

    pub fn record(
        &mut self,
        target: impl Into<String>,
        before: TargetStatus,
        action: StepAction,
        detail: impl Into<String>,
    ) {
        let record = StepRecord {
            target: target.into(),
            before,
            action,
            detail: detail.into(),
        };
        match record.action {
            StepAction::Warned => tracing::warn!(
                "[{}] {}: {}",
                self.component,
                record.target,
                record.detail
            ),
            _ => tracing::info!(
                "[{}] {} ({}): {}",
                self.component,
                record.target,
                record.action,
                record.detail
            ),
        }
        self.steps.push(record);
    }

    pub fn step(&self, target: &str) -> Option<&StepRecord> {
        self.steps.iter().find(|s| s.target == target)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &StepRecord> {
        self.steps.iter().filter(|s| s.action == StepAction::Warned)
    }

    /// Human-readable step listing.
    pub fn render(&self) -> String {
        let mut out = format!("── {} ──\n", self.component);
        for step in &self.steps {
            out.push_str(&format!(
                "  {:<10} {:<28} {}\n",
                step.action.to_string(),
                step.target,
                step.detail
            ));
        }
        let warnings = self.warnings().count();
        if warnings > 0 {
            out.push_str(&format!("  {} warning(s), review the lines above\n", warnings));
        }
        out
    }
}
