use crate::audit::AuditReport;
use serde::Serialize;
use sovereign_protocol::{Report, Verdict};

/// Whether a cleaned tree may be packaged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateDecision {
    Proceed,
    ProceedWithWarning,
    Refuse,
}

impl GateDecision {
    pub fn as_str(self) -> &'static str {
        match self {
            GateDecision::Proceed => "proceed",
            GateDecision::ProceedWithWarning => "proceed_with_warning",
            GateDecision::Refuse => "refuse",
        }
    }

    pub fn allows_packaging(self) -> bool {
        self != GateDecision::Refuse
    }
}

impl std::fmt::Display for GateDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Packaging decision from the run verdict and an independent audit
pub fn packaging_gate(report: &Report, audit: &AuditReport) -> GateDecision {
    match (report.verdict, audit.passed) {
        (Verdict::Blocked, _) | (_, false) => GateDecision::Refuse,
        (Verdict::RequiresReview, true) => GateDecision::ProceedWithWarning,
        (Verdict::Sovereign, true) => GateDecision::Proceed,
    }
}
