//! Report status state machine.
//!
//! Road and water reports follow the standard workflow; spatial reports follow
//! the review workflow. Both share the terminal states.
//!
//! ```text
//! standard: PENDING -> VERIFIED -> IN_PROGRESS -> COMPLETED
//!           PENDING | VERIFIED -> REJECTED, VERIFIED -> COMPLETED
//! spatial:  PENDING -> REVIEWING -> PROCESSING -> RESOLVED
//!           PENDING | REVIEWING | PROCESSING -> REJECTED
//! ```

use crate::domain::enums::{token_enum, TokenError};
use crate::error::{CoreError, CoreResult};

token_enum! {
    ReportStatus {
        Pending => "PENDING",
        Verified => "VERIFIED",
        InProgress => "IN_PROGRESS",
        Completed => "COMPLETED",
        Rejected => "REJECTED",
        Reviewing => "REVIEWING",
        Processing => "PROCESSING",
        Resolved => "RESOLVED",
    }
}

impl Default for ReportStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl ReportStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Rejected | Self::Resolved)
    }
}

/// Terminal tokens, for SQL `NOT IN (...)` lists.
pub const TERMINAL_STATUSES: &[ReportStatus] = &[
    ReportStatus::Completed,
    ReportStatus::Rejected,
    ReportStatus::Resolved,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Workflow {
    Standard,
    Spatial,
}

use ReportStatus::*;

const STANDARD_TRANSITIONS: &[(ReportStatus, ReportStatus)] = &[
    (Pending, Verified),
    (Pending, Rejected),
    (Verified, InProgress),
    (Verified, Completed),
    (Verified, Rejected),
    (InProgress, Completed),
];

const SPATIAL_TRANSITIONS: &[(ReportStatus, ReportStatus)] = &[
    (Pending, Reviewing),
    (Pending, Rejected),
    (Reviewing, Processing),
    (Reviewing, Rejected),
    (Processing, Resolved),
    (Processing, Rejected),
];

/// Outcome of checking a requested status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionCheck {
    /// Requested status equals the current one.
    Unchanged,
    /// Legal move to a different status.
    Allowed,
}

impl Workflow {
    fn transitions(self) -> &'static [(ReportStatus, ReportStatus)] {
        match self {
            Workflow::Standard => STANDARD_TRANSITIONS,
            Workflow::Spatial => SPATIAL_TRANSITIONS,
        }
    }

    /// Whether `status` appears anywhere in this workflow.
    pub fn contains(self, status: ReportStatus) -> bool {
        status == Pending
            || self
                .transitions()
                .iter()
                .any(|(from, to)| *from == status || *to == status)
    }

    pub fn statuses(self) -> Vec<ReportStatus> {
        ReportStatus::ALL
            .iter()
            .copied()
            .filter(|s| self.contains(*s))
            .collect()
    }

    /// Check a status for a freshly created record.
    pub fn check_initial(self, status: ReportStatus) -> CoreResult<()> {
        if self.contains(status) {
            Ok(())
        } else {
            Err(CoreError::validation(format!(
                "status {status} is not used by this report type"
            )))
        }
    }

    /// Parse a raw token and check that this workflow uses it.
    pub fn parse(self, token: &str) -> CoreResult<ReportStatus> {
        let status: ReportStatus = token.parse().map_err(|e: TokenError| CoreError::from(e))?;
        self.check_initial(status)?;
        Ok(status)
    }

    pub fn check_transition(
        self,
        from: ReportStatus,
        to: ReportStatus,
    ) -> CoreResult<TransitionCheck> {
        self.check_initial(to)?;
        if from == to {
            return Ok(TransitionCheck::Unchanged);
        }
        if from.is_terminal() {
            return Err(CoreError::validation(format!(
                "status {from} is terminal and cannot change to {to}"
            )));
        }
        if self.transitions().contains(&(from, to)) {
            Ok(TransitionCheck::Allowed)
        } else {
            Err(CoreError::validation(format!(
                "illegal status transition {from} -> {to}"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn standard_happy_path() {
        let wf = Workflow::Standard;
        assert_eq!(wf.check_transition(Pending, Verified).unwrap(), TransitionCheck::Allowed);
        assert_eq!(wf.check_transition(Verified, Completed).unwrap(), TransitionCheck::Allowed);
        assert_eq!(wf.check_transition(Verified, InProgress).unwrap(), TransitionCheck::Allowed);
        assert_eq!(wf.check_transition(InProgress, Completed).unwrap(), TransitionCheck::Allowed);
    }

    #[test]
    fn terminal_states_cannot_move() {
        let wf = Workflow::Standard;
        assert_matches!(wf.check_transition(Completed, InProgress), Err(CoreError::Validation(_)));
        assert_matches!(wf.check_transition(Rejected, Pending), Err(CoreError::Validation(_)));
        assert_eq!(wf.check_transition(Completed, Completed).unwrap(), TransitionCheck::Unchanged);
    }

    #[test]
    fn in_progress_cannot_be_rejected() {
        assert_matches!(
            Workflow::Standard.check_transition(InProgress, Rejected),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn spatial_workflow_uses_its_own_states() {
        let wf = Workflow::Spatial;
        assert_eq!(wf.check_transition(Pending, Reviewing).unwrap(), TransitionCheck::Allowed);
        assert_eq!(wf.check_transition(Processing, Resolved).unwrap(), TransitionCheck::Allowed);
        assert_matches!(wf.check_transition(Pending, Verified), Err(CoreError::Validation(_)));
        assert_matches!(wf.check_transition(Resolved, Processing), Err(CoreError::Validation(_)));
        assert!(!Workflow::Standard.contains(Resolved));
        assert!(wf.contains(Rejected));
    }

    #[test]
    fn terminal_set() {
        for status in ReportStatus::ALL {
            assert_eq!(status.is_terminal(), TERMINAL_STATUSES.contains(status));
        }
    }
}
