//! Gate state machine.
//!
//! Decides, per scored suggestion, whether to auto-apply, request human
//! approval, or reject, and validates every subsequent lifecycle
//! transition:
//!
//! ```text
//! scored ──▶ auto_applied                    confidence ≥ high
//! scored ──▶ awaiting_approval               low ≤ confidence < high
//! scored ──▶ rejected                        confidence < low
//! awaiting_approval ──▶ approved             human accept
//! awaiting_approval ──▶ rejected             human decline
//! awaiting_approval ──▶ expired              no response within timeout
//! ```
//!
//! Thresholds are configuration, not constants. The decision is a pure
//! function of `(confidence, thresholds)`, so identical inputs always gate
//! identically.

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::models::SuggestionStatus;

/// Confidence thresholds for the initial gate decision.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GateThresholds {
    /// At or above this, the suggestion is applied without asking.
    pub high: f64,
    /// Below this, the suggestion is rejected outright.
    pub low: f64,
}

impl GateThresholds {
    pub fn is_valid(&self) -> bool {
        (0.0..=1.0).contains(&self.low) && (0.0..=1.0).contains(&self.high) && self.low <= self.high
    }
}

impl Default for GateThresholds {
    fn default() -> Self {
        Self {
            high: 0.85,
            low: 0.4,
        }
    }
}

/// Outcome of gating a freshly scored suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    AutoApply,
    AwaitApproval,
    Reject,
}

impl GateDecision {
    /// The suggestion status this decision creates.
    pub fn initial_status(&self) -> SuggestionStatus {
        match self {
            GateDecision::AutoApply => SuggestionStatus::AutoApplied,
            GateDecision::AwaitApproval => SuggestionStatus::AwaitingApproval,
            GateDecision::Reject => SuggestionStatus::Rejected,
        }
    }
}

/// Human response relayed by the front end for an awaiting suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalDecision {
    Approve,
    Decline,
}

/// Gate a scored confidence value against the thresholds.
pub fn decide(confidence: f64, thresholds: &GateThresholds) -> GateDecision {
    if confidence >= thresholds.high {
        GateDecision::AutoApply
    } else if confidence >= thresholds.low {
        GateDecision::AwaitApproval
    } else {
        GateDecision::Reject
    }
}

/// True when the lifecycle permits moving `from` to `to`.
///
/// Terminal states accept no transition. `Pending` exists for records
/// persisted before scoring completes and may move to any gated status.
pub fn can_transition(from: SuggestionStatus, to: SuggestionStatus) -> bool {
    use SuggestionStatus::*;
    match from {
        Pending => matches!(to, AutoApplied | AwaitingApproval | Rejected),
        AwaitingApproval => matches!(to, Approved | Rejected | Expired),
        AutoApplied | Approved | Rejected | Expired => false,
    }
}

/// Validate a transition, returning the typed error on violation.
pub fn check_transition(
    from: SuggestionStatus,
    to: SuggestionStatus,
) -> Result<(), EngineError> {
    if can_transition(from, to) {
        Ok(())
    } else {
        Err(EngineError::InvalidTransition { from, to })
    }
}

/// True when this status must trigger the edit-application side effect on
/// the editor/CLI collaborator. Rejection and expiry never mutate external
/// state.
pub fn applies_edit(status: SuggestionStatus) -> bool {
    status.is_accepted()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decide_bands() {
        let t = GateThresholds::default();
        assert_eq!(decide(0.9, &t), GateDecision::AutoApply);
        assert_eq!(decide(0.6, &t), GateDecision::AwaitApproval);
        assert_eq!(decide(0.2, &t), GateDecision::Reject);
    }

    #[test]
    fn test_decide_boundaries_inclusive() {
        let t = GateThresholds {
            high: 0.85,
            low: 0.4,
        };
        // Exactly high → auto-apply; exactly low → awaiting.
        assert_eq!(decide(0.85, &t), GateDecision::AutoApply);
        assert_eq!(decide(0.4, &t), GateDecision::AwaitApproval);
        assert_eq!(decide(0.39999, &t), GateDecision::Reject);
    }

    #[test]
    fn test_decide_deterministic() {
        let t = GateThresholds::default();
        for i in 0..=100 {
            let c = i as f64 / 100.0;
            assert_eq!(decide(c, &t), decide(c, &t));
        }
    }

    #[test]
    fn test_terminal_states_accept_nothing() {
        use SuggestionStatus::*;
        for from in [AutoApplied, Approved, Rejected, Expired] {
            for to in [
                Pending,
                AutoApplied,
                AwaitingApproval,
                Approved,
                Rejected,
                Expired,
            ] {
                assert!(!can_transition(from, to), "{:?} -> {:?}", from, to);
            }
        }
    }

    #[test]
    fn test_awaiting_transitions() {
        use SuggestionStatus::*;
        assert!(can_transition(AwaitingApproval, Approved));
        assert!(can_transition(AwaitingApproval, Rejected));
        assert!(can_transition(AwaitingApproval, Expired));
        assert!(!can_transition(AwaitingApproval, AutoApplied));
        assert!(!can_transition(AwaitingApproval, Pending));
    }

    #[test]
    fn test_check_transition_error() {
        let err = check_transition(
            SuggestionStatus::Approved,
            SuggestionStatus::Rejected,
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition { .. }));
    }

    #[test]
    fn test_only_accepted_statuses_apply_edits() {
        use SuggestionStatus::*;
        assert!(applies_edit(AutoApplied));
        assert!(applies_edit(Approved));
        assert!(!applies_edit(Rejected));
        assert!(!applies_edit(Expired));
        assert!(!applies_edit(AwaitingApproval));
    }

    #[test]
    fn test_thresholds_validation() {
        assert!(GateThresholds::default().is_valid());
        assert!(!GateThresholds {
            high: 0.3,
            low: 0.6,
        }
        .is_valid());
        assert!(!GateThresholds {
            high: 1.2,
            low: 0.1,
        }
        .is_valid());
    }
}
