//! Watering plan lifecycle state machine.
//!
//! ```text
//!   planned ──► active ──► finished
//!     │  ▲        │
//!     │  │        ├──► cancelled
//!     │  │        └──► not_completed
//!     │  └─────────────────┘ (replan)
//!     ├──► cancelled
//!     └──► not_completed
//! ```

use greenspace_core::{ServiceError, WateringPlanStatus};

/// Check if a state transition is valid.
///
/// Staying in the same state is always allowed.
#[must_use]
pub fn is_valid_transition(from: WateringPlanStatus, to: WateringPlanStatus) -> bool {
    use WateringPlanStatus::{Active, Cancelled, Finished, NotCompleted, Planned};

    if from == to {
        return true;
    }
    matches!(
        (from, to),
        (Planned, Active | Cancelled | NotCompleted)
            | (Active, Finished | Cancelled | NotCompleted)
            | (NotCompleted, Planned)
    )
}

/// Validate a transition, returning a `Conflict` error when it is not allowed.
///
/// # Errors
///
/// Returns `Conflict` if the transition is not valid.
pub fn validate_transition(
    from: WateringPlanStatus,
    to: WateringPlanStatus,
) -> Result<(), ServiceError> {
    if is_valid_transition(from, to) {
        Ok(())
    } else {
        Err(ServiceError::conflict(format!(
            "invalid watering plan transition: {from} -> {to}"
        )))
    }
}

/// Whether a plan in this state is done and can no longer change.
#[must_use]
pub const fn is_terminal(status: WateringPlanStatus) -> bool {
    matches!(
        status,
        WateringPlanStatus::Finished | WateringPlanStatus::Cancelled
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use greenspace_core::ErrorKind;
    use WateringPlanStatus::{Active, Cancelled, Finished, NotCompleted, Planned, Unknown};

    #[test]
    fn valid_transitions() {
        assert!(is_valid_transition(Planned, Active));
        assert!(is_valid_transition(Planned, Cancelled));
        assert!(is_valid_transition(Planned, NotCompleted));
        assert!(is_valid_transition(Active, Finished));
        assert!(is_valid_transition(Active, Cancelled));
        assert!(is_valid_transition(Active, NotCompleted));
        assert!(is_valid_transition(NotCompleted, Planned));
    }

    #[test]
    fn same_state_is_allowed() {
        for status in [Planned, Active, Cancelled, Finished, NotCompleted, Unknown] {
            assert!(is_valid_transition(status, status));
        }
    }

    #[test]
    fn invalid_transitions() {
        assert!(!is_valid_transition(Planned, Finished));
        assert!(!is_valid_transition(Finished, Active));
        assert!(!is_valid_transition(Cancelled, Planned));
        assert!(!is_valid_transition(NotCompleted, Active));
        assert!(!is_valid_transition(Unknown, Planned));
    }

    #[test]
    fn rejection_is_conflict() {
        let err = validate_transition(Finished, Planned).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(err.message().contains("finished -> planned"));
    }

    #[test]
    fn terminal_states() {
        assert!(is_terminal(Finished));
        assert!(is_terminal(Cancelled));
        assert!(!is_terminal(NotCompleted));
        assert!(!is_terminal(Active));
    }
}
