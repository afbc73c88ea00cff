//! Triage state machine for imported calendar events.
//!
//! ```text
//! raw ──assign(n>0)──▶ assigned ──assign(0)──▶ raw
//! raw | assigned ──ignore──▶ ignored      (terminal)
//! raw | assigned ──convert──▶ converted   (terminal)
//! ```
//!
//! A `converted` status without a linked intervention is treated as `raw`:
//! deleting an intervention resets its source events, and older rows may
//! carry the status without the link.

use thiserror::Error;

use crate::status::TriageStatus;

/// Requested triage transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriageAction {
    /// Replace the assignment set with `employees` members.
    Assign { employees: usize },
    Ignore,
    Convert,
}

impl TriageAction {
    const fn name(self) -> &'static str {
        match self {
            Self::Assign { .. } => "assign",
            Self::Ignore => "ignore",
            Self::Convert => "convert",
        }
    }
}

/// Rejected triage transitions.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TriageError {
    /// The event already produced an intervention.
    #[error("raw event {raw_event_id} is already converted into intervention {intervention_id}")]
    AlreadyConverted {
        raw_event_id: String,
        intervention_id: String,
    },
    /// The event was ignored; reopening is not supported.
    #[error("raw event {raw_event_id} is ignored and cannot be {action}ed")]
    Ignored {
        raw_event_id: String,
        action: &'static str,
    },
}

/// Current triage state of one event.
#[derive(Debug, Clone, Copy)]
pub struct TriageState<'a> {
    pub raw_event_id: &'a str,
    pub status: TriageStatus,
    pub linked_intervention_id: Option<&'a str>,
}

impl TriageState<'_> {
    /// Status after applying `action`, or why it is refused.
    pub fn transition(&self, action: TriageAction) -> Result<TriageStatus, TriageError> {
        if let (TriageStatus::Converted, Some(intervention_id)) =
            (self.status, self.linked_intervention_id)
        {
            return Err(TriageError::AlreadyConverted {
                raw_event_id: self.raw_event_id.to_string(),
                intervention_id: intervention_id.to_string(),
            });
        }
        match (self.status, action) {
            (TriageStatus::Ignored, TriageAction::Ignore) => Ok(TriageStatus::Ignored),
            (TriageStatus::Ignored, _) => Err(TriageError::Ignored {
                raw_event_id: self.raw_event_id.to_string(),
                action: action.name(),
            }),
            (_, TriageAction::Assign { employees: 0 }) => Ok(TriageStatus::Raw),
            (_, TriageAction::Assign { .. }) => Ok(TriageStatus::Assigned),
            (_, TriageAction::Ignore) => Ok(TriageStatus::Ignored),
            (_, TriageAction::Convert) => Ok(TriageStatus::Converted),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(status: TriageStatus, link: Option<&str>) -> TriageState<'_> {
        TriageState {
            raw_event_id: "raw-1",
            status,
            linked_intervention_id: link,
        }
    }

    #[test]
    fn assign_moves_between_raw_and_assigned() {
        let raw = state(TriageStatus::Raw, None);
        assert_eq!(
            raw.transition(TriageAction::Assign { employees: 2 }),
            Ok(TriageStatus::Assigned)
        );
        let assigned = state(TriageStatus::Assigned, None);
        assert_eq!(
            assigned.transition(TriageAction::Assign { employees: 0 }),
            Ok(TriageStatus::Raw)
        );
    }

    #[test]
    fn converted_with_link_is_terminal() {
        let converted = state(TriageStatus::Converted, Some("int-1"));
        for action in [
            TriageAction::Assign { employees: 1 },
            TriageAction::Ignore,
            TriageAction::Convert,
        ] {
            assert!(matches!(
                converted.transition(action),
                Err(TriageError::AlreadyConverted { .. })
            ));
        }
    }

    #[test]
    fn converted_without_link_behaves_as_raw() {
        let orphan = state(TriageStatus::Converted, None);
        assert_eq!(
            orphan.transition(TriageAction::Convert),
            Ok(TriageStatus::Converted)
        );
    }

    #[test]
    fn ignored_is_terminal_but_idempotent() {
        let ignored = state(TriageStatus::Ignored, None);
        assert_eq!(
            ignored.transition(TriageAction::Ignore),
            Ok(TriageStatus::Ignored)
        );
        let err = ignored
            .transition(TriageAction::Assign { employees: 1 })
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "raw event raw-1 is ignored and cannot be assigned"
        );
        assert!(ignored.transition(TriageAction::Convert).is_err());
    }
}
