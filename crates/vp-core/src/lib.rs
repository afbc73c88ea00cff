//! Core domain logic for field-service scheduling.
//!
//! This crate contains the fundamental types and logic for:
//! - Capacity planning: daily load verdicts from staff, absences and jobs
//! - Triage: the state machine imported calendar events move through
//! - Conversion inputs: confirmed structure and the duplicate-folding pass
//!
//! Nothing here performs I/O.

pub mod auth;
pub mod capacity;
pub mod confirmation;
pub mod dedup;
pub mod error;
pub mod model;
pub mod status;
pub mod time;
pub mod triage;
pub mod types;
pub mod update;

pub use auth::{AuthError, Principal};
pub use capacity::{DayStats, LoadStatus, PlanningInput, day_stats, range_stats};
pub use confirmation::{ClientPlan, Confirmation, ServiceLine, StructuredFields};
pub use dedup::{DedupGroup, deduplicate};
pub use error::ErrorKind;
pub use model::{
    Absence, Client, CompanySettings, Employee, EmployeeProfile, Intervention, InterventionItem,
    NewAbsence, NewClient, NewIntervention, RawEvent, RawEventUpsert,
};
pub use status::{InterventionStatus, Role, TriageStatus, parse_status_filter};
pub use triage::{TriageAction, TriageError, TriageState};
pub use types::{AbsenceId, ClientId, EmployeeId, InterventionId, RawEventId, ValidationError};
pub use update::{EmployeeUpdate, InterventionUpdate};
