//! Scheduling entities and their creation payloads.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::status::{InterventionStatus, Role, TriageStatus};
use crate::types::{
    AbsenceId, ClientId, EmployeeId, InterventionId, RawEventId, ValidationError, non_blank,
    non_negative,
};

/// Weekly contract assumed when a profile does not say otherwise.
pub const DEFAULT_WEEKLY_HOURS: f64 = 38.0;
/// Display color assumed when a profile does not say otherwise.
pub const DEFAULT_COLOR: &str = "#3B82F6";
/// Daily capacity is derived from weekly hours over this many working days.
pub const WORKING_DAYS_PER_WEEK: f64 = 5.0;
/// Overload tolerance used when no settings row exists.
pub const DEFAULT_OVERTIME_TOLERANCE_HOURS: f64 = 3.0;
/// Absence reason used when none is given.
pub const DEFAULT_ABSENCE_REASON: &str = "Leave";
/// Source identifier recorded on imported calendar events.
pub const EXTERNAL_SOURCE: &str = "external";
/// Title stored for calendar entries that have none.
pub const UNTITLED: &str = "Untitled";

/// Derives daily capacity from a weekly contract.
pub fn daily_capacity_for(weekly_hours: f64) -> f64 {
    weekly_hours / WORKING_DAYS_PER_WEEK
}

/// A member of staff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Employee {
    pub id: EmployeeId,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub role: Role,
    pub color: String,
    pub weekly_hours: f64,
    pub daily_capacity: f64,
}

/// Profile data sent when an employee first signs in or refreshes their profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmployeeProfile {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub weekly_hours: Option<f64>,
    /// Overrides the `weekly_hours / 5` derivation when set.
    #[serde(default)]
    pub daily_capacity: Option<f64>,
}

impl EmployeeProfile {
    /// Builds a new employee record for an externally issued id.
    pub fn into_employee(self, id: EmployeeId) -> Result<Employee, ValidationError> {
        let weekly_hours = non_negative(
            "weekly hours",
            self.weekly_hours.unwrap_or(DEFAULT_WEEKLY_HOURS),
        )?;
        let daily_capacity = match self.daily_capacity {
            Some(value) => non_negative("daily capacity", value)?,
            None => daily_capacity_for(weekly_hours),
        };
        Ok(Employee {
            id,
            email: non_blank(self.email.as_deref()),
            full_name: non_blank(self.full_name.as_deref()),
            role: self.role.unwrap_or_default(),
            color: non_blank(self.color.as_deref()).unwrap_or_else(|| DEFAULT_COLOR.to_string()),
            weekly_hours,
            daily_capacity,
        })
    }
}

/// A customer. Anonymous when `name` is absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub id: ClientId,
    pub name: Option<String>,
    pub street: Option<String>,
    pub zip_code: Option<String>,
    pub city: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Client {
    /// Anonymous clients are never matched by name.
    pub const fn is_anonymous(&self) -> bool {
        self.name.is_none()
    }
}

/// Fields for creating a client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewClient {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub street: Option<String>,
    #[serde(default)]
    pub zip_code: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl NewClient {
    /// Returns a copy with every field trimmed and blanks dropped.
    #[must_use]
    pub fn normalized(&self) -> Self {
        Self {
            name: non_blank(self.name.as_deref()),
            street: non_blank(self.street.as_deref()),
            zip_code: non_blank(self.zip_code.as_deref()),
            city: non_blank(self.city.as_deref()),
            phone: non_blank(self.phone.as_deref()),
            email: non_blank(self.email.as_deref()),
            notes: non_blank(self.notes.as_deref()),
        }
    }

    /// `street, zip, city` with empty parts left out.
    pub fn address(&self) -> Option<String> {
        let parts: Vec<&str> = [&self.street, &self.zip_code, &self.city]
            .into_iter()
            .filter_map(|part| part.as_deref().map(str::trim))
            .filter(|part| !part.is_empty())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(", "))
        }
    }
}

/// One priced line of an intervention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterventionItem {
    pub label: String,
    pub price: f64,
}

/// A scheduled job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intervention {
    pub id: InterventionId,
    pub title: String,
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: InterventionStatus,
    pub price_estimated: Option<f64>,
    /// Set when `price_estimated` was given rather than summed from the items.
    #[serde(default)]
    pub price_is_explicit: bool,
    pub is_invoice: bool,
    pub client_id: Option<ClientId>,
    /// Sorted, without duplicates.
    pub employee_ids: Vec<EmployeeId>,
    /// In display order.
    pub items: Vec<InterventionItem>,
}

impl Intervention {
    /// Wall-clock length in hours.
    #[expect(
        clippy::cast_precision_loss,
        reason = "job durations are far below f64 integer precision"
    )]
    pub fn duration_hours(&self) -> f64 {
        (self.end_time - self.start_time).num_seconds() as f64 / 3600.0
    }
}

/// Fields for creating an intervention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewIntervention {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub status: InterventionStatus,
    #[serde(default)]
    pub price_estimated: Option<f64>,
    #[serde(default)]
    pub is_invoice: bool,
    #[serde(default)]
    pub client_id: Option<ClientId>,
    #[serde(default)]
    pub employee_ids: Vec<EmployeeId>,
    #[serde(default)]
    pub items: Vec<InterventionItem>,
}

impl NewIntervention {
    /// Checks the title, time range and every price.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::Empty { field: "title" });
        }
        check_interval("intervention", self.start_time, self.end_time)?;
        if let Some(price) = self.price_estimated {
            non_negative("estimated price", price)?;
        }
        for item in &self.items {
            if item.label.trim().is_empty() {
                return Err(ValidationError::Empty { field: "item label" });
            }
            non_negative("item price", item.price)?;
        }
        Ok(())
    }

    /// The explicit price, or the sum of the items when only items are given.
    pub fn effective_price(&self) -> Option<f64> {
        derive_price(self.price_estimated, &self.items)
    }

    /// Employee ids sorted with duplicates removed.
    pub fn assignees(&self) -> Vec<EmployeeId> {
        let mut ids = self.employee_ids.clone();
        ids.sort();
        ids.dedup();
        ids
    }
}

/// Applies the price derivation rule shared by creation and updates.
pub fn derive_price(explicit: Option<f64>, items: &[InterventionItem]) -> Option<f64> {
    match explicit {
        Some(price) => Some(price),
        None if items.is_empty() => None,
        None => Some(items.iter().map(|item| item.price).sum()),
    }
}

/// Rejects intervals whose end is not after their start.
pub fn check_interval(
    field: &'static str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<(), ValidationError> {
    if end <= start {
        return Err(ValidationError::InvalidRange {
            field,
            start: start.to_rfc3339(),
            end: end.to_rfc3339(),
        });
    }
    Ok(())
}

/// A period an employee is unavailable, inclusive on both ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Absence {
    pub id: AbsenceId,
    pub employee_id: EmployeeId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub reason: String,
}

impl Absence {
    /// Whether `date` falls inside the absence (time of day is irrelevant).
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date
    }
}

/// Fields for recording an absence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAbsence {
    pub employee_id: EmployeeId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub reason: Option<String>,
}

impl NewAbsence {
    /// Validates the range and fills in the default reason.
    pub fn into_absence(self, id: AbsenceId) -> Result<Absence, ValidationError> {
        if self.end_date < self.start_date {
            return Err(ValidationError::InvalidRange {
                field: "absence",
                start: self.start_date.to_string(),
                end: self.end_date.to_string(),
            });
        }
        Ok(Absence {
            id,
            employee_id: self.employee_id,
            start_date: self.start_date,
            end_date: self.end_date,
            reason: non_blank(self.reason.as_deref())
                .unwrap_or_else(|| DEFAULT_ABSENCE_REASON.to_string()),
        })
    }
}

/// An entry imported from the external calendar, with its triage state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    pub id: RawEventId,
    pub source: String,
    pub calendar_id: String,
    pub external_id: String,
    pub summary: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub all_day: bool,
    /// Provider payload kept verbatim for audit and replay.
    pub raw_payload: serde_json::Value,
    pub status: TriageStatus,
    /// First assigned employee, kept for single-assignee consumers.
    pub employee_id: Option<EmployeeId>,
    /// In assignment order.
    pub assigned_employees: Vec<EmployeeId>,
    pub linked_intervention_id: Option<InterventionId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Refreshable content of an imported event, keyed by its natural key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEventUpsert {
    pub source: String,
    pub calendar_id: String,
    pub external_id: String,
    pub summary: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub raw_payload: serde_json::Value,
}

/// Organization-wide planning settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompanySettings {
    pub overtime_tolerance_hours: f64,
}

impl Default for CompanySettings {
    fn default() -> Self {
        Self {
            overtime_tolerance_hours: DEFAULT_OVERTIME_TOLERANCE_HOURS,
        }
    }
}
