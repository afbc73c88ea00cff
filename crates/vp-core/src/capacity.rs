//! Daily capacity and load planning.
//!
//! # Algorithm
//!
//! 1. An employee is present on a date unless one of their absences covers it
//!    (calendar dates only, both ends inclusive).
//! 2. Capacity is the sum of `daily_capacity` over present employees.
//! 3. Each intervention starting on the date (in the business timezone)
//!    consumes its wall-clock duration times `max(1, assignees)`.
//! 4. Planned hours above capacity give `warning`; above capacity plus the
//!    overtime tolerance give `overload`.
//!
//! Everything here is a pure function of its inputs so callers can recompute
//! after any employee or absence change.

use std::collections::{BTreeMap, HashSet};

use chrono::{NaiveDate, TimeZone};
use serde::Serialize;

use crate::model::{Absence, CompanySettings, Employee, Intervention};
use crate::time::{dates_inclusive, local_date};
use crate::types::{EmployeeId, ValidationError};

/// Longest span a range query may cover.
pub const MAX_RANGE_DAYS: i64 = 366;

/// Load verdict for a day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadStatus {
    Ok,
    Warning,
    Overload,
}

impl LoadStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Warning => "warning",
            Self::Overload => "overload",
        }
    }

    fn classify(planned: f64, capacity: f64, tolerance: f64) -> Self {
        if planned > capacity + tolerance {
            Self::Overload
        } else if planned > capacity {
            Self::Warning
        } else {
            Self::Ok
        }
    }
}

impl std::fmt::Display for LoadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capacity figures for one date.
///
/// Hours are rounded to one decimal for display; the status is decided on the
/// unrounded values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayStats {
    pub date: NaiveDate,
    pub capacity_hours: f64,
    pub planned_hours: f64,
    pub tolerance: f64,
    pub present_employees: usize,
    pub status: LoadStatus,
}

/// Everything the calculator reads.
///
/// `interventions` may cover more than the requested days; each day only
/// counts the ones that start on it.
#[derive(Debug, Clone, Copy)]
pub struct PlanningInput<'a, Tz: TimeZone> {
    pub tz: &'a Tz,
    pub settings: CompanySettings,
    pub employees: &'a [Employee],
    pub absences: &'a [Absence],
    pub interventions: &'a [Intervention],
}

/// Computes the load verdict for `date`.
pub fn day_stats<Tz: TimeZone>(date: NaiveDate, input: &PlanningInput<'_, Tz>) -> DayStats {
    let absent: HashSet<&EmployeeId> = input
        .absences
        .iter()
        .filter(|absence| absence.covers(date))
        .map(|absence| &absence.employee_id)
        .collect();

    let present: Vec<&Employee> = input
        .employees
        .iter()
        .filter(|employee| !absent.contains(&employee.id))
        .collect();
    let capacity: f64 = present.iter().map(|employee| employee.daily_capacity).sum();

    let planned: f64 = input
        .interventions
        .iter()
        .filter(|intervention| local_date(input.tz, intervention.start_time) == date)
        .map(consumed_hours)
        .sum();

    let tolerance = input.settings.overtime_tolerance_hours;
    DayStats {
        date,
        capacity_hours: round_tenth(capacity),
        planned_hours: round_tenth(planned),
        tolerance,
        present_employees: present.len(),
        status: LoadStatus::classify(planned, capacity, tolerance),
    }
}

/// Computes [`day_stats`] for every date of an inclusive span, keyed by ISO date.
pub fn range_stats<Tz: TimeZone>(
    start: NaiveDate,
    end: NaiveDate,
    input: &PlanningInput<'_, Tz>,
) -> Result<BTreeMap<String, DayStats>, ValidationError> {
    if end < start {
        return Err(ValidationError::InvalidRange {
            field: "date range",
            start: start.to_string(),
            end: end.to_string(),
        });
    }
    let days = (end - start).num_days() + 1;
    if days > MAX_RANGE_DAYS {
        return Err(ValidationError::RangeTooLong {
            days,
            max: MAX_RANGE_DAYS,
        });
    }
    Ok(dates_inclusive(start, end)
        .map(|date| (date.format("%Y-%m-%d").to_string(), day_stats(date, input)))
        .collect())
}

/// Hours of capacity an intervention uses: one block per assignee, at least one.
fn consumed_hours(intervention: &Intervention) -> f64 {
    let people = intervention.employee_ids.len().max(1);
    #[expect(
        clippy::cast_precision_loss,
        reason = "team sizes are tiny compared to f64 precision"
    )]
    let people = people as f64;
    intervention.duration_hours() * people
}

fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{DateTime, Utc};
    use chrono_tz::Europe::Brussels;

    use crate::model::{DEFAULT_WEEKLY_HOURS, daily_capacity_for};
    use crate::status::{InterventionStatus, Role};
    use crate::types::{AbsenceId, InterventionId};

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, 10).unwrap()
    }

    fn employee(id: &str) -> Employee {
        Employee {
            id: EmployeeId::new(id).unwrap(),
            email: None,
            full_name: None,
            role: Role::Employee,
            color: "#3B82F6".to_string(),
            weekly_hours: DEFAULT_WEEKLY_HOURS,
            daily_capacity: daily_capacity_for(DEFAULT_WEEKLY_HOURS),
        }
    }

    fn absence(employee: &str, from: NaiveDate, to: NaiveDate) -> Absence {
        Absence {
            id: AbsenceId::generate(),
            employee_id: EmployeeId::new(employee).unwrap(),
            start_date: from,
            end_date: to,
            reason: "Leave".to_string(),
        }
    }

    fn at(rfc3339: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(rfc3339)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn intervention(start: &str, end: &str, employees: &[&str]) -> Intervention {
        Intervention {
            id: InterventionId::generate(),
            title: "Vitres".to_string(),
            description: None,
            start_time: at(start),
            end_time: at(end),
            status: InterventionStatus::Planned,
            price_estimated: None,
            price_is_explicit: false,
            is_invoice: false,
            client_id: None,
            employee_ids: employees
                .iter()
                .map(|id| EmployeeId::new(*id).unwrap())
                .collect(),
            items: Vec::new(),
        }
    }

    fn input<'a>(
        employees: &'a [Employee],
        absences: &'a [Absence],
        interventions: &'a [Intervention],
    ) -> PlanningInput<'a, chrono_tz::Tz> {
        PlanningInput {
            tz: &Brussels,
            settings: CompanySettings::default(),
            employees,
            absences,
            interventions,
        }
    }

    #[test]
    fn absent_employee_is_excluded_and_single_job_is_ok() {
        let employees = [employee("emp-a"), employee("emp-b")];
        let absences = [absence("emp-b", day(), day())];
        let interventions = [intervention(
            "2026-02-10T09:00:00+01:00",
            "2026-02-10T13:00:00+01:00",
            &["emp-a"],
        )];
        let stats = day_stats(day(), &input(&employees, &absences, &interventions));

        assert_eq!(stats.present_employees, 1);
        assert!((stats.capacity_hours - 7.6).abs() < 1e-9);
        assert!((stats.planned_hours - 4.0).abs() < 1e-9);
        assert_eq!(stats.status, LoadStatus::Ok);
    }

    #[test]
    fn unassigned_job_counts_once_and_tips_into_overload() {
        let employees = [employee("emp-a"), employee("emp-b")];
        let absences = [absence("emp-b", day(), day())];
        let interventions = [
            intervention(
                "2026-02-10T09:00:00+01:00",
                "2026-02-10T13:00:00+01:00",
                &["emp-a"],
            ),
            intervention("2026-02-10T09:00:00+01:00", "2026-02-10T17:00:00+01:00", &[]),
        ];
        let stats = day_stats(day(), &input(&employees, &absences, &interventions));

        assert!((stats.planned_hours - 12.0).abs() < 1e-9);
        assert_eq!(stats.status, LoadStatus::Overload);
    }

    #[test]
    fn team_jobs_consume_duration_per_assignee() {
        let employees = [employee("emp-a"), employee("emp-b")];
        let interventions = [intervention(
            "2026-02-10T08:00:00+01:00",
            "2026-02-10T16:00:00+01:00",
            &["emp-a", "emp-b"],
        )];
        let stats = day_stats(day(), &input(&employees, &[], &interventions));

        assert!((stats.capacity_hours - 15.2).abs() < 1e-9);
        assert!((stats.planned_hours - 16.0).abs() < 1e-9);
        assert_eq!(stats.status, LoadStatus::Warning);
    }

    #[test]
    fn start_date_is_taken_in_business_timezone() {
        // 23:30 UTC on the 9th is 00:30 on the 10th in Brussels.
        let interventions = [intervention(
            "2026-02-09T23:30:00Z",
            "2026-02-10T01:30:00Z",
            &[],
        )];
        let employees = [employee("emp-a")];
        let on_tenth = day_stats(day(), &input(&employees, &[], &interventions));
        let on_ninth = day_stats(
            day().pred_opt().unwrap(),
            &input(&employees, &[], &interventions),
        );

        assert!((on_tenth.planned_hours - 2.0).abs() < 1e-9);
        assert!(on_ninth.planned_hours.abs() < f64::EPSILON);
    }

    #[test]
    fn capacity_follows_absence_changes() {
        let employees = [employee("emp-a"), employee("emp-b")];
        let before = day_stats(day(), &input(&employees, &[], &[]));
        let absences = [absence(
            "emp-a",
            NaiveDate::from_ymd_opt(2026, 2, 1).unwrap(),
            NaiveDate::from_ymd_opt(2026, 2, 28).unwrap(),
        )];
        let after = day_stats(day(), &input(&employees, &absences, &[]));

        assert!((before.capacity_hours - 15.2).abs() < 1e-9);
        assert!((after.capacity_hours - 7.6).abs() < 1e-9);
        assert_eq!(after.present_employees, 1);
    }

    #[test]
    fn range_is_keyed_by_iso_date() {
        let employees = [employee("emp-a")];
        let start = NaiveDate::from_ymd_opt(2026, 2, 9).unwrap();
        let end = NaiveDate::from_ymd_opt(2026, 2, 11).unwrap();
        let stats = range_stats(start, end, &input(&employees, &[], &[])).unwrap();

        let keys: Vec<&str> = stats.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["2026-02-09", "2026-02-10", "2026-02-11"]);
        assert!(stats.values().all(|day| day.status == LoadStatus::Ok));
    }

    #[test]
    fn range_rejects_inverted_and_oversized_spans() {
        let start = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2027, 1, 2).unwrap();
        assert!(matches!(
            range_stats(start, end, &input(&[], &[], &[])),
            Err(ValidationError::RangeTooLong { days: 367, .. })
        ));
        assert!(matches!(
            range_stats(end, start, &input(&[], &[], &[])),
            Err(ValidationError::InvalidRange { .. })
        ));
    }

    #[test]
    fn serializes_status_in_lowercase() {
        let stats = day_stats(day(), &input(&[], &[], &[]));
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["date"], "2026-02-10");
    }
}
