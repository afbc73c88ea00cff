//! Imported calendar events: reconciliation upsert and triage.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use tracing::{debug, info};
use vp_core::time::format_timestamp;
use vp_core::{
    EmployeeId, RawEvent, RawEventId, RawEventUpsert, TriageAction, TriageState, TriageStatus,
};

use crate::employees::ensure_employees_exist;
use crate::{Database, DbError, json_column, placeholders, timestamp_column};

const RAW_EVENT_COLUMNS: &str = "
    id, source, calendar_id, external_id, summary, description, location,
    start_time, end_time, all_day, raw_payload, status, employee_id,
    linked_intervention_id, created_at, updated_at
";

/// Result of a reconciliation batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertStats {
    /// Events seen for the first time.
    pub inserted: usize,
    /// Existing events whose content was refreshed.
    pub refreshed: usize,
}

impl UpsertStats {
    /// Every event written, new or refreshed.
    pub const fn upserted(&self) -> usize {
        self.inserted + self.refreshed
    }
}

fn raw_event_from_row(row: &Row<'_>) -> rusqlite::Result<RawEvent> {
    Ok(RawEvent {
        id: row.get(0)?,
        source: row.get(1)?,
        calendar_id: row.get(2)?,
        external_id: row.get(3)?,
        summary: row.get(4)?,
        description: row.get(5)?,
        location: row.get(6)?,
        start_time: timestamp_column(row, 7)?,
        end_time: timestamp_column(row, 8)?,
        all_day: row.get(9)?,
        raw_payload: json_column(row, 10)?,
        status: row.get(11)?,
        employee_id: row.get(12)?,
        assigned_employees: Vec::new(),
        linked_intervention_id: row.get(13)?,
        created_at: timestamp_column(row, 14)?,
        updated_at: timestamp_column(row, 15)?,
    })
}

fn load_assignments(
    conn: &Connection,
    raw_event_id: &RawEventId,
) -> Result<Vec<EmployeeId>, DbError> {
    let mut stmt = conn.prepare_cached(
        "SELECT employee_id FROM raw_event_employees WHERE raw_event_id = ? ORDER BY position ASC",
    )?;
    let rows = stmt.query_map([raw_event_id], |row| row.get(0))?;
    let mut employees = Vec::new();
    for row in rows {
        employees.push(row?);
    }
    Ok(employees)
}

pub(crate) fn load_raw_event(
    conn: &Connection,
    id: &RawEventId,
) -> Result<Option<RawEvent>, DbError> {
    let event = conn
        .query_row(
            &format!("SELECT {RAW_EVENT_COLUMNS} FROM raw_calendar_events WHERE id = ?"),
            [id],
            raw_event_from_row,
        )
        .optional()?;
    match event {
        Some(mut event) => {
            event.assigned_employees = load_assignments(conn, &event.id)?;
            Ok(Some(event))
        }
        None => Ok(None),
    }
}

pub(crate) fn require_raw_event(conn: &Connection, id: &RawEventId) -> Result<RawEvent, DbError> {
    load_raw_event(conn, id)?.ok_or_else(|| DbError::not_found("raw event", id))
}

/// Applies `action` to the event's triage state, failing on a refused transition.
pub(crate) fn next_status(
    event: &RawEvent,
    action: TriageAction,
) -> Result<TriageStatus, DbError> {
    let state = TriageState {
        raw_event_id: event.id.as_str(),
        status: event.status,
        linked_intervention_id: event.linked_intervention_id.as_ref().map(|id| id.as_str()),
    };
    Ok(state.transition(action)?)
}

/// Recomputes the first-assignee column after the assignment set changed.
///
/// An `assigned` event left with nobody goes back to `raw`.
pub(crate) fn refresh_assignment_summary(
    conn: &Connection,
    raw_event_id: &str,
) -> Result<(), DbError> {
    conn.execute(
        "
        UPDATE raw_calendar_events
        SET employee_id = (
                SELECT employee_id FROM raw_event_employees
                WHERE raw_event_id = ?1
                ORDER BY position ASC
                LIMIT 1
            ),
            status = CASE
                WHEN status = 'assigned' AND NOT EXISTS (
                    SELECT 1 FROM raw_event_employees WHERE raw_event_id = ?1
                ) THEN 'raw'
                ELSE status
            END,
            updated_at = ?2
        WHERE id = ?1
        ",
        params![raw_event_id, format_timestamp(Utc::now())],
    )?;
    Ok(())
}

impl Database {
    /// Upserts imported events by `(source, calendar_id, external_id)`.
    ///
    /// New events start as `raw`. Existing events get their summary,
    /// description, location, times and payload refreshed while status,
    /// assignments and conversion link are left untouched. The whole batch
    /// commits atomically.
    pub fn upsert_raw_events(
        &mut self,
        events: &[RawEventUpsert],
    ) -> Result<UpsertStats, DbError> {
        let mut stats = UpsertStats::default();
        if events.is_empty() {
            return Ok(stats);
        }
        let now = format_timestamp(Utc::now());
        let tx = self.conn.transaction()?;
        {
            let mut exists = tx.prepare(
                "
                SELECT 1 FROM raw_calendar_events
                WHERE source = ? AND calendar_id = ? AND external_id = ?
                ",
            )?;
            let mut upsert = tx.prepare(
                "
                INSERT INTO raw_calendar_events
                (id, source, calendar_id, external_id, summary, description, location,
                 start_time, end_time, all_day, raw_payload, status, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, 'raw', ?, ?)
                ON CONFLICT(source, calendar_id, external_id) DO UPDATE SET
                    summary = excluded.summary,
                    description = excluded.description,
                    location = excluded.location,
                    start_time = excluded.start_time,
                    end_time = excluded.end_time,
                    raw_payload = excluded.raw_payload,
                    updated_at = excluded.updated_at
                ",
            )?;
            for event in events {
                let known =
                    exists.exists(params![event.source, event.calendar_id, event.external_id])?;
                let payload = serde_json::to_string(&event.raw_payload)?;
                upsert.execute(params![
                    RawEventId::generate(),
                    event.source,
                    event.calendar_id,
                    event.external_id,
                    event.summary,
                    event.description,
                    event.location,
                    format_timestamp(event.start_time),
                    format_timestamp(event.end_time),
                    payload,
                    now,
                    now,
                ])?;
                if known {
                    stats.refreshed += 1;
                } else {
                    stats.inserted += 1;
                }
                debug!(external_id = %event.external_id, refreshed = known, "upserted raw event");
            }
        }
        tx.commit()?;
        info!(
            inserted = stats.inserted,
            refreshed = stats.refreshed,
            "reconciled raw events"
        );
        Ok(stats)
    }

    pub fn get_raw_event(&self, id: &RawEventId) -> Result<RawEvent, DbError> {
        require_raw_event(&self.conn, id)
    }

    /// Lists raw events with one of `statuses`, ordered by start time.
    ///
    /// With a window, only events starting in `[start, end)` are returned.
    pub fn list_raw_events(
        &self,
        window: Option<(DateTime<Utc>, DateTime<Utc>)>,
        statuses: &[TriageStatus],
    ) -> Result<Vec<RawEvent>, DbError> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }
        let mut values: Vec<String> = statuses.iter().map(|s| s.as_str().to_string()).collect();
        let mut sql = format!(
            "SELECT {RAW_EVENT_COLUMNS} FROM raw_calendar_events WHERE status IN ({})",
            placeholders(statuses.len())
        );
        if let Some((start, end)) = window {
            sql.push_str(" AND start_time >= ? AND start_time < ?");
            values.push(format_timestamp(start));
            values.push(format_timestamp(end));
        }
        sql.push_str(" ORDER BY start_time ASC, id ASC");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), raw_event_from_row)?;
        let mut events = Vec::new();
        for row in rows {
            let mut event = row?;
            event.assigned_employees = load_assignments(&self.conn, &event.id)?;
            events.push(event);
        }
        Ok(events)
    }

    /// Pending (`raw` or `assigned`) events starting in `[start, end)`.
    pub fn list_raw_events_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<RawEvent>, DbError> {
        if end <= start {
            return Ok(Vec::new());
        }
        self.list_raw_events(Some((start, end)), &TriageStatus::PENDING)
    }

    /// Replaces the event's assignment set.
    ///
    /// Assigning nobody returns an `assigned` event to `raw`. Duplicate ids
    /// are ignored; order is kept and the first id becomes `employee_id`.
    pub fn assign_raw_event(
        &mut self,
        id: &RawEventId,
        employee_ids: &[EmployeeId],
    ) -> Result<RawEvent, DbError> {
        let mut employees: Vec<EmployeeId> = Vec::with_capacity(employee_ids.len());
        for employee in employee_ids {
            if !employees.contains(employee) {
                employees.push(employee.clone());
            }
        }

        let tx = self.conn.transaction()?;
        let event = require_raw_event(&tx, id)?;
        let status = next_status(
            &event,
            TriageAction::Assign {
                employees: employees.len(),
            },
        )?;
        ensure_employees_exist(&tx, &employees)?;

        tx.execute("DELETE FROM raw_event_employees WHERE raw_event_id = ?", [id])?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO raw_event_employees (raw_event_id, employee_id, position) VALUES (?, ?, ?)",
            )?;
            for (position, employee) in employees.iter().enumerate() {
                let position = i64::try_from(position).unwrap_or(i64::MAX);
                insert.execute(params![id, employee, position])?;
            }
        }
        tx.execute(
            "
            UPDATE raw_calendar_events
            SET status = ?, employee_id = ?, updated_at = ?
            WHERE id = ?
            ",
            params![status, employees.first(), format_timestamp(Utc::now()), id],
        )?;
        let updated = require_raw_event(&tx, id)?;
        tx.commit()?;

        info!(
            raw_event_id = %id,
            assigned = employees.len(),
            status = %status,
            "assigned raw event"
        );
        Ok(updated)
    }

    /// Marks the event `ignored`. Ignoring an ignored event changes nothing.
    pub fn ignore_raw_event(&mut self, id: &RawEventId) -> Result<RawEvent, DbError> {
        let tx = self.conn.transaction()?;
        let event = require_raw_event(&tx, id)?;
        let status = next_status(&event, TriageAction::Ignore)?;
        if status != event.status {
            tx.execute(
                "UPDATE raw_calendar_events SET status = ?, updated_at = ? WHERE id = ?",
                params![status, format_timestamp(Utc::now()), id],
            )?;
        }
        let updated = require_raw_event(&tx, id)?;
        tx.commit()?;
        info!(raw_event_id = %id, "ignored raw event");
        Ok(updated)
    }
}
