//! Employee persistence.

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::{debug, info};
use vp_core::time::format_timestamp;
use vp_core::types::non_blank;
use vp_core::{Employee, EmployeeId, EmployeeProfile, EmployeeUpdate};

use crate::{Database, DbError, raw_events};

const EMPLOYEE_COLUMNS: &str = "id, email, full_name, role, color, weekly_hours, daily_capacity";

fn employee_from_row(row: &Row<'_>) -> rusqlite::Result<Employee> {
    Ok(Employee {
        id: row.get(0)?,
        email: row.get(1)?,
        full_name: row.get(2)?,
        role: row.get(3)?,
        color: row.get(4)?,
        weekly_hours: row.get(5)?,
        daily_capacity: row.get(6)?,
    })
}

pub(crate) fn load_employee(
    conn: &Connection,
    id: &EmployeeId,
) -> Result<Option<Employee>, DbError> {
    let employee = conn
        .query_row(
            &format!("SELECT {EMPLOYEE_COLUMNS} FROM employees WHERE id = ?"),
            [id],
            employee_from_row,
        )
        .optional()?;
    Ok(employee)
}

/// Fails with `NotFound` for the first id that has no employee row.
pub(crate) fn ensure_employees_exist(
    conn: &Connection,
    ids: &[EmployeeId],
) -> Result<(), DbError> {
    let mut stmt = conn.prepare("SELECT 1 FROM employees WHERE id = ?")?;
    for id in ids {
        if !stmt.exists([id])? {
            return Err(DbError::not_found("employee", id));
        }
    }
    Ok(())
}

fn write_employee(conn: &Connection, employee: &Employee) -> Result<(), DbError> {
    let now = format_timestamp(Utc::now());
    conn.execute(
        "
        UPDATE employees
        SET email = ?, full_name = ?, role = ?, color = ?, weekly_hours = ?,
            daily_capacity = ?, updated_at = ?
        WHERE id = ?
        ",
        params![
            employee.email,
            employee.full_name,
            employee.role,
            employee.color,
            employee.weekly_hours,
            employee.daily_capacity,
            now,
            employee.id,
        ],
    )?;
    Ok(())
}

impl Database {
    /// Inserts a new employee. Fails with `Conflict` if the id is taken.
    pub fn create_employee(&mut self, employee: &Employee) -> Result<(), DbError> {
        let now = format_timestamp(Utc::now());
        let inserted = self.conn.execute(
            "
            INSERT OR IGNORE INTO employees
            (id, email, full_name, role, color, weekly_hours, daily_capacity, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
            params![
                employee.id,
                employee.email,
                employee.full_name,
                employee.role,
                employee.color,
                employee.weekly_hours,
                employee.daily_capacity,
                now,
                now,
            ],
        )?;
        if inserted == 0 {
            return Err(DbError::Conflict(format!(
                "employee {} already exists",
                employee.id
            )));
        }
        info!(employee_id = %employee.id, "created employee");
        Ok(())
    }

    /// Creates the employee on first sign-in, or refreshes its profile.
    ///
    /// The role in `profile` only applies on creation; changing an existing
    /// employee's role goes through [`Database::update_employee`].
    /// Returns the stored employee and whether it was created.
    pub fn sync_profile(
        &mut self,
        id: &EmployeeId,
        profile: &EmployeeProfile,
    ) -> Result<(Employee, bool), DbError> {
        let tx = self.conn.transaction()?;
        let result = if let Some(existing) = load_employee(&tx, id)? {
            let update = EmployeeUpdate {
                full_name: profile.full_name.clone(),
                color: profile.color.clone(),
                role: None,
                weekly_hours: profile.weekly_hours,
                daily_capacity: profile.daily_capacity,
            };
            let mut updated = update.apply(&existing)?;
            if let Some(email) = non_blank(profile.email.as_deref()) {
                updated.email = Some(email);
            }
            write_employee(&tx, &updated)?;
            (updated, false)
        } else {
            let employee = profile.clone().into_employee(id.clone())?;
            let now = format_timestamp(Utc::now());
            tx.execute(
                "
                INSERT INTO employees
                (id, email, full_name, role, color, weekly_hours, daily_capacity, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                ",
                params![
                    employee.id,
                    employee.email,
                    employee.full_name,
                    employee.role,
                    employee.color,
                    employee.weekly_hours,
                    employee.daily_capacity,
                    now,
                    now,
                ],
            )?;
            (employee, true)
        };
        tx.commit()?;
        debug!(employee_id = %id, created = result.1, "synced employee profile");
        Ok(result)
    }

    pub fn get_employee(&self, id: &EmployeeId) -> Result<Employee, DbError> {
        load_employee(&self.conn, id)?.ok_or_else(|| DbError::not_found("employee", id))
    }

    /// Lists employees ordered by name, then id.
    pub fn list_employees(&self) -> Result<Vec<Employee>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {EMPLOYEE_COLUMNS} FROM employees ORDER BY full_name ASC, id ASC"
        ))?;
        let rows = stmt.query_map([], employee_from_row)?;
        let mut employees = Vec::new();
        for row in rows {
            employees.push(row?);
        }
        Ok(employees)
    }

    pub fn count_employees(&self) -> Result<usize, DbError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM employees", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    /// Applies an explicit update command and returns the stored result.
    pub fn update_employee(
        &mut self,
        id: &EmployeeId,
        update: &EmployeeUpdate,
    ) -> Result<Employee, DbError> {
        let tx = self.conn.transaction()?;
        let existing = load_employee(&tx, id)?.ok_or_else(|| DbError::not_found("employee", id))?;
        let updated = update.apply(&existing)?;
        write_employee(&tx, &updated)?;
        tx.commit()?;
        info!(employee_id = %id, "updated employee");
        Ok(updated)
    }

    /// Deletes an employee after detaching every association.
    ///
    /// Interventions and raw events they were assigned to are kept. Raw
    /// events lose the employee from their assignment set; their first
    /// assignee and triage status are recomputed. Absences go with the employee.
    pub fn delete_employee(&mut self, id: &EmployeeId) -> Result<(), DbError> {
        let tx = self.conn.transaction()?;
        if load_employee(&tx, id)?.is_none() {
            return Err(DbError::not_found("employee", id));
        }

        let detached_interventions = tx.execute(
            "DELETE FROM intervention_employees WHERE employee_id = ?",
            [id],
        )?;

        let affected_raw_events: Vec<String> = {
            let mut stmt =
                tx.prepare("SELECT raw_event_id FROM raw_event_employees WHERE employee_id = ?")?;
            let rows = stmt.query_map([id], |row| row.get(0))?;
            rows.collect::<Result<_, _>>()?
        };
        tx.execute("DELETE FROM raw_event_employees WHERE employee_id = ?", [id])?;
        tx.execute(
            "UPDATE raw_calendar_events SET employee_id = NULL WHERE employee_id = ?",
            [id],
        )?;
        for raw_event_id in &affected_raw_events {
            raw_events::refresh_assignment_summary(&tx, raw_event_id)?;
        }

        let removed_absences = tx.execute("DELETE FROM absences WHERE employee_id = ?", [id])?;
        tx.execute("DELETE FROM employees WHERE id = ?", [id])?;
        tx.commit()?;

        info!(
            employee_id = %id,
            detached_interventions,
            detached_raw_events = affected_raw_events.len(),
            removed_absences,
            "deleted employee"
        );
        Ok(())
    }
}
