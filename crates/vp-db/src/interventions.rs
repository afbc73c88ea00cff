//! Intervention persistence, including the deletion coupling with raw events.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use tracing::info;
use vp_core::time::format_timestamp;
use vp_core::types::non_blank;
use vp_core::{
    ClientId, EmployeeId, Intervention, InterventionId, InterventionItem, InterventionUpdate,
    NewIntervention,
};

use crate::clients::load_client;
use crate::employees::ensure_employees_exist;
use crate::{Database, DbError, timestamp_column};

const INTERVENTION_COLUMNS: &str = "
    id, title, description, start_time, end_time, status, price_estimated,
    price_is_explicit, is_invoice, client_id
";

fn intervention_from_row(row: &Row<'_>) -> rusqlite::Result<Intervention> {
    Ok(Intervention {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        start_time: timestamp_column(row, 3)?,
        end_time: timestamp_column(row, 4)?,
        status: row.get(5)?,
        price_estimated: row.get(6)?,
        price_is_explicit: row.get(7)?,
        is_invoice: row.get(8)?,
        client_id: row.get(9)?,
        employee_ids: Vec::new(),
        items: Vec::new(),
    })
}

/// Fills in assignees and line items.
fn hydrate(conn: &Connection, intervention: &mut Intervention) -> Result<(), DbError> {
    let mut stmt = conn.prepare_cached(
        "
        SELECT employee_id FROM intervention_employees
        WHERE intervention_id = ?
        ORDER BY employee_id ASC
        ",
    )?;
    let rows = stmt.query_map([&intervention.id], |row| row.get(0))?;
    for row in rows {
        intervention.employee_ids.push(row?);
    }

    let mut stmt = conn.prepare_cached(
        "
        SELECT label, price FROM intervention_items
        WHERE intervention_id = ?
        ORDER BY position ASC
        ",
    )?;
    let rows = stmt.query_map([&intervention.id], |row| {
        Ok(InterventionItem {
            label: row.get(0)?,
            price: row.get(1)?,
        })
    })?;
    for row in rows {
        intervention.items.push(row?);
    }
    Ok(())
}

fn query_interventions(
    conn: &Connection,
    filter: &str,
    values: &[String],
) -> Result<Vec<Intervention>, DbError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {INTERVENTION_COLUMNS} FROM interventions {filter} ORDER BY start_time ASC, id ASC"
    ))?;
    let rows = stmt.query_map(params_from_iter(values.iter()), intervention_from_row)?;
    let mut interventions = Vec::new();
    for row in rows {
        let mut intervention = row?;
        hydrate(conn, &mut intervention)?;
        interventions.push(intervention);
    }
    Ok(interventions)
}

pub(crate) fn load_intervention(
    conn: &Connection,
    id: &InterventionId,
) -> Result<Option<Intervention>, DbError> {
    let intervention = conn
        .query_row(
            &format!("SELECT {INTERVENTION_COLUMNS} FROM interventions WHERE id = ?"),
            [id],
            intervention_from_row,
        )
        .optional()?;
    match intervention {
        Some(mut intervention) => {
            hydrate(conn, &mut intervention)?;
            Ok(Some(intervention))
        }
        None => Ok(None),
    }
}

pub(crate) fn list_for_client(
    conn: &Connection,
    client_id: &ClientId,
) -> Result<Vec<Intervention>, DbError> {
    query_interventions(conn, "WHERE client_id = ?", &[client_id.to_string()])
}

fn write_assignees(
    conn: &Connection,
    id: &InterventionId,
    employee_ids: &[EmployeeId],
) -> Result<(), DbError> {
    conn.execute(
        "DELETE FROM intervention_employees WHERE intervention_id = ?",
        [id],
    )?;
    let mut stmt = conn.prepare_cached(
        "INSERT OR IGNORE INTO intervention_employees (intervention_id, employee_id) VALUES (?, ?)",
    )?;
    for employee in employee_ids {
        stmt.execute(params![id, employee])?;
    }
    Ok(())
}

fn write_items(
    conn: &Connection,
    id: &InterventionId,
    items: &[InterventionItem],
) -> Result<(), DbError> {
    conn.execute("DELETE FROM intervention_items WHERE intervention_id = ?", [id])?;
    let mut stmt = conn.prepare_cached(
        "INSERT INTO intervention_items (intervention_id, position, label, price) VALUES (?, ?, ?, ?)",
    )?;
    for (position, item) in items.iter().enumerate() {
        let position = i64::try_from(position).unwrap_or(i64::MAX);
        stmt.execute(params![id, position, item.label.trim(), item.price])?;
    }
    Ok(())
}

fn check_references(
    conn: &Connection,
    client_id: Option<&ClientId>,
    employee_ids: &[EmployeeId],
) -> Result<(), DbError> {
    if let Some(client_id) = client_id {
        load_client(conn, client_id)?.ok_or_else(|| DbError::not_found("client", client_id))?;
    }
    ensure_employees_exist(conn, employee_ids)
}

/// Validates and inserts an intervention with its assignees and items.
///
/// Runs on the caller's connection so conversions can share their transaction.
pub(crate) fn insert_intervention(
    conn: &Connection,
    new: &NewIntervention,
) -> Result<Intervention, DbError> {
    new.validate()?;
    let employee_ids = new.assignees();
    check_references(conn, new.client_id.as_ref(), &employee_ids)?;

    let intervention = Intervention {
        id: InterventionId::generate(),
        title: new.title.trim().to_string(),
        description: non_blank(new.description.as_deref()),
        start_time: new.start_time,
        end_time: new.end_time,
        status: new.status,
        price_estimated: new.effective_price(),
        price_is_explicit: new.price_estimated.is_some(),
        is_invoice: new.is_invoice,
        client_id: new.client_id.clone(),
        employee_ids,
        items: new.items.clone(),
    };
    let now = format_timestamp(Utc::now());
    conn.execute(
        "
        INSERT INTO interventions
        (id, title, description, start_time, end_time, status, price_estimated,
         price_is_explicit, is_invoice, client_id, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ",
        params![
            intervention.id,
            intervention.title,
            intervention.description,
            format_timestamp(intervention.start_time),
            format_timestamp(intervention.end_time),
            intervention.status,
            intervention.price_estimated,
            intervention.price_is_explicit,
            intervention.is_invoice,
            intervention.client_id,
            now,
            now,
        ],
    )?;
    write_assignees(conn, &intervention.id, &intervention.employee_ids)?;
    write_items(conn, &intervention.id, &intervention.items)?;
    Ok(intervention)
}

impl Database {
    /// Creates an intervention, its assignments and its items atomically.
    pub fn create_intervention(&mut self, new: &NewIntervention) -> Result<Intervention, DbError> {
        let tx = self.conn.transaction()?;
        let intervention = insert_intervention(&tx, new)?;
        tx.commit()?;
        info!(intervention_id = %intervention.id, "created intervention");
        Ok(intervention)
    }

    pub fn get_intervention(&self, id: &InterventionId) -> Result<Intervention, DbError> {
        load_intervention(&self.conn, id)?.ok_or_else(|| DbError::not_found("intervention", id))
    }

    /// Interventions starting in `[start, end)`, ordered by start time.
    pub fn list_interventions(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Intervention>, DbError> {
        if end <= start {
            return Ok(Vec::new());
        }
        query_interventions(
            &self.conn,
            "WHERE start_time >= ? AND start_time < ?",
            &[format_timestamp(start), format_timestamp(end)],
        )
    }

    /// Applies an explicit update command and returns the stored result.
    pub fn update_intervention(
        &mut self,
        id: &InterventionId,
        update: &InterventionUpdate,
    ) -> Result<Intervention, DbError> {
        let tx = self.conn.transaction()?;
        let existing = load_intervention(&tx, id)?
            .ok_or_else(|| DbError::not_found("intervention", id))?;
        let updated = update.apply(&existing)?;
        check_references(&tx, updated.client_id.as_ref(), &updated.employee_ids)?;

        tx.execute(
            "
            UPDATE interventions
            SET title = ?, description = ?, start_time = ?, end_time = ?, status = ?,
                price_estimated = ?, price_is_explicit = ?, is_invoice = ?, client_id = ?,
                updated_at = ?
            WHERE id = ?
            ",
            params![
                updated.title,
                updated.description,
                format_timestamp(updated.start_time),
                format_timestamp(updated.end_time),
                updated.status,
                updated.price_estimated,
                updated.price_is_explicit,
                updated.is_invoice,
                updated.client_id,
                format_timestamp(Utc::now()),
                id,
            ],
        )?;
        if update.employee_ids.is_some() {
            write_assignees(&tx, id, &updated.employee_ids)?;
        }
        if update.items.is_some() {
            write_items(&tx, id, &updated.items)?;
        }
        tx.commit()?;
        info!(intervention_id = %id, "updated intervention");
        Ok(updated)
    }

    /// Deletes an intervention and returns its source raw events to `raw`.
    ///
    /// Returns how many raw events were detached.
    pub fn delete_intervention(&mut self, id: &InterventionId) -> Result<usize, DbError> {
        let tx = self.conn.transaction()?;
        if load_intervention(&tx, id)?.is_none() {
            return Err(DbError::not_found("intervention", id));
        }
        let detached = tx.execute(
            "
            UPDATE raw_calendar_events
            SET status = 'raw', linked_intervention_id = NULL, updated_at = ?
            WHERE linked_intervention_id = ?
            ",
            params![format_timestamp(Utc::now()), id],
        )?;
        tx.execute("DELETE FROM interventions WHERE id = ?", [id])?;
        tx.commit()?;
        info!(intervention_id = %id, detached, "deleted intervention");
        Ok(detached)
    }
}
