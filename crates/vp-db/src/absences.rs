//! Absence persistence.

use chrono::NaiveDate;
use rusqlite::{Row, params};
use tracing::info;
use vp_core::{Absence, AbsenceId, EmployeeId, NewAbsence};

use crate::employees::ensure_employees_exist;
use crate::{Database, DbError, date_column, format_date};

const ABSENCE_COLUMNS: &str = "id, employee_id, start_date, end_date, reason";

fn absence_from_row(row: &Row<'_>) -> rusqlite::Result<Absence> {
    Ok(Absence {
        id: row.get(0)?,
        employee_id: row.get(1)?,
        start_date: date_column(row, 2)?,
        end_date: date_column(row, 3)?,
        reason: row.get(4)?,
    })
}

impl Database {
    fn query_absences(&self, filter: &str, values: &[String]) -> Result<Vec<Absence>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ABSENCE_COLUMNS} FROM absences {filter} ORDER BY start_date ASC, id ASC"
        ))?;
        let rows = stmt.query_map(rusqlite::params_from_iter(values.iter()), absence_from_row)?;
        let mut absences = Vec::new();
        for row in rows {
            absences.push(row?);
        }
        Ok(absences)
    }

    /// Records an absence for an existing employee.
    pub fn create_absence(&mut self, new: NewAbsence) -> Result<Absence, DbError> {
        let absence = new.into_absence(AbsenceId::generate())?;
        ensure_employees_exist(&self.conn, std::slice::from_ref(&absence.employee_id))?;
        self.conn.execute(
            "
            INSERT INTO absences (id, employee_id, start_date, end_date, reason)
            VALUES (?, ?, ?, ?, ?)
            ",
            params![
                absence.id,
                absence.employee_id,
                format_date(absence.start_date),
                format_date(absence.end_date),
                absence.reason,
            ],
        )?;
        info!(absence_id = %absence.id, employee_id = %absence.employee_id, "recorded absence");
        Ok(absence)
    }

    pub fn list_absences_for_employee(
        &self,
        employee_id: &EmployeeId,
    ) -> Result<Vec<Absence>, DbError> {
        self.query_absences("WHERE employee_id = ?", &[employee_id.to_string()])
    }

    /// Absences covering `date`.
    pub fn list_absences_on(&self, date: NaiveDate) -> Result<Vec<Absence>, DbError> {
        self.list_absences_between(date, date)
    }

    /// Absences overlapping the inclusive range `[start, end]`.
    pub fn list_absences_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Absence>, DbError> {
        if end < start {
            return Ok(Vec::new());
        }
        self.query_absences(
            "WHERE start_date <= ? AND end_date >= ?",
            &[format_date(end), format_date(start)],
        )
    }

    pub fn delete_absence(&mut self, id: &AbsenceId) -> Result<(), DbError> {
        let deleted = self
            .conn
            .execute("DELETE FROM absences WHERE id = ?", [id])?;
        if deleted == 0 {
            return Err(DbError::not_found("absence", id));
        }
        info!(absence_id = %id, "deleted absence");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::add_employee;

    fn date(value: &str) -> NaiveDate {
        vp_core::time::parse_date(value).unwrap()
    }

    fn leave(employee_id: &EmployeeId, start: &str, end: &str) -> NewAbsence {
        NewAbsence {
            employee_id: employee_id.clone(),
            start_date: date(start),
            end_date: date(end),
            reason: None,
        }
    }

    #[test]
    fn absence_covers_inclusive_dates() {
        let mut db = Database::open_in_memory().unwrap();
        let a = add_employee(&mut db, "emp-a");
        let absence = db
            .create_absence(leave(&a.id, "2026-02-10", "2026-02-12"))
            .unwrap();
        assert_eq!(absence.reason, vp_core::model::DEFAULT_ABSENCE_REASON);

        assert_eq!(db.list_absences_on(date("2026-02-10")).unwrap().len(), 1);
        assert_eq!(db.list_absences_on(date("2026-02-12")).unwrap().len(), 1);
        assert!(db.list_absences_on(date("2026-02-13")).unwrap().is_empty());
        assert_eq!(
            db.list_absences_between(date("2026-02-01"), date("2026-02-10"))
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn inverted_absence_is_rejected() {
        let mut db = Database::open_in_memory().unwrap();
        let a = add_employee(&mut db, "emp-a");
        let err = db
            .create_absence(leave(&a.id, "2026-02-12", "2026-02-10"))
            .unwrap_err();
        assert!(matches!(err, DbError::Validation(_)));
    }

    #[test]
    fn absence_needs_known_employee() {
        let mut db = Database::open_in_memory().unwrap();
        let ghost = EmployeeId::new("ghost").unwrap();
        let err = db
            .create_absence(leave(&ghost, "2026-02-10", "2026-02-10"))
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { entity: "employee", .. }));
    }

    #[test]
    fn delete_absence_then_missing() {
        let mut db = Database::open_in_memory().unwrap();
        let a = add_employee(&mut db, "emp-a");
        let absence = db
            .create_absence(leave(&a.id, "2026-02-10", "2026-02-10"))
            .unwrap();
        assert_eq!(db.list_absences_for_employee(&a.id).unwrap().len(), 1);

        db.delete_absence(&absence.id).unwrap();
        assert!(db.list_absences_for_employee(&a.id).unwrap().is_empty());
        assert!(matches!(
            db.delete_absence(&absence.id),
            Err(DbError::NotFound { .. })
        ));
    }
}
