//! Company settings, stored as a single row.

use rusqlite::OptionalExtension;
use tracing::info;
use vp_core::CompanySettings;
use vp_core::types::non_negative;

use crate::{Database, DbError};

impl Database {
    /// Current settings, or the defaults when none were saved.
    pub fn settings(&self) -> Result<CompanySettings, DbError> {
        let tolerance: Option<f64> = self
            .conn
            .query_row(
                "SELECT overtime_tolerance_hours FROM company_settings WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(tolerance.map_or_else(CompanySettings::default, |overtime_tolerance_hours| {
            CompanySettings {
                overtime_tolerance_hours,
            }
        }))
    }

    pub fn set_overtime_tolerance(&mut self, hours: f64) -> Result<CompanySettings, DbError> {
        let hours = non_negative("overtime tolerance", hours)?;
        self.conn.execute(
            "
            INSERT INTO company_settings (id, overtime_tolerance_hours) VALUES (1, ?)
            ON CONFLICT(id) DO UPDATE SET overtime_tolerance_hours = excluded.overtime_tolerance_hours
            ",
            [hours],
        )?;
        info!(overtime_tolerance_hours = hours, "updated company settings");
        Ok(CompanySettings {
            overtime_tolerance_hours: hours,
        })
    }
}
