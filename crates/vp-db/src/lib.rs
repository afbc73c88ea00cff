//! Storage layer for field-service scheduling.
//!
//! Provides persistence for employees, clients, interventions, absences,
//! imported calendar events and company settings using `rusqlite`.
//!
//! # Thread Safety
//!
//! The [`Database`] type wraps a `rusqlite::Connection`, which is `Send` but not `Sync`.
//! Open one handle per unit of work and pass it down; there is no global connection.
//!
//! # Schema
//!
//! ## Timestamp Format
//!
//! Instants are stored as TEXT in RFC 3339 UTC with millisecond precision
//! (e.g., `2026-02-10T08:00:00.000Z`). The fixed width keeps lexicographic
//! ordering equal to chronological ordering, so range filters compare strings.
//! Calendar dates (absences) are stored as `YYYY-MM-DD`.
//!
//! ## Raw Payload Storage
//!
//! `raw_calendar_events.raw_payload` keeps the provider's JSON verbatim for
//! audit and replay. Nothing in this crate reads fields out of it.
//!
//! ## Atomicity
//!
//! Every operation that writes more than one row runs in a single
//! transaction. In particular an intervention is never committed without the
//! raw events it came from being marked `converted`, and deleting an
//! intervention resets those events in the same transaction.

mod absences;
mod clients;
mod conversion;
mod employees;
mod interventions;
mod raw_events;
mod settings;

use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, Row};
use thiserror::Error;
use vp_core::time::{parse_date, parse_timestamp};
use vp_core::{ErrorKind, TriageError, ValidationError};

pub use clients::ClientDetail;
pub use conversion::Conversion;
pub use raw_events::UpsertStats;

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// A referenced record does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    /// The write clashes with existing rows.
    #[error("{0}")]
    Conflict(String),
    /// Input failed domain validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// A raw event refused the requested triage transition.
    #[error(transparent)]
    Triage(#[from] TriageError),
    /// A stored or supplied JSON payload could not be (de)serialized.
    #[error("invalid payload JSON: {0}")]
    Payload(#[from] serde_json::Error),
}

impl DbError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Conflict(_) | Self::Triage(_) => ErrorKind::Conflict,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Sqlite(_) | Self::Payload(_) => ErrorKind::Internal,
        }
    }

    pub const fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self) -> Result<(), DbError> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS employees (
                id TEXT PRIMARY KEY,
                email TEXT,
                full_name TEXT,
                role TEXT NOT NULL DEFAULT 'employee',
                color TEXT NOT NULL DEFAULT '#3B82F6',
                weekly_hours REAL NOT NULL DEFAULT 38.0,
                daily_capacity REAL NOT NULL DEFAULT 7.6,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            -- name is NULL for anonymous clients
            -- name_key: lower-cased name used for case-insensitive lookup
            CREATE TABLE IF NOT EXISTS clients (
                id TEXT PRIMARY KEY,
                name TEXT,
                name_key TEXT,
                street TEXT,
                zip_code TEXT,
                city TEXT,
                address TEXT,
                phone TEXT,
                email TEXT,
                notes TEXT,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_clients_name_key ON clients(name_key);

            CREATE TABLE IF NOT EXISTS interventions (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                description TEXT,
                start_time TEXT NOT NULL,
                end_time TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'planned',
                price_estimated REAL,
                price_is_explicit INTEGER NOT NULL DEFAULT 0,
                is_invoice INTEGER NOT NULL DEFAULT 0,
                client_id TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                CHECK (end_time > start_time),
                FOREIGN KEY (client_id) REFERENCES clients(id)
            );

            CREATE INDEX IF NOT EXISTS idx_interventions_start ON interventions(start_time);
            CREATE INDEX IF NOT EXISTS idx_interventions_client ON interventions(client_id);

            CREATE TABLE IF NOT EXISTS intervention_employees (
                intervention_id TEXT NOT NULL,
                employee_id TEXT NOT NULL,
                PRIMARY KEY (intervention_id, employee_id),
                FOREIGN KEY (intervention_id) REFERENCES interventions(id) ON DELETE CASCADE,
                FOREIGN KEY (employee_id) REFERENCES employees(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_intervention_employees_employee
                ON intervention_employees(employee_id);

            CREATE TABLE IF NOT EXISTS intervention_items (
                intervention_id TEXT NOT NULL,
                position INTEGER NOT NULL,
                label TEXT NOT NULL,
                price REAL NOT NULL CHECK (price >= 0),
                PRIMARY KEY (intervention_id, position),
                FOREIGN KEY (intervention_id) REFERENCES interventions(id) ON DELETE CASCADE
            );

            -- start_date/end_date: inclusive calendar dates (YYYY-MM-DD)
            CREATE TABLE IF NOT EXISTS absences (
                id TEXT PRIMARY KEY,
                employee_id TEXT NOT NULL,
                start_date TEXT NOT NULL,
                end_date TEXT NOT NULL,
                reason TEXT NOT NULL,
                CHECK (end_date >= start_date),
                FOREIGN KEY (employee_id) REFERENCES employees(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_absences_employee ON absences(employee_id);
            CREATE INDEX IF NOT EXISTS idx_absences_dates ON absences(start_date, end_date);

            -- Imported calendar entries, unique per (source, calendar_id, external_id)
            -- employee_id: first assigned employee, kept for single-assignee readers
            CREATE TABLE IF NOT EXISTS raw_calendar_events (
                id TEXT PRIMARY KEY,
                source TEXT NOT NULL,
                calendar_id TEXT NOT NULL,
                external_id TEXT NOT NULL,
                summary TEXT NOT NULL,
                description TEXT,
                location TEXT,
                start_time TEXT NOT NULL,
                end_time TEXT NOT NULL,
                all_day INTEGER NOT NULL DEFAULT 0,
                raw_payload TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'raw',
                employee_id TEXT,
                linked_intervention_id TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (source, calendar_id, external_id),
                FOREIGN KEY (employee_id) REFERENCES employees(id) ON DELETE SET NULL,
                FOREIGN KEY (linked_intervention_id) REFERENCES interventions(id) ON DELETE SET NULL
            );

            CREATE INDEX IF NOT EXISTS idx_raw_events_start ON raw_calendar_events(start_time);
            CREATE INDEX IF NOT EXISTS idx_raw_events_status ON raw_calendar_events(status);
            CREATE INDEX IF NOT EXISTS idx_raw_events_link
                ON raw_calendar_events(linked_intervention_id);

            CREATE TABLE IF NOT EXISTS raw_event_employees (
                raw_event_id TEXT NOT NULL,
                employee_id TEXT NOT NULL,
                position INTEGER NOT NULL,
                PRIMARY KEY (raw_event_id, employee_id),
                FOREIGN KEY (raw_event_id) REFERENCES raw_calendar_events(id) ON DELETE CASCADE,
                FOREIGN KEY (employee_id) REFERENCES employees(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS company_settings (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                overtime_tolerance_hours REAL NOT NULL
            );
            ",
        )?;
        Ok(())
    }
}

/// Reads an RFC 3339 column into UTC.
pub(crate) fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_timestamp(&raw)
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err)))
}

/// Reads a `YYYY-MM-DD` column.
pub(crate) fn date_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    parse_date(&raw)
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err)))
}

/// Reads a JSON text column.
pub(crate) fn json_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<serde_json::Value> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err)))
}

pub(crate) fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// `?, ?, ?` for an `IN (...)` clause of `count` parameters.
pub(crate) fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{DateTime, Utc};
    use vp_core::{Employee, EmployeeId, EmployeeProfile, RawEventUpsert, Role};

    use super::Database;

    pub fn at(rfc3339: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(rfc3339)
            .expect("valid timestamp")
            .with_timezone(&Utc)
    }

    pub fn add_employee(db: &mut Database, id: &str) -> Employee {
        add_employee_with_role(db, id, Role::Employee)
    }

    pub fn add_employee_with_role(db: &mut Database, id: &str, role: Role) -> Employee {
        let employee = EmployeeProfile {
            full_name: Some(id.to_uppercase()),
            role: Some(role),
            ..EmployeeProfile::default()
        }
        .into_employee(EmployeeId::new(id).expect("employee id"))
        .expect("valid profile");
        db.create_employee(&employee).expect("create employee");
        employee
    }

    pub fn upsert(external_id: &str, summary: &str, start: &str, end: &str) -> RawEventUpsert {
        RawEventUpsert {
            source: vp_core::model::EXTERNAL_SOURCE.to_string(),
            calendar_id: "agenda@example.com".to_string(),
            external_id: external_id.to_string(),
            summary: summary.to_string(),
            description: None,
            location: None,
            start_time: at(start),
            end_time: at(end),
            raw_payload: serde_json::json!({ "id": external_id, "summary": summary }),
        }
    }
}
