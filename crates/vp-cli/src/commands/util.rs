//! Shared utilities for CLI commands.

use std::io::Write;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::Serialize;
use vp_core::time::local_to_utc;
use vp_core::{AuthError, EmployeeId, Principal, ValidationError};
use vp_db::{Database, DbError};

use crate::Config;

/// Opens the configured database, creating its directory first.
pub fn open_database(config: &Config) -> Result<Database> {
    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }
    Database::open(&config.database_path)
        .with_context(|| format!("failed to open {}", config.database_path.display()))
}

/// Resolves the configured operator and checks that they are an admin.
pub fn require_admin(db: &Database, config: &Config) -> Result<Principal> {
    let principal = operator(db, config)?;
    principal.require_admin()?;
    Ok(principal)
}

/// Resolves the configured operator against the employees table.
pub fn operator(db: &Database, config: &Config) -> Result<Principal> {
    let subject = config
        .operator_id
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or(AuthError::Unauthenticated)?;
    let id = EmployeeId::new(subject)?;
    match db.get_employee(&id) {
        Ok(employee) => Ok(Principal::from(&employee)),
        Err(DbError::NotFound { .. }) => Err(AuthError::UnknownPrincipal {
            subject: subject.to_string(),
        }
        .into()),
        Err(err) => Err(err.into()),
    }
}

/// Parses an instant given as RFC 3339 or as local `YYYY-MM-DD HH:MM`.
pub fn parse_instant<Tz: TimeZone>(value: &str, tz: &Tz) -> Result<DateTime<Utc>, ValidationError> {
    let trimmed = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(parsed.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
        .ok_or_else(|| ValidationError::InvalidTimestamp {
            value: value.to_string(),
        })
        .and_then(|local| local_to_utc(tz, local.date(), local.time()))
}

/// Formats an instant as local `YYYY-MM-DD HH:MM`.
pub fn format_local<Tz: TimeZone>(instant: DateTime<Utc>, tz: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    instant.with_timezone(tz).format("%Y-%m-%d %H:%M").to_string()
}

/// Runs a future to completion on a fresh runtime.
pub fn block_on<F: std::future::Future>(future: F) -> Result<F::Output> {
    let runtime = tokio::runtime::Runtime::new().context("failed to initialize tokio runtime")?;
    Ok(runtime.block_on(future))
}

/// Writes `value` as pretty JSON followed by a newline.
pub fn print_json<W: Write, T: Serialize + ?Sized>(writer: &mut W, value: &T) -> Result<()> {
    writeln!(writer, "{}", serde_json::to_string_pretty(value)?)?;
    Ok(())
}
