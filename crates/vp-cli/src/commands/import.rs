//! Import command: reconcile one day of the external calendar into raw events.
//!
//! The whole day is fetched before anything is written, so an unreachable
//! calendar leaves the store untouched. Malformed events are skipped one by
//! one; the rest are upserted in a single transaction keyed by
//! `(source, calendar_id, external_id)`.

use std::io::Write;

use anyhow::{Context, Result};
use chrono::{NaiveDate, TimeZone};
use clap::Args;
use serde::Serialize;
use tracing::{debug, info, warn};
use vp_calendar::{CalendarError, CalendarSource, FetchedEvent, GoogleCalendar, GoogleCredentials};
use vp_core::model::{EXTERNAL_SOURCE, UNTITLED};
use vp_core::time::{day_bounds, parse_date, parse_timestamp};
use vp_core::types::non_blank;
use vp_core::RawEventUpsert;
use vp_db::Database;

use super::util::{block_on, open_database, print_json, require_admin};
use crate::Config;

#[derive(Debug, Args)]
pub struct ImportArgs {
    /// Day to import (YYYY-MM-DD, business timezone).
    #[arg(long)]
    pub date: String,

    /// Calendar to read instead of the configured one.
    #[arg(long)]
    pub calendar: Option<String>,

    /// Print the report as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Outcome of importing one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub date: NaiveDate,
    /// Events inserted or refreshed.
    pub upserted: usize,
    /// Timed events rejected as malformed.
    pub skipped: usize,
    /// Timed events returned by the calendar.
    pub total_fetched: usize,
    /// Date-only events filtered out before reconciliation.
    pub all_day: usize,
}

pub fn run<W: Write>(writer: &mut W, args: &ImportArgs, config: &Config) -> Result<()> {
    let date = parse_date(&args.date)?;
    let tz = config.tz()?;
    let calendar_id = args
        .calendar
        .as_deref()
        .or(config.calendar_id.as_deref())
        .and_then(|value| non_blank(Some(value)))
        .ok_or(CalendarError::NotConfigured {
            reason: "calendar_id is not set",
        })?;

    let mut db = open_database(config)?;
    require_admin(&db, config)?;

    let credentials = GoogleCredentials::new(
        config.google_client_id.as_deref(),
        config.google_client_secret.as_deref(),
        config.google_refresh_token.as_deref(),
    )?;
    let calendar = GoogleCalendar::new(credentials)?;
    let report = block_on(import_day(&calendar, &mut db, &calendar_id, date, &tz))??;

    if args.json {
        print_json(writer, &report)?;
    } else {
        writeln!(
            writer,
            "Imported {}: {} upserted, {} skipped, {} fetched ({} all-day ignored)",
            report.date, report.upserted, report.skipped, report.total_fetched, report.all_day
        )?;
    }
    Ok(())
}

/// Fetches `date` from `source` and reconciles it into the store.
pub async fn import_day<S, Tz>(
    source: &S,
    db: &mut Database,
    calendar_id: &str,
    date: NaiveDate,
    tz: &Tz,
) -> Result<ImportReport>
where
    S: CalendarSource + ?Sized,
    Tz: TimeZone,
{
    let (time_min, time_max) = day_bounds(tz, date);
    let fetched = source
        .list_events(calendar_id, time_min, time_max)
        .await
        .with_context(|| format!("failed to fetch {calendar_id} for {date}"))?;
    let (timed, all_day) = vp_calendar::timed_only(fetched);
    let total_fetched = timed.len();

    let (upserts, skipped) = prepare_upserts(calendar_id, timed);
    let stats = db.upsert_raw_events(&upserts)?;
    info!(
        %date,
        calendar_id,
        upserted = stats.upserted(),
        inserted = stats.inserted,
        skipped,
        all_day,
        "imported calendar day"
    );
    Ok(ImportReport {
        date,
        upserted: stats.upserted(),
        skipped,
        total_fetched,
        all_day,
    })
}

/// Turns fetched events into upserts, returning them with the number skipped.
///
/// An event is skipped when it has no external id, lacks a start or end
/// instant, or carries an instant that is not RFC 3339.
pub fn prepare_upserts(
    calendar_id: &str,
    events: Vec<FetchedEvent>,
) -> (Vec<RawEventUpsert>, usize) {
    let mut upserts = Vec::with_capacity(events.len());
    let mut skipped = 0;
    for event in events {
        match to_upsert(calendar_id, event) {
            Ok(upsert) => upserts.push(upsert),
            Err(reason) => {
                warn!(reason, "skipping malformed calendar event");
                skipped += 1;
            }
        }
    }
    (upserts, skipped)
}

fn to_upsert(calendar_id: &str, event: FetchedEvent) -> Result<RawEventUpsert, &'static str> {
    let external_id = non_blank(event.external_id.as_deref()).ok_or("missing id")?;
    let (Some(start), Some(end)) = (event.start.as_deref(), event.end.as_deref()) else {
        return Err("missing start or end");
    };
    let start_time = parse_timestamp(start).map_err(|_| "unparseable start")?;
    let end_time = parse_timestamp(end).map_err(|_| "unparseable end")?;
    debug!(external_id = %external_id, "prepared calendar event");
    Ok(RawEventUpsert {
        source: EXTERNAL_SOURCE.to_string(),
        calendar_id: calendar_id.to_string(),
        external_id,
        summary: non_blank(event.summary.as_deref()).unwrap_or_else(|| UNTITLED.to_string()),
        description: non_blank(event.description.as_deref()),
        location: non_blank(event.location.as_deref()),
        start_time,
        end_time,
        raw_payload: event.payload,
    })
}
