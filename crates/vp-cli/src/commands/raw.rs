//! Raw event commands: reading, triage, structuring and conversion.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Subcommand;
use serde::Serialize;
use vp_core::time::{day_bounds, parse_date};
use vp_core::{
    Confirmation, EmployeeId, RawEvent, RawEventId, ValidationError, parse_status_filter,
};
use vp_db::Conversion;
use vp_llm::EventText;

use super::util::{block_on, format_local, open_database, print_json, require_admin};
use crate::Config;

/// Raw event subcommands.
#[derive(Debug, Subcommand)]
pub enum RawCommand {
    /// List raw events, optionally for one day.
    List {
        /// Day to list (YYYY-MM-DD, business timezone).
        #[arg(long)]
        date: Option<String>,
        /// Comma-separated statuses to include.
        #[arg(long, default_value = "raw,assigned")]
        status: String,
        #[arg(long)]
        json: bool,
    },
    /// List pending raw events over an inclusive span of days.
    Range {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        #[arg(long)]
        json: bool,
    },
    /// Show one raw event with its payload.
    Show { id: String },
    /// Replace the assignees of a raw event. No employee un-assigns it.
    Assign {
        id: String,
        #[arg(long = "employee")]
        employees: Vec<String>,
    },
    /// Dismiss a raw event.
    Ignore { id: String },
    /// Convert a raw event as-is into an intervention.
    Convert { id: String },
    /// Ask the structuring service for a proposal (printed, not stored).
    Structure { id: String },
    /// Convert a raw event with a reviewed proposal.
    Confirm {
        id: String,
        /// JSON file holding the confirmed proposal.
        #[arg(long)]
        file: PathBuf,
    },
    /// Write the pending events of a day as JSON for offline structuring.
    Export {
        #[arg(long)]
        date: String,
    },
}

/// One pending event as written by `vp raw export`, in local time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportedEvent {
    pub id: String,
    pub summary: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub date: String,
    pub start: String,
    pub end: String,
}

pub fn run<W: Write>(writer: &mut W, command: &RawCommand, config: &Config) -> Result<()> {
    match command {
        RawCommand::List { date, status, json } => {
            list(writer, date.as_deref(), status, *json, config)
        }
        RawCommand::Range { from, to, json } => range(writer, from, to, *json, config),
        RawCommand::Show { id } => {
            let db = open_database(config)?;
            let event = db.get_raw_event(&RawEventId::new(id.as_str())?)?;
            print_json(writer, &event)
        }
        RawCommand::Assign { id, employees } => assign(writer, id, employees, config),
        RawCommand::Ignore { id } => {
            let mut db = open_database(config)?;
            require_admin(&db, config)?;
            let event = db.ignore_raw_event(&RawEventId::new(id.as_str())?)?;
            writeln!(writer, "Raw event {} is {}", event.id, event.status)?;
            Ok(())
        }
        RawCommand::Convert { id } => {
            let mut db = open_database(config)?;
            require_admin(&db, config)?;
            let conversion = db.convert_raw_event(&RawEventId::new(id.as_str())?)?;
            write_conversion(writer, &conversion)
        }
        RawCommand::Structure { id } => structure(writer, id, config),
        RawCommand::Confirm { id, file } => confirm(writer, id, file, config),
        RawCommand::Export { date } => export(writer, date, config),
    }
}

fn list<W: Write>(
    writer: &mut W,
    date: Option<&str>,
    status: &str,
    json: bool,
    config: &Config,
) -> Result<()> {
    let tz = config.tz()?;
    let statuses = parse_status_filter(status)?;
    let window = date
        .map(parse_date)
        .transpose()?
        .map(|day| day_bounds(&tz, day));
    let db = open_database(config)?;
    let events = db.list_raw_events(window, &statuses)?;
    write_events(writer, &events, json, &tz)
}

fn range<W: Write>(
    writer: &mut W,
    from: &str,
    to: &str,
    json: bool,
    config: &Config,
) -> Result<()> {
    let tz = config.tz()?;
    let (from, to) = (parse_date(from)?, parse_date(to)?);
    if to < from {
        return Err(ValidationError::InvalidRange {
            field: "date range",
            start: from.to_string(),
            end: to.to_string(),
        }
        .into());
    }
    let (start, _) = day_bounds(&tz, from);
    let (_, end) = day_bounds(&tz, to);
    let db = open_database(config)?;
    let events = db.list_raw_events_range(start, end)?;
    write_events(writer, &events, json, &tz)
}

fn write_events<W: Write>(
    writer: &mut W,
    events: &[RawEvent],
    json: bool,
    tz: &chrono_tz::Tz,
) -> Result<()> {
    if json {
        return print_json(writer, events);
    }
    if events.is_empty() {
        writeln!(writer, "No raw events.")?;
        return Ok(());
    }
    for event in events {
        let assignees: Vec<&str> = event
            .assigned_employees
            .iter()
            .map(EmployeeId::as_str)
            .collect();
        writeln!(
            writer,
            "{}  {}  {:<9} {}{}",
            event.id,
            format_local(event.start_time, tz),
            event.status,
            event.summary,
            if assignees.is_empty() {
                String::new()
            } else {
                format!(" [{}]", assignees.join(", "))
            }
        )?;
    }
    Ok(())
}

fn assign<W: Write>(writer: &mut W, id: &str, employees: &[String], config: &Config) -> Result<()> {
    let employee_ids = employees
        .iter()
        .map(|employee| EmployeeId::new(employee.as_str()))
        .collect::<Result<Vec<_>, _>>()?;
    let mut db = open_database(config)?;
    require_admin(&db, config)?;
    let event = db.assign_raw_event(&RawEventId::new(id)?, &employee_ids)?;
    writeln!(
        writer,
        "Raw event {} is {} ({} assigned)",
        event.id,
        event.status,
        event.assigned_employees.len()
    )?;
    Ok(())
}

fn structure<W: Write>(writer: &mut W, id: &str, config: &Config) -> Result<()> {
    let tz = config.tz()?;
    let db = open_database(config)?;
    require_admin(&db, config)?;
    let event = db.get_raw_event(&RawEventId::new(id)?)?;

    let client = vp_llm::Client::new(config.api_key.clone().unwrap_or_default())?
        .with_model(config.model.as_str());
    let proposal = block_on(vp_llm::structure(&client, &event, &tz))?
        .with_context(|| format!("failed to structure raw event {id}"))?;
    print_json(writer, &proposal)
}

fn confirm<W: Write>(
    writer: &mut W,
    id: &str,
    file: &Path,
    config: &Config,
) -> Result<()> {
    let tz = config.tz()?;
    let id = RawEventId::new(id)?;
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let confirmation: Confirmation = serde_json::from_str(&content)
        .with_context(|| format!("invalid confirmation in {}", file.display()))?;
    let source_id = confirmation.source_id.trim();
    if !source_id.is_empty() && source_id != id.as_str() {
        return Err(ValidationError::UnknownValue {
            field: "confirmation source_id",
            value: source_id.to_string(),
        }
        .into());
    }

    let mut db = open_database(config)?;
    require_admin(&db, config)?;
    let conversion = db.confirm_raw_event(&id, &confirmation, &tz)?;
    write_conversion(writer, &conversion)
}

fn export<W: Write>(writer: &mut W, date: &str, config: &Config) -> Result<()> {
    let tz = config.tz()?;
    let (start, end) = day_bounds(&tz, parse_date(date)?);
    let db = open_database(config)?;
    let events: Vec<ExportedEvent> = db
        .list_raw_events_range(start, end)?
        .iter()
        .map(|event| {
            let text = EventText::new(event, &tz);
            ExportedEvent {
                id: event.id.to_string(),
                summary: event.summary.clone(),
                description: event.description.clone(),
                location: event.location.clone(),
                date: text.date,
                start: text.start_time,
                end: text.end_time,
            }
        })
        .collect();
    print_json(writer, &events)
}

fn write_conversion<W: Write>(writer: &mut W, conversion: &Conversion) -> Result<()> {
    writeln!(
        writer,
        "Created intervention {} from {} raw event(s)",
        conversion.intervention_id,
        conversion.raw_event_ids.len()
    )?;
    if let Some(client_id) = &conversion.client_id {
        writeln!(writer, "Client: {client_id}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{DateTime, Utc};
    use insta::assert_snapshot;
    use vp_core::model::EXTERNAL_SOURCE;
    use vp_core::{RawEventUpsert, Role, TriageStatus};
    use vp_db::{Database, DbError};

    use crate::commands::util::test_support::{add_employee, config};

    fn at(rfc3339: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(rfc3339)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn seed(config: &Config, events: &[(&str, &str, &str, &str)]) -> Vec<RawEventId> {
        let mut db = Database::open(&config.database_path).unwrap();
        let upserts: Vec<RawEventUpsert> = events
            .iter()
            .map(|(external_id, summary, start, end)| RawEventUpsert {
                source: EXTERNAL_SOURCE.to_string(),
                calendar_id: "agenda@example.com".to_string(),
                external_id: (*external_id).to_string(),
                summary: (*summary).to_string(),
                description: Some("Rue Haute 1, 1000 Bruxelles".to_string()),
                location: None,
                start_time: at(start),
                end_time: at(end),
                raw_payload: serde_json::json!({ "id": external_id }),
            })
            .collect();
        db.upsert_raw_events(&upserts).unwrap();
        db.list_raw_events(None, &TriageStatus::PENDING)
            .unwrap()
            .into_iter()
            .map(|event| event.id)
            .collect()
    }

    fn admin_config(dir: &std::path::Path) -> Config {
        let config = config(dir, Some("boss"));
        add_employee(&config, "boss", Role::Admin);
        config
    }

    #[test]
    fn export_writes_local_times() {
        let temp = tempfile::tempdir().unwrap();
        let config = admin_config(temp.path());
        seed(
            &config,
            &[("evt-1", "Dupont vitres", "2026-02-10T08:00:00Z", "2026-02-10T10:30:00Z")],
        );

        let mut output = Vec::new();
        run(
            &mut output,
            &RawCommand::Export {
                date: "2026-02-10".to_string(),
            },
            &config,
        )
        .unwrap();
        let exported: serde_json::Value = serde_json::from_slice(&output).unwrap();
        assert_eq!(exported[0]["summary"], "Dupont vitres");
        assert_eq!(exported[0]["date"], "2026-02-10");
        assert_eq!(exported[0]["start"], "09:00");
        assert_eq!(exported[0]["end"], "11:30");
    }

    #[test]
    fn triage_requires_admin() {
        let temp = tempfile::tempdir().unwrap();
        let admin = admin_config(temp.path());
        let ids = seed(
            &admin,
            &[("evt-1", "Dupont vitres", "2026-02-10T08:00:00Z", "2026-02-10T10:00:00Z")],
        );
        add_employee(&admin, "emp-a", Role::Employee);
        let worker = config(temp.path(), Some("emp-a"));

        let mut output = Vec::new();
        let err = run(
            &mut output,
            &RawCommand::Ignore {
                id: ids[0].to_string(),
            },
            &worker,
        )
        .unwrap_err();
        assert!(err.downcast_ref::<vp_core::AuthError>().is_some());
    }

    #[test]
    fn assign_then_list_shows_assignees() {
        let temp = tempfile::tempdir().unwrap();
        let config = admin_config(temp.path());
        let ids = seed(
            &config,
            &[("evt-1", "Dupont vitres", "2026-02-10T08:00:00Z", "2026-02-10T10:00:00Z")],
        );
        add_employee(&config, "emp-a", Role::Employee);

        let mut output = Vec::new();
        run(
            &mut output,
            &RawCommand::Assign {
                id: ids[0].to_string(),
                employees: vec!["emp-a".to_string()],
            },
            &config,
        )
        .unwrap();

        let mut listing = Vec::new();
        run(
            &mut listing,
            &RawCommand::List {
                date: Some("2026-02-10".to_string()),
                status: "assigned".to_string(),
                json: false,
            },
            &config,
        )
        .unwrap();
        let listing = String::from_utf8(listing).unwrap();
        let line = listing.replace(ids[0].as_str(), "<id>");
        assert_snapshot!(line.trim_end(), @"<id>  2026-02-10 09:00  assigned  Dupont vitres [emp-a]");
    }

    #[test]
    fn convert_twice_is_a_conflict() {
        let temp = tempfile::tempdir().unwrap();
        let config = admin_config(temp.path());
        let ids = seed(
            &config,
            &[("evt-1", "Dupont vitres", "2026-02-10T08:00:00Z", "2026-02-10T10:00:00Z")],
        );
        let command = RawCommand::Convert {
            id: ids[0].to_string(),
        };

        let mut output = Vec::new();
        run(&mut output, &command, &config).unwrap();
        assert!(String::from_utf8(output).unwrap().starts_with("Created intervention"));

        let err = run(&mut Vec::new(), &command, &config).unwrap_err();
        let db_err = err.downcast_ref::<DbError>().unwrap();
        assert_eq!(db_err.kind(), vp_core::ErrorKind::Conflict);
    }

    #[test]
    fn confirm_reads_proposal_file() {
        let temp = tempfile::tempdir().unwrap();
        let config = admin_config(temp.path());
        let ids = seed(
            &config,
            &[("evt-1", "Dupont vitres", "2026-02-10T08:00:00Z", "2026-02-10T10:00:00Z")],
        );
        let file = temp.path().join("proposal.json");
        std::fs::write(
            &file,
            serde_json::json!({
                "source_id": ids[0].to_string(),
                "original_summary": "Dupont vitres",
                "date": "2026-02-10",
                "start_time": "09:00",
                "end_time": "11:00",
                "client_name": "Dupont",
                "client_city": "Bruxelles",
                "total_price": 80.0,
                "services_json": [{ "description": "Vitres", "price": 80.0 }]
            })
            .to_string(),
        )
        .unwrap();

        let mut output = Vec::new();
        run(
            &mut output,
            &RawCommand::Confirm {
                id: ids[0].to_string(),
                file,
            },
            &config,
        )
        .unwrap();
        let output = String::from_utf8(output).unwrap();
        assert!(output.contains("from 1 raw event(s)"));
        assert!(output.contains("Client: "));

        let db = Database::open(&config.database_path).unwrap();
        let event = db.get_raw_event(&ids[0]).unwrap();
        assert_eq!(event.status, TriageStatus::Converted);
    }

    #[test]
    fn confirm_rejects_mismatched_source() {
        let temp = tempfile::tempdir().unwrap();
        let config = admin_config(temp.path());
        let ids = seed(
            &config,
            &[("evt-1", "Dupont vitres", "2026-02-10T08:00:00Z", "2026-02-10T10:00:00Z")],
        );
        let file = temp.path().join("proposal.json");
        std::fs::write(
            &file,
            r#"{"source_id":"other","date":"2026-02-10","start_time":"09:00","end_time":"10:00"}"#,
        )
        .unwrap();

        let err = run(
            &mut Vec::new(),
            &RawCommand::Confirm {
                id: ids[0].to_string(),
                file,
            },
            &config,
        )
        .unwrap_err();
        assert!(err.downcast_ref::<ValidationError>().is_some());
    }

    #[test]
    fn structure_without_api_key_is_unavailable() {
        let temp = tempfile::tempdir().unwrap();
        let config = admin_config(temp.path());
        let ids = seed(
            &config,
            &[("evt-1", "Dupont vitres", "2026-02-10T08:00:00Z", "2026-02-10T10:00:00Z")],
        );
        let err = run(
            &mut Vec::new(),
            &RawCommand::Structure {
                id: ids[0].to_string(),
            },
            &config,
        )
        .unwrap_err();
        let llm_err = err.downcast_ref::<vp_llm::LlmError>().unwrap();
        assert_eq!(llm_err.kind(), vp_core::ErrorKind::UpstreamUnavailable);
    }
}
