//! Batch conversion of reviewed structuring proposals.
//!
//! Proposal files are JSON arrays of confirmations, each naming the raw event
//! it was produced from. Confirmations describing the same job are folded
//! first, then each group converts to exactly one intervention. A failing
//! group never stops the batch.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use tracing::{info, warn};
use vp_core::{Confirmation, ErrorKind, deduplicate};

use super::util::{open_database, print_json, require_admin};
use crate::Config;

#[derive(Debug, Args)]
pub struct ImportStructuredArgs {
    /// JSON files holding arrays of confirmations.
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Print the report as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    /// Confirmations read across all files.
    pub confirmations: usize,
    /// Groups left after folding duplicates.
    pub groups: usize,
    pub created: usize,
    /// Groups with a member that was already converted.
    pub skipped: usize,
    pub errors: usize,
}

pub fn run<W: Write>(writer: &mut W, args: &ImportStructuredArgs, config: &Config) -> Result<()> {
    let tz = config.tz()?;
    let mut confirmations = Vec::new();
    for file in &args.files {
        let content = std::fs::read_to_string(file)
            .with_context(|| format!("failed to read {}", file.display()))?;
        let batch: Vec<Confirmation> = serde_json::from_str(&content)
            .with_context(|| format!("invalid confirmations in {}", file.display()))?;
        confirmations.extend(batch);
    }

    let mut db = open_database(config)?;
    require_admin(&db, config)?;

    let mut report = BatchReport {
        confirmations: confirmations.len(),
        ..BatchReport::default()
    };
    let (identified, anonymous): (Vec<_>, Vec<_>) = confirmations
        .into_iter()
        .partition(|confirmation| !confirmation.source_id.trim().is_empty());
    if !anonymous.is_empty() {
        warn!(count = anonymous.len(), "confirmations without source id");
        report.errors += anonymous.len();
    }

    let groups = deduplicate(identified);
    report.groups = groups.len();
    for group in &groups {
        match db.convert_group(group, &tz) {
            Ok(conversion) => {
                report.created += 1;
                info!(
                    intervention_id = %conversion.intervention_id,
                    members = conversion.raw_event_ids.len(),
                    "created intervention from group"
                );
            }
            Err(err) if err.kind() == ErrorKind::Conflict => {
                report.skipped += 1;
                info!(source_ids = ?group.source_ids, "group already converted");
            }
            Err(err) => {
                report.errors += 1;
                warn!(source_ids = ?group.source_ids, error = %err, "group conversion failed");
            }
        }
    }

    if args.json {
        print_json(writer, &report)?;
    } else {
        writeln!(
            writer,
            "{} confirmations in {} groups: {} created, {} skipped, {} errors",
            report.confirmations, report.groups, report.created, report.skipped, report.errors
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{DateTime, Utc};
    use insta::assert_snapshot;
    use vp_core::model::EXTERNAL_SOURCE;
    use vp_core::{EmployeeId, RawEventId, RawEventUpsert, Role, TriageStatus};
    use vp_db::Database;

    use crate::commands::util::test_support::{add_employee, config};

    fn upsert(external_id: &str, start: &str) -> RawEventUpsert {
        let start: DateTime<Utc> = DateTime::parse_from_rfc3339(start).unwrap().into();
        RawEventUpsert {
            source: EXTERNAL_SOURCE.to_string(),
            calendar_id: "agenda@example.com".to_string(),
            external_id: external_id.to_string(),
            summary: "Dupont vitres".to_string(),
            description: None,
            location: None,
            start_time: start,
            end_time: start + chrono::Duration::hours(2),
            raw_payload: serde_json::json!({ "id": external_id }),
        }
    }

    fn confirmation(source_id: &str, start_time: &str) -> serde_json::Value {
        serde_json::json!({
            "source_id": source_id,
            "original_summary": "Dupont vitres",
            "date": "2026-02-10",
            "start_time": start_time,
            "end_time": "11:00",
            "client_name": "Dupont",
            "total_price": 120.0
        })
    }

    #[test]
    fn duplicates_fold_into_one_intervention() {
        let temp = tempfile::tempdir().unwrap();
        let config = config(temp.path(), Some("boss"));
        add_employee(&config, "boss", Role::Admin);
        add_employee(&config, "emp-a", Role::Employee);
        add_employee(&config, "emp-b", Role::Employee);

        let ids: Vec<RawEventId> = {
            let mut db = Database::open(&config.database_path).unwrap();
            db.upsert_raw_events(&[
                upsert("evt-a", "2026-02-10T08:00:00Z"),
                upsert("evt-b", "2026-02-10T08:00:00Z"),
                upsert("evt-c", "2026-02-10T12:00:00Z"),
            ])
            .unwrap();
            let events = db.list_raw_events(None, &TriageStatus::PENDING).unwrap();
            let by_external = |external: &str| {
                events
                    .iter()
                    .find(|event| event.external_id == external)
                    .unwrap()
                    .id
                    .clone()
            };
            let ids = vec![by_external("evt-a"), by_external("evt-b"), by_external("evt-c")];
            db.assign_raw_event(&ids[0], &[EmployeeId::new("emp-a").unwrap()])
                .unwrap();
            db.assign_raw_event(&ids[1], &[EmployeeId::new("emp-b").unwrap()])
                .unwrap();
            db.convert_raw_event(&ids[2]).unwrap();
            ids
        };

        let file = temp.path().join("batch.json");
        std::fs::write(
            &file,
            serde_json::json!([
                confirmation(ids[0].as_str(), "09:00"),
                confirmation(ids[1].as_str(), "09:00"),
                confirmation(ids[2].as_str(), "13:00"),
                confirmation("", "15:00"),
            ])
            .to_string(),
        )
        .unwrap();

        let args = ImportStructuredArgs {
            files: vec![file],
            json: false,
        };
        let mut output = Vec::new();
        run(&mut output, &args, &config).unwrap();
        let output = String::from_utf8(output).unwrap();
        assert_snapshot!(output.trim_end(), @"4 confirmations in 2 groups: 1 created, 1 skipped, 1 errors");

        let db = Database::open(&config.database_path).unwrap();
        let first = db.get_raw_event(&ids[0]).unwrap();
        let second = db.get_raw_event(&ids[1]).unwrap();
        assert_eq!(first.status, TriageStatus::Converted);
        assert_eq!(first.linked_intervention_id, second.linked_intervention_id);

        let intervention_id = first.linked_intervention_id.unwrap();
        let intervention = db.get_intervention(&intervention_id).unwrap();
        let employees: Vec<&str> = intervention
            .employee_ids
            .iter()
            .map(EmployeeId::as_str)
            .collect();
        assert_eq!(employees, vec!["emp-a", "emp-b"]);
        assert_eq!(intervention.price_estimated, Some(120.0));
    }

    #[test]
    fn unreadable_file_fails_before_writing() {
        let temp = tempfile::tempdir().unwrap();
        let config = config(temp.path(), Some("boss"));
        let file = temp.path().join("batch.json");
        std::fs::write(&file, "{ not an array").unwrap();

        let args = ImportStructuredArgs {
            files: vec![file],
            json: false,
        };
        let err = run(&mut Vec::new(), &args, &config).unwrap_err();
        assert!(err.to_string().contains("invalid confirmations"));
        assert!(!config.database_path.exists());
    }
}
