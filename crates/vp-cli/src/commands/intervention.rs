//! Intervention commands.
//!
//! Times are given as RFC 3339 or as local `YYYY-MM-DD HH:MM` in the
//! business timezone. Items are written `label=price`.

use std::io::Write;

use anyhow::Result;
use clap::Subcommand;
use vp_core::time::{day_bounds, parse_date};
use vp_core::{
    ClientId, EmployeeId, Intervention, InterventionId, InterventionItem, InterventionStatus,
    InterventionUpdate, NewIntervention, ValidationError,
};

use super::util::{format_local, open_database, parse_instant, print_json, require_admin};
use crate::Config;

/// Intervention subcommands.
#[derive(Debug, Subcommand)]
pub enum InterventionCommand {
    /// Book an intervention.
    Create {
        #[arg(long)]
        title: String,
        #[arg(long)]
        start: String,
        #[arg(long)]
        end: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, default_value = "planned")]
        status: InterventionStatus,
        /// Estimated price; derived from the items when omitted.
        #[arg(long)]
        price: Option<f64>,
        #[arg(long)]
        invoice: bool,
        #[arg(long)]
        client: Option<String>,
        #[arg(long = "employee")]
        employees: Vec<String>,
        #[arg(long = "item")]
        items: Vec<String>,
    },
    /// List interventions starting within an inclusive span of days.
    List {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        #[arg(long)]
        json: bool,
    },
    /// Show one intervention.
    Show { id: String },
    /// Change an intervention. Repeated options replace the whole set.
    Update {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        end: Option<String>,
        #[arg(long)]
        status: Option<InterventionStatus>,
        #[arg(long, conflicts_with = "clear_price")]
        price: Option<f64>,
        /// Drop the explicit price so it is derived from the items again.
        #[arg(long)]
        clear_price: bool,
        #[arg(long)]
        invoice: Option<bool>,
        #[arg(long, conflicts_with = "clear_client")]
        client: Option<String>,
        #[arg(long)]
        clear_client: bool,
        #[arg(long = "employee")]
        employees: Vec<String>,
        /// Remove every assignee.
        #[arg(long, conflicts_with = "employees")]
        unassign: bool,
        #[arg(long = "item")]
        items: Vec<String>,
    },
    /// Delete an intervention; linked raw events return to triage.
    Delete { id: String },
}

pub fn run<W: Write>(writer: &mut W, command: &InterventionCommand, config: &Config) -> Result<()> {
    let tz = config.tz()?;
    match command {
        InterventionCommand::Create {
            title,
            start,
            end,
            description,
            status,
            price,
            invoice,
            client,
            employees,
            items,
        } => {
            let new = NewIntervention {
                title: title.clone(),
                description: description.clone(),
                start_time: parse_instant(start, &tz)?,
                end_time: parse_instant(end, &tz)?,
                status: *status,
                price_estimated: *price,
                is_invoice: *invoice,
                client_id: client.as_deref().map(ClientId::new).transpose()?,
                employee_ids: employee_ids(employees)?,
                items: parse_items(items)?,
            };
            let mut db = open_database(config)?;
            let intervention = db.create_intervention(&new)?;
            writeln!(writer, "Created intervention {}", intervention.id)?;
            Ok(())
        }
        InterventionCommand::List { from, to, json } => {
            let (from, to) = (parse_date(from)?, parse_date(to)?);
            let (start, _) = day_bounds(&tz, from);
            let (_, end) = day_bounds(&tz, to);
            let db = open_database(config)?;
            let interventions = db.list_interventions(start, end)?;
            if *json {
                return print_json(writer, &interventions);
            }
            if interventions.is_empty() {
                writeln!(writer, "No interventions.")?;
            }
            for intervention in &interventions {
                write_line(writer, intervention, &tz)?;
            }
            Ok(())
        }
        InterventionCommand::Show { id } => {
            let db = open_database(config)?;
            let intervention = db.get_intervention(&InterventionId::new(id.as_str())?)?;
            print_json(writer, &intervention)
        }
        InterventionCommand::Update {
            id,
            title,
            description,
            start,
            end,
            status,
            price,
            clear_price,
            invoice,
            client,
            clear_client,
            employees,
            unassign,
            items,
        } => {
            let update = InterventionUpdate {
                title: title.clone(),
                description: description.clone().map(Some),
                start_time: start.as_deref().map(|s| parse_instant(s, &tz)).transpose()?,
                end_time: end.as_deref().map(|s| parse_instant(s, &tz)).transpose()?,
                status: *status,
                price_estimated: if *clear_price { Some(None) } else { price.map(Some) },
                is_invoice: *invoice,
                client_id: if *clear_client {
                    Some(None)
                } else {
                    client.as_deref().map(ClientId::new).transpose()?.map(Some)
                },
                employee_ids: if *unassign {
                    Some(Vec::new())
                } else if employees.is_empty() {
                    None
                } else {
                    Some(employee_ids(employees)?)
                },
                items: if items.is_empty() {
                    None
                } else {
                    Some(parse_items(items)?)
                },
            };
            let mut db = open_database(config)?;
            let intervention = db.update_intervention(&InterventionId::new(id.as_str())?, &update)?;
            print_json(writer, &intervention)
        }
        InterventionCommand::Delete { id } => {
            let mut db = open_database(config)?;
            require_admin(&db, config)?;
            let detached = db.delete_intervention(&InterventionId::new(id.as_str())?)?;
            writeln!(
                writer,
                "Deleted intervention {id} ({detached} raw event(s) back in triage)"
            )?;
            Ok(())
        }
    }
}

fn employee_ids(values: &[String]) -> Result<Vec<EmployeeId>, ValidationError> {
    values
        .iter()
        .map(|value| EmployeeId::new(value.as_str()))
        .collect()
}

/// Parses `label=price` items. The last `=` separates the price.
pub fn parse_items(values: &[String]) -> Result<Vec<InterventionItem>, ValidationError> {
    values
        .iter()
        .map(|value| {
            let invalid = || ValidationError::UnknownValue {
                field: "item",
                value: value.clone(),
            };
            let (label, price) = value.rsplit_once('=').ok_or_else(invalid)?;
            let price: f64 = price.trim().parse().map_err(|_| invalid())?;
            Ok(InterventionItem {
                label: label.trim().to_string(),
                price,
            })
        })
        .collect()
}

fn write_line<W: Write>(
    writer: &mut W,
    intervention: &Intervention,
    tz: &chrono_tz::Tz,
) -> Result<()> {
    let end = format_local(intervention.end_time, tz);
    writeln!(
        writer,
        "{}  {} - {}  {:<11}  {}{}",
        intervention.id,
        format_local(intervention.start_time, tz),
        end.get(11..).unwrap_or(&end),
        intervention.status,
        intervention.title,
        intervention
            .price_estimated
            .map(|price| format!(" ({price:.2} EUR)"))
            .unwrap_or_default()
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use insta::assert_snapshot;
    use vp_core::{RawEventUpsert, Role, TriageStatus};
    use vp_db::Database;

    use crate::commands::util::test_support::{add_employee, config};

    fn create(title: &str, items: &[&str]) -> InterventionCommand {
        InterventionCommand::Create {
            title: title.to_string(),
            start: "2026-02-10 09:00".to_string(),
            end: "2026-02-10 12:30".to_string(),
            description: None,
            status: InterventionStatus::Planned,
            price: None,
            invoice: false,
            client: None,
            employees: vec!["emp-a".to_string()],
            items: items.iter().map(|item| (*item).to_string()).collect(),
        }
    }

    fn list() -> InterventionCommand {
        InterventionCommand::List {
            from: "2026-02-10".to_string(),
            to: "2026-02-10".to_string(),
            json: false,
        }
    }

    #[test]
    fn parse_items_splits_on_last_equals() {
        let items = parse_items(&["Vitres = 35".to_string(), "a=b=20.5".to_string()]).unwrap();
        assert_eq!(items[0].label, "Vitres");
        assert!((items[0].price - 35.0).abs() < f64::EPSILON);
        assert_eq!(items[1].label, "a=b");

        assert!(parse_items(&["Vitres".to_string()]).is_err());
        assert!(parse_items(&["Vitres=cheap".to_string()]).is_err());
    }

    #[test]
    fn created_intervention_lists_with_derived_price() {
        let temp = tempfile::tempdir().unwrap();
        let config = config(temp.path(), None);
        add_employee(&config, "emp-a", Role::Employee);

        let mut output = Vec::new();
        run(&mut output, &create("Dupont vitres", &["Vitres=35", "Seuils=20"]), &config)
            .unwrap();
        let id = String::from_utf8(output)
            .unwrap()
            .trim()
            .trim_start_matches("Created intervention ")
            .to_string();

        let mut listing = Vec::new();
        run(&mut listing, &list(), &config).unwrap();
        let listing = String::from_utf8(listing).unwrap().replace(&id, "<id>");
        assert_snapshot!(
            listing.trim_end(),
            @"<id>  2026-02-10 09:00 - 12:30  planned      Dupont vitres (55.00 EUR)"
        );
    }

    #[test]
    fn update_rejects_inverted_range() {
        let temp = tempfile::tempdir().unwrap();
        let config = config(temp.path(), None);
        add_employee(&config, "emp-a", Role::Employee);
        let mut output = Vec::new();
        run(&mut output, &create("Dupont vitres", &[]), &config).unwrap();
        let id = String::from_utf8(output)
            .unwrap()
            .trim()
            .trim_start_matches("Created intervention ")
            .to_string();

        let update = InterventionCommand::Update {
            id,
            title: None,
            description: None,
            start: None,
            end: Some("2026-02-10 08:00".to_string()),
            status: None,
            price: None,
            clear_price: false,
            invoice: None,
            client: None,
            clear_client: false,
            employees: Vec::new(),
            unassign: false,
            items: Vec::new(),
        };
        let err = run(&mut Vec::new(), &update, &config).unwrap_err();
        let db_err = err.downcast_ref::<vp_db::DbError>().unwrap();
        assert_eq!(db_err.kind(), vp_core::ErrorKind::Validation);
    }

    #[test]
    fn delete_returns_linked_raw_events_to_triage() {
        let temp = tempfile::tempdir().unwrap();
        let config = config(temp.path(), Some("boss"));
        add_employee(&config, "boss", Role::Admin);

        let mut db = Database::open(&config.database_path).unwrap();
        let start = parse_instant("2026-02-10 09:00", &chrono_tz::Europe::Brussels).unwrap();
        db.upsert_raw_events(&[RawEventUpsert {
            source: vp_core::model::EXTERNAL_SOURCE.to_string(),
            calendar_id: "agenda@example.com".to_string(),
            external_id: "evt-1".to_string(),
            summary: "Dupont vitres".to_string(),
            description: None,
            location: None,
            start_time: start,
            end_time: start + chrono::Duration::hours(2),
            raw_payload: serde_json::json!({ "id": "evt-1" }),
        }])
        .unwrap();
        let raw = db.list_raw_events(None, &TriageStatus::PENDING).unwrap();
        let conversion = db.convert_raw_event(&raw[0].id).unwrap();

        let mut output = Vec::new();
        run(
            &mut output,
            &InterventionCommand::Delete {
                id: conversion.intervention_id.to_string(),
            },
            &config,
        )
        .unwrap();
        assert!(String::from_utf8(output).unwrap().ends_with("(1 raw event(s) back in triage)\n"));

        let event = db.get_raw_event(&raw[0].id).unwrap();
        assert_eq!(event.status, TriageStatus::Raw);
        assert_eq!(event.linked_intervention_id, None);
    }
}
