//! Planning commands: daily capacity against booked work.

use std::collections::BTreeMap;
use std::io::Write;

use anyhow::Result;
use chrono::NaiveDate;
use clap::Subcommand;
use vp_core::time::{day_bounds, parse_date};
use vp_core::{DayStats, PlanningInput, range_stats};

use super::util::{open_database, print_json};
use crate::Config;

/// Planning subcommands.
#[derive(Debug, Subcommand)]
pub enum PlanCommand {
    /// Capacity and load for one day.
    Day {
        #[arg(long)]
        date: String,
        #[arg(long)]
        json: bool,
    },
    /// Capacity and load for every day of an inclusive span.
    Range {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        #[arg(long)]
        json: bool,
    },
}

pub fn run<W: Write>(writer: &mut W, command: &PlanCommand, config: &Config) -> Result<()> {
    match command {
        PlanCommand::Day { date, json } => {
            let date = parse_date(date)?;
            let stats = compute(config, date, date)?;
            if *json {
                if let Some(day) = stats.values().next() {
                    return print_json(writer, day);
                }
            }
            write_table(writer, &stats)
        }
        PlanCommand::Range { from, to, json } => {
            let stats = compute(config, parse_date(from)?, parse_date(to)?)?;
            if *json {
                print_json(writer, &stats)
            } else {
                write_table(writer, &stats)
            }
        }
    }
}

/// Loads everything the calculator reads for `[from, to]` and runs it.
pub fn compute(
    config: &Config,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<BTreeMap<String, DayStats>> {
    let tz = config.tz()?;
    let db = open_database(config)?;

    let (start, _) = day_bounds(&tz, from);
    let (_, end) = day_bounds(&tz, to);
    let employees = db.list_employees()?;
    let absences = db.list_absences_between(from, to)?;
    let interventions = db.list_interventions(start, end)?;
    let input = PlanningInput {
        tz: &tz,
        settings: db.settings()?,
        employees: &employees,
        absences: &absences,
        interventions: &interventions,
    };
    Ok(range_stats(from, to, &input)?)
}

fn write_table<W: Write>(writer: &mut W, stats: &BTreeMap<String, DayStats>) -> Result<()> {
    writeln!(
        writer,
        "{:<10}  {:>8}  {:>7}  {:>7}  STATUS",
        "DATE", "CAPACITY", "PLANNED", "PRESENT"
    )?;
    for (date, day) in stats {
        writeln!(
            writer,
            "{:<10}  {:>8.1}  {:>7.1}  {:>7}  {}",
            date, day.capacity_hours, day.planned_hours, day.present_employees, day.status
        )?;
    }
    Ok(())
}
