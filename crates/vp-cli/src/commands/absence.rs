//! Absence commands.

use std::io::Write;

use anyhow::Result;
use clap::Subcommand;
use vp_core::time::parse_date;
use vp_core::{Absence, AbsenceId, EmployeeId, NewAbsence};

use super::util::{open_database, print_json};
use crate::Config;

/// Absence subcommands.
#[derive(Debug, Subcommand)]
pub enum AbsenceCommand {
    /// Record an absence; both dates are included.
    Create {
        #[arg(long)]
        employee: String,
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        /// Defaults to "Leave".
        #[arg(long)]
        reason: Option<String>,
    },
    /// List absences of one employee, or those covering a date.
    List {
        #[arg(long, required_unless_present = "date")]
        employee: Option<String>,
        #[arg(long, conflicts_with = "employee")]
        date: Option<String>,
        #[arg(long)]
        json: bool,
    },
    Delete { id: String },
}

pub fn run<W: Write>(writer: &mut W, command: &AbsenceCommand, config: &Config) -> Result<()> {
    match command {
        AbsenceCommand::Create {
            employee,
            from,
            to,
            reason,
        } => {
            let new = NewAbsence {
                employee_id: EmployeeId::new(employee.as_str())?,
                start_date: parse_date(from)?,
                end_date: parse_date(to)?,
                reason: reason.clone(),
            };
            let mut db = open_database(config)?;
            let absence = db.create_absence(new)?;
            writeln!(writer, "Created absence {}", absence.id)?;
            Ok(())
        }
        AbsenceCommand::List {
            employee,
            date,
            json,
        } => {
            let db = open_database(config)?;
            let absences = match (employee, date) {
                (_, Some(date)) => db.list_absences_on(parse_date(date)?)?,
                (Some(employee), None) => {
                    db.list_absences_for_employee(&EmployeeId::new(employee.as_str())?)?
                }
                (None, None) => Vec::new(),
            };
            if *json {
                return print_json(writer, &absences);
            }
            write_absences(writer, &absences)
        }
        AbsenceCommand::Delete { id } => {
            let mut db = open_database(config)?;
            db.delete_absence(&AbsenceId::new(id.as_str())?)?;
            writeln!(writer, "Deleted absence {id}")?;
            Ok(())
        }
    }
}

fn write_absences<W: Write>(writer: &mut W, absences: &[Absence]) -> Result<()> {
    if absences.is_empty() {
        writeln!(writer, "No absences.")?;
    }
    for absence in absences {
        writeln!(
            writer,
            "{}  {}  {} .. {}  {}",
            absence.id, absence.employee_id, absence.start_date, absence.end_date, absence.reason
        )?;
    }
    Ok(())
}
