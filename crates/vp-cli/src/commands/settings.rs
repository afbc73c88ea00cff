//! Company settings commands.

use std::io::Write;

use anyhow::Result;
use clap::Subcommand;

use super::util::{open_database, require_admin};
use crate::Config;

/// Settings subcommands.
#[derive(Debug, Subcommand)]
pub enum SettingsCommand {
    /// Show the planning settings.
    Show,
    /// Set how many hours above capacity still count as a warning.
    SetTolerance { hours: f64 },
}

pub fn run<W: Write>(writer: &mut W, command: &SettingsCommand, config: &Config) -> Result<()> {
    let mut db = open_database(config)?;
    let settings = match command {
        SettingsCommand::Show => db.settings()?,
        SettingsCommand::SetTolerance { hours } => {
            require_admin(&db, config)?;
            db.set_overtime_tolerance(*hours)?
        }
    };
    writeln!(
        writer,
        "Overtime tolerance: {:.1} h",
        settings.overtime_tolerance_hours
    )?;
    Ok(())
}
