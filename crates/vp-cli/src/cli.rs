//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::commands::absence::AbsenceCommand;
use crate::commands::client::ClientCommand;
use crate::commands::employee::EmployeeCommand;
use crate::commands::import::ImportArgs;
use crate::commands::import_structured::ImportStructuredArgs;
use crate::commands::intervention::InterventionCommand;
use crate::commands::plan::PlanCommand;
use crate::commands::raw::RawCommand;
use crate::commands::settings::SettingsCommand;

/// Field-service scheduling.
///
/// Imports the shared calendar, triages its entries into interventions and
/// checks each day's load against staff capacity.
#[derive(Debug, Parser)]
#[command(name = "vp", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Import one day of the external calendar as raw events.
    Import(ImportArgs),

    /// Convert files of reviewed proposals, folding duplicates.
    ImportStructured(ImportStructuredArgs),

    /// Triage imported calendar events.
    #[command(subcommand)]
    Raw(RawCommand),

    /// Daily capacity against booked work.
    #[command(subcommand)]
    Plan(PlanCommand),

    #[command(subcommand)]
    Employee(EmployeeCommand),

    #[command(subcommand)]
    Client(ClientCommand),

    #[command(subcommand)]
    Intervention(InterventionCommand),

    #[command(subcommand)]
    Absence(AbsenceCommand),

    /// Company-wide planning settings.
    #[command(subcommand)]
    Settings(SettingsCommand),
}
