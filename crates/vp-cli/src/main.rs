use std::io::{self, Write};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use vp_cli::commands::{
    absence, client, employee, import, import_structured, intervention, plan, raw, settings,
};
use vp_cli::{Cli, Commands, Config};

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Use try_init to avoid panic if tracing is already initialized (e.g., in tests)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let kind = vp_cli::error_kind(&err);
            eprintln!("error: {err:#}");
            tracing::debug!(%kind, "command failed");
            ExitCode::from(kind.exit_code())
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let Some(command) = &cli.command else {
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    let config = Config::load_from(cli.config.as_deref()).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    let stdout = io::stdout();
    let mut writer = stdout.lock();
    match command {
        Commands::Import(args) => import::run(&mut writer, args, &config)?,
        Commands::ImportStructured(args) => import_structured::run(&mut writer, args, &config)?,
        Commands::Raw(command) => raw::run(&mut writer, command, &config)?,
        Commands::Plan(command) => plan::run(&mut writer, command, &config)?,
        Commands::Employee(command) => employee::run(&mut writer, command, &config)?,
        Commands::Client(command) => client::run(&mut writer, command, &config)?,
        Commands::Intervention(command) => intervention::run(&mut writer, command, &config)?,
        Commands::Absence(command) => absence::run(&mut writer, command, &config)?,
        Commands::Settings(command) => settings::run(&mut writer, command, &config)?,
    }
    writer.flush()?;
    Ok(())
}
