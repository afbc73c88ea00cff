//! CLI subcommand implementations.

pub mod absence;
pub mod client;
pub mod employee;
pub mod import;
pub mod import_structured;
pub mod intervention;
pub mod plan;
pub mod raw;
pub mod settings;
pub mod util;
