//! Client commands.

use std::io::Write;

use anyhow::Result;
use clap::{Args, Subcommand};
use vp_core::{Client, ClientId, NewClient};

use super::util::{open_database, print_json};
use crate::Config;

/// Client subcommands.
#[derive(Debug, Subcommand)]
pub enum ClientCommand {
    /// Create a client. Without a name the client is anonymous.
    Create(ClientFields),
    /// List clients.
    List {
        #[arg(long)]
        json: bool,
    },
    /// Show a client with its interventions.
    Show { id: String },
    /// Find a named client, ignoring case.
    Find { name: String },
    /// Delete a client that has no interventions.
    Delete { id: String },
}

#[derive(Debug, Args)]
pub struct ClientFields {
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long)]
    pub street: Option<String>,
    #[arg(long)]
    pub zip: Option<String>,
    #[arg(long)]
    pub city: Option<String>,
    #[arg(long)]
    pub phone: Option<String>,
    #[arg(long)]
    pub email: Option<String>,
    #[arg(long)]
    pub notes: Option<String>,
}

impl From<&ClientFields> for NewClient {
    fn from(fields: &ClientFields) -> Self {
        Self {
            name: fields.name.clone(),
            street: fields.street.clone(),
            zip_code: fields.zip.clone(),
            city: fields.city.clone(),
            phone: fields.phone.clone(),
            email: fields.email.clone(),
            notes: fields.notes.clone(),
        }
    }
}

pub fn run<W: Write>(writer: &mut W, command: &ClientCommand, config: &Config) -> Result<()> {
    match command {
        ClientCommand::Create(fields) => {
            let mut db = open_database(config)?;
            let client = db.create_client(&NewClient::from(fields))?;
            writeln!(writer, "Created client {}", client.id)?;
            Ok(())
        }
        ClientCommand::List { json } => {
            let db = open_database(config)?;
            let clients = db.list_clients()?;
            if *json {
                return print_json(writer, &clients);
            }
            if clients.is_empty() {
                writeln!(writer, "No clients.")?;
            }
            for client in &clients {
                write_client_line(writer, client)?;
            }
            Ok(())
        }
        ClientCommand::Show { id } => {
            let db = open_database(config)?;
            let detail = db.get_client(&ClientId::new(id.as_str())?)?;
            print_json(writer, &detail)
        }
        ClientCommand::Find { name } => {
            let db = open_database(config)?;
            match db.find_client_by_name(name)? {
                Some(client) => write_client_line(writer, &client)?,
                None => writeln!(writer, "No client named {name:?}.")?,
            }
            Ok(())
        }
        ClientCommand::Delete { id } => {
            let mut db = open_database(config)?;
            db.delete_client(&ClientId::new(id.as_str())?)?;
            writeln!(writer, "Deleted client {id}")?;
            Ok(())
        }
    }
}

fn write_client_line<W: Write>(writer: &mut W, client: &Client) -> Result<()> {
    writeln!(
        writer,
        "{}  {}  {}",
        client.id,
        client.name.as_deref().unwrap_or("(anonymous)"),
        client.address.as_deref().unwrap_or("-")
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use insta::assert_snapshot;

    use crate::commands::util::test_support::config;

    fn fields(name: Option<&str>, city: Option<&str>) -> ClientFields {
        ClientFields {
            name: name.map(str::to_string),
            street: Some("Rue Haute 1".to_string()),
            zip: Some("1000".to_string()),
            city: city.map(str::to_string),
            phone: None,
            email: None,
            notes: None,
        }
    }

    fn created_id(output: &[u8]) -> String {
        String::from_utf8(output.to_vec())
            .unwrap()
            .trim()
            .trim_start_matches("Created client ")
            .to_string()
    }

    #[test]
    fn find_matches_name_ignoring_case() {
        let temp = tempfile::tempdir().unwrap();
        let config = config(temp.path(), None);
        let mut output = Vec::new();
        run(
            &mut output,
            &ClientCommand::Create(fields(Some("Dupont"), Some("Bruxelles"))),
            &config,
        )
        .unwrap();
        let id = created_id(&output);

        let mut found = Vec::new();
        run(
            &mut found,
            &ClientCommand::Find {
                name: "DUPONT".to_string(),
            },
            &config,
        )
        .unwrap();
        let found = String::from_utf8(found).unwrap().replace(&id, "<id>");
        assert_snapshot!(found.trim_end(), @"<id>  Dupont  Rue Haute 1, 1000, Bruxelles");
    }

    #[test]
    fn anonymous_clients_are_listed_but_never_found() {
        let temp = tempfile::tempdir().unwrap();
        let config = config(temp.path(), None);
        run(
            &mut Vec::new(),
            &ClientCommand::Create(fields(None, None)),
            &config,
        )
        .unwrap();

        let mut listing = Vec::new();
        run(&mut listing, &ClientCommand::List { json: false }, &config).unwrap();
        assert!(String::from_utf8(listing).unwrap().contains("(anonymous)  Rue Haute 1, 1000"));

        let mut found = Vec::new();
        run(
            &mut found,
            &ClientCommand::Find {
                name: "unknown".to_string(),
            },
            &config,
        )
        .unwrap();
        assert_eq!(String::from_utf8(found).unwrap(), "No client named \"unknown\".\n");
    }
}
