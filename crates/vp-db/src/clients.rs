//! Client persistence.
//!
//! Named clients are matched case-insensitively through `name_key`.
//! Anonymous clients have neither a name nor a key, so they never match.

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::Serialize;
use tracing::info;
use vp_core::time::format_timestamp;
use vp_core::{Client, ClientId, Intervention, NewClient, ValidationError};

use crate::interventions::list_for_client;
use crate::{Database, DbError, timestamp_column};

const CLIENT_COLUMNS: &str =
    "id, name, street, zip_code, city, address, phone, email, notes, created_at";

/// A client with the interventions booked for it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientDetail {
    pub client: Client,
    /// Ordered by start time.
    pub interventions: Vec<Intervention>,
}

fn client_from_row(row: &Row<'_>) -> rusqlite::Result<Client> {
    Ok(Client {
        id: row.get(0)?,
        name: row.get(1)?,
        street: row.get(2)?,
        zip_code: row.get(3)?,
        city: row.get(4)?,
        address: row.get(5)?,
        phone: row.get(6)?,
        email: row.get(7)?,
        notes: row.get(8)?,
        created_at: timestamp_column(row, 9)?,
    })
}

fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

pub(crate) fn load_client(conn: &Connection, id: &ClientId) -> Result<Option<Client>, DbError> {
    let client = conn
        .query_row(
            &format!("SELECT {CLIENT_COLUMNS} FROM clients WHERE id = ?"),
            [id],
            client_from_row,
        )
        .optional()?;
    Ok(client)
}

/// Oldest named client whose name matches `name` ignoring case.
pub(crate) fn find_named_client(
    conn: &Connection,
    name: &str,
) -> Result<Option<Client>, DbError> {
    let client = conn
        .query_row(
            &format!(
                "
                SELECT {CLIENT_COLUMNS} FROM clients
                WHERE name_key = ?
                ORDER BY created_at ASC, id ASC
                LIMIT 1
                "
            ),
            [name_key(name)],
            client_from_row,
        )
        .optional()?;
    Ok(client)
}

/// Inserts a client built from trimmed `fields`, composing its address.
pub(crate) fn insert_client(conn: &Connection, fields: &NewClient) -> Result<Client, DbError> {
    let fields = fields.normalized();
    if fields == NewClient::default() {
        return Err(ValidationError::Empty { field: "client" }.into());
    }
    let client = Client {
        id: ClientId::generate(),
        address: fields.address(),
        name: fields.name,
        street: fields.street,
        zip_code: fields.zip_code,
        city: fields.city,
        phone: fields.phone,
        email: fields.email,
        notes: fields.notes,
        created_at: Utc::now(),
    };
    conn.execute(
        "
        INSERT INTO clients
        (id, name, name_key, street, zip_code, city, address, phone, email, notes, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ",
        params![
            client.id,
            client.name,
            client.name.as_deref().map(name_key),
            client.street,
            client.zip_code,
            client.city,
            client.address,
            client.phone,
            client.email,
            client.notes,
            format_timestamp(client.created_at),
        ],
    )?;
    info!(client_id = %client.id, anonymous = client.is_anonymous(), "created client");
    Ok(client)
}

impl Database {
    pub fn create_client(&mut self, fields: &NewClient) -> Result<Client, DbError> {
        insert_client(&self.conn, fields)
    }

    /// Returns the client together with its interventions.
    pub fn get_client(&self, id: &ClientId) -> Result<ClientDetail, DbError> {
        let client =
            load_client(&self.conn, id)?.ok_or_else(|| DbError::not_found("client", id))?;
        let interventions = list_for_client(&self.conn, id)?;
        Ok(ClientDetail {
            client,
            interventions,
        })
    }

    /// Lists named clients by name, then anonymous ones by creation time.
    pub fn list_clients(&self) -> Result<Vec<Client>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "
            SELECT {CLIENT_COLUMNS} FROM clients
            ORDER BY name_key IS NULL, name_key ASC, created_at ASC, id ASC
            "
        ))?;
        let rows = stmt.query_map([], client_from_row)?;
        let mut clients = Vec::new();
        for row in rows {
            clients.push(row?);
        }
        Ok(clients)
    }

    /// Case-insensitive exact match over named clients.
    pub fn find_client_by_name(&self, name: &str) -> Result<Option<Client>, DbError> {
        if name.trim().is_empty() {
            return Ok(None);
        }
        find_named_client(&self.conn, name)
    }

    /// Deletes a client that no intervention references.
    pub fn delete_client(&mut self, id: &ClientId) -> Result<(), DbError> {
        let tx = self.conn.transaction()?;
        if load_client(&tx, id)?.is_none() {
            return Err(DbError::not_found("client", id));
        }
        let referencing: i64 = tx.query_row(
            "SELECT COUNT(*) FROM interventions WHERE client_id = ?",
            [id],
            |row| row.get(0),
        )?;
        if referencing > 0 {
            return Err(DbError::Conflict(format!(
                "client {id} still has {referencing} intervention(s)"
            )));
        }
        tx.execute("DELETE FROM clients WHERE id = ?", [id])?;
        tx.commit()?;
        info!(client_id = %id, "deleted client");
        Ok(())
    }
}
