//! Turning triaged raw events into interventions.
//!
//! Each entry point runs in one transaction: the intervention, its client,
//! its assignees and the `converted` marks on its source events commit
//! together or not at all. A raw event converts at most once.

use chrono::{TimeZone, Utc};
use rusqlite::{Connection, params};
use serde::Serialize;
use tracing::{debug, info};
use vp_core::model::UNTITLED;
use vp_core::time::format_timestamp;
use vp_core::types::non_blank;
use vp_core::{
    ClientId, ClientPlan, Confirmation, DedupGroup, EmployeeId, InterventionId, InterventionStatus,
    NewIntervention, RawEvent, RawEventId, TriageAction,
};

use crate::clients::{find_named_client, insert_client};
use crate::interventions::insert_intervention;
use crate::raw_events::{next_status, require_raw_event};
use crate::{Database, DbError};

/// Outcome of a successful conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conversion {
    pub intervention_id: InterventionId,
    /// Every raw event now linked to the intervention.
    pub raw_event_ids: Vec<RawEventId>,
    pub client_id: Option<ClientId>,
}

/// Reuses or creates the client a confirmation points at.
fn resolve_client(conn: &Connection, plan: ClientPlan) -> Result<Option<ClientId>, DbError> {
    match plan {
        ClientPlan::Lookup { name, details } => {
            if let Some(existing) = find_named_client(conn, &name)? {
                debug!(client_id = %existing.id, "matched existing client");
                return Ok(Some(existing.id));
            }
            Ok(Some(insert_client(conn, &details)?.id))
        }
        ClientPlan::Anonymous(details) => Ok(Some(insert_client(conn, &details)?.id)),
        ClientPlan::Unset => Ok(None),
    }
}

fn mark_converted(
    conn: &Connection,
    raw_event_ids: &[RawEventId],
    intervention_id: &InterventionId,
) -> Result<(), DbError> {
    let now = format_timestamp(Utc::now());
    let mut stmt = conn.prepare_cached(
        "
        UPDATE raw_calendar_events
        SET status = 'converted', linked_intervention_id = ?, updated_at = ?
        WHERE id = ?
        ",
    )?;
    for id in raw_event_ids {
        stmt.execute(params![intervention_id, now, id])?;
    }
    Ok(())
}

fn intervention_from_raw(event: &RawEvent) -> NewIntervention {
    NewIntervention {
        title: non_blank(Some(event.summary.as_str())).unwrap_or_else(|| UNTITLED.to_string()),
        description: non_blank(event.description.as_deref()),
        start_time: event.start_time,
        end_time: event.end_time,
        status: InterventionStatus::Planned,
        price_estimated: None,
        is_invoice: false,
        client_id: None,
        employee_ids: event.assigned_employees.clone(),
        items: Vec::new(),
    }
}

impl Database {
    /// Converts a raw event as-is, carrying over its title, times and assignees.
    pub fn convert_raw_event(&mut self, id: &RawEventId) -> Result<Conversion, DbError> {
        let tx = self.conn.transaction()?;
        let event = require_raw_event(&tx, id)?;
        next_status(&event, TriageAction::Convert)?;

        let intervention = insert_intervention(&tx, &intervention_from_raw(&event))?;
        mark_converted(&tx, std::slice::from_ref(id), &intervention.id)?;
        tx.commit()?;

        info!(raw_event_id = %id, intervention_id = %intervention.id, "converted raw event");
        Ok(Conversion {
            intervention_id: intervention.id,
            raw_event_ids: vec![id.clone()],
            client_id: None,
        })
    }

    /// Converts a raw event using human-confirmed structure.
    ///
    /// Local date and times in the confirmation are resolved in `tz`. The
    /// event's assignees become the intervention's employees.
    pub fn confirm_raw_event<Tz: TimeZone>(
        &mut self,
        id: &RawEventId,
        confirmation: &Confirmation,
        tz: &Tz,
    ) -> Result<Conversion, DbError> {
        let tx = self.conn.transaction()?;
        let event = require_raw_event(&tx, id)?;
        next_status(&event, TriageAction::Convert)?;

        let client_id = resolve_client(&tx, confirmation.fields.client_plan())?;
        let new =
            confirmation.to_new_intervention(tz, client_id.clone(), event.assigned_employees)?;
        let intervention = insert_intervention(&tx, &new)?;
        mark_converted(&tx, std::slice::from_ref(id), &intervention.id)?;
        tx.commit()?;

        info!(
            raw_event_id = %id,
            intervention_id = %intervention.id,
            client = client_id.is_some(),
            "confirmed raw event"
        );
        Ok(Conversion {
            intervention_id: intervention.id,
            raw_event_ids: vec![id.clone()],
            client_id,
        })
    }

    /// Converts a folded group of confirmations into one intervention.
    ///
    /// Every member must exist and be convertible; otherwise nothing is
    /// written. The intervention's employees are the union of the members'
    /// assignees in first-seen order, and every member ends up linked to it.
    pub fn convert_group<Tz: TimeZone>(
        &mut self,
        group: &DedupGroup,
        tz: &Tz,
    ) -> Result<Conversion, DbError> {
        let mut raw_event_ids = Vec::with_capacity(group.source_ids.len());
        for source_id in &group.source_ids {
            raw_event_ids.push(RawEventId::new(source_id.trim())?);
        }

        let tx = self.conn.transaction()?;
        let mut employees: Vec<EmployeeId> = Vec::new();
        for id in &raw_event_ids {
            let event = require_raw_event(&tx, id)?;
            next_status(&event, TriageAction::Convert)?;
            for employee in event.assigned_employees {
                if !employees.contains(&employee) {
                    employees.push(employee);
                }
            }
        }

        let confirmation = &group.confirmation;
        let client_id = resolve_client(&tx, confirmation.fields.client_plan())?;
        let new = confirmation.to_new_intervention(tz, client_id.clone(), employees)?;
        let intervention = insert_intervention(&tx, &new)?;
        mark_converted(&tx, &raw_event_ids, &intervention.id)?;
        tx.commit()?;

        info!(
            intervention_id = %intervention.id,
            members = raw_event_ids.len(),
            "converted confirmation group"
        );
        Ok(Conversion {
            intervention_id: intervention.id,
            raw_event_ids,
            client_id,
        })
    }
}
