//! Human-confirmed structure for a raw calendar event.
//!
//! The structuring service proposes [`StructuredFields`]; an admin confirms
//! them together with the event's local date and times as a
//! [`Confirmation`], which the store turns into an intervention.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{InterventionItem, NewClient, NewIntervention, UNTITLED};
use crate::status::InterventionStatus;
use crate::time::{local_to_utc, parse_date, parse_time_of_day};
use crate::types::{ClientId, EmployeeId, RawEventId, ValidationError, non_blank, non_negative};

/// Client names meaning "we don't know who this is".
pub const UNKNOWN_CLIENT_NAMES: [&str; 2] = ["unknown", "client inconnu"];

/// One priced service line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceLine {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub price: f64,
}

/// Fields extracted from an event's free text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuredFields {
    #[serde(default)]
    pub client_name: Option<String>,
    #[serde(default)]
    pub client_street: Option<String>,
    #[serde(default)]
    pub client_zip: Option<String>,
    #[serde(default)]
    pub client_city: Option<String>,
    #[serde(default)]
    pub client_phone: Option<String>,
    #[serde(default)]
    pub client_email: Option<String>,
    #[serde(default)]
    pub client_notes: Option<String>,
    #[serde(default)]
    pub is_invoice: bool,
    #[serde(default)]
    pub total_price: f64,
    #[serde(default)]
    pub full_description: Option<String>,
    #[serde(default, rename = "services_json", alias = "services")]
    pub services: Vec<ServiceLine>,
}

/// How the client of a confirmed event is obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientPlan {
    /// Reuse the named client (case-insensitive match) or create it from `details`.
    Lookup { name: String, details: NewClient },
    /// Create a nameless client holding the known address and contact data.
    Anonymous(NewClient),
    /// Leave the intervention without a client.
    Unset,
}

impl StructuredFields {
    fn client_details(&self, name: Option<String>) -> NewClient {
        NewClient {
            name,
            street: self.client_street.clone(),
            zip_code: self.client_zip.clone(),
            city: self.client_city.clone(),
            phone: self.client_phone.clone(),
            email: self.client_email.clone(),
            notes: self.client_notes.clone(),
        }
        .normalized()
    }

    /// Decides whether to look up, create anonymously, or skip the client.
    ///
    /// Anonymous clients are only created when a street, phone or city is known.
    pub fn client_plan(&self) -> ClientPlan {
        let known_name = non_blank(self.client_name.as_deref()).filter(|name| {
            !UNKNOWN_CLIENT_NAMES
                .iter()
                .any(|sentinel| name.eq_ignore_ascii_case(sentinel))
        });
        if let Some(name) = known_name {
            let details = self.client_details(Some(name.clone()));
            return ClientPlan::Lookup { name, details };
        }
        let details = self.client_details(None);
        let has_real_data =
            details.street.is_some() || details.phone.is_some() || details.city.is_some();
        if has_real_data {
            ClientPlan::Anonymous(details)
        } else {
            ClientPlan::Unset
        }
    }

    fn items(&self) -> Result<Vec<InterventionItem>, ValidationError> {
        self.services
            .iter()
            .map(|service| {
                Ok(InterventionItem {
                    label: non_blank(Some(service.description.as_str()))
                        .unwrap_or_else(|| UNTITLED.to_string()),
                    price: non_negative("service price", service.price)?,
                })
            })
            .collect()
    }
}

/// A structuring proposal after human review.
///
/// `date`, `start_time` and `end_time` are local wall-clock values
/// (`YYYY-MM-DD`, `HH:MM`) in the business timezone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Confirmation {
    /// Raw event this confirmation was produced from. Batch files require it.
    #[serde(default, alias = "google_id")]
    pub source_id: String,
    #[serde(default)]
    pub original_summary: String,
    pub date: String,
    pub start_time: String,
    pub end_time: String,
    #[serde(flatten)]
    pub fields: StructuredFields,
}

impl Confirmation {
    /// The raw event id this confirmation refers to.
    pub fn raw_event_id(&self) -> Result<RawEventId, ValidationError> {
        RawEventId::new(self.source_id.trim())
    }

    /// Start and end instants resolved in `tz`.
    pub fn interval<Tz: TimeZone>(
        &self,
        tz: &Tz,
    ) -> Result<(DateTime<Utc>, DateTime<Utc>), ValidationError> {
        let date = parse_date(&self.date)?;
        let start = local_to_utc(tz, date, parse_time_of_day(&self.start_time)?)?;
        let end = local_to_utc(tz, date, parse_time_of_day(&self.end_time)?)?;
        Ok((start, end))
    }

    /// Builds the intervention this confirmation describes.
    ///
    /// A zero total leaves the price to be derived from the service lines.
    pub fn to_new_intervention<Tz: TimeZone>(
        &self,
        tz: &Tz,
        client_id: Option<ClientId>,
        employee_ids: Vec<EmployeeId>,
    ) -> Result<NewIntervention, ValidationError> {
        let (start_time, end_time) = self.interval(tz)?;
        let total = non_negative("total price", self.fields.total_price)?;
        let new = NewIntervention {
            title: non_blank(Some(self.original_summary.as_str()))
                .unwrap_or_else(|| UNTITLED.to_string()),
            description: non_blank(self.fields.full_description.as_deref()),
            start_time,
            end_time,
            status: InterventionStatus::Planned,
            price_estimated: (total > 0.0).then_some(total),
            is_invoice: self.fields.is_invoice,
            client_id,
            employee_ids,
            items: self.fields.items()?,
        };
        new.validate()?;
        Ok(new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono_tz::Europe::Brussels;

    use crate::time::format_timestamp;

    fn confirmation(json: &str) -> Confirmation {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn accepts_legacy_field_names() {
        let parsed = confirmation(
            r#"{
                "google_id": "raw-1",
                "original_summary": "Dupont vitres",
                "date": "2026-02-10",
                "start_time": "09:00",
                "end_time": "11:30",
                "client_name": "Dupont",
                "services_json": [{"description": "Vitres", "price": 35.0}]
            }"#,
        );
        assert_eq!(parsed.source_id, "raw-1");
        assert_eq!(parsed.fields.services.len(), 1);
        assert_eq!(parsed.raw_event_id().unwrap().as_str(), "raw-1");
    }

    #[test]
    fn named_client_is_looked_up() {
        let fields = StructuredFields {
            client_name: Some("  Dupont ".to_string()),
            client_city: Some("Namur".to_string()),
            ..StructuredFields::default()
        };
        match fields.client_plan() {
            ClientPlan::Lookup { name, details } => {
                assert_eq!(name, "Dupont");
                assert_eq!(details.city.as_deref(), Some("Namur"));
            }
            other => panic!("unexpected plan {other:?}"),
        }
    }

    #[test]
    fn sentinel_with_address_creates_anonymous_client() {
        let fields = StructuredFields {
            client_name: Some("Unknown".to_string()),
            client_street: Some("Rue Haute 12".to_string()),
            ..StructuredFields::default()
        };
        match fields.client_plan() {
            ClientPlan::Anonymous(details) => {
                assert_eq!(details.name, None);
                assert_eq!(details.street.as_deref(), Some("Rue Haute 12"));
            }
            other => panic!("unexpected plan {other:?}"),
        }
    }

    #[test]
    fn sentinel_without_data_leaves_client_unset() {
        let fields = StructuredFields {
            client_name: Some("client inconnu".to_string()),
            client_email: Some("x@example.com".to_string()),
            ..StructuredFields::default()
        };
        assert_eq!(fields.client_plan(), ClientPlan::Unset);
        assert_eq!(StructuredFields::default().client_plan(), ClientPlan::Unset);
    }

    #[test]
    fn builds_intervention_in_business_timezone() {
        let parsed = confirmation(
            r#"{
                "source_id": "raw-1",
                "original_summary": "Dupont vitres",
                "date": "2026-02-10",
                "start_time": "09:00",
                "end_time": "11:30",
                "total_price": 0.0,
                "is_invoice": true,
                "services": [
                    {"description": "Vitres", "price": 35.0},
                    {"description": "Seuils", "price": 20.0}
                ]
            }"#,
        );
        let new = parsed
            .to_new_intervention(&Brussels, None, Vec::new())
            .unwrap();
        assert_eq!(format_timestamp(new.start_time), "2026-02-10T08:00:00.000Z");
        assert_eq!(format_timestamp(new.end_time), "2026-02-10T10:30:00.000Z");
        assert_eq!(new.price_estimated, None);
        assert_eq!(new.effective_price(), Some(55.0));
        assert!(new.is_invoice);
        assert_eq!(new.items.len(), 2);
    }

    #[test]
    fn rejects_malformed_times() {
        let parsed = confirmation(
            r#"{"date": "10/02/2026", "start_time": "09:00", "end_time": "10:00"}"#,
        );
        assert!(matches!(
            parsed.interval(&Brussels),
            Err(ValidationError::InvalidDate { .. })
        ));

        let parsed = confirmation(
            r#"{"date": "2026-02-10", "start_time": "11:00", "end_time": "10:00"}"#,
        );
        assert!(matches!(
            parsed.to_new_intervention(&Brussels, None, Vec::new()),
            Err(ValidationError::InvalidRange { .. })
        ));
    }

    #[test]
    fn blank_source_id_is_rejected() {
        let parsed = confirmation(
            r#"{"date": "2026-02-10", "start_time": "09:00", "end_time": "10:00"}"#,
        );
        assert!(parsed.raw_event_id().is_err());
    }
}
