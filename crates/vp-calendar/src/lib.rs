//! External calendar source.
//!
//! The import pipeline only needs one capability from a calendar provider:
//! list the events overlapping a time window. [`CalendarSource`] captures
//! that, and [`GoogleCalendar`] implements it against Google Calendar v3.

mod google;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use vp_core::ErrorKind;

pub use google::{GoogleCalendar, GoogleCredentials};

/// Calendar source errors.
#[derive(Debug, Error)]
pub enum CalendarError {
    /// Credentials or calendar id are missing from the configuration.
    #[error("calendar source not configured: {reason}")]
    NotConfigured { reason: &'static str },
    /// Failed to build HTTP client.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    /// HTTP request failed (connection, timeout).
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// The refresh token was refused.
    #[error("calendar authorization failed: {message}")]
    Auth { message: String },
    /// The provider answered with an error status.
    #[error("calendar API error (status {status}): {message}")]
    Api { status: u16, message: String },
    /// The provider answered with something that is not an event listing.
    #[error("invalid calendar response: {0}")]
    InvalidResponse(String),
}

impl CalendarError {
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidResponse(_) => ErrorKind::UpstreamMalformed,
            Self::ClientBuild(_) => ErrorKind::Internal,
            Self::NotConfigured { .. } | Self::Request(_) | Self::Auth { .. } | Self::Api { .. } => {
                ErrorKind::UpstreamUnavailable
            }
        }
    }

    /// Configuration and credential failures need an operator, not a retry.
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::NotConfigured { .. } | Self::Auth { .. } => false,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            _ => self.kind().is_retryable(),
        }
    }
}

/// One event as listed by the provider.
///
/// Fields are optional because provider data is not trusted: the importer
/// decides which events are usable.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedEvent {
    pub external_id: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    /// RFC 3339 start instant; absent for all-day events.
    pub start: Option<String>,
    /// RFC 3339 end instant; absent for all-day events.
    pub end: Option<String>,
    /// Date-only event with no start instant.
    pub all_day: bool,
    /// The provider's JSON for this event, untouched.
    pub payload: serde_json::Value,
}

/// A provider of calendar events.
#[async_trait]
pub trait CalendarSource: Send + Sync {
    /// Lists every event of `calendar_id` overlapping `[time_min, time_max)`.
    async fn list_events(
        &self,
        calendar_id: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<Vec<FetchedEvent>, CalendarError>;
}

/// Splits off all-day events, returning the timed ones and how many were dropped.
pub fn timed_only(events: Vec<FetchedEvent>) -> (Vec<FetchedEvent>, usize) {
    let total = events.len();
    let timed: Vec<FetchedEvent> = events.into_iter().filter(|event| !event.all_day).collect();
    let dropped = total - timed.len();
    (timed, dropped)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(id: &str, all_day: bool) -> FetchedEvent {
        FetchedEvent {
            external_id: Some(id.to_string()),
            summary: None,
            description: None,
            location: None,
            start: (!all_day).then(|| "2026-02-10T09:00:00+01:00".to_string()),
            end: (!all_day).then(|| "2026-02-10T10:00:00+01:00".to_string()),
            all_day,
            payload: serde_json::json!({ "id": id }),
        }
    }

    #[test]
    fn timed_only_drops_all_day_events() {
        let (timed, dropped) =
            timed_only(vec![event("a", false), event("b", true), event("c", false)]);
        assert_eq!(dropped, 1);
        let ids: Vec<_> = timed
            .iter()
            .filter_map(|event| event.external_id.as_deref())
            .collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn credential_failures_are_not_retryable() {
        let err = CalendarError::NotConfigured {
            reason: "refresh token missing",
        };
        assert_eq!(err.kind(), ErrorKind::UpstreamUnavailable);
        assert!(!err.is_retryable());

        let err = CalendarError::Auth {
            message: "invalid_grant".to_string(),
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn server_errors_are_retryable() {
        let err = CalendarError::Api {
            status: 503,
            message: "backend error".to_string(),
        };
        assert!(err.is_retryable());
        let err = CalendarError::Api {
            status: 404,
            message: "not found".to_string(),
        };
        assert!(!err.is_retryable());
        assert_eq!(
            CalendarError::InvalidResponse("not json".to_string()).kind(),
            ErrorKind::UpstreamMalformed
        );
    }
}
