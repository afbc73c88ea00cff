//! Google Calendar v3 source.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::{CalendarError, CalendarSource, FetchedEvent};

const GOOGLE_CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const PAGE_SIZE: &str = "250";
/// Caps pagination; a listing that still has pages after this is rejected.
const MAX_PAGES: usize = 40;

/// OAuth client and refresh token for an installed-app grant.
#[derive(Clone)]
pub struct GoogleCredentials {
    client_id: String,
    client_secret: String,
    refresh_token: String,
}

impl fmt::Debug for GoogleCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoogleCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .finish()
    }
}

impl GoogleCredentials {
    /// Checks that every part of the grant is present.
    pub fn new(
        client_id: Option<&str>,
        client_secret: Option<&str>,
        refresh_token: Option<&str>,
    ) -> Result<Self, CalendarError> {
        fn required(value: Option<&str>, reason: &'static str) -> Result<String, CalendarError> {
            value
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
                .ok_or(CalendarError::NotConfigured { reason })
        }

        Ok(Self {
            client_id: required(client_id, "google_client_id is not set")?,
            client_secret: required(client_secret, "google_client_secret is not set")?,
            refresh_token: required(refresh_token, "google_refresh_token is not set")?,
        })
    }
}

/// Google Calendar client.
///
/// Access tokens are obtained from the refresh token on first use and kept
/// for the lifetime of the client. A `401` from the API triggers one refresh
/// and retry.
pub struct GoogleCalendar {
    http: reqwest::Client,
    credentials: GoogleCredentials,
    api_base: String,
    token_url: String,
    access_token: Mutex<Option<String>>,
}

impl fmt::Debug for GoogleCalendar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoogleCalendar")
            .field("credentials", &self.credentials)
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

impl GoogleCalendar {
    pub fn new(credentials: GoogleCredentials) -> Result<Self, CalendarError> {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(CalendarError::ClientBuild)?;
        Ok(Self {
            http,
            credentials,
            api_base: GOOGLE_CALENDAR_API_BASE.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
            access_token: Mutex::new(None),
        })
    }

    #[must_use]
    pub fn with_api_base(mut self, url: impl Into<String>) -> Self {
        self.api_base = url.into();
        self
    }

    #[must_use]
    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }

    fn events_url(&self, calendar_id: &str) -> Result<Url, CalendarError> {
        let mut url = Url::parse(&self.api_base).map_err(|_| CalendarError::NotConfigured {
            reason: "calendar API base URL is invalid",
        })?;
        url.path_segments_mut()
            .map_err(|()| CalendarError::NotConfigured {
                reason: "calendar API base URL cannot take a path",
            })?
            .pop_if_empty()
            .extend(["calendars", calendar_id, "events"]);
        Ok(url)
    }

    async fn access_token(&self) -> Result<String, CalendarError> {
        let mut cached = self.access_token.lock().await;
        if let Some(token) = cached.as_ref() {
            return Ok(token.clone());
        }
        let token = self.refresh_access_token().await?;
        *cached = Some(token.clone());
        Ok(token)
    }

    async fn forget_access_token(&self) {
        *self.access_token.lock().await = None;
    }

    async fn refresh_access_token(&self) -> Result<String, CalendarError> {
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
                ("refresh_token", self.credentials.refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            let message = parse_api_error(&body).unwrap_or_else(|| body.clone());
            if status == StatusCode::BAD_REQUEST || status == StatusCode::UNAUTHORIZED {
                return Err(CalendarError::Auth { message });
            }
            return Err(CalendarError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let token: TokenResponse = serde_json::from_str(&body)
            .map_err(|err| CalendarError::InvalidResponse(err.to_string()))?;
        debug!("refreshed calendar access token");
        Ok(token.access_token)
    }
}

#[async_trait]
impl CalendarSource for GoogleCalendar {
    async fn list_events(
        &self,
        calendar_id: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<Vec<FetchedEvent>, CalendarError> {
        let url = self.events_url(calendar_id)?;
        let mut events = Vec::new();
        let mut page_token: Option<String> = None;
        let mut refreshed = false;
        let mut pages = 0;

        loop {
            let token = self.access_token().await?;
            let mut query = vec![
                ("timeMin", time_min.to_rfc3339_opts(SecondsFormat::Secs, true)),
                ("timeMax", time_max.to_rfc3339_opts(SecondsFormat::Secs, true)),
                ("singleEvents", "true".to_string()),
                ("orderBy", "startTime".to_string()),
                ("maxResults", PAGE_SIZE.to_string()),
            ];
            if let Some(page_token) = &page_token {
                query.push(("pageToken", page_token.clone()));
            }

            let response = self
                .http
                .get(url.clone())
                .bearer_auth(&token)
                .query(&query)
                .send()
                .await?;
            let status = response.status();
            if status == StatusCode::UNAUTHORIZED && !refreshed {
                debug!("calendar access token rejected, refreshing");
                refreshed = true;
                self.forget_access_token().await;
                continue;
            }

            let body = response.text().await?;
            if !status.is_success() {
                let message = parse_api_error(&body).unwrap_or_else(|| body.clone());
                if status == StatusCode::UNAUTHORIZED {
                    return Err(CalendarError::Auth { message });
                }
                return Err(CalendarError::Api {
                    status: status.as_u16(),
                    message,
                });
            }

            let page: EventsPage = serde_json::from_str(&body)
                .map_err(|err| CalendarError::InvalidResponse(err.to_string()))?;
            events.extend(page.items.into_iter().map(fetched_event));
            pages += 1;

            match page.next_page_token {
                Some(next) if pages < MAX_PAGES => page_token = Some(next),
                Some(_) => {
                    return Err(CalendarError::InvalidResponse(format!(
                        "listing still paginating after {pages} pages"
                    )));
                }
                None => break,
            }
        }

        debug!(calendar_id, fetched = events.len(), pages, "listed calendar events");
        Ok(events)
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct EventsPage {
    #[serde(default)]
    items: Vec<serde_json::Value>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct GoogleEvent {
    id: Option<String>,
    summary: Option<String>,
    description: Option<String>,
    location: Option<String>,
    #[serde(default)]
    start: EventTime,
    #[serde(default)]
    end: EventTime,
}

#[derive(Debug, Default, Deserialize)]
struct EventTime {
    #[serde(rename = "dateTime")]
    date_time: Option<String>,
    date: Option<String>,
}

/// Reads the fields the importer needs while keeping the item verbatim.
fn fetched_event(item: serde_json::Value) -> FetchedEvent {
    let event = GoogleEvent::deserialize(&item).unwrap_or_else(|err| {
        warn!(error = %err, "calendar event has an unexpected shape");
        GoogleEvent::default()
    });
    FetchedEvent {
        all_day: event.start.date_time.is_none() && event.start.date.is_some(),
        external_id: event.id,
        summary: event.summary,
        description: event.description,
        location: event.location,
        start: event.start.date_time,
        end: event.end.date_time,
        payload: item,
    }
}

/// Extracts a message from either Google error shape.
fn parse_api_error(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ErrorPayload {
        Api { error: ApiError },
        OAuth {
            error: String,
            error_description: Option<String>,
        },
    }

    #[derive(Deserialize)]
    struct ApiError {
        message: String,
    }

    match serde_json::from_str::<ErrorPayload>(body).ok()? {
        ErrorPayload::Api { error } => Some(error.message),
        ErrorPayload::OAuth {
            error,
            error_description,
        } => Some(error_description.map_or(error.clone(), |text| format!("{error}: {text}"))),
    }
}
