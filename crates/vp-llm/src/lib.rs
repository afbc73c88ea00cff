//! Claude API integration for field-service scheduling.
//!
//! Provides the structuring step of the import pipeline: the free text of a
//! raw calendar event goes to a language model, and the JSON it returns is
//! checked and turned into a [`Confirmation`] proposal for an admin to review.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::TimeZone;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use vp_core::{Confirmation, ErrorKind, RawEvent, StructuredFields};

/// Default request timeout for API calls.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const DEFAULT_MODEL: &str = "claude-haiku-4-5";
const STRUCTURING_MAX_TOKENS: u32 = 1024;
const STRUCTURING_TEMPERATURE: f32 = 0.0;
/// How much upstream text error messages show.
const PREVIEW_CHARS: usize = 200;

/// Instruction sent with every structuring request.
pub const STRUCTURING_INSTRUCTION: &str = r#"You assist a window-cleaning company in Belgium.
You receive one raw calendar entry (title, description, location, date and times) and extract structured job information from it.

Answer ONLY with one valid JSON object: no markdown, no comments, no extra text.

Expected shape:
{
  "client_name": "Full client name, or \"unknown\"",
  "client_street": "Street and number",
  "client_zip": "Postal code",
  "client_city": "City",
  "client_phone": "Phone number or empty",
  "client_email": "Email or empty",
  "client_notes": "Important constraints (time windows, access, warnings) or empty",
  "is_invoice": true when the title contains 'Fac', 'TVAC' or 'HTVA', otherwise false,
  "total_price": total amount in euros as a number, or 0.0,
  "full_description": "Complete description of the services",
  "services_json": [
    {"description": "Service name", "price": 0.0}
  ]
}

Rules:
- Take the address from the location or the description.
- Take prices from the description (format: "Service (XX€)").
- total_price is the sum of the service prices; 0.0 when no price is known.
- Move constraints (e.g. "not before 11am", "mind the sills") out of full_description into client_notes."#;

/// LLM client errors.
#[derive(Debug, Error)]
pub enum LlmError {
    /// The provided API key was invalid.
    #[error("invalid API key: {reason}")]
    InvalidApiKey { reason: &'static str },
    /// Failed to build HTTP client.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    /// HTTP request failed.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// API returned an error response.
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },
    /// The API envelope could not be read.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    /// The model answered, but not with the expected JSON shape.
    ///
    /// `raw` holds the complete answer; only a prefix is displayed.
    #[error("unusable structuring output ({reason}): {}", preview(.raw))]
    BadUpstreamResponse { reason: String, raw: String },
}

impl LlmError {
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidApiKey { .. } | Self::Request(_) | Self::Api { .. } => {
                ErrorKind::UpstreamUnavailable
            }
            Self::InvalidResponse(_) | Self::BadUpstreamResponse { .. } => {
                ErrorKind::UpstreamMalformed
            }
            Self::ClientBuild(_) => ErrorKind::Internal,
        }
    }

    /// A missing key or a rejected request will fail the same way again.
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::InvalidApiKey { .. } => false,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            _ => self.kind().is_retryable(),
        }
    }
}

fn preview(raw: &str) -> String {
    let mut chars = raw.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}…")
    } else {
        head
    }
}

/// A service that turns free text into JSON under an instruction.
#[async_trait]
pub trait TextStructurer: Send + Sync {
    /// Returns the service's raw text answer.
    async fn extract(&self, instruction: &str, text: &str) -> Result<String, LlmError>;
}

/// Claude API client.
///
/// # Thread Safety
///
/// The client is safe to clone and share across threads. Each clone shares
/// the underlying HTTP connection pool.
#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    api_key: String,
    api_url: String,
    model: String,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Creates a new client with the given API key and the default model.
    ///
    /// # Errors
    ///
    /// Returns an error if the API key is empty or whitespace-only, or if
    /// the HTTP client fails to build.
    pub fn new(api_key: impl Into<String>) -> Result<Self, LlmError> {
        let api_key = api_key.into();

        if api_key.is_empty() {
            return Err(LlmError::InvalidApiKey {
                reason: "API key cannot be empty",
            });
        }
        if api_key.trim().is_empty() {
            return Err(LlmError::InvalidApiKey {
                reason: "API key cannot be whitespace-only",
            });
        }

        let http = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(LlmError::ClientBuild)?;

        Ok(Self {
            http,
            api_key,
            api_url: ANTHROPIC_API_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
        })
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    #[must_use]
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }
}

#[async_trait]
impl TextStructurer for Client {
    async fn extract(&self, instruction: &str, text: &str) -> Result<String, LlmError> {
        let request = MessageRequest {
            model: &self.model,
            max_tokens: STRUCTURING_MAX_TOKENS,
            temperature: STRUCTURING_TEMPERATURE,
            system: instruction,
            messages: vec![Message {
                role: "user",
                content: text,
            }],
        };

        let response = self
            .http
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(LlmError::Api {
                status: status.as_u16(),
                message: parse_api_error(&body).unwrap_or(body),
            });
        }

        let payload: MessageResponse = serde_json::from_str(&body)
            .map_err(|err| LlmError::InvalidResponse(err.to_string()))?;
        extract_text(payload.content)
    }
}

#[derive(Debug, Serialize)]
struct MessageRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

fn extract_text(blocks: Vec<ContentBlock>) -> Result<String, LlmError> {
    let pieces: Vec<String> = blocks
        .into_iter()
        .filter_map(|block| match block {
            ContentBlock::Text { text } => Some(text),
            ContentBlock::Other => None,
        })
        .collect();
    if pieces.is_empty() {
        return Err(LlmError::InvalidResponse(
            "missing text content".to_string(),
        ));
    }
    Ok(pieces.join("\n"))
}

fn parse_api_error(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorPayload {
        error: ErrorDetails,
    }

    #[derive(Deserialize)]
    struct ErrorDetails {
        message: String,
    }

    serde_json::from_str::<ErrorPayload>(body)
        .ok()
        .map(|payload| payload.error.message)
}

/// Local wall-clock rendering of a raw event, as shown to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventText {
    pub date: String,
    pub start_time: String,
    pub end_time: String,
    pub body: String,
}

impl EventText {
    pub fn new<Tz: TimeZone>(event: &RawEvent, tz: &Tz) -> Self {
        let start = event.start_time.with_timezone(tz).naive_local();
        let end = event.end_time.with_timezone(tz).naive_local();
        let date = start.format("%Y-%m-%d").to_string();
        let start_time = start.format("%H:%M").to_string();
        let end_time = end.format("%H:%M").to_string();
        let body = [
            format!("Title: {}", event.summary),
            format!("Description: {}", event.description.as_deref().unwrap_or("")),
            format!("Location: {}", event.location.as_deref().unwrap_or("")),
            format!("Date: {date}"),
            format!("Start: {start_time}"),
            format!("End: {end_time}"),
        ]
        .join("\n");
        Self {
            date,
            start_time,
            end_time,
            body,
        }
    }
}

/// Keys every answer must carry, with their accepted spellings.
const REQUIRED_KEYS: [&[&str]; 3] = [
    &["client_name"],
    &["total_price"],
    &["services_json", "services"],
];

/// Checks the model's answer against the structured shape.
///
/// Surrounding whitespace and a Markdown code fence are tolerated; anything
/// else that is not a JSON object of the expected fields is rejected with
/// the full answer attached.
pub fn parse_structured(raw: &str) -> Result<StructuredFields, LlmError> {
    let bad = |reason: String| LlmError::BadUpstreamResponse {
        reason,
        raw: raw.to_string(),
    };

    let text = strip_code_fence(raw.trim());
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|err| bad(format!("not JSON: {err}")))?;
    let Some(object) = value.as_object() else {
        return Err(bad("expected a JSON object".to_string()));
    };
    let missing: Vec<&str> = REQUIRED_KEYS
        .iter()
        .filter(|names| !names.iter().any(|name| object.contains_key(*name)))
        .map(|names| names[0])
        .collect();
    if !missing.is_empty() {
        return Err(bad(format!("missing fields: {}", missing.join(", "))));
    }
    serde_json::from_value(value).map_err(|err| bad(format!("unexpected shape: {err}")))
}

fn strip_code_fence(text: &str) -> &str {
    let Some(inner) = text.strip_prefix("```") else {
        return text;
    };
    let Some(inner) = inner.strip_suffix("```") else {
        return text;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.trim()
}

/// Proposes structured fields for a raw event.
///
/// Stores nothing: the returned confirmation still has to be reviewed and
/// confirmed. Its date and times are the event's local values in `tz`.
pub async fn structure<S, Tz>(
    structurer: &S,
    event: &RawEvent,
    tz: &Tz,
) -> Result<Confirmation, LlmError>
where
    S: TextStructurer + ?Sized,
    Tz: TimeZone,
{
    let text = EventText::new(event, tz);
    debug!(raw_event_id = %event.id, "requesting structuring proposal");
    let raw = structurer
        .extract(STRUCTURING_INSTRUCTION, &text.body)
        .await?;
    let fields = parse_structured(&raw).inspect_err(|err| {
        warn!(raw_event_id = %event.id, error = %err, "structuring output rejected");
    })?;
    Ok(Confirmation {
        source_id: event.id.to_string(),
        original_summary: event.summary.clone(),
        date: text.date,
        start_time: text.start_time,
        end_time: text.end_time,
        fields,
    })
}
