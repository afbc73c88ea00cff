//! Core type definitions with validation.

use std::fmt;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Validation errors for core types and commands.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    /// The provided value was empty.
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },

    /// A string did not match any known variant.
    #[error("invalid {field}: {value}")]
    UnknownValue { field: &'static str, value: String },

    /// A time range ends before (or when) it starts.
    #[error("{field} must end after it starts ({start} .. {end})")]
    InvalidRange {
        field: &'static str,
        start: String,
        end: String,
    },

    /// A numeric value was negative or not finite.
    #[error("{field} must be a non-negative number, got {value}")]
    Negative { field: &'static str, value: f64 },

    /// A date string was not `YYYY-MM-DD`.
    #[error("invalid date: {value} (expected YYYY-MM-DD)")]
    InvalidDate { value: String },

    /// A time-of-day string was not `HH:MM`.
    #[error("invalid time: {value} (expected HH:MM)")]
    InvalidTime { value: String },

    /// A timestamp string was not RFC 3339.
    #[error("invalid timestamp: {value}")]
    InvalidTimestamp { value: String },

    /// A local date and time does not exist in the business timezone.
    #[error("local time {value} does not exist in the configured timezone")]
    NonexistentLocalTime { value: String },

    /// A date span is longer than allowed.
    #[error("date range spans {days} days, maximum is {max}")]
    RangeTooLong { days: i64, max: i64 },
}

/// Generates a validated string ID newtype with common trait implementations.
macro_rules! define_string_id {
    (
        $(#[$meta:meta])*
        $name:ident, $field_name:literal
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates a new ID after validation.
            pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
                let id = id.into();
                if id.trim().is_empty() {
                    return Err(ValidationError::Empty { field: $field_name });
                }
                Ok(Self(id))
            }

            /// Returns the ID as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl std::str::FromStr for $name {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.0.as_str()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                let raw = String::column_result(value)?;
                Self::new(raw).map_err(|err| FromSqlError::Other(Box::new(err)))
            }
        }
    };
}

/// Adds random generation to IDs that are issued locally.
macro_rules! impl_generated_id {
    ($($name:ident),+ $(,)?) => {
        $(
            impl $name {
                /// Generates a fresh random identifier.
                pub fn generate() -> Self {
                    Self(Uuid::new_v4().to_string())
                }
            }
        )+
    };
}

define_string_id!(
    /// An employee identifier.
    ///
    /// Issued by the external identity provider and never generated locally,
    /// so this type deliberately has no `generate` constructor.
    EmployeeId, "employee ID"
);

define_string_id!(
    /// A client identifier.
    ClientId, "client ID"
);

define_string_id!(
    /// An intervention identifier.
    InterventionId, "intervention ID"
);

define_string_id!(
    /// A raw calendar event identifier (local, not the provider's id).
    RawEventId, "raw event ID"
);

define_string_id!(
    /// An absence identifier.
    AbsenceId, "absence ID"
);

impl_generated_id!(ClientId, InterventionId, RawEventId, AbsenceId);

/// Checks that a money or hours amount is finite and non-negative.
pub fn non_negative(field: &'static str, value: f64) -> Result<f64, ValidationError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(ValidationError::Negative { field, value })
    }
}

/// Trims a free-text field, mapping blank input to `None`.
pub fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|trimmed| !trimmed.is_empty())
        .map(str::to_string)
}
