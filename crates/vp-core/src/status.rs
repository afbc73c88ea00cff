//! Enumerated states stored as lower-case strings.

use std::fmt;
use std::str::FromStr;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

use crate::types::ValidationError;

/// Implements `Display` and the `rusqlite` column conversions via `as_str`/`FromStr`.
macro_rules! string_column {
    ($name:ident) => {
        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                let raw = value.as_str()?;
                raw.parse().map_err(|err: ValidationError| FromSqlError::Other(Box::new(err)))
            }
        }
    };
}

/// Access level of an employee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    Employee,
}

impl Role {
    /// String representation for database storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Employee => "employee",
        }
    }
}

impl FromStr for Role {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "employee" => Ok(Self::Employee),
            _ => Err(ValidationError::UnknownValue {
                field: "role",
                value: s.to_string(),
            }),
        }
    }
}

string_column!(Role);

/// Lifecycle of an intervention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterventionStatus {
    #[default]
    Planned,
    InProgress,
    Done,
    Cancelled,
}

impl InterventionStatus {
    /// String representation for database storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Planned => "planned",
            Self::InProgress => "in_progress",
            Self::Done => "done",
            Self::Cancelled => "cancelled",
        }
    }
}

impl FromStr for InterventionStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "planned" => Ok(Self::Planned),
            "in_progress" => Ok(Self::InProgress),
            "done" => Ok(Self::Done),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(ValidationError::UnknownValue {
                field: "intervention status",
                value: s.to_string(),
            }),
        }
    }
}

string_column!(InterventionStatus);

/// Triage state of an imported calendar event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriageStatus {
    /// Freshly imported, nobody assigned.
    #[default]
    Raw,
    /// At least one employee assigned.
    Assigned,
    /// Dismissed by an admin.
    Ignored,
    /// Promoted into an intervention.
    Converted,
}

impl TriageStatus {
    /// Statuses still waiting for an admin decision.
    pub const PENDING: [Self; 2] = [Self::Raw, Self::Assigned];

    /// String representation for database storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Assigned => "assigned",
            Self::Ignored => "ignored",
            Self::Converted => "converted",
        }
    }

    /// Returns `true` for `raw` and `assigned`.
    #[must_use]
    pub const fn is_pending(self) -> bool {
        matches!(self, Self::Raw | Self::Assigned)
    }
}

impl FromStr for TriageStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            // "pending" is what older clients send after an intervention is deleted.
            "raw" | "pending" => Ok(Self::Raw),
            "assigned" => Ok(Self::Assigned),
            "ignored" => Ok(Self::Ignored),
            "converted" => Ok(Self::Converted),
            _ => Err(ValidationError::UnknownValue {
                field: "triage status",
                value: s.to_string(),
            }),
        }
    }
}

string_column!(TriageStatus);

/// Parses a comma-separated status filter such as `raw,assigned`.
pub fn parse_status_filter(input: &str) -> Result<Vec<TriageStatus>, ValidationError> {
    let mut statuses = Vec::new();
    for part in input.split(',').map(str::trim).filter(|part| !part.is_empty()) {
        let status: TriageStatus = part.parse()?;
        if !statuses.contains(&status) {
            statuses.push(status);
        }
    }
    if statuses.is_empty() {
        return Err(ValidationError::Empty {
            field: "status filter",
        });
    }
    Ok(statuses)
}
