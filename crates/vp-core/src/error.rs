//! Failure taxonomy shared by every crate.

use std::fmt;

use serde::Serialize;

use crate::triage::TriageError;
use crate::types::ValidationError;

/// How a failure should be surfaced to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A referenced record does not exist.
    NotFound,
    /// The operation clashes with current state (already converted, dependents exist).
    Conflict,
    /// Malformed input or a broken invariant.
    Validation,
    /// The principal lacks the required role.
    Forbidden,
    /// A collaborator is unreachable or not configured.
    UpstreamUnavailable,
    /// A collaborator answered with something unusable.
    UpstreamMalformed,
    Internal,
}

impl ErrorKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::Validation => "validation",
            Self::Forbidden => "forbidden",
            Self::UpstreamUnavailable => "upstream_unavailable",
            Self::UpstreamMalformed => "upstream_malformed",
            Self::Internal => "internal",
        }
    }

    /// Only unavailable collaborators are worth retrying.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::UpstreamUnavailable)
    }

    /// Process exit status for command-line callers (sysexits where one fits).
    #[must_use]
    pub const fn exit_code(self) -> u8 {
        match self {
            Self::Validation => 2,
            Self::NotFound => 3,
            Self::Conflict => 4,
            Self::Forbidden => 5,
            Self::UpstreamUnavailable => 69,
            Self::UpstreamMalformed => 76,
            Self::Internal => 1,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ValidationError {
    pub const fn kind(&self) -> ErrorKind {
        ErrorKind::Validation
    }
}

impl TriageError {
    pub const fn kind(&self) -> ErrorKind {
        ErrorKind::Conflict
    }
}
