//! Field-service scheduling CLI library.
//!
//! This crate provides the `vp` command-line interface over the scheduling
//! store and its external collaborators.

mod cli;
pub mod commands;
mod config;

pub use cli::{Cli, Commands};
pub use config::Config;

use vp_calendar::CalendarError;
use vp_core::{AuthError, ErrorKind, TriageError, ValidationError};
use vp_db::DbError;
use vp_llm::LlmError;

/// Classifies a command failure by the first library error in its chain.
pub fn error_kind(err: &anyhow::Error) -> ErrorKind {
    for cause in err.chain() {
        if let Some(err) = cause.downcast_ref::<DbError>() {
            return err.kind();
        }
        if let Some(err) = cause.downcast_ref::<CalendarError>() {
            return err.kind();
        }
        if let Some(err) = cause.downcast_ref::<LlmError>() {
            return err.kind();
        }
        if let Some(err) = cause.downcast_ref::<AuthError>() {
            return err.kind();
        }
        if let Some(err) = cause.downcast_ref::<ValidationError>() {
            return err.kind();
        }
        if let Some(err) = cause.downcast_ref::<TriageError>() {
            return err.kind();
        }
        // Unreadable input files.
        if cause.downcast_ref::<serde_json::Error>().is_some() {
            return ErrorKind::Validation;
        }
    }
    ErrorKind::Internal
}

#[cfg(test)]
mod tests {
    use super::*;

    use anyhow::Context;

    #[test]
    fn kind_survives_context() {
        let err = Err::<(), _>(DbError::NotFound {
            entity: "raw event",
            id: "abc".to_string(),
        })
        .context("failed to convert")
        .unwrap_err();
        assert_eq!(error_kind(&err), ErrorKind::NotFound);
        assert_eq!(error_kind(&err).exit_code(), 3);
    }

    #[test]
    fn upstream_failures_map_to_sysexits() {
        let err = anyhow::Error::new(CalendarError::NotConfigured {
            reason: "google_refresh_token is not set",
        });
        assert_eq!(error_kind(&err).exit_code(), 69);

        let err = anyhow::Error::new(LlmError::BadUpstreamResponse {
            reason: "not an object".to_string(),
            raw: "[]".to_string(),
        });
        assert_eq!(error_kind(&err).exit_code(), 76);
    }

    #[test]
    fn unknown_errors_are_internal() {
        let err = anyhow::anyhow!("disk on fire");
        assert_eq!(error_kind(&err), ErrorKind::Internal);
        let err = anyhow::Error::new(AuthError::Unauthenticated);
        assert_eq!(error_kind(&err), ErrorKind::Forbidden);
    }
}
