//! The authenticated caller.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ErrorKind;
use crate::model::Employee;
use crate::status::Role;
use crate::types::EmployeeId;

/// Authorization failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No principal was supplied at all.
    #[error("no authenticated principal")]
    Unauthenticated,
    /// The supplied subject has no employee record.
    #[error("unknown principal: {subject}")]
    UnknownPrincipal { subject: String },
    #[error("{subject} is not an admin")]
    NotAdmin { subject: String },
}

impl AuthError {
    pub const fn kind(&self) -> ErrorKind {
        ErrorKind::Forbidden
    }
}

/// Identity supplied by the verifier in front of this crate.
///
/// The role is trusted as given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub subject: EmployeeId,
    pub email: Option<String>,
    pub role: Role,
}

impl Principal {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn require_admin(&self) -> Result<(), AuthError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AuthError::NotAdmin {
                subject: self.subject.to_string(),
            })
        }
    }
}

impl From<&Employee> for Principal {
    fn from(employee: &Employee) -> Self {
        Self {
            subject: employee.id.clone(),
            email: employee.email.clone(),
            role: employee.role,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(role: Role) -> Principal {
        Principal {
            subject: EmployeeId::new("emp-a").unwrap(),
            email: None,
            role,
        }
    }

    #[test]
    fn admin_passes() {
        assert!(principal(Role::Admin).require_admin().is_ok());
    }

    #[test]
    fn employee_is_forbidden() {
        let err = principal(Role::Employee).require_admin().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        assert_eq!(err.to_string(), "emp-a is not an admin");
    }
}
