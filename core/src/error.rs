//! Domain error taxonomy.
//!
//! Every operation in the service layer fails with a [`DomainError`]. The web
//! layer maps each variant onto an HTTP status; the variants mirror that
//! taxonomy (validation, authorization, missing resource, state conflict,
//! storage failure).

use crate::hours::Hours;
use crate::store::StoreError;
use serde::Serialize;
use thiserror::Error;

/// A single invalid input field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FieldError {
    /// Name of the offending field as the client sent it.
    pub field: String,
    /// Human readable description of the problem.
    pub message: String,
}

/// Errors produced by domain rules and services.
#[derive(Error, Debug)]
pub enum DomainError {
    /// Malformed or missing input.
    #[error("Validation failed: {}", describe(.0))]
    Validation(Vec<FieldError>),

    /// The caller is authenticated but may not perform the operation.
    #[error("{0}")]
    Forbidden(String),

    /// A referenced resource does not exist.
    #[error("{resource} with id {id} not found")]
    NotFound {
        /// Kind of resource ("Booking", "User", ...).
        resource: &'static str,
        /// Identifier that was looked up.
        id: String,
    },

    /// The resource is in a state that does not allow the operation.
    #[error("{0}")]
    Conflict(String),

    /// The payer's ledger balance does not cover the amount.
    #[error("Insufficient balance")]
    InsufficientBalance {
        /// Current ledger balance of the payer.
        available: Hours,
        /// Amount that had to be covered.
        required: Hours,
    },

    /// The store failed for reasons unrelated to domain rules.
    #[error("Storage error: {0}")]
    Store(StoreError),
}

impl DomainError {
    /// Shorthand for a single-field validation error.
    #[must_use]
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation(vec![FieldError {
            field: field.into(),
            message: message.into(),
        }])
    }

    /// Shorthand for a missing resource.
    #[must_use]
    pub fn not_found(resource: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            resource,
            id: id.to_string(),
        }
    }

    /// Shorthand for an authorization failure.
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    /// Shorthand for a state conflict.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }
}

impl From<StoreError> for DomainError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InsufficientBalance {
                available,
                required,
                ..
            } => Self::InsufficientBalance {
                available,
                required,
            },
            StoreError::StaleWrite(message) | StoreError::Duplicate(message) => {
                Self::Conflict(message)
            }
            StoreError::NotFound { entity, id } => Self::NotFound { resource: entity, id },
            other => Self::Store(other),
        }
    }
}

fn describe(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| format!("{}: {}", e.field, e.message))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Collects field errors so a request can report all of them at once.
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<FieldError>,
}

impl Validator {
    /// Creates an empty validator.
    #[must_use]
    pub const fn new() -> Self {
        Self { errors: Vec::new() }
    }

    /// Records an error for `field` unless `ok` holds.
    pub fn check(&mut self, ok: bool, field: &str, message: &str) -> &mut Self {
        if !ok {
            self.errors.push(FieldError {
                field: field.to_string(),
                message: message.to_string(),
            });
        }
        self
    }

    /// Records the field errors carried by a failed sub-validation.
    pub fn absorb<T>(&mut self, result: Result<T, DomainError>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(DomainError::Validation(mut errors)) => {
                self.errors.append(&mut errors);
                None
            }
            Err(other) => {
                self.errors.push(FieldError {
                    field: "request".to_string(),
                    message: other.to_string(),
                });
                None
            }
        }
    }

    /// Returns `Ok` when nothing was recorded.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Validation`] with every recorded field error.
    pub fn finish(self) -> Result<(), DomainError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(DomainError::Validation(self.errors))
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn validator_collects_all_fields() {
        let mut v = Validator::new();
        v.check(false, "hours", "must be greater than 0")
            .check(true, "category", "is required")
            .check(false, "note", "is too long");
        match v.finish() {
            Err(DomainError::Validation(errors)) => {
                let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
                assert_eq!(fields, ["hours", "note"]);
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn store_guard_failure_becomes_insufficient_balance() {
        let err: DomainError = StoreError::InsufficientBalance {
            user_id: crate::ids::UserId::new(),
            available: Hours::whole(2),
            required: Hours::whole(5),
        }
        .into();
        assert_eq!(err.to_string(), "Insufficient balance");
    }
}
