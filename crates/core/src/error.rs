use serde::Serialize;
use thiserror::Error;

use crate::types::{AssociationStatus, DelegationStatus};

/// Error kinds surfaced to callers of the relationship engines.
///
/// Each variant maps to exactly one [`ErrorKind`] and one HTTP status code via
/// [`RelationError::kind`] and [`RelationError::status_code`].
#[derive(Error, Debug)]
pub enum RelationError {
    // --- 401 ---
    #[error("Authentication required")]
    Unauthenticated,

    // --- 403 ---
    #[error("{0}")]
    Forbidden(String),

    // --- 404 ---
    #[error("{0}")]
    NotFound(String),

    // --- 409 ---
    #[error("{0}")]
    Conflict(String),

    #[error("Cannot {action} {entity} in status {from}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        action: &'static str,
    },

    // --- 400 ---
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // --- 410 ---
    #[error("{0}")]
    Gone(String),

    // --- 499 ---
    #[error("Request cancelled")]
    Cancelled,

    // --- 500 ---
    #[error("Misconfigured: {0}")]
    Misconfigured(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Flat classification of [`RelationError`] for transport layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Unauthenticated,
    Forbidden,
    NotFound,
    Conflict,
    InvalidInput,
    InvalidTransition,
    Gone,
    Cancelled,
    Misconfigured,
    Internal,
}

impl RelationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unauthenticated => ErrorKind::Unauthenticated,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::Gone(_) => ErrorKind::Gone,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Misconfigured(_) => ErrorKind::Misconfigured,
            Self::Database(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::InvalidInput => 400,
            ErrorKind::Unauthenticated => 401,
            ErrorKind::Forbidden => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict | ErrorKind::InvalidTransition => 409,
            ErrorKind::Gone => 410,
            ErrorKind::Cancelled => 499,
            ErrorKind::Misconfigured | ErrorKind::Internal => 500,
        }
    }

    /// Message safe to show to an authenticated user of the same tenancy.
    ///
    /// Store and configuration failures are collapsed to a generic message.
    pub fn public_message(&self) -> String {
        match self.kind() {
            ErrorKind::Internal | ErrorKind::Misconfigured => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }

    // --- Constructors ---

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn gone(message: impl Into<String>) -> Self {
        Self::Gone(message.into())
    }

    pub fn misconfigured(message: impl Into<String>) -> Self {
        Self::Misconfigured(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub fn association_transition(from: AssociationStatus, action: &'static str) -> Self {
        Self::InvalidTransition {
            entity: "association",
            from: from.to_string(),
            action,
        }
    }

    pub fn delegation_transition(from: DelegationStatus, action: &'static str) -> Self {
        Self::InvalidTransition {
            entity: "delegation",
            from: from.to_string(),
            action,
        }
    }
}

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Row decode error: {0}")]
    Decode(String),
}

#[cfg(feature = "sqlx-postgres")]
impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => {
                if db_err.is_unique_violation() {
                    DatabaseError::Constraint(db_err.to_string())
                } else {
                    DatabaseError::Query(db_err.to_string())
                }
            }
            sqlx::Error::PoolClosed => DatabaseError::Connection("Pool closed".to_string()),
            sqlx::Error::PoolTimedOut => DatabaseError::Connection("Pool timed out".to_string()),
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                DatabaseError::Decode(err.to_string())
            }
            _ => DatabaseError::Query(err.to_string()),
        }
    }
}

#[cfg(feature = "sqlx-postgres")]
impl From<sqlx::Error> for RelationError {
    fn from(err: sqlx::Error) -> Self {
        RelationError::Database(DatabaseError::from(err))
    }
}

impl From<validator::ValidationErrors> for RelationError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields: Vec<String> = errors
            .field_errors()
            .into_iter()
            .map(|(field, errs)| {
                let messages: Vec<String> = errs
                    .iter()
                    .map(|e| {
                        e.message
                            .as_ref()
                            .map(|m| m.to_string())
                            .unwrap_or_else(|| format!("invalid value for {}", field))
                    })
                    .collect();
                format!("{}: {}", field, messages.join(", "))
            })
            .collect();
        fields.sort();
        RelationError::InvalidInput(fields.join("; "))
    }
}

pub type RelationResult<T> = Result<T, RelationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_follow_kind() {
        assert_eq!(RelationError::Unauthenticated.status_code(), 401);
        assert_eq!(RelationError::forbidden("x").status_code(), 403);
        assert_eq!(RelationError::not_found("x").status_code(), 404);
        assert_eq!(RelationError::conflict("x").status_code(), 409);
        assert_eq!(
            RelationError::association_transition(AssociationStatus::Rejected, "approve")
                .status_code(),
            409
        );
        assert_eq!(RelationError::invalid_input("x").status_code(), 400);
        assert_eq!(RelationError::gone("x").status_code(), 410);
        assert_eq!(
            RelationError::Database(DatabaseError::Query("boom".into())).kind(),
            ErrorKind::Internal
        );
    }

    #[test]
    fn test_internal_details_are_not_public() {
        let err = RelationError::Database(DatabaseError::Connection("10.0.0.4:5432".into()));
        assert_eq!(err.public_message(), "Internal server error");

        let err = RelationError::forbidden("Approval belongs to the affiliate side");
        assert_eq!(
            err.public_message(),
            "Approval belongs to the affiliate side"
        );
    }

    #[test]
    fn test_transition_message() {
        let err = RelationError::delegation_transition(DelegationStatus::Revoked, "accept");
        assert_eq!(err.to_string(), "Cannot accept delegation in status revoked");
    }
}
