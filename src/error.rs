// ⚠️ Error Types - every failure the office can hit
// None of these are fatal to the process: each one maps to a safe page
// with a human-readable notice in the web layer.

use thiserror::Error;

/// Errors from domain operations and the persistence layer.
#[derive(Debug, Error)]
pub enum AppError {
    /// Student, user or other entity is missing.
    #[error("{0}")]
    NotFound(String),

    /// Duplicate unique key (reg number, username).
    #[error("{0}")]
    Conflict(String),

    /// Unparseable amount, missing required field, malformed period.
    #[error("{0}")]
    InvalidInput(String),

    /// Authenticated, but the role does not allow the action.
    #[error("You do not have permission to perform this action.")]
    Forbidden,

    /// No (or an expired) session, or bad credentials.
    #[error("{0}")]
    Unauthenticated(String),

    /// Store-level failure. The transaction has been rolled back.
    #[error("Database error: {0}")]
    Persistence(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl AppError {
    pub fn not_found(message: impl Into<String>) -> Self {
        AppError::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        AppError::Conflict(message.into())
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        AppError::InvalidInput(message.into())
    }

    /// Message safe to show to a user. Store details stay in the log.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Persistence(_) | AppError::Config(_) => {
                "Something went wrong while saving. No changes were made.".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, msg)
                if e.code == rusqlite::ErrorCode::ConstraintViolation
                    && msg.as_deref().is_some_and(|m| m.contains("UNIQUE")) =>
            {
                AppError::Conflict(err.to_string())
            }
            _ => AppError::Persistence(err.to_string()),
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;

/// Configuration error types.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Figment extraction or merge error.
    #[error("Configuration error: {0}")]
    Figment(#[from] Box<figment::Error>),

    /// A configuration field has an invalid value.
    #[error("Invalid configuration value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        ConfigError::Figment(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_violation_maps_to_conflict() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute("CREATE TABLE t (k TEXT UNIQUE)", []).unwrap();
        conn.execute("INSERT INTO t (k) VALUES ('a')", []).unwrap();

        let err: AppError = conn
            .execute("INSERT INTO t (k) VALUES ('a')", [])
            .unwrap_err()
            .into();

        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[test]
    fn other_store_errors_map_to_persistence() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let err: AppError = conn
            .execute("INSERT INTO missing_table (k) VALUES (1)", [])
            .unwrap_err()
            .into();

        assert!(matches!(err, AppError::Persistence(_)));
        assert!(!err.user_message().contains("missing_table"));
    }
}
