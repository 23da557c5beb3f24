//! Unified error types for the rollup engine.
//!
//! Every failure surfaced by the core is one of these variants. Not-found and
//! precondition errors abort the enclosing mutation; the open database
//! transaction is dropped and rolled back.

use thiserror::Error;

/// Every error the crate can return.
#[derive(Debug, Error)]
pub enum Error {
    /// The store rejected a query or write
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// config.toml could not be read or parsed
    #[error("Configuration error: {message}")]
    Config {
        /// What went wrong
        message: String,
    },

    /// No budget item with this id
    #[error("Budget item not found: {id}")]
    BudgetItemNotFound {
        /// Requested id
        id: i64,
    },

    /// No project with this id
    #[error("Project not found: {id}")]
    ProjectNotFound {
        /// Requested id
        id: i64,
    },

    /// No breakdown with this id
    #[error("Breakdown not found: {id}")]
    BreakdownNotFound {
        /// Requested id
        id: i64,
    },

    /// The acting user does not exist
    #[error("Actor not found: {id}")]
    ActorNotFound {
        /// Requested user id
        id: i64,
    },

    /// No activity log entry with this id
    #[error("Activity log entry not found: {id}")]
    LogNotFound {
        /// Requested id
        id: i64,
    },

    /// A hard precondition blocked the mutation; `blocking` is the number of
    /// child records standing in the way.
    #[error("{message}")]
    PreconditionFailed {
        /// Message shown to the caller as-is
        message: String,
        /// Number of blocking child records
        blocking: u64,
    },

    /// The permission check refused the action
    #[error("Permission denied: {message}")]
    PermissionDenied {
        /// Who was refused what
        message: String,
    },

    /// Input or state did not allow the operation
    #[error("Validation error: {message}")]
    Validation {
        /// What was invalid
        message: String,
    },

    /// An amount was negative or not finite
    #[error("Invalid amount: {amount}")]
    InvalidAmount {
        /// The rejected amount
        amount: f64,
    },

    /// A recompute kept losing the version check
    #[error("Concurrent modification of {entity} {id}, retries exhausted")]
    ConcurrentModification {
        /// Kind of record, e.g. "project"
        entity: &'static str,
        /// Record id
        id: i64,
    },

    /// A snapshot or summary could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// File access failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An environment variable was missing or not unicode
    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),
}

impl Error {
    /// Returns true for the record not-found family. Bulk breakdown operations
    /// turn these into skipped records instead of failing the batch.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::BudgetItemNotFound { .. }
                | Self::ProjectNotFound { .. }
                | Self::BreakdownNotFound { .. }
        )
    }
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
