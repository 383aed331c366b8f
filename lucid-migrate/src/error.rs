//! Error types for the migration engine.

use lucid_schema::SchemaError;
use thiserror::Error;

/// Result type alias for migration operations.
pub type MigrateResult<T> = Result<T, MigrationError>;

/// Errors that can occur during migration operations.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Invalid collection declarations.
    #[error("Declaration error: {0}")]
    Declaration(#[from] SchemaError),

    /// A table name could not be built or parsed.
    #[error("Invalid table name: {0}")]
    TableName(String),

    /// The database catalog could not be read.
    #[error("Introspection error: {0}")]
    Introspection(String),

    /// Database operation error.
    #[error("Database error: {0}")]
    Database(String),

    /// A DDL operation failed for a table.
    #[error("Failed to migrate table '{table}': {message}")]
    Execution {
        /// Table name.
        table: String,
        /// Error message.
        message: String,
    },

    /// The requested collection is not configured.
    #[error("Collection '{0}' not found")]
    CollectionNotFound(String),

    /// The dialect cannot express an operation.
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// General migration error.
    #[error("Migration error: {0}")]
    Other(String),
}

impl MigrationError {
    /// Create a table name error.
    pub fn table_name(msg: impl Into<String>) -> Self {
        Self::TableName(msg.into())
    }

    /// Create an introspection error.
    pub fn introspection(msg: impl Into<String>) -> Self {
        Self::Introspection(msg.into())
    }

    /// Create a database error.
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Create an execution error for a table.
    pub fn execution(table: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Execution {
            table: table.into(),
            message: msg.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an unsupported operation error.
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    /// Create an other error.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Check if retrying the same call may succeed.
    ///
    /// Dry runs are read-only, so catalog and connection failures can be retried.
    /// Declaration and naming errors cannot.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Introspection(_) | Self::Database(_))
    }
}
