//! Error types for collection declarations and configuration.

// These warnings are false positives - the fields are used by derive macros
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

/// Result type for schema operations.
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Errors that can occur while declaring or validating collections.
#[derive(Error, Debug, Diagnostic)]
pub enum SchemaError {
    /// Error reading a file.
    #[error("failed to read file: {path}")]
    #[diagnostic(code(lucid::schema::io_error))]
    IoError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A collection, brick or field key is empty or contains a reserved sequence.
    #[error("invalid key `{key}` in `{scope}`: {message}")]
    #[diagnostic(
        code(lucid::schema::invalid_key),
        help("keys may not be empty or contain the table name separator")
    )]
    InvalidKey {
        scope: String,
        key: String,
        message: String,
    },

    /// Invalid field definition.
    #[error("invalid field `{scope}.{field}`: {message}")]
    #[diagnostic(code(lucid::schema::invalid_field))]
    InvalidField {
        scope: String,
        field: String,
        message: String,
    },

    /// Duplicate definition.
    #[error("duplicate {kind} `{name}` in `{scope}`")]
    #[diagnostic(code(lucid::schema::duplicate))]
    Duplicate {
        kind: String,
        name: String,
        scope: String,
    },

    /// A field key collides with a column the engine manages itself.
    #[error("field `{scope}.{field}` uses the reserved column name `{field}`")]
    #[diagnostic(code(lucid::schema::reserved_column))]
    ReservedColumn { scope: String, field: String },

    /// Unknown field type name.
    #[error("unknown field type `{type_name}`")]
    #[diagnostic(code(lucid::schema::unknown_field_type))]
    UnknownFieldType { type_name: String },

    /// Configuration error.
    #[error("configuration error: {message}")]
    #[diagnostic(code(lucid::schema::config_error))]
    ConfigError { message: String },

    /// TOML parsing error.
    #[error("failed to parse TOML")]
    #[diagnostic(code(lucid::schema::toml_error))]
    TomlError {
        #[source]
        source: toml::de::Error,
    },

    /// Validation error with multiple issues.
    #[error("collection validation failed with {count} error(s)")]
    #[diagnostic(code(lucid::schema::validation_failed))]
    ValidationFailed {
        count: usize,
        #[related]
        errors: Vec<SchemaError>,
    },
}

impl SchemaError {
    /// Create an invalid key error.
    pub fn invalid_key(
        scope: impl Into<String>,
        key: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidKey {
            scope: scope.into(),
            key: key.into(),
            message: message.into(),
        }
    }

    /// Create an invalid field error.
    pub fn invalid_field(
        scope: impl Into<String>,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidField {
            scope: scope.into(),
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a duplicate definition error.
    pub fn duplicate(
        kind: impl Into<String>,
        name: impl Into<String>,
        scope: impl Into<String>,
    ) -> Self {
        Self::Duplicate {
            kind: kind.into(),
            name: name.into(),
            scope: scope.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_key_display() {
        let err = SchemaError::invalid_key("collection", "my_pages", "contains `_`");
        let msg = err.to_string();
        assert!(msg.contains("my_pages"));
        assert!(msg.contains("collection"));
    }

    #[test]
    fn test_validation_failed_display() {
        let err = SchemaError::ValidationFailed {
            count: 2,
            errors: vec![
                SchemaError::duplicate("field", "title", "pages"),
                SchemaError::config("bad"),
            ],
        };
        assert!(err.to_string().contains("2 error(s)"));
    }
}
