//! Column specifications produced by field types.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::DefaultValue;

/// Dialect-independent column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ColumnType {
    /// Auto-incrementing integer primary key.
    Serial,
    /// 32-bit integer.
    Integer,
    /// Double precision float.
    Real,
    /// Unbounded text.
    Text,
    /// Boolean.
    Boolean,
    /// Timestamp with time zone.
    Timestamp,
    /// JSON document.
    Json,
}

impl ColumnType {
    /// Get the semantic type name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Serial => "serial",
            Self::Integer => "integer",
            Self::Real => "real",
            Self::Text => "text",
            Self::Boolean => "boolean",
            Self::Timestamp => "timestamp",
            Self::Json => "json",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Referential action when the referenced row is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OnDelete {
    /// Delete dependent rows.
    Cascade,
    /// Null out the referencing column.
    SetNull,
    /// Refuse the delete.
    Restrict,
    /// Database default behavior.
    #[default]
    NoAction,
}

impl OnDelete {
    /// Get the SQL keyword for this action.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Cascade => "CASCADE",
            Self::SetNull => "SET NULL",
            Self::Restrict => "RESTRICT",
            Self::NoAction => "NO ACTION",
        }
    }

    /// Parse an action as reported by a database catalog (e.g. `SET NULL`).
    pub fn from_sql(rule: &str) -> Self {
        match rule.trim().to_ascii_uppercase().as_str() {
            "CASCADE" => Self::Cascade,
            "SET NULL" => Self::SetNull,
            "RESTRICT" => Self::Restrict,
            _ => Self::NoAction,
        }
    }
}

/// A foreign key reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForeignKey {
    /// Referenced table.
    pub table: String,
    /// Referenced column.
    pub column: String,
    /// Delete behavior.
    pub on_delete: OnDelete,
}

impl ForeignKey {
    /// Create a new foreign key reference.
    pub fn new(table: impl Into<String>, column: impl Into<String>, on_delete: OnDelete) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
            on_delete,
        }
    }
}

/// A single column contributed by a field type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    /// Column name.
    pub name: String,
    /// Semantic type.
    pub column_type: ColumnType,
    /// Whether the column accepts null.
    pub nullable: bool,
    /// Default value, if any.
    pub default: Option<DefaultValue>,
    /// Whether the column carries a unique constraint.
    pub unique: bool,
    /// Foreign key reference, if any.
    pub foreign_key: Option<ForeignKey>,
}

impl ColumnSpec {
    /// Create a nullable column with no default.
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: true,
            default: None,
            unique: false,
            foreign_key: None,
        }
    }

    /// Set nullability.
    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// Set the default value.
    pub fn default_value(mut self, default: Option<DefaultValue>) -> Self {
        self.default = default;
        self
    }

    /// Mark the column unique.
    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    /// Set a foreign key reference.
    pub fn references(mut self, foreign_key: ForeignKey) -> Self {
        self.foreign_key = Some(foreign_key);
        self
    }
}

/// The schema contribution of one field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaDefinition {
    /// Columns the field adds to its table.
    pub columns: Vec<ColumnSpec>,
}

impl SchemaDefinition {
    /// A definition contributing no columns.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A definition contributing a single column.
    pub fn single(column: ColumnSpec) -> Self {
        Self {
            columns: vec![column],
        }
    }
}
