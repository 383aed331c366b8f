//! Contracts between field types and the database layer.
//!
//! Field types never talk to a database. They describe their columns through
//! [`SchemaContext`], which hands them the adapter's [`AdapterCapabilities`]
//! and the names of the tables they may reference.

use crate::ast::ColumnType;
use crate::value::DefaultValue;

/// Dialect facts a field type may need while describing its columns.
pub trait AdapterCapabilities: Send + Sync {
    /// Physical type name for a semantic column type.
    fn data_type(&self, column_type: ColumnType) -> &'static str;

    /// The default value representation this database reports for a boolean.
    ///
    /// Databases without a native boolean store `0`/`1`, so declaring
    /// `Bool(true)` there would never compare equal to the live column.
    fn boolean_default(&self, value: bool) -> DefaultValue {
        DefaultValue::Bool(value)
    }

    /// Render a default value as a SQL literal for a column of `column_type`.
    fn format_default(&self, value: &DefaultValue, column_type: ColumnType) -> String;
}

/// Core tables managed outside of collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoreTable {
    /// Registered collections.
    Collections,
    /// Configured locales.
    Locales,
    /// Users.
    Users,
    /// Media library.
    Media,
}

impl CoreTable {
    /// Unprefixed table name.
    pub fn base_name(&self) -> &'static str {
        match self {
            Self::Collections => "collections",
            Self::Locales => "locales",
            Self::Users => "users",
            Self::Media => "media",
        }
    }
}

/// Everything a field type can see while producing its schema definition.
pub trait SchemaContext {
    /// Adapter capabilities.
    fn capabilities(&self) -> &dyn AdapterCapabilities;

    /// Full name of a core table.
    fn core_table(&self, table: CoreTable) -> String;

    /// Full name of another collection's document table.
    fn document_table(&self, collection_key: &str) -> String;
}
