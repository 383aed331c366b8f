//! Relational schema model shared by declared and live schemas.

use std::fmt;

use lucid_schema::{ColumnSpec, ColumnType, DefaultValue, ForeignKey};
use serde::{Deserialize, Serialize};

/// The kind of table a collection owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TableType {
    /// One row per document.
    Document,
    /// One row per document version.
    Versions,
    /// Document-level field values.
    DocumentFields,
    /// Field values of one brick.
    Brick,
    /// Rows of a repeater, possibly nested.
    Repeater,
}

impl TableType {
    /// Get the type name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Versions => "versions",
            Self::DocumentFields => "document-fields",
            Self::Brick => "brick",
            Self::Repeater => "repeater",
        }
    }
}

impl fmt::Display for TableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Group name used for document-level field tables in status reports.
pub const DOCUMENT_FIELDS_GROUP: &str = "document-fields";

/// Structured path of a table within its collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TableKey {
    /// Collection key.
    pub collection: String,
    /// Brick key, when the table belongs to a brick.
    pub brick: Option<String>,
    /// Repeater keys from outermost to innermost.
    pub repeaters: Vec<String>,
}

impl TableKey {
    /// Key of a collection-level table.
    pub fn collection(key: impl Into<String>) -> Self {
        Self {
            collection: key.into(),
            brick: None,
            repeaters: Vec::new(),
        }
    }

    /// Scope this key to a brick.
    pub fn with_brick(mut self, brick: impl Into<String>) -> Self {
        self.brick = Some(brick.into());
        self
    }

    /// Descend into a repeater.
    pub fn with_repeater(mut self, repeater: impl Into<String>) -> Self {
        self.repeaters.push(repeater.into());
        self
    }

    /// Repeater nesting depth.
    pub fn depth(&self) -> usize {
        self.repeaters.len()
    }

    /// Key of the table owning this repeater's rows, one level up.
    pub fn parent(&self) -> Option<Self> {
        if self.repeaters.is_empty() {
            return None;
        }
        let mut parent = self.clone();
        parent.repeaters.pop();
        Some(parent)
    }

    /// Status grouping: the brick key, or `document-fields`.
    pub fn group(&self) -> &str {
        self.brick.as_deref().unwrap_or(DOCUMENT_FIELDS_GROUP)
    }
}

/// Where a column comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ColumnSource {
    /// Managed by the engine (linkage, timestamps).
    Core,
    /// Backs a declared field.
    Field {
        /// Field key.
        key: String,
    },
}

/// A column as declared by the collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSchemaColumn {
    /// Column name.
    pub name: String,
    /// Column origin.
    #[serde(flatten)]
    pub source: ColumnSource,
    /// Semantic type.
    pub column_type: ColumnType,
    /// Whether the column accepts null.
    pub nullable: bool,
    /// Default value.
    pub default: Option<DefaultValue>,
    /// Unique constraint.
    pub unique: bool,
    /// Primary key.
    pub primary: bool,
    /// Foreign key reference.
    pub foreign_key: Option<ForeignKey>,
}

impl CollectionSchemaColumn {
    /// Create a nullable core column.
    pub fn core(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            source: ColumnSource::Core,
            column_type,
            nullable: true,
            default: None,
            unique: false,
            primary: false,
            foreign_key: None,
        }
    }

    /// Create a column backing the field `key` from its column spec.
    pub fn from_field(key: impl Into<String>, spec: ColumnSpec) -> Self {
        Self {
            name: spec.name,
            source: ColumnSource::Field { key: key.into() },
            column_type: spec.column_type,
            nullable: spec.nullable,
            default: spec.default,
            unique: spec.unique,
            primary: false,
            foreign_key: spec.foreign_key,
        }
    }

    /// Auto-incrementing primary key.
    pub fn primary_key(name: impl Into<String>) -> Self {
        let mut column = Self::core(name, ColumnType::Serial);
        column.nullable = false;
        column.primary = true;
        column
    }

    /// Set nullability.
    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// Set the default value.
    pub fn default_value(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self
    }

    /// Set a foreign key reference.
    pub fn references(mut self, foreign_key: ForeignKey) -> Self {
        self.foreign_key = Some(foreign_key);
        self
    }

    /// The field key this column backs, if any.
    pub fn field_key(&self) -> Option<&str> {
        match &self.source {
            ColumnSource::Field { key } => Some(key),
            ColumnSource::Core => None,
        }
    }
}

/// One relational table of a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSchemaTable {
    /// Encoded table name.
    pub name: String,
    /// Table type.
    #[serde(rename = "type")]
    pub table_type: TableType,
    /// Structured key.
    pub key: TableKey,
    /// Columns in declaration order.
    pub columns: Vec<CollectionSchemaColumn>,
}

impl CollectionSchemaTable {
    /// Find a column by name.
    pub fn column(&self, name: &str) -> Option<&CollectionSchemaColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Tables referenced by foreign keys, excluding the table itself.
    pub fn foreign_key_targets(&self) -> impl Iterator<Item = &str> {
        self.columns
            .iter()
            .filter_map(|c| c.foreign_key.as_ref())
            .map(|fk| fk.table.as_str())
            .filter(move |t| *t != self.name)
    }
}

/// The full schema of one collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSchema {
    /// Collection key.
    pub key: String,
    /// Tables, parents before children.
    pub tables: Vec<CollectionSchemaTable>,
}

impl CollectionSchema {
    /// Create an empty schema.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            tables: Vec::new(),
        }
    }

    /// Find a table by name.
    pub fn table(&self, name: &str) -> Option<&CollectionSchemaTable> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Find a table by type and key.
    pub fn table_by_key(&self, table_type: TableType, key: &TableKey) -> Option<&CollectionSchemaTable> {
        self.tables
            .iter()
            .find(|t| t.table_type == table_type && &t.key == key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_key_parent_and_group() {
        let key = TableKey::collection("pages")
            .with_brick("hero")
            .with_repeater("items")
            .with_repeater("links");

        assert_eq!(key.depth(), 2);
        assert_eq!(key.group(), "hero");

        let parent = key.parent().unwrap();
        assert_eq!(parent.repeaters, vec!["items".to_string()]);
        assert!(TableKey::collection("pages").parent().is_none());
        assert_eq!(TableKey::collection("pages").group(), DOCUMENT_FIELDS_GROUP);
    }

    #[test]
    fn test_foreign_key_targets_skip_self() {
        use lucid_schema::OnDelete;

        let table = CollectionSchemaTable {
            name: "ld_document_pages_versions".into(),
            table_type: TableType::Versions,
            key: TableKey::collection("pages"),
            columns: vec![
                CollectionSchemaColumn::core("document_id", ColumnType::Integer).references(
                    ForeignKey::new("ld_document_pages", "id", OnDelete::Cascade),
                ),
                CollectionSchemaColumn::core("promoted_from", ColumnType::Integer).references(
                    ForeignKey::new("ld_document_pages_versions", "id", OnDelete::SetNull),
                ),
            ],
        };

        let targets: Vec<_> = table.foreign_key_targets().collect();
        assert_eq!(targets, vec!["ld_document_pages"]);
    }

    #[test]
    fn test_column_serializes_source() {
        let column = CollectionSchemaColumn::from_field(
            "title",
            ColumnSpec::new("title", ColumnType::Text),
        );
        let json = serde_json::to_value(&column).unwrap();
        assert_eq!(json["source"], "field");
        assert_eq!(json["key"], "title");
        assert_eq!(column.field_key(), Some("title"));
    }
}
