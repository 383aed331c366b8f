//! Table naming codec.
//!
//! Every collection table name has the shape
//! `{prefix}document{sep}{collection}[{sep}versions|{sep}fields|{sep}{brick}][{sep}{repeater}]*`.
//! Keys never contain the separator (declarations are validated before they
//! reach the codec), so names decode by splitting on it.

use crate::error::{MigrateResult, MigrationError};
use crate::schema::{TableKey, TableType};

/// Literal segment following the prefix.
pub const DOCUMENT_SEGMENT: &str = "document";
/// Literal segment of the versions table.
pub const VERSIONS_SEGMENT: &str = "versions";
/// Literal segment of the document-level fields table.
pub const FIELDS_SEGMENT: &str = "fields";

/// Encodes table types and keys into names and back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNameCodec {
    prefix: String,
    separator: String,
}

impl Default for TableNameCodec {
    fn default() -> Self {
        Self::new("ld_", "_")
    }
}

impl TableNameCodec {
    /// Create a codec.
    pub fn new(prefix: impl Into<String>, separator: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            separator: separator.into(),
        }
    }

    /// Table prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Segment separator.
    pub fn separator(&self) -> &str {
        &self.separator
    }

    /// Name of a core table such as `collections`.
    pub fn core_table(&self, base: &str) -> String {
        format!("{}{}", self.prefix, base)
    }

    /// Prefix shared by every collection-scoped table.
    pub fn collection_scope(&self) -> String {
        format!("{}{}{}", self.prefix, DOCUMENT_SEGMENT, self.separator)
    }

    /// Name of a collection's document table.
    pub fn document_table(&self, collection_key: &str) -> String {
        format!("{}{}", self.collection_scope(), collection_key)
    }

    /// Check if a table belongs to some collection.
    pub fn is_collection_table(&self, name: &str) -> bool {
        name.starts_with(&self.collection_scope())
    }

    /// Build the name of a table.
    pub fn build_table_name(&self, table_type: TableType, key: &TableKey) -> MigrateResult<String> {
        if key.collection.is_empty() {
            return Err(MigrationError::table_name(format!(
                "cannot build a {} table name without a collection key",
                table_type
            )));
        }

        let mut segments: Vec<&str> = vec![DOCUMENT_SEGMENT, &key.collection];

        match table_type {
            TableType::Document => {}
            TableType::Versions => segments.push(VERSIONS_SEGMENT),
            TableType::DocumentFields => segments.push(FIELDS_SEGMENT),
            TableType::Brick => {
                let brick = key.brick.as_deref().ok_or_else(|| {
                    MigrationError::table_name(format!(
                        "brick table for collection '{}' requires a brick key",
                        key.collection
                    ))
                })?;
                segments.push(brick);
            }
            TableType::Repeater => {
                if key.repeaters.is_empty() {
                    return Err(MigrationError::table_name(format!(
                        "repeater table for collection '{}' requires at least one repeater key",
                        key.collection
                    )));
                }
                segments.push(key.brick.as_deref().unwrap_or(FIELDS_SEGMENT));
                segments.extend(key.repeaters.iter().map(String::as_str));
            }
        }

        Ok(format!("{}{}", self.prefix, segments.join(&self.separator)))
    }

    /// Infer the type of a table from its name.
    pub fn infer_table_type(&self, name: &str) -> MigrateResult<TableType> {
        self.parse(name).map(|(table_type, _)| table_type)
    }

    /// Decode a table name into its type and key.
    pub fn parse(&self, name: &str) -> MigrateResult<(TableType, TableKey)> {
        let rest = name.strip_prefix(&self.prefix).ok_or_else(|| {
            MigrationError::table_name(format!(
                "table '{}' does not start with the prefix '{}'",
                name, self.prefix
            ))
        })?;

        let segments: Vec<&str> = rest.split(self.separator.as_str()).collect();

        if segments[0] != DOCUMENT_SEGMENT {
            return Err(MigrationError::table_name(format!(
                "table '{}' is not a collection table",
                name
            )));
        }
        if segments.iter().any(|s| s.is_empty()) {
            return Err(MigrationError::table_name(format!(
                "table '{}' contains an empty segment",
                name
            )));
        }

        let parsed = match segments.as_slice() {
            [_, collection] => (TableType::Document, TableKey::collection(*collection)),
            [_, collection, VERSIONS_SEGMENT] => {
                (TableType::Versions, TableKey::collection(*collection))
            }
            [_, collection, FIELDS_SEGMENT] => {
                (TableType::DocumentFields, TableKey::collection(*collection))
            }
            [_, collection, brick] => (
                TableType::Brick,
                TableKey::collection(*collection).with_brick(*brick),
            ),
            [_, collection, scope, repeaters @ ..] => {
                let key = match *scope {
                    VERSIONS_SEGMENT => {
                        return Err(MigrationError::table_name(format!(
                            "table '{}' nests a repeater under the versions table",
                            name
                        )));
                    }
                    FIELDS_SEGMENT => TableKey::collection(*collection),
                    brick => TableKey::collection(*collection).with_brick(brick),
                };
                let key = repeaters
                    .iter()
                    .fold(key, |key, repeater| key.with_repeater(*repeater));
                (TableType::Repeater, key)
            }
            _ => {
                return Err(MigrationError::table_name(format!(
                    "table '{}' has {} segment(s), expected at least 2",
                    name,
                    segments.len()
                )));
            }
        };

        Ok(parsed)
    }
}
