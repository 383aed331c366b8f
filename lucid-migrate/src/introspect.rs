//! Live schema introspection.
//!
//! Adapters report raw catalog rows through [`Introspector`]. This module
//! normalizes them into [`InferredTable`]s and groups those into per-collection
//! [`CollectionSchema`]s the diff engine can compare against declarations.

use std::collections::{BTreeMap, HashMap};

use futures::future::try_join_all;
use lucid_schema::system;
use lucid_schema::{ColumnType, DefaultValue, ForeignKey, OnDelete};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{MigrateResult, MigrationError};
use crate::naming::TableNameCodec;
use crate::schema::{
    CollectionSchema, CollectionSchemaColumn, CollectionSchemaTable, ColumnSource, TableType,
};

/// Raw table information from the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    /// Table name.
    pub name: String,
    /// Table schema (e.g., "public").
    pub schema: String,
    /// Table type ("BASE TABLE" or "VIEW").
    pub table_type: String,
}

impl TableInfo {
    /// A base table in the `public` schema.
    pub fn base_table(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: "public".to_string(),
            table_type: "BASE TABLE".to_string(),
        }
    }
}

/// Raw column information from the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    /// Column name.
    pub name: String,
    /// Data type (e.g., "integer", "character varying").
    pub data_type: String,
    /// Full UDT name (e.g., "int4", "varchar").
    pub udt_name: String,
    /// Whether the column is nullable.
    pub is_nullable: bool,
    /// Default value expression.
    pub column_default: Option<String>,
    /// Ordinal position.
    pub ordinal_position: i32,
}

/// Raw constraint information from the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintInfo {
    /// Constraint name.
    pub name: String,
    /// Constraint type (PRIMARY KEY, UNIQUE, FOREIGN KEY, CHECK).
    pub constraint_type: String,
    /// Table name.
    pub table_name: String,
    /// Columns in the constraint.
    pub columns: Vec<String>,
    /// Referenced table (for foreign keys).
    pub referenced_table: Option<String>,
    /// Referenced columns (for foreign keys).
    pub referenced_columns: Option<Vec<String>>,
    /// On delete action (for foreign keys).
    pub on_delete: Option<String>,
}

/// Trait for database introspection.
#[async_trait::async_trait]
pub trait Introspector: Send + Sync {
    /// Get all tables in the database.
    async fn get_tables(&self) -> MigrateResult<Vec<TableInfo>>;

    /// Get columns for a table.
    async fn get_columns(&self, table: &str) -> MigrateResult<Vec<ColumnInfo>>;

    /// Get constraints for a table.
    async fn get_constraints(&self, table: &str) -> MigrateResult<Vec<ConstraintInfo>>;
}

/// A live column, normalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferredColumn {
    /// Column name.
    pub name: String,
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

impl InferredColumn {
    /// Convert into the schema model, deriving the column's source from its name.
    pub fn into_schema_column(self) -> CollectionSchemaColumn {
        let source = if system::is_reserved(&self.name) {
            ColumnSource::Core
        } else {
            ColumnSource::Field {
                key: self.name.clone(),
            }
        };

        CollectionSchemaColumn {
            name: self.name,
            source,
            column_type: self.column_type,
            nullable: self.nullable,
            default: self.default,
            unique: self.unique,
            primary: self.primary,
            foreign_key: self.foreign_key,
        }
    }
}

/// A live table, normalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferredTable {
    /// Table name.
    pub name: String,
    /// Columns in ordinal order.
    pub columns: Vec<InferredColumn>,
}

/// Reads and normalizes the collection tables of a live database.
pub struct LiveSchemaIntrospector<'a> {
    codec: &'a TableNameCodec,
}

impl<'a> LiveSchemaIntrospector<'a> {
    /// Create an introspector for tables named by `codec`.
    pub fn new(codec: &'a TableNameCodec) -> Self {
        Self { codec }
    }

    /// Read every collection table.
    ///
    /// Catalog failures and columns whose type cannot be mapped abort the
    /// whole read. A table with an unreadable column still exists, so
    /// dropping it from the result would plan its creation.
    pub async fn introspect<I>(&self, introspector: &I) -> MigrateResult<Vec<InferredTable>>
    where
        I: Introspector + ?Sized,
    {
        let tables: Vec<TableInfo> = introspector
            .get_tables()
            .await?
            .into_iter()
            .filter(|t| t.table_type == "BASE TABLE" && self.codec.is_collection_table(&t.name))
            .collect();

        let raw = try_join_all(tables.iter().map(|table| async move {
            let (columns, constraints) = futures::try_join!(
                introspector.get_columns(&table.name),
                introspector.get_constraints(&table.name)
            )?;
            Ok::<_, MigrationError>((table, columns, constraints))
        }))
        .await?;

        let inferred = raw
            .into_iter()
            .map(|(table, columns, constraints)| {
                build_inferred_table(table, columns, &constraints)
            })
            .collect::<MigrateResult<Vec<_>>>()?;

        debug!(tables = inferred.len(), "Introspected live schema");
        Ok(inferred)
    }

    /// Group inferred tables into per-collection schemas keyed by collection.
    ///
    /// Tables whose names do not decode are set aside in
    /// [`LiveSchema::unrecognized`]. No declaration resolves to such a name.
    pub fn group(&self, tables: Vec<InferredTable>) -> LiveSchema {
        let mut schemas: BTreeMap<String, CollectionSchema> = BTreeMap::new();
        let mut unrecognized = Vec::new();

        for table in tables {
            let (table_type, key) = match self.codec.parse(&table.name) {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!(table = %table.name, error = %e, "Skipping unrecognized live table");
                    unrecognized.push(table.name);
                    continue;
                }
            };

            let collection = key.collection.clone();
            schemas
                .entry(collection.clone())
                .or_insert_with(|| CollectionSchema::new(collection))
                .tables
                .push(CollectionSchemaTable {
                    name: table.name,
                    table_type,
                    key,
                    columns: table
                        .columns
                        .into_iter()
                        .map(InferredColumn::into_schema_column)
                        .collect(),
                });
        }

        for schema in schemas.values_mut() {
            schema.tables.sort_by(|a, b| {
                type_rank(a.table_type)
                    .cmp(&type_rank(b.table_type))
                    .then_with(|| a.key.brick.cmp(&b.key.brick))
                    .then_with(|| a.key.repeaters.cmp(&b.key.repeaters))
            });
        }

        LiveSchema {
            schemas,
            unrecognized,
        }
    }
}

/// Live collection tables grouped by collection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LiveSchema {
    /// Per-collection schemas keyed by collection.
    pub schemas: BTreeMap<String, CollectionSchema>,
    /// Tables under the collection scope whose names do not decode.
    pub unrecognized: Vec<String>,
}

fn type_rank(table_type: TableType) -> u8 {
    match table_type {
        TableType::Document => 0,
        TableType::Versions => 1,
        TableType::DocumentFields => 2,
        TableType::Brick => 3,
        TableType::Repeater => 4,
    }
}

/// Normalize raw catalog rows for one table.
pub fn build_inferred_table(
    table: &TableInfo,
    mut columns: Vec<ColumnInfo>,
    constraints: &[ConstraintInfo],
) -> MigrateResult<InferredTable> {
    columns.sort_by_key(|c| c.ordinal_position);

    let pk_columns: Vec<&str> = constraints
        .iter()
        .filter(|c| c.constraint_type == "PRIMARY KEY")
        .flat_map(|c| c.columns.iter().map(String::as_str))
        .collect();

    let unique_columns: Vec<&str> = constraints
        .iter()
        .filter(|c| c.constraint_type == "UNIQUE" && c.columns.len() == 1)
        .flat_map(|c| c.columns.iter().map(String::as_str))
        .collect();

    let mut foreign_keys: HashMap<&str, ForeignKey> = HashMap::new();
    for constraint in constraints
        .iter()
        .filter(|c| c.constraint_type == "FOREIGN KEY" && c.columns.len() == 1)
    {
        let (Some(target), Some(target_column)) = (
            constraint.referenced_table.as_ref(),
            constraint
                .referenced_columns
                .as_ref()
                .and_then(|cols| cols.first()),
        ) else {
            continue;
        };
        foreign_keys.insert(
            constraint.columns[0].as_str(),
            ForeignKey::new(
                target,
                target_column,
                constraint
                    .on_delete
                    .as_deref()
                    .map(OnDelete::from_sql)
                    .unwrap_or_default(),
            ),
        );
    }

    let columns = columns
        .into_iter()
        .map(|column| {
            let auto_increment = column
                .column_default
                .as_deref()
                .is_some_and(|d| d.contains("nextval"));
            let column_type = sql_type_to_column_type(&column.udt_name, &column.data_type)
                .map(|t| match t {
                    ColumnType::Integer if auto_increment => ColumnType::Serial,
                    other => other,
                })
                .map_err(|_| {
                    MigrationError::introspection(format!(
                        "column \"{}\".\"{}\" has unsupported type {} ({})",
                        table.name, column.name, column.udt_name, column.data_type
                    ))
                })?;

            let default = match column.column_default.as_deref() {
                Some(d) if !auto_increment => parse_default_value(d, column_type),
                _ => None,
            };

            Ok(InferredColumn {
                primary: pk_columns.contains(&column.name.as_str()),
                unique: unique_columns.contains(&column.name.as_str()),
                foreign_key: foreign_keys.remove(column.name.as_str()),
                nullable: column.is_nullable,
                name: column.name,
                column_type,
                default,
            })
        })
        .collect::<MigrateResult<Vec<_>>>()?;

    Ok(InferredTable {
        name: table.name.clone(),
        columns,
    })
}

/// Map a catalog type to a semantic column type.
pub fn sql_type_to_column_type(udt_name: &str, data_type: &str) -> MigrateResult<ColumnType> {
    let mapped = |name: &str| match name {
        "int2" | "int4" | "int8" | "integer" | "smallint" | "bigint" => Some(ColumnType::Integer),
        "serial" | "serial4" | "bigserial" => Some(ColumnType::Serial),
        "float4" | "float8" | "real" | "double precision" | "numeric" | "decimal" => {
            Some(ColumnType::Real)
        }
        "text" | "varchar" | "char" | "character varying" | "character" | "bpchar" => {
            Some(ColumnType::Text)
        }
        "bool" | "boolean" => Some(ColumnType::Boolean),
        "timestamp"
        | "timestamptz"
        | "timestamp with time zone"
        | "timestamp without time zone" => Some(ColumnType::Timestamp),
        "json" | "jsonb" => Some(ColumnType::Json),
        _ => None,
    };

    mapped(udt_name)
        .or_else(|| mapped(data_type))
        .ok_or_else(|| {
            MigrationError::introspection(format!("Unknown SQL type: {} ({})", udt_name, data_type))
        })
}

/// Parse a catalog default expression.
///
/// `NULL` and sequence defaults yield `None`. Function calls and other bare
/// expressions are kept verbatim.
pub fn parse_default_value(default: &str, column_type: ColumnType) -> Option<DefaultValue> {
    let mut trimmed = default.trim();

    while trimmed.len() >= 2
        && trimmed.starts_with('(')
        && trimmed.ends_with(')')
        && balanced(&trimmed[1..trimmed.len() - 1])
    {
        trimmed = trimmed[1..trimmed.len() - 1].trim();
    }

    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("NULL") || trimmed.contains("nextval") {
        return None;
    }

    if let Some(literal) = quoted_literal(trimmed) {
        return Some(typed_literal(literal, column_type));
    }

    // NULL::text
    if let Some((head, _)) = trimmed.split_once("::")
        && head.trim().eq_ignore_ascii_case("NULL")
    {
        return None;
    }

    if trimmed.eq_ignore_ascii_case("true") {
        return Some(DefaultValue::Bool(true));
    }
    if trimmed.eq_ignore_ascii_case("false") {
        return Some(DefaultValue::Bool(false));
    }

    if let Ok(int) = trimmed.parse::<i64>() {
        return Some(DefaultValue::Int(int));
    }
    if let Ok(float) = trimmed.parse::<f64>() {
        return Some(DefaultValue::Float(float));
    }

    Some(DefaultValue::expression(trimmed))
}

/// Extract the content of a `'...'` literal, optionally followed by a `::cast`.
fn quoted_literal(expr: &str) -> Option<String> {
    let body = expr.strip_prefix('\'')?;
    let mut out = String::new();
    let mut chars = body.char_indices().peekable();

    while let Some((i, ch)) = chars.next() {
        if ch != '\'' {
            out.push(ch);
            continue;
        }
        if matches!(chars.peek(), Some((_, '\''))) {
            chars.next();
            out.push('\'');
            continue;
        }
        let rest = body[i + 1..].trim();
        return (rest.is_empty() || rest.starts_with("::")).then_some(out);
    }

    None
}

fn typed_literal(literal: String, column_type: ColumnType) -> DefaultValue {
    match column_type {
        ColumnType::Json => serde_json::from_str::<serde_json::Value>(&literal)
            .map(DefaultValue::from)
            .unwrap_or(DefaultValue::Text(literal)),
        ColumnType::Integer | ColumnType::Serial | ColumnType::Real => {
            if let Ok(int) = literal.parse::<i64>() {
                DefaultValue::Int(int)
            } else if let Ok(float) = literal.parse::<f64>() {
                DefaultValue::Float(float)
            } else {
                DefaultValue::Text(literal)
            }
        }
        ColumnType::Boolean => match literal.to_ascii_lowercase().as_str() {
            "true" | "t" => DefaultValue::Bool(true),
            "false" | "f" => DefaultValue::Bool(false),
            _ => DefaultValue::Text(literal),
        },
        ColumnType::Text | ColumnType::Timestamp => DefaultValue::Text(literal),
    }
}

fn balanced(expr: &str) -> bool {
    let mut depth = 0i32;
    for ch in expr.chars() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}
