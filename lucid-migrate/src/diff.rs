//! Diffing declared schemas against live schemas.

use std::collections::HashMap;

use lucid_schema::system;
use lucid_schema::{ColumnType, DefaultValue, ForeignKey};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::naming::TableNameCodec;
use crate::priority::get_table_priority;
use crate::schema::{CollectionSchema, CollectionSchemaColumn, CollectionSchemaTable, TableKey, TableType};

/// What a table migration does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationKind {
    /// Create a missing table.
    Create,
    /// Alter an existing table.
    Modify,
    /// Drop a table no longer declared.
    Remove,
}

impl MigrationKind {
    /// Dispatch order within one priority: removals, then creates, then modifies.
    pub fn order(&self) -> u8 {
        match self {
            Self::Remove => 0,
            Self::Create => 1,
            Self::Modify => 2,
        }
    }

    /// Get the kind name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Modify => "modify",
            Self::Remove => "remove",
        }
    }
}

/// A changed attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change<T> {
    /// Live value.
    pub from: T,
    /// Declared value.
    pub to: T,
}

impl<T> Change<T> {
    fn new(from: T, to: T) -> Self {
        Self { from, to }
    }
}

/// The attributes of a column that differ between live and declared.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnChanges {
    /// Type change.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub column_type: Option<Change<ColumnType>>,
    /// Nullability change.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nullable: Option<Change<bool>>,
    /// Default value change.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Change<Option<DefaultValue>>>,
    /// Foreign key change.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub foreign_key: Option<Change<Option<ForeignKey>>>,
    /// Unique constraint change.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unique: Option<Change<bool>>,
}

impl ColumnChanges {
    /// Check if nothing changed.
    pub fn is_empty(&self) -> bool {
        self.column_type.is_none()
            && self.nullable.is_none()
            && self.default.is_none()
            && self.foreign_key.is_none()
            && self.unique.is_none()
    }
}

/// One column-level operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ColumnOperation {
    /// Add a declared column.
    Add {
        /// Declared column.
        column: CollectionSchemaColumn,
    },
    /// Bring a live column in line with its declaration.
    Modify {
        /// Declared column.
        column: CollectionSchemaColumn,
        /// What differs.
        changes: ColumnChanges,
    },
    /// Drop a live column no longer declared.
    Drop {
        /// Live column.
        column: CollectionSchemaColumn,
    },
}

impl ColumnOperation {
    /// The column this operation applies to.
    pub fn column(&self) -> &CollectionSchemaColumn {
        match self {
            Self::Add { column } | Self::Modify { column, .. } | Self::Drop { column } => column,
        }
    }

    /// Check if this is an add.
    pub fn is_add(&self) -> bool {
        matches!(self, Self::Add { .. })
    }
}

/// One table's required change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableMigration {
    /// Table name.
    pub table_name: String,
    /// Table type.
    pub table_type: TableType,
    /// Structured table key.
    pub key: TableKey,
    /// Execution priority, higher first.
    pub priority: i32,
    /// Migration kind.
    #[serde(rename = "type")]
    pub kind: MigrationKind,
    /// Column operations for creates and modifies.
    pub column_operations: Vec<ColumnOperation>,
}

impl TableMigration {
    /// Tables referenced by added or modified columns, excluding this table.
    pub fn foreign_key_targets(&self) -> impl Iterator<Item = &str> {
        self.column_operations
            .iter()
            .filter(|op| !matches!(op, ColumnOperation::Drop { .. }))
            .filter_map(|op| op.column().foreign_key.as_ref())
            .map(|fk| fk.table.as_str())
            .filter(move |t| *t != self.table_name)
    }

    /// Columns added by this migration.
    pub fn added_columns(&self) -> impl Iterator<Item = &CollectionSchemaColumn> {
        self.column_operations
            .iter()
            .filter(|op| op.is_add())
            .map(ColumnOperation::column)
    }
}

/// The migrations needed for one collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationPlan {
    /// Collection key.
    pub collection_key: String,
    /// Table migrations, highest priority first.
    pub tables: Vec<TableMigration>,
}

impl MigrationPlan {
    /// Check if the collection needs no migration.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Find the migration for a table.
    pub fn table(&self, name: &str) -> Option<&TableMigration> {
        self.tables.iter().find(|m| m.table_name == name)
    }

    /// Order tables by priority, highest first, then by kind.
    pub fn sort(&mut self) {
        self.tables.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.kind.order().cmp(&b.kind.order()))
        });
    }

    /// Human-readable notes for operations that discard data.
    pub fn destructive_warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        for migration in &self.tables {
            if migration.kind == MigrationKind::Remove {
                warnings.push(format!(
                    "Table '{}' of collection '{}' will be dropped",
                    migration.table_name, self.collection_key
                ));
                continue;
            }
            for op in &migration.column_operations {
                if let ColumnOperation::Drop { column } = op {
                    warnings.push(format!(
                        "Column '{}' of table '{}' will be dropped",
                        column.name, migration.table_name
                    ));
                }
            }
        }
        warnings
    }
}

/// The result of one full dry run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MigrationResult {
    /// One plan per configured collection.
    pub plans: Vec<MigrationPlan>,
    /// Live schemas of configured collections as introspected.
    pub inferred_schemas: Vec<CollectionSchema>,
    /// Destructive operations and skipped live tables.
    pub warnings: Vec<String>,
}

impl MigrationResult {
    /// Check if any collection needs migration.
    pub fn requires_migration(&self) -> bool {
        self.plans.iter().any(|p| !p.is_empty())
    }

    /// Find a collection's plan.
    pub fn plan(&self, collection_key: &str) -> Option<&MigrationPlan> {
        self.plans.iter().find(|p| p.collection_key == collection_key)
    }

    /// Find a collection's live schema.
    pub fn inferred_schema(&self, collection_key: &str) -> Option<&CollectionSchema> {
        self.inferred_schemas.iter().find(|s| s.key == collection_key)
    }

    /// Total table migrations across all plans.
    pub fn table_count(&self) -> usize {
        self.plans.iter().map(|p| p.tables.len()).sum()
    }

    /// Get a human-readable summary.
    pub fn summary(&self) -> String {
        let count = |kind: MigrationKind| {
            self.plans
                .iter()
                .flat_map(|p| p.tables.iter())
                .filter(|m| m.kind == kind)
                .count()
        };

        let mut parts = Vec::new();
        for kind in [MigrationKind::Create, MigrationKind::Modify, MigrationKind::Remove] {
            let n = count(kind);
            if n > 0 {
                parts.push(format!("{} {} tables", capitalize(kind.as_str()), n));
            }
        }

        if parts.is_empty() {
            "No changes".to_string()
        } else {
            parts.join(", ")
        }
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Compare two default values semantically.
///
/// `None` and `Null` are interchangeable, `NaN` equals `NaN`, integers and
/// floats compare numerically, arrays element-wise and objects by key set.
pub fn default_values_equal(a: Option<&DefaultValue>, b: Option<&DefaultValue>) -> bool {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());

    match (a, b) {
        (None, None) => true,
        (None, Some(_)) | (Some(_), None) => false,
        (Some(a), Some(b)) => values_equal(a, b),
    }
}

fn values_equal(a: &DefaultValue, b: &DefaultValue) -> bool {
    use DefaultValue::*;

    match (a, b) {
        (Null, Null) => true,
        (Int(_) | Float(_), Int(_) | Float(_)) => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => (x.is_nan() && y.is_nan()) || x == y,
            _ => false,
        },
        (Array(xs), Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Object(xs), Object(ys)) => {
            let mut xk: Vec<&String> = xs.keys().collect();
            let mut yk: Vec<&String> = ys.keys().collect();
            xk.sort();
            yk.sort();
            xk == yk
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| values_equal(x, y)))
        }
        _ => a == b,
    }
}

/// Compare a declared column with its live counterpart.
///
/// Returns `None` when nothing differs.
pub fn determine_column_mods(
    declared: &CollectionSchemaColumn,
    live: &CollectionSchemaColumn,
) -> Option<ColumnOperation> {
    let mut changes = ColumnChanges::default();

    if declared.column_type != live.column_type {
        changes.column_type = Some(Change::new(live.column_type, declared.column_type));
    }
    if declared.nullable != live.nullable {
        changes.nullable = Some(Change::new(live.nullable, declared.nullable));
    }
    if !default_values_equal(declared.default.as_ref(), live.default.as_ref()) {
        changes.default = Some(Change::new(live.default.clone(), declared.default.clone()));
    }
    if declared.foreign_key != live.foreign_key {
        changes.foreign_key = Some(Change::new(
            live.foreign_key.clone(),
            declared.foreign_key.clone(),
        ));
    }
    if declared.unique != live.unique {
        changes.unique = Some(Change::new(live.unique, declared.unique));
    }

    if changes.is_empty() {
        None
    } else {
        Some(ColumnOperation::Modify {
            column: declared.clone(),
            changes,
        })
    }
}

/// Diffs declared collection schemas against live ones.
pub struct SchemaDiffer<'a> {
    codec: &'a TableNameCodec,
}

impl<'a> SchemaDiffer<'a> {
    /// Create a differ.
    pub fn new(codec: &'a TableNameCodec) -> Self {
        Self { codec }
    }

    /// Diff one collection.
    pub fn diff_collection(
        &self,
        declared: &CollectionSchema,
        live: Option<&CollectionSchema>,
    ) -> MigrationPlan {
        let live_tables: HashMap<&str, &CollectionSchemaTable> = live
            .map(|s| s.tables.iter().map(|t| (t.name.as_str(), t)).collect())
            .unwrap_or_default();

        let mut tables: Vec<TableMigration> = declared
            .tables
            .iter()
            .filter_map(|table| self.diff_table(Some(table), live_tables.get(table.name.as_str()).copied()))
            .collect();

        if let Some(live) = live {
            tables.extend(
                live.tables
                    .iter()
                    .filter(|t| declared.table(&t.name).is_none())
                    .filter_map(|t| self.diff_table(None, Some(t))),
            );
        }

        let mut plan = MigrationPlan {
            collection_key: declared.key.clone(),
            tables,
        };
        plan.sort();

        debug!(
            collection = %declared.key,
            tables = plan.tables.len(),
            "Diffed collection"
        );

        plan
    }

    /// Diff one table. Returns `None` when nothing needs to change.
    pub fn diff_table(
        &self,
        declared: Option<&CollectionSchemaTable>,
        live: Option<&CollectionSchemaTable>,
    ) -> Option<TableMigration> {
        match (declared, live) {
            (None, None) => None,
            (Some(declared), None) => Some(self.migration(
                declared,
                MigrationKind::Create,
                declared
                    .columns
                    .iter()
                    .map(|c| ColumnOperation::Add { column: c.clone() })
                    .collect(),
            )),
            (None, Some(live)) => Some(self.migration(live, MigrationKind::Remove, Vec::new())),
            (Some(declared), Some(live)) => {
                let mut operations = Vec::new();

                for column in &declared.columns {
                    match live.column(&column.name) {
                        None => operations.push(ColumnOperation::Add {
                            column: column.clone(),
                        }),
                        Some(live_column) => {
                            operations.extend(determine_column_mods(column, live_column));
                        }
                    }
                }

                operations.extend(
                    live.columns
                        .iter()
                        .filter(|c| declared.column(&c.name).is_none())
                        .filter(|c| !self.is_protected(c))
                        .map(|c| ColumnOperation::Drop { column: c.clone() }),
                );

                if operations.is_empty() {
                    None
                } else {
                    Some(self.migration(declared, MigrationKind::Modify, operations))
                }
            }
        }
    }

    /// Columns never dropped: bookkeeping columns and references to core tables.
    fn is_protected(&self, column: &CollectionSchemaColumn) -> bool {
        system::PROTECTED.contains(&column.name.as_str())
            || column
                .foreign_key
                .as_ref()
                .is_some_and(|fk| !self.codec.is_collection_table(&fk.table))
    }

    fn migration(
        &self,
        table: &CollectionSchemaTable,
        kind: MigrationKind,
        column_operations: Vec<ColumnOperation>,
    ) -> TableMigration {
        TableMigration {
            table_name: table.name.clone(),
            table_type: table.table_type,
            key: table.key.clone(),
            priority: get_table_priority(self.codec, table),
            kind,
            column_operations,
        }
    }
}
