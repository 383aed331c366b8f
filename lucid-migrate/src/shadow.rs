//! In-memory shadow database.
//!
//! [`ShadowDatabase`] keeps a PostgreSQL-style catalog in memory and implements
//! [`DatabaseAdapter`], so migrations can be rehearsed without a server:
//!
//! 1. Run a dry run against the shadow and inspect the plan
//! 2. Execute it and check the catalog or the recorded events
//! 3. Run a second dry run to confirm nothing is left to migrate
//!
//! # Example
//!
//! ```rust,ignore
//! use lucid_migrate::{MigrationEngine, ShadowDatabase};
//!
//! let shadow = ShadowDatabase::new();
//! let engine = MigrationEngine::new(shadow, collections);
//! engine.migrate().await?;
//! assert!(!engine.generate().await?.requires_migration());
//! ```

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use indexmap::IndexMap;
use lucid_schema::{AdapterCapabilities, ColumnType, DefaultValue, ForeignKey};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::adapter::DatabaseAdapter;
use crate::diff::{ColumnOperation, MigrationKind};
use crate::error::{MigrateResult, MigrationError};
use crate::introspect::{ColumnInfo, ConstraintInfo, Introspector, TableInfo};
use crate::schema::{CollectionSchemaColumn, CollectionSchemaTable};
use crate::sql::{Dialect, PostgresDialect, foreign_key_constraint_name, unique_constraint_name};

/// Phase of a recorded operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShadowPhase {
    /// The operation was dispatched.
    Started,
    /// The operation completed successfully.
    Finished,
}

/// A recorded DDL operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShadowEvent {
    /// Table name.
    pub table: String,
    /// Operation kind.
    pub kind: MigrationKind,
    /// Phase.
    pub phase: ShadowPhase,
}

#[derive(Debug, Clone)]
struct ShadowColumn {
    name: String,
    column_type: ColumnType,
    nullable: bool,
    default: Option<DefaultValue>,
    unique: bool,
    primary: bool,
    foreign_key: Option<ForeignKey>,
}

impl From<&CollectionSchemaColumn> for ShadowColumn {
    fn from(column: &CollectionSchemaColumn) -> Self {
        Self {
            name: column.name.clone(),
            column_type: column.column_type,
            nullable: column.nullable && !column.primary,
            default: column.default.clone().filter(|d| !d.is_null()),
            unique: column.unique,
            primary: column.primary,
            foreign_key: column.foreign_key.clone(),
        }
    }
}

/// An in-memory database with PostgreSQL catalog conventions.
#[derive(Debug, Default)]
pub struct ShadowDatabase {
    dialect: PostgresDialect,
    tables: RwLock<IndexMap<String, Vec<ShadowColumn>>>,
    core_tables: RwLock<Option<HashSet<String>>>,
    failing: RwLock<HashSet<String>>,
    events: Mutex<Vec<ShadowEvent>>,
    statements: Mutex<Vec<String>>,
    delay: Option<Duration>,
    fail_introspection: AtomicBool,
    introspections: AtomicUsize,
}

impl ShadowDatabase {
    /// Create an empty shadow database.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every DDL operation, making concurrent dispatch observable.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Register tables managed outside the shadow and check every foreign key
    /// target exists when a table is created or altered.
    pub fn with_core_tables<I, S>(self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *self.core_tables.write() = Some(tables.into_iter().map(Into::into).collect());
        self
    }

    /// Fail every operation on `table`.
    pub fn fail_on(&self, table: impl Into<String>) {
        self.failing.write().insert(table.into());
    }

    /// Stop injecting failures.
    pub fn clear_failures(&self) {
        self.failing.write().clear();
    }

    /// Make catalog reads fail.
    pub fn set_fail_introspection(&self, fail: bool) {
        self.fail_introspection.store(fail, Ordering::SeqCst);
    }

    /// Number of times the table list was read.
    pub fn introspection_count(&self) -> usize {
        self.introspections.load(Ordering::SeqCst)
    }

    /// Install a table directly, bypassing the migration path.
    pub fn seed(&self, table: &CollectionSchemaTable) {
        self.tables.write().insert(
            table.name.clone(),
            table.columns.iter().map(ShadowColumn::from).collect(),
        );
    }

    /// Names of existing tables.
    pub fn table_names(&self) -> Vec<String> {
        self.tables.read().keys().cloned().collect()
    }

    /// Check if a table exists.
    pub fn has_table(&self, table: &str) -> bool {
        self.tables.read().contains_key(table)
    }

    /// Column names of a table, in ordinal order.
    pub fn column_names(&self, table: &str) -> Vec<String> {
        self.tables
            .read()
            .get(table)
            .map(|cols| cols.iter().map(|c| c.name.clone()).collect())
            .unwrap_or_default()
    }

    /// Recorded operations in the order they happened.
    pub fn events(&self) -> Vec<ShadowEvent> {
        self.events.lock().clone()
    }

    /// Forget recorded operations.
    pub fn clear_events(&self) {
        self.events.lock().clear();
    }

    /// DDL transcript in execution order.
    ///
    /// Holds the statements [`PostgresDialect`] renders for every applied
    /// create, alter and drop, followed by any raw statements passed to
    /// [`DatabaseAdapter::execute`]. Raw statements are logged, never applied.
    pub fn executed_statements(&self) -> Vec<String> {
        self.statements.lock().clone()
    }

    fn log(&self, statements: Vec<String>) {
        self.statements.lock().extend(statements);
    }

    fn record(&self, table: &str, kind: MigrationKind, phase: ShadowPhase) {
        self.events.lock().push(ShadowEvent {
            table: table.to_string(),
            kind,
            phase,
        });
    }

    /// Record the start, wait out the delay and apply failure injection.
    async fn begin(&self, table: &str, kind: MigrationKind) -> MigrateResult<()> {
        self.record(table, kind, ShadowPhase::Started);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing.read().contains(table) {
            return Err(MigrationError::execution(
                table,
                format!("injected failure during {}", kind.as_str()),
            ));
        }
        Ok(())
    }

    fn check_reference(&self, table: &str, column: &ShadowColumn, tables: &IndexMap<String, Vec<ShadowColumn>>) -> MigrateResult<()> {
        let core = self.core_tables.read();
        let (Some(core), Some(fk)) = (core.as_ref(), column.foreign_key.as_ref()) else {
            return Ok(());
        };

        if fk.table == table || tables.contains_key(&fk.table) || core.contains(&fk.table) {
            Ok(())
        } else {
            Err(MigrationError::execution(
                table,
                format!("relation \"{}\" does not exist", fk.table),
            ))
        }
    }

    fn apply_operation(
        &self,
        table: &str,
        columns: &mut Vec<ShadowColumn>,
        op: &ColumnOperation,
        tables: &IndexMap<String, Vec<ShadowColumn>>,
    ) -> MigrateResult<()> {
        match op {
            ColumnOperation::Add { column } => {
                if columns.iter().any(|c| c.name == column.name) {
                    return Err(MigrationError::execution(
                        table,
                        format!("column \"{}\" already exists", column.name),
                    ));
                }
                let column = ShadowColumn::from(column);
                self.check_reference(table, &column, tables)?;
                columns.push(column);
            }
            ColumnOperation::Modify { column, changes } => {
                if changes.column_type.as_ref().is_some_and(|c| c.to == ColumnType::Serial) {
                    return Err(MigrationError::unsupported("cannot alter a column to serial"));
                }
                let replacement = ShadowColumn::from(column);
                self.check_reference(table, &replacement, tables)?;
                let existing = columns
                    .iter_mut()
                    .find(|c| c.name == column.name)
                    .ok_or_else(|| {
                        MigrationError::execution(
                            table,
                            format!("column \"{}\" does not exist", column.name),
                        )
                    })?;
                *existing = replacement;
            }
            ColumnOperation::Drop { column } => {
                columns.retain(|c| c.name != column.name);
            }
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Introspector for ShadowDatabase {
    async fn get_tables(&self) -> MigrateResult<Vec<TableInfo>> {
        self.introspections.fetch_add(1, Ordering::SeqCst);
        if self.fail_introspection.load(Ordering::SeqCst) {
            return Err(MigrationError::introspection("catalog unavailable"));
        }

        let mut names = self.table_names();
        names.sort();
        Ok(names.into_iter().map(TableInfo::base_table).collect())
    }

    async fn get_columns(&self, table: &str) -> MigrateResult<Vec<ColumnInfo>> {
        let tables = self.tables.read();
        let columns = tables.get(table).ok_or_else(|| {
            MigrationError::introspection(format!("relation \"{}\" does not exist", table))
        })?;

        Ok(columns
            .iter()
            .enumerate()
            .map(|(i, column)| {
                let (data_type, udt_name) = catalog_type(column.column_type);
                let column_default = if column.column_type == ColumnType::Serial {
                    Some(format!("nextval('{}_{}_seq'::regclass)", table, column.name))
                } else {
                    column.default.as_ref().map(|d| {
                        let literal = self.dialect.format_default(d, column.column_type);
                        match (d, column.column_type) {
                            (DefaultValue::Text(_), ColumnType::Text) => format!("{}::text", literal),
                            _ => literal,
                        }
                    })
                };

                ColumnInfo {
                    name: column.name.clone(),
                    data_type: data_type.to_string(),
                    udt_name: udt_name.to_string(),
                    is_nullable: column.nullable,
                    column_default,
                    ordinal_position: i as i32 + 1,
                }
            })
            .collect())
    }

    async fn get_constraints(&self, table: &str) -> MigrateResult<Vec<ConstraintInfo>> {
        let tables = self.tables.read();
        let columns = tables.get(table).ok_or_else(|| {
            MigrationError::introspection(format!("relation \"{}\" does not exist", table))
        })?;

        let constraint = |name: String, constraint_type: &str, column: &ShadowColumn| ConstraintInfo {
            name,
            constraint_type: constraint_type.to_string(),
            table_name: table.to_string(),
            columns: vec![column.name.clone()],
            referenced_table: None,
            referenced_columns: None,
            on_delete: None,
        };

        let mut constraints = Vec::new();
        for column in columns {
            if column.primary {
                constraints.push(constraint(format!("{}_pkey", table), "PRIMARY KEY", column));
            }
            if column.unique {
                constraints.push(constraint(
                    unique_constraint_name(table, &column.name),
                    "UNIQUE",
                    column,
                ));
            }
            if let Some(fk) = &column.foreign_key {
                constraints.push(ConstraintInfo {
                    referenced_table: Some(fk.table.clone()),
                    referenced_columns: Some(vec![fk.column.clone()]),
                    on_delete: Some(fk.on_delete.as_sql().to_string()),
                    ..constraint(
                        foreign_key_constraint_name(table, &column.name),
                        "FOREIGN KEY",
                        column,
                    )
                });
            }
        }

        Ok(constraints)
    }
}

#[async_trait::async_trait]
impl DatabaseAdapter for ShadowDatabase {
    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    async fn execute(&self, statements: &[String]) -> MigrateResult<()> {
        self.statements.lock().extend(statements.iter().cloned());
        Ok(())
    }

    async fn create_table(&self, table: &str, columns: &[CollectionSchemaColumn]) -> MigrateResult<()> {
        self.begin(table, MigrationKind::Create).await?;

        {
            let mut tables = self.tables.write();
            if tables.contains_key(table) {
                return Err(MigrationError::execution(
                    table,
                    format!("relation \"{}\" already exists", table),
                ));
            }
            let columns: Vec<ShadowColumn> = columns.iter().map(ShadowColumn::from).collect();
            for column in &columns {
                self.check_reference(table, column, &tables)?;
            }
            tables.insert(table.to_string(), columns);
        }

        self.log(self.dialect.create_table(table, columns));
        self.record(table, MigrationKind::Create, ShadowPhase::Finished);
        Ok(())
    }

    async fn alter_table(&self, table: &str, operations: &[ColumnOperation]) -> MigrateResult<()> {
        self.begin(table, MigrationKind::Modify).await?;
        let statements = self.dialect.alter_table(table, operations)?;

        {
            let mut tables = self.tables.write();
            let mut columns = tables.shift_remove(table).ok_or_else(|| {
                MigrationError::execution(table, format!("relation \"{}\" does not exist", table))
            })?;

            // All or nothing, like a transactional ALTER TABLE.
            let original = columns.clone();
            let result = operations
                .iter()
                .try_for_each(|op| self.apply_operation(table, &mut columns, op, &tables));

            match result {
                Ok(()) => {
                    tables.insert(table.to_string(), columns);
                }
                Err(e) => {
                    tables.insert(table.to_string(), original);
                    return Err(e);
                }
            }
        }

        self.log(statements);
        self.record(table, MigrationKind::Modify, ShadowPhase::Finished);
        Ok(())
    }

    async fn drop_table(&self, table: &str) -> MigrateResult<()> {
        self.begin(table, MigrationKind::Remove).await?;

        {
            let mut tables = self.tables.write();
            tables.shift_remove(table);
            // CASCADE drops referencing constraints.
            for column in tables.values_mut().flatten() {
                if column.foreign_key.as_ref().is_some_and(|fk| fk.table == table) {
                    column.foreign_key = None;
                }
            }
        }

        self.log(self.dialect.drop_table(table));
        self.record(table, MigrationKind::Remove, ShadowPhase::Finished);
        Ok(())
    }
}

/// Catalog `(data_type, udt_name)` PostgreSQL reports for a column type.
fn catalog_type(column_type: ColumnType) -> (&'static str, &'static str) {
    match column_type {
        ColumnType::Serial | ColumnType::Integer => ("integer", "int4"),
        ColumnType::Real => ("double precision", "float8"),
        ColumnType::Text => ("text", "text"),
        ColumnType::Boolean => ("boolean", "bool"),
        ColumnType::Timestamp => ("timestamp with time zone", "timestamptz"),
        ColumnType::Json => ("jsonb", "jsonb"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::introspect::build_inferred_table;
    use crate::schema::{TableKey, TableType};
    use lucid_schema::OnDelete;
    use pretty_assertions::assert_eq;

    fn table(name: &str, columns: Vec<CollectionSchemaColumn>) -> CollectionSchemaTable {
        CollectionSchemaTable {
            name: name.to_string(),
            table_type: TableType::Document,
            key: TableKey::collection("pages"),
            columns,
        }
    }

    fn document_columns() -> Vec<CollectionSchemaColumn> {
        vec![
            CollectionSchemaColumn::primary_key("id"),
            CollectionSchemaColumn::core("title", ColumnType::Text)
                .default_value(DefaultValue::text("it's")),
            CollectionSchemaColumn::core("is_deleted", ColumnType::Boolean)
                .nullable(false)
                .default_value(DefaultValue::Bool(false)),
            CollectionSchemaColumn::core("created_by", ColumnType::Integer)
                .references(ForeignKey::new("ld_users", "id", OnDelete::SetNull)),
        ]
    }

    #[tokio::test]
    async fn test_create_and_introspect() {
        let shadow = ShadowDatabase::new();
        shadow
            .create_table("ld_document_pages", &document_columns())
            .await
            .unwrap();

        let columns = shadow.get_columns("ld_document_pages").await.unwrap();
        let constraints = shadow.get_constraints("ld_document_pages").await.unwrap();

        assert_eq!(
            columns[0].column_default.as_deref(),
            Some("nextval('ld_document_pages_id_seq'::regclass)")
        );
        assert_eq!(columns[1].column_default.as_deref(), Some("'it''s'::text"));

        let inferred = build_inferred_table(
            &TableInfo::base_table("ld_document_pages"),
            columns,
            &constraints,
        )
        .unwrap();

        let expected: Vec<_> = document_columns();
        for (live, declared) in inferred.columns.into_iter().zip(expected) {
            let live = live.into_schema_column();
            assert_eq!(live.name, declared.name);
            assert_eq!(live.column_type, declared.column_type);
            assert_eq!(live.nullable, declared.nullable);
            assert_eq!(live.default, declared.default);
            assert_eq!(live.foreign_key, declared.foreign_key);
            assert_eq!(live.primary, declared.primary);
        }
    }

    #[tokio::test]
    async fn test_create_twice_fails() {
        let shadow = ShadowDatabase::new();
        shadow.create_table("t", &[]).await.unwrap();
        assert!(shadow.create_table("t", &[]).await.is_err());
    }

    #[tokio::test]
    async fn test_strict_references() {
        let shadow = ShadowDatabase::new().with_core_tables(["ld_users"]);
        let child = vec![
            CollectionSchemaColumn::core("document_id", ColumnType::Integer)
                .references(ForeignKey::new("ld_document_pages", "id", OnDelete::Cascade)),
        ];

        assert!(shadow.create_table("ld_document_pages_versions", &child).await.is_err());

        shadow
            .create_table("ld_document_pages", &document_columns())
            .await
            .unwrap();
        shadow
            .create_table("ld_document_pages_versions", &child)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_alter_is_all_or_nothing() {
        let shadow = ShadowDatabase::new();
        shadow.seed(&table("t", document_columns()));

        let ops = vec![
            ColumnOperation::Add {
                column: CollectionSchemaColumn::core("subtitle", ColumnType::Text),
            },
            ColumnOperation::Add {
                column: CollectionSchemaColumn::core("title", ColumnType::Text),
            },
        ];
        assert!(shadow.alter_table("t", &ops).await.is_err());
        assert_eq!(shadow.column_names("t"), vec!["id", "title", "is_deleted", "created_by"]);
        assert!(shadow.executed_statements().is_empty());

        let ops = vec![ColumnOperation::Drop {
            column: CollectionSchemaColumn::core("title", ColumnType::Text),
        }];
        shadow.alter_table("t", &ops).await.unwrap();
        assert_eq!(shadow.column_names("t"), vec!["id", "is_deleted", "created_by"]);
        assert_eq!(
            shadow.executed_statements(),
            vec!["ALTER TABLE \"t\" DROP COLUMN IF EXISTS \"title\";"]
        );
    }

    #[tokio::test]
    async fn test_json_defaults_round_trip() {
        let shadow = ShadowDatabase::new();
        let columns = vec![
            CollectionSchemaColumn::core("meta", ColumnType::Json)
                .default_value(DefaultValue::text("draft")),
            CollectionSchemaColumn::core("flag", ColumnType::Json)
                .default_value(DefaultValue::Bool(true)),
        ];
        shadow.create_table("t", &columns).await.unwrap();
        assert!(shadow.executed_statements()[0].contains(r#""meta" JSONB DEFAULT '"draft"'::jsonb"#));

        let reported = shadow.get_columns("t").await.unwrap();
        assert_eq!(reported[0].column_default.as_deref(), Some(r#"'"draft"'::jsonb"#));
        assert_eq!(reported[1].column_default.as_deref(), Some("'true'::jsonb"));

        let inferred = build_inferred_table(&TableInfo::base_table("t"), reported, &[]).unwrap();
        assert_eq!(inferred.columns[0].default, Some(DefaultValue::text("draft")));
        assert_eq!(inferred.columns[1].default, Some(DefaultValue::Bool(true)));
    }

    #[tokio::test]
    async fn test_drop_cascades_references() {
        let shadow = ShadowDatabase::new();
        shadow.seed(&table("parent", vec![CollectionSchemaColumn::primary_key("id")]));
        shadow.seed(&table(
            "child",
            vec![
                CollectionSchemaColumn::core("parent_id", ColumnType::Integer)
                    .references(ForeignKey::new("parent", "id", OnDelete::Cascade)),
            ],
        ));

        shadow.drop_table("parent").await.unwrap();
        assert!(!shadow.has_table("parent"));
        assert_eq!(
            shadow.executed_statements(),
            vec!["DROP TABLE IF EXISTS \"parent\" CASCADE;"]
        );
        assert!(shadow.get_constraints("child").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failure_injection_and_events() {
        let shadow = ShadowDatabase::new();
        shadow.fail_on("broken");

        shadow.create_table("ok", &[]).await.unwrap();
        let err = shadow.create_table("broken", &[]).await.unwrap_err();
        assert!(matches!(err, MigrationError::Execution { .. }));

        let phases: Vec<_> = shadow
            .events()
            .into_iter()
            .map(|e| (e.table, e.phase))
            .collect();
        assert_eq!(
            phases,
            vec![
                ("ok".to_string(), ShadowPhase::Started),
                ("ok".to_string(), ShadowPhase::Finished),
                ("broken".to_string(), ShadowPhase::Started),
            ]
        );
    }

    #[tokio::test]
    async fn test_introspection_failure() {
        let shadow = ShadowDatabase::new();
        shadow.set_fail_introspection(true);
        assert!(shadow.get_tables().await.is_err());
        assert_eq!(shadow.introspection_count(), 1);
    }
}
