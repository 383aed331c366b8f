//! Database adapter contract.

use crate::diff::{ColumnOperation, MigrationKind, TableMigration};
use crate::error::MigrateResult;
use crate::introspect::Introspector;
use crate::schema::CollectionSchemaColumn;
use crate::sql::Dialect;

/// A database the engine can introspect and migrate.
///
/// Adapters only need to supply a [`Dialect`] and [`execute`](Self::execute);
/// the structured DDL methods render through the dialect by default.
#[async_trait::async_trait]
pub trait DatabaseAdapter: Introspector {
    /// The SQL dialect and capabilities of this database.
    fn dialect(&self) -> &dyn Dialect;

    /// Execute statements in order.
    async fn execute(&self, statements: &[String]) -> MigrateResult<()>;

    /// Create a table.
    async fn create_table(&self, table: &str, columns: &[CollectionSchemaColumn]) -> MigrateResult<()> {
        let statements = self.dialect().create_table(table, columns);
        self.execute(&statements).await
    }

    /// Add, modify and drop columns of a table.
    async fn alter_table(&self, table: &str, operations: &[ColumnOperation]) -> MigrateResult<()> {
        let statements = self.dialect().alter_table(table, operations)?;
        self.execute(&statements).await
    }

    /// Drop a table.
    async fn drop_table(&self, table: &str) -> MigrateResult<()> {
        let statements = self.dialect().drop_table(table);
        self.execute(&statements).await
    }

    /// Apply one table migration.
    async fn apply(&self, migration: &TableMigration) -> MigrateResult<()> {
        match migration.kind {
            MigrationKind::Create => {
                let columns: Vec<CollectionSchemaColumn> =
                    migration.added_columns().cloned().collect();
                self.create_table(&migration.table_name, &columns).await
            }
            MigrationKind::Modify => {
                self.alter_table(&migration.table_name, &migration.column_operations)
                    .await
            }
            MigrationKind::Remove => self.drop_table(&migration.table_name).await,
        }
    }
}
