//! DDL rendering.

use lucid_schema::{AdapterCapabilities, ColumnType, DefaultValue};

use crate::diff::{ColumnChanges, ColumnOperation};
use crate::error::{MigrateResult, MigrationError};
use crate::schema::CollectionSchemaColumn;

/// A SQL dialect rendering the DDL behind each table operation.
///
/// [`DatabaseAdapter`](crate::adapter::DatabaseAdapter) executes these through its default
/// `create_table`, `alter_table` and `drop_table`.
pub trait Dialect: AdapterCapabilities {
    /// Dialect name.
    fn name(&self) -> &'static str;

    /// Render a CREATE TABLE statement.
    fn create_table(&self, table: &str, columns: &[CollectionSchemaColumn]) -> Vec<String>;

    /// Render ALTER TABLE statements for column operations.
    fn alter_table(&self, table: &str, operations: &[ColumnOperation]) -> MigrateResult<Vec<String>>;

    /// Render a DROP TABLE statement.
    fn drop_table(&self, table: &str) -> Vec<String>;
}

/// PostgreSQL dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl AdapterCapabilities for PostgresDialect {
    fn data_type(&self, column_type: ColumnType) -> &'static str {
        match column_type {
            ColumnType::Serial => "SERIAL",
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "DOUBLE PRECISION",
            ColumnType::Text => "TEXT",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Timestamp => "TIMESTAMP WITH TIME ZONE",
            ColumnType::Json => "JSONB",
        }
    }

    fn format_default(&self, value: &DefaultValue, column_type: ColumnType) -> String {
        match value {
            DefaultValue::Null => "NULL".to_string(),
            DefaultValue::Expression(expr) => expr.clone(),
            _ if column_type == ColumnType::Json => {
                format!("{}::jsonb", quote_literal(&value.to_json().to_string()))
            }
            DefaultValue::Bool(b) => b.to_string(),
            DefaultValue::Int(i) => i.to_string(),
            DefaultValue::Float(f) if f.is_finite() => f.to_string(),
            DefaultValue::Float(f) => format!("'{}'::double precision", f),
            DefaultValue::Text(s) => quote_literal(s),
            DefaultValue::Array(_) | DefaultValue::Object(_) => {
                format!("{}::jsonb", quote_literal(&value.to_json().to_string()))
            }
        }
    }
}

impl Dialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgresql"
    }

    fn create_table(&self, table: &str, columns: &[CollectionSchemaColumn]) -> Vec<String> {
        let columns: Vec<String> = columns
            .iter()
            .map(|c| self.column_definition(c))
            .collect();

        vec![format!(
            "CREATE TABLE \"{}\" (\n    {}\n);",
            table,
            columns.join(",\n    ")
        )]
    }

    fn alter_table(&self, table: &str, operations: &[ColumnOperation]) -> MigrateResult<Vec<String>> {
        let mut stmts = Vec::new();

        for op in operations {
            match op {
                ColumnOperation::Add { column } => stmts.push(format!(
                    "ALTER TABLE \"{}\" ADD COLUMN {};",
                    table,
                    self.column_definition(column)
                )),
                ColumnOperation::Modify { column, changes } => {
                    stmts.extend(self.alter_column(table, column, changes)?);
                }
                ColumnOperation::Drop { column } => stmts.push(format!(
                    "ALTER TABLE \"{}\" DROP COLUMN IF EXISTS \"{}\";",
                    table, column.name
                )),
            }
        }

        Ok(stmts)
    }

    fn drop_table(&self, table: &str) -> Vec<String> {
        vec![format!("DROP TABLE IF EXISTS \"{}\" CASCADE;", table)]
    }
}

impl PostgresDialect {
    /// Generate a column definition.
    pub fn column_definition(&self, column: &CollectionSchemaColumn) -> String {
        let mut parts = vec![
            format!("\"{}\"", column.name),
            self.data_type(column.column_type).to_string(),
        ];

        if column.primary {
            parts.push("PRIMARY KEY".to_string());
        } else {
            if !column.nullable {
                parts.push("NOT NULL".to_string());
            }
            if column.unique {
                parts.push("UNIQUE".to_string());
            }
        }

        if let Some(default) = &column.default {
            parts.push(format!(
                "DEFAULT {}",
                self.format_default(default, column.column_type)
            ));
        }

        if let Some(fk) = &column.foreign_key {
            parts.push(format!(
                "REFERENCES \"{}\" (\"{}\") ON DELETE {}",
                fk.table,
                fk.column,
                fk.on_delete.as_sql()
            ));
        }

        parts.join(" ")
    }

    /// Generate ALTER COLUMN statements for the changed attributes.
    fn alter_column(
        &self,
        table: &str,
        column: &CollectionSchemaColumn,
        changes: &ColumnChanges,
    ) -> MigrateResult<Vec<String>> {
        let mut stmts = Vec::new();
        let name = &column.name;

        if let Some(change) = &changes.column_type {
            if change.to == ColumnType::Serial || change.from == ColumnType::Serial {
                return Err(MigrationError::unsupported(format!(
                    "cannot change \"{}\".\"{}\" from {} to {}",
                    table, name, change.from, change.to
                )));
            }
            let sql_type = self.data_type(change.to);
            stmts.push(format!(
                "ALTER TABLE \"{}\" ALTER COLUMN \"{}\" TYPE {} USING \"{}\"::{};",
                table, name, sql_type, name, sql_type
            ));
        }

        if let Some(change) = &changes.nullable {
            let action = if change.to { "DROP NOT NULL" } else { "SET NOT NULL" };
            stmts.push(format!(
                "ALTER TABLE \"{}\" ALTER COLUMN \"{}\" {};",
                table, name, action
            ));
        }

        if let Some(change) = &changes.default {
            match change.to.as_ref().filter(|d| !d.is_null()) {
                Some(default) => stmts.push(format!(
                    "ALTER TABLE \"{}\" ALTER COLUMN \"{}\" SET DEFAULT {};",
                    table,
                    name,
                    self.format_default(default, column.column_type)
                )),
                None => stmts.push(format!(
                    "ALTER TABLE \"{}\" ALTER COLUMN \"{}\" DROP DEFAULT;",
                    table, name
                )),
            }
        }

        if let Some(change) = &changes.unique {
            let constraint = unique_constraint_name(table, name);
            if change.to {
                stmts.push(format!(
                    "ALTER TABLE \"{}\" ADD CONSTRAINT \"{}\" UNIQUE (\"{}\");",
                    table, constraint, name
                ));
            } else {
                stmts.push(format!(
                    "ALTER TABLE \"{}\" DROP CONSTRAINT IF EXISTS \"{}\";",
                    table, constraint
                ));
            }
        }

        if let Some(change) = &changes.foreign_key {
            let constraint = foreign_key_constraint_name(table, name);
            if change.from.is_some() {
                stmts.push(format!(
                    "ALTER TABLE \"{}\" DROP CONSTRAINT IF EXISTS \"{}\";",
                    table, constraint
                ));
            }
            if let Some(fk) = &change.to {
                stmts.push(format!(
                    "ALTER TABLE \"{}\" ADD CONSTRAINT \"{}\" FOREIGN KEY (\"{}\") REFERENCES \"{}\" (\"{}\") ON DELETE {};",
                    table,
                    constraint,
                    name,
                    fk.table,
                    fk.column,
                    fk.on_delete.as_sql()
                ));
            }
        }

        Ok(stmts)
    }
}

/// PostgreSQL's default name for a single-column unique constraint.
pub fn unique_constraint_name(table: &str, column: &str) -> String {
    format!("{}_{}_key", table, column)
}

/// PostgreSQL's default name for a single-column foreign key.
pub fn foreign_key_constraint_name(table: &str, column: &str) -> String {
    format!("{}_{}_fkey", table, column)
}

fn quote_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}
