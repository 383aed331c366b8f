//! Migration engine façade.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use lucid_schema::{CollectionBuilder, LucidConfig};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::adapter::DatabaseAdapter;
use crate::cache::MigrationCache;
use crate::diff::{MigrationKind, MigrationPlan, MigrationResult, SchemaDiffer};
use crate::error::{MigrateResult, MigrationError};
use crate::executor::{BatchExecutor, ExecutionReport};
use crate::introspect::{LiveSchema, LiveSchemaIntrospector};
use crate::naming::TableNameCodec;
use crate::priority::enforce_dependency_order;
use crate::resolve::SchemaResolver;
use crate::schema::{CollectionSchema, CollectionSchemaTable};

/// Configuration for the migration engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationConfig {
    /// Prefix of every table the engine owns.
    pub prefix: String,
    /// Separator joining table name segments.
    pub separator: String,
    /// Maximum DDL operations in flight per batch.
    pub max_concurrency: usize,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self::from(&LucidConfig::default())
    }
}

impl From<&LucidConfig> for MigrationConfig {
    fn from(config: &LucidConfig) -> Self {
        Self {
            prefix: config.tables.prefix.clone(),
            separator: config.tables.separator.clone(),
            max_concurrency: config.migrations.max_concurrency,
        }
    }
}

impl MigrationConfig {
    /// Create a new configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the table prefix.
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Set the segment separator.
    pub fn separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    /// Set the per-batch concurrency limit.
    pub fn max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max;
        self
    }

    /// The table name codec for this configuration.
    pub fn codec(&self) -> TableNameCodec {
        TableNameCodec::new(&self.prefix, &self.separator)
    }

    /// Check the configuration before any table name is built from it.
    pub fn validate(&self) -> MigrateResult<()> {
        if self.prefix.is_empty() {
            return Err(MigrationError::config("table prefix may not be empty"));
        }
        if self.separator.is_empty() {
            return Err(MigrationError::config("table separator may not be empty"));
        }
        if self.max_concurrency == 0 {
            return Err(MigrationError::config("max_concurrency must be at least 1"));
        }
        Ok(())
    }
}

/// Outcome of a migration run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationSummary {
    /// Tables created, altered or dropped.
    pub tables_migrated: usize,
    /// Priority batches executed.
    pub batches: usize,
    /// Wall time in milliseconds.
    pub duration_ms: u64,
}

impl MigrationSummary {
    fn add(&mut self, report: ExecutionReport) {
        self.tables_migrated += report.tables;
        self.batches += report.batches;
    }
}

/// Whether a collection is backed by the live schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationStatus {
    /// Collection key.
    pub collection_key: String,
    /// True when any table of the collection needs migrating.
    pub requires_migration: bool,
    /// Field keys without a live column, grouped by brick key or `document-fields`.
    pub missing_columns: BTreeMap<String, Vec<String>>,
}

/// Keeps a database in step with collection declarations.
///
/// Dry runs are cached in an injected [`MigrationCache`]; engines sharing a
/// cache share dry runs, and every real migration invalidates it.
pub struct MigrationEngine<A: DatabaseAdapter> {
    config: MigrationConfig,
    codec: TableNameCodec,
    adapter: Arc<A>,
    collections: Vec<CollectionBuilder>,
    cache: Arc<MigrationCache>,
}

impl<A: DatabaseAdapter> MigrationEngine<A> {
    /// Create an engine with the default configuration and a private cache.
    pub fn new(adapter: A, collections: Vec<CollectionBuilder>) -> Self {
        Self::from_arc(Arc::new(adapter), collections)
    }

    /// Create an engine over an adapter shared with other owners.
    pub fn from_arc(adapter: Arc<A>, collections: Vec<CollectionBuilder>) -> Self {
        let config = MigrationConfig::default();
        Self {
            codec: config.codec(),
            config,
            adapter,
            collections,
            cache: Arc::new(MigrationCache::new()),
        }
    }

    /// Replace the configuration.
    ///
    /// The attached cache is left alone; it may be shared with other engines.
    pub fn with_config(mut self, config: MigrationConfig) -> Self {
        self.codec = config.codec();
        self.config = config;
        self
    }

    /// Share a cache handle.
    ///
    /// Engines sharing a cache must share their configuration and database.
    pub fn with_cache(mut self, cache: Arc<MigrationCache>) -> Self {
        self.cache = cache;
        self
    }

    /// The configuration.
    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    /// The table name codec.
    pub fn codec(&self) -> &TableNameCodec {
        &self.codec
    }

    /// The database adapter.
    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    /// The cache handle.
    pub fn cache(&self) -> &Arc<MigrationCache> {
        &self.cache
    }

    /// Configured collections.
    pub fn collections(&self) -> &[CollectionBuilder] {
        &self.collections
    }

    fn executor(&self) -> BatchExecutor {
        BatchExecutor::new(self.config.max_concurrency)
    }

    fn ensure_configured(&self, collection_key: &str) -> MigrateResult<()> {
        if self.collections.iter().any(|c| c.key == collection_key) {
            Ok(())
        } else {
            Err(MigrationError::CollectionNotFound(collection_key.to_string()))
        }
    }

    /// Read and group every live collection table.
    async fn live_schemas(&self) -> MigrateResult<LiveSchema> {
        let introspector = LiveSchemaIntrospector::new(&self.codec);
        let tables = introspector.introspect(self.adapter.as_ref()).await?;
        Ok(introspector.group(tables))
    }

    /// The cached dry-run result, computing it on a miss.
    pub async fn dry_run(&self) -> MigrateResult<Arc<MigrationResult>> {
        self.cache.get_or_compute(|| self.generate()).await
    }

    /// Compute a fresh dry-run result, bypassing the cache.
    pub async fn generate(&self) -> MigrateResult<MigrationResult> {
        let start = Instant::now();
        self.config.validate()?;

        let resolver = SchemaResolver::new(&self.codec, self.adapter.dialect());
        let declared = resolver.resolve_all(&self.collections)?;
        let LiveSchema {
            schemas: mut live,
            unrecognized,
        } = self.live_schemas().await?;

        let mut warnings: Vec<String> = unrecognized
            .iter()
            .map(|table| {
                format!(
                    "Table '{}' is not a recognized collection table; it was left untouched",
                    table
                )
            })
            .collect();

        warnings.extend(
            live.keys()
                .filter(|key| !self.collections.iter().any(|c| &c.key == *key))
                .map(|key| {
                    warn!(collection = %key, "Live tables belong to an unconfigured collection");
                    format!("Collection '{}' is not configured; its tables were left untouched", key)
                }),
        );

        let differ = SchemaDiffer::new(&self.codec);
        let mut plans: Vec<MigrationPlan> = declared
            .iter()
            .map(|schema| differ.diff_collection(schema, live.get(&schema.key)))
            .collect();

        warnings.extend(enforce_dependency_order(&mut plans));
        warnings.extend(plans.iter().flat_map(MigrationPlan::destructive_warnings));

        let inferred_schemas = declared
            .iter()
            .map(|schema| {
                live.remove(&schema.key)
                    .unwrap_or_else(|| CollectionSchema::new(&schema.key))
            })
            .collect();

        let result = MigrationResult {
            plans,
            inferred_schemas,
            warnings,
        };

        info!(
            collections = self.collections.len(),
            tables = result.table_count(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Dry run complete: {}",
            result.summary()
        );

        Ok(result)
    }

    /// Plan and execute every pending migration.
    ///
    /// The cache is invalidated once anything was executed, including when a
    /// batch fails after earlier batches were applied.
    pub async fn migrate(&self) -> MigrateResult<MigrationSummary> {
        let start = Instant::now();
        let result = self.generate().await?;

        let mut summary = MigrationSummary::default();
        if !result.requires_migration() {
            info!("Schema is up to date");
            return Ok(summary);
        }

        let report = self
            .executor()
            .build_migrations(self.adapter.as_ref(), &result.plans)
            .await;
        self.cache.invalidate();

        summary.add(report?);
        summary.duration_ms = start.elapsed().as_millis() as u64;

        info!(
            tables = summary.tables_migrated,
            batches = summary.batches,
            elapsed_ms = summary.duration_ms,
            "Migration complete"
        );
        Ok(summary)
    }

    /// Drop every live table of the configured collections, then migrate.
    pub async fn fresh(&self) -> MigrateResult<MigrationSummary> {
        let start = Instant::now();
        self.config.validate()?;
        let live = self.live_schemas().await?.schemas;
        let differ = SchemaDiffer::new(&self.codec);

        let plans: Vec<MigrationPlan> = self
            .collections
            .iter()
            .filter_map(|c| live.get(&c.key))
            .map(|schema| {
                let mut plan = MigrationPlan {
                    collection_key: schema.key.clone(),
                    tables: schema
                        .tables
                        .iter()
                        .filter_map(|t| differ.diff_table(None, Some(t)))
                        .collect(),
                };
                plan.sort();
                plan
            })
            .collect();

        let mut summary = MigrationSummary::default();
        if plans.iter().any(|p| !p.is_empty()) {
            warn!(
                tables = plans.iter().map(|p| p.tables.len()).sum::<usize>(),
                "Dropping collection tables"
            );
            let report = self.executor().build_migrations(self.adapter.as_ref(), &plans).await;
            self.cache.invalidate();
            summary.add(report?);
        }

        let migrated = self.migrate().await?;
        summary.tables_migrated += migrated.tables_migrated;
        summary.batches += migrated.batches;
        summary.duration_ms = start.elapsed().as_millis() as u64;
        Ok(summary)
    }

    /// The live schema of a collection, minus tables and columns still pending creation.
    pub async fn get_schema(&self, collection_key: &str) -> MigrateResult<Arc<CollectionSchema>> {
        self.ensure_configured(collection_key)?;

        if let Some(schema) = self.cache.schema(collection_key) {
            debug!(collection = %collection_key, "Schema cache hit");
            return Ok(schema);
        }

        let generation = self.cache.generation();
        let result = self.dry_run().await?;

        let schema = match result.inferred_schema(collection_key) {
            Some(inferred) => filter_schema(inferred, result.plan(collection_key)),
            None => CollectionSchema::new(collection_key),
        };
        let schema = Arc::new(schema);
        self.cache.insert_schema(generation, Arc::clone(&schema));

        debug!(collection = %collection_key, tables = schema.tables.len(), "Schema cached");
        Ok(schema)
    }

    /// Populate the schema cache for every configured collection.
    pub async fn cache_all_schemas(&self) -> MigrateResult<()> {
        for collection in &self.collections {
            self.get_schema(&collection.key).await?;
        }
        Ok(())
    }

    /// Report whether a collection needs migrating and which fields lack columns.
    pub async fn get_migration_status(&self, collection_key: &str) -> MigrateResult<MigrationStatus> {
        self.ensure_configured(collection_key)?;
        let result = self.dry_run().await?;

        let (requires_migration, missing_columns) = match result.plan(collection_key) {
            Some(plan) => (!plan.is_empty(), missing_columns(plan)),
            None => (false, BTreeMap::new()),
        };

        Ok(MigrationStatus {
            collection_key: collection_key.to_string(),
            requires_migration,
            missing_columns,
        })
    }
}

/// Strip what `plan` has yet to create from a live schema.
///
/// Tables pending creation and columns pending addition are removed, and
/// tables left without columns are dropped. With nothing pending the live
/// schema is returned unchanged.
pub fn filter_schema(inferred: &CollectionSchema, plan: Option<&MigrationPlan>) -> CollectionSchema {
    let Some(plan) = plan.filter(|p| !p.is_empty()) else {
        return inferred.clone();
    };

    let tables = inferred
        .tables
        .iter()
        .filter_map(|table| match plan.table(&table.name) {
            Some(m) if m.kind == MigrationKind::Create => None,
            Some(m) if m.kind == MigrationKind::Modify => {
                let columns: Vec<_> = table
                    .columns
                    .iter()
                    .filter(|c| !m.added_columns().any(|added| added.name == c.name))
                    .cloned()
                    .collect();
                Some(CollectionSchemaTable {
                    columns,
                    ..table.clone()
                })
            }
            _ => Some(table.clone()),
        })
        .filter(|t| !t.columns.is_empty())
        .collect();

    CollectionSchema {
        key: inferred.key.clone(),
        tables,
    }
}

/// Field keys added by `plan`, grouped by brick key or `document-fields`.
pub fn missing_columns(plan: &MigrationPlan) -> BTreeMap<String, Vec<String>> {
    let mut missing: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for migration in plan.tables.iter().filter(|m| m.kind != MigrationKind::Remove) {
        for key in migration.added_columns().filter_map(|c| c.field_key()) {
            let keys = missing.entry(migration.key.group().to_string()).or_default();
            if !keys.iter().any(|k| k == key) {
                keys.push(key.to_string());
            }
        }
    }

    missing
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::{ColumnOperation, TableMigration};
    use crate::schema::{CollectionSchemaColumn, TableKey, TableType};
    use lucid_schema::ColumnType;
    use pretty_assertions::assert_eq;

    fn live_table(name: &str, key: TableKey, columns: &[&str]) -> CollectionSchemaTable {
        CollectionSchemaTable {
            name: name.to_string(),
            table_type: TableType::DocumentFields,
            key,
            columns: columns
                .iter()
                .map(|c| CollectionSchemaColumn::from_field(*c, lucid_schema::ColumnSpec::new(*c, ColumnType::Text)))
                .collect(),
        }
    }

    fn migration(name: &str, key: TableKey, kind: MigrationKind, added: &[&str]) -> TableMigration {
        TableMigration {
            table_name: name.to_string(),
            table_type: TableType::DocumentFields,
            key,
            priority: 700,
            kind,
            column_operations: added
                .iter()
                .map(|c| ColumnOperation::Add {
                    column: CollectionSchemaColumn::from_field(
                        *c,
                        lucid_schema::ColumnSpec::new(*c, ColumnType::Text),
                    ),
                })
                .collect(),
        }
    }

    fn plan(tables: Vec<TableMigration>) -> MigrationPlan {
        MigrationPlan {
            collection_key: "pages".to_string(),
            tables,
        }
    }

    #[test]
    fn test_config_from_file_config() {
        let file = LucidConfig::parse(
            r#"
            [tables]
            prefix = "cms_"
            separator = "__"

            [migrations]
            max_concurrency = 4
            "#,
        )
        .unwrap();

        let config = MigrationConfig::from(&file);
        assert_eq!(config, MigrationConfig::new().prefix("cms_").separator("__").max_concurrency(4));
        assert_eq!(config.codec().document_table("pages"), "cms_document__pages");
    }

    #[test]
    fn test_config_default() {
        let config = MigrationConfig::default();
        assert_eq!(config.prefix, "ld_");
        assert_eq!(config.separator, "_");
        assert_eq!(config.max_concurrency, 16);
    }

    #[test]
    fn test_filter_schema_empty_plan() {
        let key = TableKey::collection("pages");
        let schema = CollectionSchema {
            key: "pages".to_string(),
            tables: vec![live_table("t", key, &["title"])],
        };

        assert_eq!(filter_schema(&schema, Some(&plan(vec![]))), schema);
        assert_eq!(filter_schema(&schema, None), schema);
    }

    #[test]
    fn test_filter_schema_strips_pending() {
        let fields = TableKey::collection("pages");
        let hero = TableKey::collection("pages").with_brick("hero");
        let cta = TableKey::collection("pages").with_brick("cta");

        let schema = CollectionSchema {
            key: "pages".to_string(),
            tables: vec![
                live_table("t", fields.clone(), &["title", "c"]),
                live_table("hero", hero.clone(), &["image"]),
                live_table("cta", cta.clone(), &["label"]),
            ],
        };
        let plan = plan(vec![
            migration("t", fields, MigrationKind::Modify, &["c"]),
            migration("hero", hero, MigrationKind::Create, &["image"]),
            migration("cta", cta, MigrationKind::Modify, &["label"]),
        ]);

        let filtered = filter_schema(&schema, Some(&plan));
        assert_eq!(filtered.tables.len(), 1);
        assert_eq!(filtered.tables[0].name, "t");
        assert!(filtered.tables[0].column("c").is_none());
        assert!(filtered.tables[0].column("title").is_some());
    }

    #[test]
    fn test_missing_columns_grouped() {
        let plan = plan(vec![
            migration("f", TableKey::collection("pages"), MigrationKind::Modify, &["subtitle"]),
            migration(
                "s",
                TableKey::collection("pages").with_repeater("sections"),
                MigrationKind::Create,
                &["heading", "subtitle"],
            ),
            migration(
                "h",
                TableKey::collection("pages").with_brick("hero"),
                MigrationKind::Create,
                &["image"],
            ),
        ]);

        let missing = missing_columns(&plan);
        assert_eq!(missing["document-fields"], vec!["subtitle", "heading"]);
        assert_eq!(missing["hero"], vec!["image"]);
    }

    #[test]
    fn test_missing_columns_ignores_core_columns() {
        let mut m = migration("d", TableKey::collection("pages"), MigrationKind::Create, &[]);
        m.column_operations.push(ColumnOperation::Add {
            column: CollectionSchemaColumn::core("created_at", ColumnType::Timestamp),
        });

        assert!(missing_columns(&plan(vec![m])).is_empty());
    }

    #[test]
    fn test_config_validation() {
        assert!(MigrationConfig::default().validate().is_ok());
        assert!(matches!(
            MigrationConfig::new().separator("").validate(),
            Err(MigrationError::Config(_))
        ));
        assert!(matches!(
            MigrationConfig::new().prefix("").validate(),
            Err(MigrationError::Config(_))
        ));
        assert!(matches!(
            MigrationConfig::new().max_concurrency(0).validate(),
            Err(MigrationError::Config(_))
        ));
    }
}
