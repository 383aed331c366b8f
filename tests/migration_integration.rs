//! Integration tests for planning and executing collection migrations.
//!
//! These tests drive the engine end to end against the in-memory shadow
//! database, from declarations to live tables and back.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use lucid::migrate::{
    CollectionSchemaColumn, CollectionSchemaTable, ColumnInfo, ColumnOperation, ConstraintInfo,
    DatabaseAdapter, Dialect, Introspector, MigrateResult, MigrationCache, MigrationConfig,
    MigrationEngine, MigrationError, MigrationKind, ShadowDatabase, ShadowPhase, TableInfo,
    TableKey, TableType, build_batches,
};
use lucid::schema::{BrickBuilder, CollectionBuilder, FieldDefinition, LucidConfig};
use pretty_assertions::assert_eq;

const CORE_TABLES: [&str; 4] = ["ld_collections", "ld_locales", "ld_users", "ld_media"];

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn shadow() -> Arc<ShadowDatabase> {
    Arc::new(ShadowDatabase::new().with_core_tables(CORE_TABLES))
}

fn pages() -> CollectionBuilder {
    CollectionBuilder::new("pages")
        .field(FieldDefinition::text("title"))
        .field(FieldDefinition::wysiwyg("body"))
        .field(FieldDefinition::repeater(
            "sections",
            vec![FieldDefinition::text("heading")],
        ))
}

fn posts() -> CollectionBuilder {
    CollectionBuilder::new("posts")
        .field(FieldDefinition::text("title"))
        .field(FieldDefinition::document("page", "pages"))
}

fn engine(shadow: &Arc<ShadowDatabase>, collections: Vec<CollectionBuilder>) -> MigrationEngine<ShadowDatabase> {
    init_tracing();
    MigrationEngine::from_arc(Arc::clone(shadow), collections)
}

/// A shadow database whose catalog reports one extra column of an unmappable type.
struct UnmappableColumn {
    inner: Arc<ShadowDatabase>,
    table: &'static str,
}

#[async_trait::async_trait]
impl Introspector for UnmappableColumn {
    async fn get_tables(&self) -> MigrateResult<Vec<TableInfo>> {
        self.inner.get_tables().await
    }

    async fn get_columns(&self, table: &str) -> MigrateResult<Vec<ColumnInfo>> {
        let mut columns = self.inner.get_columns(table).await?;
        if table == self.table {
            let ordinal_position = columns.len() as i32 + 1;
            columns.push(ColumnInfo {
                name: "shape".to_string(),
                data_type: "USER-DEFINED".to_string(),
                udt_name: "geometry".to_string(),
                is_nullable: true,
                column_default: None,
                ordinal_position,
            });
        }
        Ok(columns)
    }

    async fn get_constraints(&self, table: &str) -> MigrateResult<Vec<ConstraintInfo>> {
        self.inner.get_constraints(table).await
    }
}

#[async_trait::async_trait]
impl DatabaseAdapter for UnmappableColumn {
    fn dialect(&self) -> &dyn Dialect {
        self.inner.dialect()
    }

    async fn execute(&self, statements: &[String]) -> MigrateResult<()> {
        self.inner.execute(statements).await
    }

    async fn create_table(&self, table: &str, columns: &[CollectionSchemaColumn]) -> MigrateResult<()> {
        self.inner.create_table(table, columns).await
    }

    async fn alter_table(&self, table: &str, operations: &[ColumnOperation]) -> MigrateResult<()> {
        self.inner.alter_table(table, operations).await
    }

    async fn drop_table(&self, table: &str) -> MigrateResult<()> {
        self.inner.drop_table(table).await
    }
}

/// First dry run on an empty database creates every table; a second one after migrating plans nothing
#[tokio::test]
async fn test_end_to_end_pages() {
    let shadow = shadow();
    let engine = engine(&shadow, vec![pages()]);

    let result = engine.dry_run().await.unwrap();
    let plan = result.plan("pages").unwrap();

    let created: Vec<_> = plan.tables.iter().map(|m| m.table_name.as_str()).collect();
    assert_eq!(
        created,
        vec![
            "ld_document_pages",
            "ld_document_pages_versions",
            "ld_document_pages_fields",
            "ld_document_pages_fields_sections",
        ]
    );
    assert!(plan.tables.iter().all(|m| m.kind == MigrationKind::Create));

    let fields = plan.table("ld_document_pages_fields").unwrap();
    let sections = plan.table("ld_document_pages_fields_sections").unwrap();
    let field_columns: Vec<_> = fields.added_columns().filter_map(|c| c.field_key()).collect();
    let section_columns: Vec<_> = sections.added_columns().filter_map(|c| c.field_key()).collect();
    assert_eq!(field_columns, vec!["title", "body"]);
    assert_eq!(section_columns, vec!["heading"]);
    assert!(sections.added_columns().any(|c| c.name == "brick_id"));
    assert!(fields.priority > sections.priority);

    let summary = engine.migrate().await.unwrap();
    assert_eq!(summary.tables_migrated, 4);
    assert_eq!(summary.batches, 4);
    assert!(shadow.has_table("ld_document_pages_fields_sections"));

    let second = engine.dry_run().await.unwrap();
    assert!(!second.requires_migration());
    assert_eq!(second.summary(), "No changes");
}

/// Bricks and nested repeaters land in their own tables, children after parents
#[tokio::test]
async fn test_bricks_and_nested_repeaters() {
    let shadow = shadow();
    let hero = BrickBuilder::new("hero")
        .field(FieldDefinition::media("image"))
        .field(FieldDefinition::repeater(
            "slides",
            vec![
                FieldDefinition::text("caption"),
                FieldDefinition::repeater("items", vec![FieldDefinition::text("label")]),
            ],
        ));
    let collection = CollectionBuilder::new("pages")
        .field(FieldDefinition::text("title"))
        .builder_brick(hero);
    let engine = engine(&shadow, vec![collection]);

    let result = engine.generate().await.unwrap();
    let plan = result.plan("pages").unwrap();
    let priority = |name: &str| plan.table(name).unwrap().priority;

    assert_eq!(priority("ld_document_pages_hero"), 600);
    assert_eq!(priority("ld_document_pages_hero_slides"), 490);
    assert_eq!(priority("ld_document_pages_hero_slides_items"), 480);

    engine.migrate().await.unwrap();
    assert_eq!(
        shadow.column_names("ld_document_pages_hero_slides_items"),
        vec![
            "id",
            "collection_key",
            "document_id",
            "document_version_id",
            "locale",
            "brick_id",
            "parent_id",
            "position",
            "is_open",
            "label",
        ]
    );
    assert!(!engine.generate().await.unwrap().requires_migration());
}

/// Every batch completes before the next starts; tables within a batch run concurrently
#[tokio::test]
async fn test_batch_ordering() {
    init_tracing();
    let shadow = Arc::new(
        ShadowDatabase::new()
            .with_core_tables(CORE_TABLES)
            .with_delay(Duration::from_millis(5)),
    );
    let engine = MigrationEngine::from_arc(Arc::clone(&shadow), vec![pages(), posts()]);

    let result = engine.generate().await.unwrap();
    let batch_of: HashMap<String, usize> = build_batches(&result.plans)
        .into_iter()
        .enumerate()
        .flat_map(|(i, batch)| {
            batch
                .migrations
                .into_iter()
                .map(move |m| (m.table_name, i))
        })
        .collect();

    engine.migrate().await.unwrap();

    let events = shadow.events();
    let mut finished: Vec<usize> = Vec::new();
    for event in &events {
        let batch = batch_of[&event.table];
        match event.phase {
            ShadowPhase::Started => {
                let earlier = batch_of.values().filter(|b| **b < batch).count();
                let earlier_finished = finished.iter().filter(|b| **b < batch).count();
                assert_eq!(earlier, earlier_finished, "{} started too early", event.table);
            }
            ShadowPhase::Finished => finished.push(batch),
        }
    }

    // Both document tables share the first batch and overlap.
    let first_two: Vec<_> = events.iter().take(2).map(|e| e.phase).collect();
    assert_eq!(first_two, vec![ShadowPhase::Started, ShadowPhase::Started]);
}

/// A failing table stops its batch and every later batch
#[tokio::test]
async fn test_failure_aborts_remaining_batches() {
    let shadow = shadow();
    shadow.fail_on("ld_document_pages_fields");
    let engine = engine(&shadow, vec![pages()]);

    let err = engine.migrate().await.unwrap_err();
    match err {
        MigrationError::Execution { table, .. } => assert_eq!(table, "ld_document_pages_fields"),
        other => panic!("unexpected error: {other}"),
    }

    assert!(shadow.has_table("ld_document_pages"));
    assert!(shadow.has_table("ld_document_pages_versions"));
    assert!(!shadow.has_table("ld_document_pages_fields"));
    assert!(
        !shadow
            .events()
            .iter()
            .any(|e| e.table == "ld_document_pages_fields_sections")
    );

    shadow.clear_failures();
    let summary = engine.migrate().await.unwrap();
    assert_eq!(summary.tables_migrated, 2);
    assert!(!engine.dry_run().await.unwrap().requires_migration());
}

/// A newly declared field is reported as missing until migrated
#[tokio::test]
async fn test_missing_column_status() {
    let shadow = shadow();
    engine(&shadow, vec![pages()]).migrate().await.unwrap();

    let updated = pages().field(FieldDefinition::text("subtitle"));
    let engine = engine(&shadow, vec![updated]);

    let status = engine.get_migration_status("pages").await.unwrap();
    assert!(status.requires_migration);
    assert_eq!(status.missing_columns.len(), 1);
    assert_eq!(status.missing_columns["document-fields"], vec!["subtitle"]);

    let schema = engine.get_schema("pages").await.unwrap();
    let fields = schema.table("ld_document_pages_fields").unwrap();
    assert!(fields.column("title").is_some());
    assert!(fields.column("subtitle").is_none());

    engine.migrate().await.unwrap();
    let status = engine.get_migration_status("pages").await.unwrap();
    assert!(!status.requires_migration);
    assert!(status.missing_columns.is_empty());

    let schema = engine.get_schema("pages").await.unwrap();
    assert!(
        schema
            .table("ld_document_pages_fields")
            .unwrap()
            .column("subtitle")
            .is_some()
    );
}

/// Tables not yet created are hidden from the filtered schema
#[tokio::test]
async fn test_filtered_schema_hides_pending_tables() {
    let shadow = shadow();
    engine(&shadow, vec![pages()]).migrate().await.unwrap();

    let with_brick = pages().fixed_brick(BrickBuilder::new("seo").field(FieldDefinition::text("title")));
    let engine = engine(&shadow, vec![with_brick]);

    let status = engine.get_migration_status("pages").await.unwrap();
    assert_eq!(status.missing_columns["seo"], vec!["title"]);

    let schema = engine.get_schema("pages").await.unwrap();
    assert!(schema.table("ld_document_pages_seo").is_none());
    assert_eq!(schema.tables.len(), 4);
}

/// Changed defaults modify columns in place; removed fields drop their columns
#[tokio::test]
async fn test_modify_and_drop_columns() {
    let shadow = shadow();
    engine(&shadow, vec![pages()]).migrate().await.unwrap();

    let changed = CollectionBuilder::new("pages")
        .field(FieldDefinition::text("title").default_value("Untitled"))
        .field(FieldDefinition::repeater(
            "sections",
            vec![FieldDefinition::text("heading")],
        ));
    let engine = engine(&shadow, vec![changed]);

    let result = engine.generate().await.unwrap();
    let fields = result
        .plan("pages")
        .unwrap()
        .table("ld_document_pages_fields")
        .unwrap();
    assert_eq!(fields.kind, MigrationKind::Modify);
    assert_eq!(fields.column_operations.len(), 2);
    assert!(matches!(
        &fields.column_operations[0],
        ColumnOperation::Modify { column, changes } if column.name == "title" && changes.default.is_some()
    ));
    assert!(matches!(
        &fields.column_operations[1],
        ColumnOperation::Drop { column } if column.name == "body"
    ));
    assert!(result.warnings.iter().any(|w| w.contains("'body'")));

    engine.migrate().await.unwrap();
    assert!(!shadow.column_names("ld_document_pages_fields").contains(&"body".to_string()));
    assert!(!engine.generate().await.unwrap().requires_migration());
}

/// Dropping a brick removes its table
#[tokio::test]
async fn test_removed_brick_table() {
    let shadow = shadow();
    let with_brick = pages().fixed_brick(BrickBuilder::new("seo").field(FieldDefinition::text("title")));
    engine(&shadow, vec![with_brick]).migrate().await.unwrap();
    assert!(shadow.has_table("ld_document_pages_seo"));

    let engine = engine(&shadow, vec![pages()]);
    let result = engine.generate().await.unwrap();
    let removal = result.plan("pages").unwrap().table("ld_document_pages_seo").unwrap();
    assert_eq!(removal.kind, MigrationKind::Remove);

    engine.migrate().await.unwrap();
    assert!(!shadow.has_table("ld_document_pages_seo"));
}

/// Tables of collections that are no longer declared are reported, never dropped
#[tokio::test]
async fn test_unconfigured_collection_left_alone() {
    let shadow = shadow();
    engine(&shadow, vec![pages(), posts()]).migrate().await.unwrap();

    let engine = engine(&shadow, vec![pages()]);
    let result = engine.generate().await.unwrap();
    assert!(!result.requires_migration());
    assert!(result.warnings.iter().any(|w| w.contains("'posts'")));
    assert!(result.plan("posts").is_none());

    engine.migrate().await.unwrap();
    assert!(shadow.has_table("ld_document_posts"));
}

/// Dry runs are cached until a migration runs
#[tokio::test]
async fn test_cache_invalidated_by_migration() {
    let shadow = shadow();
    let engine = engine(&shadow, vec![pages()]);

    let (a, b) = tokio::join!(engine.dry_run(), engine.dry_run());
    assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
    engine.get_schema("pages").await.unwrap();
    assert_eq!(shadow.introspection_count(), 1);

    engine.migrate().await.unwrap();
    assert_eq!(shadow.introspection_count(), 2);
    assert_eq!(engine.cache().generation(), 1);

    let result = engine.dry_run().await.unwrap();
    assert!(!result.requires_migration());
    assert_eq!(shadow.introspection_count(), 3);

    engine.cache_all_schemas().await.unwrap();
    assert_eq!(engine.get_schema("pages").await.unwrap().tables.len(), 4);
    assert_eq!(shadow.introspection_count(), 3);
}

/// Engines sharing a cache share dry runs
#[tokio::test]
async fn test_shared_cache() {
    let shadow = shadow();
    let cache = Arc::new(MigrationCache::new());
    let first = engine(&shadow, vec![pages()]).with_cache(Arc::clone(&cache));
    let second = engine(&shadow, vec![pages()]).with_cache(Arc::clone(&cache));

    first.dry_run().await.unwrap();
    second.dry_run().await.unwrap();
    assert_eq!(shadow.introspection_count(), 1);
    assert_eq!(cache.stats().hits, 1);
}

/// Introspection failures abort the dry run and leave nothing cached
#[tokio::test]
async fn test_introspection_failure_not_cached() {
    let shadow = shadow();
    let engine = engine(&shadow, vec![pages()]);

    shadow.set_fail_introspection(true);
    let err = engine.dry_run().await.unwrap_err();
    assert!(err.is_recoverable());
    assert!(engine.cache().result().is_none());

    shadow.set_fail_introspection(false);
    assert!(engine.dry_run().await.unwrap().requires_migration());
}

/// Fresh drops every table of the configured collections and rebuilds them
#[tokio::test]
async fn test_fresh() {
    let shadow = shadow();
    let engine = engine(&shadow, vec![pages()]);
    engine.migrate().await.unwrap();

    let summary = engine.fresh().await.unwrap();
    assert_eq!(summary.tables_migrated, 8);
    assert!(shadow.has_table("ld_document_pages_fields_sections"));

    let removed = shadow
        .events()
        .iter()
        .filter(|e| e.kind == MigrationKind::Remove && e.phase == ShadowPhase::Finished)
        .count();
    assert_eq!(removed, 4);
    assert!(!engine.generate().await.unwrap().requires_migration());
}

/// Collections reference each other through document fields
#[tokio::test]
async fn test_cross_collection_reference() {
    let shadow = shadow();
    let engine = engine(&shadow, vec![posts(), pages()]);
    engine.migrate().await.unwrap();

    let result = engine.generate().await.unwrap();
    assert!(!result.requires_migration());
    assert_eq!(result.inferred_schemas.len(), 2);
}

/// Table names follow the configured prefix and separator
#[tokio::test]
async fn test_configured_naming() {
    let config = LucidConfig::parse(
        r#"
        [tables]
        prefix = "cms_"
        separator = "__"

        [migrations]
        max_concurrency = 2
        "#,
    )
    .unwrap();

    let shadow = Arc::new(ShadowDatabase::new());
    let engine = engine(&shadow, vec![pages()]).with_config(MigrationConfig::from(&config));
    engine.migrate().await.unwrap();

    assert!(shadow.has_table("cms_document__pages__fields__sections"));
    assert!(!engine.generate().await.unwrap().requires_migration());
}

/// Unknown collections are rejected
#[tokio::test]
async fn test_unknown_collection() {
    let shadow = shadow();
    let engine = engine(&shadow, vec![pages()]);

    assert!(matches!(
        engine.get_schema("missing").await,
        Err(MigrationError::CollectionNotFound(_))
    ));
    assert!(matches!(
        engine.get_migration_status("missing").await,
        Err(MigrationError::CollectionNotFound(_))
    ));
}

/// Invalid declarations fail before the database is touched
#[tokio::test]
async fn test_invalid_declaration() {
    let shadow = shadow();
    let engine = engine(
        &shadow,
        vec![CollectionBuilder::new("blog_posts").field(FieldDefinition::text("title"))],
    );

    assert!(matches!(
        engine.generate().await,
        Err(MigrationError::Declaration(_))
    ));
    assert_eq!(shadow.introspection_count(), 0);
}

/// A live column of an unsupported type aborts the dry run instead of planning its table again
#[tokio::test]
async fn test_unmappable_live_column_aborts() {
    let shadow = shadow();
    engine(&shadow, vec![pages()]).migrate().await.unwrap();
    shadow.clear_events();

    init_tracing();
    let engine = MigrationEngine::new(
        UnmappableColumn {
            inner: Arc::clone(&shadow),
            table: "ld_document_pages_fields",
        },
        vec![pages()],
    );

    let err = engine.dry_run().await.unwrap_err();
    assert!(matches!(err, MigrationError::Introspection(_)));
    assert!(err.to_string().contains("\"ld_document_pages_fields\".\"shape\""));
    assert!(engine.cache().result().is_none());

    assert!(matches!(
        engine.get_schema("pages").await,
        Err(MigrationError::Introspection(_))
    ));
    assert!(matches!(
        engine.migrate().await,
        Err(MigrationError::Introspection(_))
    ));
    assert!(shadow.events().is_empty());
    assert!(shadow.has_table("ld_document_pages_fields"));
}

/// Tables under the collection scope whose names do not decode are reported and left alone
#[tokio::test]
async fn test_unrecognized_live_table_reported() {
    let shadow = shadow();
    let engine = engine(&shadow, vec![pages()]);
    engine.migrate().await.unwrap();

    shadow.seed(&CollectionSchemaTable {
        name: "ld_document_pages_versions_notes".to_string(),
        table_type: TableType::Repeater,
        key: TableKey::collection("pages"),
        columns: vec![CollectionSchemaColumn::primary_key("id")],
    });

    let result = engine.generate().await.unwrap();
    assert!(!result.requires_migration());
    assert!(result
        .warnings
        .iter()
        .any(|w| w.contains("'ld_document_pages_versions_notes'")));

    engine.migrate().await.unwrap();
    assert!(shadow.has_table("ld_document_pages_versions_notes"));
}

/// JSON fields with scalar defaults render jsonb literals and converge after one migration
#[tokio::test]
async fn test_json_scalar_defaults() {
    let shadow = shadow();
    let settings = CollectionBuilder::new("settings")
        .field(FieldDefinition::json("meta").default_value("draft"))
        .field(FieldDefinition::json("flag").default_value(true));
    let engine = engine(&shadow, vec![settings]);
    engine.migrate().await.unwrap();

    let create = shadow
        .executed_statements()
        .into_iter()
        .find(|s| s.starts_with("CREATE TABLE \"ld_document_settings_fields\""))
        .unwrap();
    assert!(create.contains(r#""meta" JSONB DEFAULT '"draft"'::jsonb"#));
    assert!(create.contains(r#""flag" JSONB DEFAULT 'true'::jsonb"#));

    assert!(!engine.generate().await.unwrap().requires_migration());
}

/// Configuring an engine leaves a cache shared with other engines intact
#[tokio::test]
async fn test_with_config_keeps_shared_cache() {
    let shadow = shadow();
    let cache = Arc::new(MigrationCache::new());
    engine(&shadow, vec![pages()])
        .with_cache(Arc::clone(&cache))
        .dry_run()
        .await
        .unwrap();

    let second = engine(&shadow, vec![pages()])
        .with_cache(Arc::clone(&cache))
        .with_config(MigrationConfig::default());
    assert!(cache.result().is_some());
    assert_eq!(cache.generation(), 0);

    second.dry_run().await.unwrap();
    assert_eq!(shadow.introspection_count(), 1);
}

/// An unusable configuration fails before the database is touched
#[tokio::test]
async fn test_invalid_config_rejected() {
    let shadow = shadow();
    let engine =
        engine(&shadow, vec![pages()]).with_config(MigrationConfig::new().max_concurrency(0));

    assert!(matches!(
        engine.generate().await,
        Err(MigrationError::Config(_))
    ));
    assert_eq!(shadow.introspection_count(), 0);
}
