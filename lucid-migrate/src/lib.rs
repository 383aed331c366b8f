//! # lucid-migrate
//!
//! Collection schema migration engine for Lucid.
//!
//! This crate provides functionality for:
//! - Encoding and decoding collection table names
//! - Resolving collection declarations into relational schemas
//! - Introspecting the live collection tables of a database
//! - Diffing declared and live schemas at table and column granularity
//! - Ordering migrations so referenced tables migrate first
//! - Executing migrations in concurrent priority batches
//! - Caching dry runs and migration-filtered schema views
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     ┌────────────────┐
//! │ Collections  │────▶│ Schema Resolver│──────┐
//! └──────────────┘     └────────────────┘      ▼
//!                                       ┌─────────────┐     ┌──────────────┐
//!                                       │ Schema Diff │────▶│ Priority Plan│
//!                                       └─────────────┘     └──────────────┘
//! ┌──────────────┐     ┌────────────────┐      ▲                   │
//! │ Live Tables  │────▶│ Introspector   │──────┘                   ▼
//! └──────────────┘     └────────────────┘                   ┌──────────────┐
//!                                                           │Batch Executor│
//!                                                           └──────────────┘
//! ```
//!
//! ## Table Names
//!
//! Every collection table lives under `{prefix}document{separator}` and
//! encodes its path through the collection:
//!
//! ```text
//! ld_document_pages                    document
//! ld_document_pages_versions           versions
//! ld_document_pages_fields             document fields
//! ld_document_pages_hero               brick "hero"
//! ld_document_pages_fields_sections    repeater "sections" of the document fields
//! ld_document_pages_hero_slides_items  repeater "items" nested in "slides" of "hero"
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use lucid_migrate::{MigrationEngine, ShadowDatabase};
//! use lucid_schema::{CollectionBuilder, FieldDefinition};
//!
//! async fn run() -> lucid_migrate::MigrateResult<()> {
//!     let pages = CollectionBuilder::new("pages")
//!         .field(FieldDefinition::text("title"))
//!         .field(FieldDefinition::wysiwyg("body"));
//!
//!     let engine = MigrationEngine::new(ShadowDatabase::new(), vec![pages]);
//!
//!     let plan = engine.dry_run().await?;
//!     println!("Plan: {}", plan.summary());
//!
//!     let summary = engine.migrate().await?;
//!     println!("Migrated {} tables in {}ms", summary.tables_migrated, summary.duration_ms);
//!
//!     let status = engine.get_migration_status("pages").await?;
//!     assert!(!status.requires_migration);
//!     Ok(())
//! }
//! ```

pub mod adapter;
pub mod cache;
pub mod diff;
pub mod engine;
pub mod error;
pub mod executor;
pub mod introspect;
pub mod naming;
pub mod priority;
pub mod resolve;
pub mod schema;
pub mod shadow;
pub mod sql;

// Re-exports
pub use adapter::DatabaseAdapter;
pub use cache::{CacheStats, MigrationCache};
pub use diff::{
    Change, ColumnChanges, ColumnOperation, MigrationKind, MigrationPlan, MigrationResult,
    SchemaDiffer, TableMigration, default_values_equal, determine_column_mods,
};
pub use engine::{
    MigrationConfig, MigrationEngine, MigrationStatus, MigrationSummary, filter_schema,
    missing_columns,
};
pub use error::{MigrateResult, MigrationError};
pub use executor::{BatchExecutor, ExecutionReport, MigrationBatch, build_batches};
pub use introspect::{
    ColumnInfo, ConstraintInfo, InferredColumn, InferredTable, Introspector,
    LiveSchema, LiveSchemaIntrospector, TableInfo,
};
pub use naming::TableNameCodec;
pub use priority::{base_priority, enforce_dependency_order, get_table_priority};
pub use resolve::SchemaResolver;
pub use schema::{
    CollectionSchema, CollectionSchemaColumn, CollectionSchemaTable, ColumnSource, TableKey,
    TableType,
};
pub use shadow::{ShadowDatabase, ShadowEvent, ShadowPhase};
pub use sql::{Dialect, PostgresDialect};
