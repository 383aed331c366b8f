//! # Lucid
//!
//! Code-declared content collections with automatic relational schema
//! synchronization.
//!
//! Lucid provides:
//! - Collection, brick and field declarations checked before they touch a database
//! - A deterministic table layout for collections, bricks and nested repeaters
//! - Dry-run planning and concurrent, dependency-ordered execution of schema changes
//! - Migration-aware schema views for read paths
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use lucid::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), MigrationError> {
//!     let config = LucidConfig::from_file("lucid.toml")?;
//!
//!     let pages = CollectionBuilder::new("pages")
//!         .field(FieldDefinition::text("title"))
//!         .field(FieldDefinition::repeater(
//!             "sections",
//!             vec![FieldDefinition::text("heading")],
//!         ));
//!
//!     let engine = MigrationEngine::new(ShadowDatabase::new(), vec![pages])
//!         .with_config(MigrationConfig::from(&config));
//!
//!     let summary = engine.migrate().await?;
//!     println!("Migrated {} tables", summary.tables_migrated);
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

/// Collection declarations and configuration.
pub mod schema {
    pub use lucid_schema::*;
}

/// The migration engine.
pub mod migrate {
    pub use lucid_migrate::*;
}

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::migrate::{
        DatabaseAdapter, MigrateResult, MigrationCache, MigrationConfig, MigrationEngine,
        MigrationError, MigrationResult, MigrationStatus, MigrationSummary, ShadowDatabase,
    };
    pub use crate::schema::{
        BrickBuilder, CollectionBuilder, CollectionMode, FieldDefinition, LucidConfig,
        SchemaError,
    };
}

// Re-export key types at the crate root
pub use migrate::{MigrationEngine, MigrationError};
pub use schema::{CollectionBuilder, LucidConfig, SchemaError};
