//! # lucid-schema
//!
//! Declarations for Lucid content collections.
//!
//! This crate provides:
//! - Collection, brick and field declaration types
//! - The closed registry of field types and the columns each one stores
//! - The contracts field types use to learn about the database dialect
//! - Declaration validation
//! - Configuration parser for `lucid.toml` files
//!
//! ## Example
//!
//! ```rust
//! use lucid_schema::{BrickBuilder, CollectionBuilder, FieldDefinition, validate_collections};
//!
//! let pages = CollectionBuilder::new("pages")
//!     .field(FieldDefinition::text("title").translations(true))
//!     .field(FieldDefinition::wysiwyg("body"))
//!     .field(FieldDefinition::repeater(
//!         "sections",
//!         vec![FieldDefinition::text("heading")],
//!     ))
//!     .builder_brick(BrickBuilder::new("hero").field(FieldDefinition::media("image")));
//!
//! validate_collections(&[pages], "_").unwrap();
//! ```

pub mod ast;
pub mod capabilities;
pub mod config;
pub mod error;
pub mod validator;
pub mod value;

pub use ast::*;
pub use capabilities::{AdapterCapabilities, CoreTable, SchemaContext};
pub use config::{CONFIG_FILE_NAME, LucidConfig, MigrationSettings, TableConfig};
pub use error::{SchemaError, SchemaResult};
pub use validator::{Validator, validate_collections};
pub use value::DefaultValue;
