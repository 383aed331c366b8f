//! Declaration types for collections, bricks and fields.

mod collection;
mod column;
mod field;
pub mod system;

pub use collection::{BrickBuilder, BrickKind, CollectionBuilder, CollectionMode};
pub use column::{ColumnSpec, ColumnType, ForeignKey, OnDelete, SchemaDefinition};
pub use field::{FIELD_TYPES, FieldConfig, FieldDefinition, FieldKind, FieldTypeInfo, field_type};
