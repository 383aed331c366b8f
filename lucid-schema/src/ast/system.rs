//! Column names the engine manages on every collection table.
//!
//! Field keys may not reuse any of these.

/// Serial primary key.
pub const ID: &str = "id";
/// Key of the owning collection.
pub const COLLECTION_KEY: &str = "collection_key";
/// Reference to the owning document.
pub const DOCUMENT_ID: &str = "document_id";
/// Reference to the owning document version.
pub const DOCUMENT_VERSION_ID: &str = "document_version_id";
/// Locale code of a translated row.
pub const LOCALE: &str = "locale";
/// Version kind, such as `draft` or `published`.
pub const VERSION_TYPE: &str = "type";
/// Version a published version was promoted from.
pub const PROMOTED_FROM: &str = "promoted_from";
/// Brick kind of a brick row.
pub const BRICK_TYPE: &str = "brick_type";
/// Reference to the owning brick row.
pub const BRICK_ID: &str = "brick_id";
/// Reference to the parent repeater row.
pub const PARENT_ID: &str = "parent_id";
/// Sort position among siblings.
pub const POSITION: &str = "position";
/// Whether the row is expanded in the editor.
pub const IS_OPEN: &str = "is_open";
/// Soft-delete marker.
pub const IS_DELETED: &str = "is_deleted";
/// Soft-delete timestamp.
pub const IS_DELETED_AT: &str = "is_deleted_at";
/// User who soft-deleted the row.
pub const DELETED_BY: &str = "deleted_by";
/// User who created the row.
pub const CREATED_BY: &str = "created_by";
/// Creation timestamp.
pub const CREATED_AT: &str = "created_at";
/// User who last updated the row.
pub const UPDATED_BY: &str = "updated_by";
/// Last update timestamp.
pub const UPDATED_AT: &str = "updated_at";

/// Every reserved column name. Field keys may not use any of them.
pub const RESERVED: &[&str] = &[
    ID,
    COLLECTION_KEY,
    DOCUMENT_ID,
    DOCUMENT_VERSION_ID,
    LOCALE,
    VERSION_TYPE,
    PROMOTED_FROM,
    BRICK_TYPE,
    BRICK_ID,
    PARENT_ID,
    POSITION,
    IS_OPEN,
    IS_DELETED,
    IS_DELETED_AT,
    DELETED_BY,
    CREATED_BY,
    CREATED_AT,
    UPDATED_BY,
    UPDATED_AT,
];

/// Columns that are never dropped, even when no declaration mentions them.
///
/// Columns whose foreign key targets a core table are protected as well;
/// that check needs the table names and lives in the diff engine.
pub const PROTECTED: &[&str] = &[
    ID,
    IS_DELETED,
    IS_DELETED_AT,
    CREATED_AT,
    UPDATED_AT,
];

/// Check if a name is reserved.
pub fn is_reserved(name: &str) -> bool {
    RESERVED.contains(&name)
}
