//! Declaration validation.
//!
//! Table names are built by joining keys with a separator, so the separator
//! must never appear inside a key. This is the only place that guarantee is
//! enforced; the naming codec trusts validated declarations.

use std::collections::HashSet;

use tracing::debug;

use crate::ast::system;
use crate::ast::{CollectionBuilder, FieldDefinition};
use crate::error::{SchemaError, SchemaResult};

/// Literal table segments a brick key may not take.
pub const RESERVED_TABLE_SEGMENTS: &[&str] = &["versions", "fields"];

/// Collection validator.
#[derive(Debug)]
pub struct Validator {
    separator: String,
    errors: Vec<SchemaError>,
}

impl Validator {
    /// Create a validator for the given table name separator.
    pub fn new(separator: impl Into<String>) -> Self {
        Self {
            separator: separator.into(),
            errors: vec![],
        }
    }

    /// Validate a set of collections.
    pub fn validate(&mut self, collections: &[CollectionBuilder]) -> SchemaResult<()> {
        self.errors.clear();

        let mut seen = HashSet::new();
        for collection in collections {
            if !seen.insert(collection.key.as_str()) {
                self.errors
                    .push(SchemaError::duplicate("collection", &collection.key, "config"));
            }
            self.validate_collection(collection);
        }

        debug!(
            collections = collections.len(),
            errors = self.errors.len(),
            "Validated collection declarations"
        );

        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(SchemaError::ValidationFailed {
                count: self.errors.len(),
                errors: std::mem::take(&mut self.errors),
            })
        }
    }

    fn validate_collection(&mut self, collection: &CollectionBuilder) {
        self.check_key("collection", &collection.key);
        self.validate_fields(&collection.key, &collection.fields);

        for (_, brick) in collection.bricks() {
            let scope = format!("{}.{}", collection.key, brick.key);
            self.check_key(&scope, &brick.key);
            if RESERVED_TABLE_SEGMENTS.contains(&brick.key.as_str()) {
                self.errors.push(SchemaError::invalid_key(
                    &scope,
                    &brick.key,
                    "brick keys `versions` and `fields` are reserved",
                ));
            }
            self.validate_fields(&scope, &brick.fields);
        }
    }

    /// Validate one table scope. Repeaters open a new scope.
    fn validate_fields(&mut self, scope: &str, fields: &[FieldDefinition]) {
        let mut seen = HashSet::new();

        for field in fields {
            self.check_key(scope, &field.key);

            if !seen.insert(field.key.as_str()) {
                self.errors.push(SchemaError::duplicate("field", &field.key, scope));
            }

            if system::is_reserved(&field.key) {
                self.errors.push(SchemaError::ReservedColumn {
                    scope: scope.to_string(),
                    field: field.key.clone(),
                });
            }

            if let Some(children) = field.repeater_fields() {
                let child_scope = format!("{}.{}", scope, field.key);
                self.validate_fields(&child_scope, children);
            }
        }
    }

    fn check_key(&mut self, scope: &str, key: &str) {
        if key.is_empty() {
            self.errors
                .push(SchemaError::invalid_key(scope, key, "key may not be empty"));
        } else if !self.separator.is_empty() && key.contains(self.separator.as_str()) {
            self.errors.push(SchemaError::invalid_key(
                scope,
                key,
                format!("key may not contain the separator `{}`", self.separator),
            ));
        }
    }
}

/// Validate collections for the given separator.
pub fn validate_collections(collections: &[CollectionBuilder], separator: &str) -> SchemaResult<()> {
    Validator::new(separator).validate(collections)
}
