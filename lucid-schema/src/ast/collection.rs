//! Collection and brick declarations.

use serde::{Deserialize, Serialize};

use crate::ast::field::FieldDefinition;
use crate::error::SchemaResult;
use crate::validator::Validator;

/// How many documents a collection holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionMode {
    /// A single document (e.g. site settings).
    Single,
    /// Any number of documents.
    #[default]
    Multiple,
}

/// Whether a brick is always present or picked by editors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrickKind {
    /// Always attached to the document.
    Fixed,
    /// Selectable from the page builder.
    Builder,
}

/// A named, reusable group of fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrickBuilder {
    /// Brick key.
    pub key: String,
    /// Fields.
    pub fields: Vec<FieldDefinition>,
}

impl BrickBuilder {
    /// Create an empty brick.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            fields: Vec::new(),
        }
    }

    /// Add a field.
    pub fn field(mut self, field: FieldDefinition) -> Self {
        self.fields.push(field);
        self
    }
}

/// A collection declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionBuilder {
    /// Collection key.
    pub key: String,
    /// Document mode.
    #[serde(default)]
    pub mode: CollectionMode,
    /// Document-level fields.
    #[serde(default)]
    pub fields: Vec<FieldDefinition>,
    /// Bricks always attached to documents.
    #[serde(default)]
    pub fixed_bricks: Vec<BrickBuilder>,
    /// Bricks selectable in the page builder.
    #[serde(default)]
    pub builder_bricks: Vec<BrickBuilder>,
}

impl CollectionBuilder {
    /// Create an empty collection.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            mode: CollectionMode::default(),
            fields: Vec::new(),
            fixed_bricks: Vec::new(),
            builder_bricks: Vec::new(),
        }
    }

    /// Set the document mode.
    pub fn mode(mut self, mode: CollectionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Add a document-level field.
    pub fn field(mut self, field: FieldDefinition) -> Self {
        self.fields.push(field);
        self
    }

    /// Attach a fixed brick.
    pub fn fixed_brick(mut self, brick: BrickBuilder) -> Self {
        self.fixed_bricks.push(brick);
        self
    }

    /// Attach a builder brick.
    pub fn builder_brick(mut self, brick: BrickBuilder) -> Self {
        self.builder_bricks.push(brick);
        self
    }

    /// All bricks, fixed first, each key once.
    ///
    /// A brick registered as both fixed and builder shares one table, so the
    /// first registration wins.
    pub fn bricks(&self) -> Vec<(BrickKind, &BrickBuilder)> {
        let mut seen = std::collections::HashSet::new();
        self.fixed_bricks
            .iter()
            .map(|b| (BrickKind::Fixed, b))
            .chain(self.builder_bricks.iter().map(|b| (BrickKind::Builder, b)))
            .filter(|(_, b)| seen.insert(b.key.as_str()))
            .collect()
    }

    /// Validate this collection on its own.
    pub fn validate(&self, separator: &str) -> SchemaResult<()> {
        Validator::new(separator).validate(std::slice::from_ref(self))
    }

    /// Find a brick by key.
    pub fn get_brick(&self, key: &str) -> Option<&BrickBuilder> {
        self.fixed_bricks
            .iter()
            .chain(self.builder_bricks.iter())
            .find(|b| b.key == key)
    }
}
