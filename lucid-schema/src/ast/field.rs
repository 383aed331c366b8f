//! Field definitions and the field type registry.

use serde::{Deserialize, Serialize};

use crate::ast::column::{ColumnSpec, ColumnType, ForeignKey, OnDelete, SchemaDefinition};
use crate::capabilities::{CoreTable, SchemaContext};
use crate::error::{SchemaError, SchemaResult};
use crate::value::DefaultValue;

/// Static facts about a field type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldTypeInfo {
    /// Registry name.
    pub name: &'static str,
    /// Column type of the single column the field stores, if it stores one.
    pub column_type: Option<ColumnType>,
    /// Whether values may be translated per locale.
    pub translatable: bool,
}

const TEXT: FieldTypeInfo = FieldTypeInfo { name: "text", column_type: Some(ColumnType::Text), translatable: true };
const TEXTAREA: FieldTypeInfo = FieldTypeInfo { name: "textarea", column_type: Some(ColumnType::Text), translatable: true };
const WYSIWYG: FieldTypeInfo = FieldTypeInfo { name: "wysiwyg", column_type: Some(ColumnType::Text), translatable: true };
const SELECT: FieldTypeInfo = FieldTypeInfo { name: "select", column_type: Some(ColumnType::Text), translatable: true };
const COLOR: FieldTypeInfo = FieldTypeInfo { name: "color", column_type: Some(ColumnType::Text), translatable: false };
const NUMBER: FieldTypeInfo = FieldTypeInfo { name: "number", column_type: Some(ColumnType::Real), translatable: false };
const CHECKBOX: FieldTypeInfo = FieldTypeInfo { name: "checkbox", column_type: Some(ColumnType::Boolean), translatable: true };
const DATETIME: FieldTypeInfo = FieldTypeInfo { name: "datetime", column_type: Some(ColumnType::Timestamp), translatable: false };
const JSON: FieldTypeInfo = FieldTypeInfo { name: "json", column_type: Some(ColumnType::Json), translatable: true };
const LINK: FieldTypeInfo = FieldTypeInfo { name: "link", column_type: Some(ColumnType::Json), translatable: true };
const MEDIA: FieldTypeInfo = FieldTypeInfo { name: "media", column_type: Some(ColumnType::Integer), translatable: true };
const USER: FieldTypeInfo = FieldTypeInfo { name: "user", column_type: Some(ColumnType::Integer), translatable: false };
const DOCUMENT: FieldTypeInfo = FieldTypeInfo { name: "document", column_type: Some(ColumnType::Integer), translatable: false };
const REPEATER: FieldTypeInfo = FieldTypeInfo { name: "repeater", column_type: None, translatable: false };

/// All supported field types.
pub const FIELD_TYPES: &[FieldTypeInfo] = &[
    TEXT, TEXTAREA, WYSIWYG, SELECT, COLOR, NUMBER, CHECKBOX,
    DATETIME, JSON, LINK, MEDIA, USER, DOCUMENT, REPEATER,
];

/// Look up a field type by its registry name.
pub fn field_type(name: &str) -> SchemaResult<&'static FieldTypeInfo> {
    FIELD_TYPES
        .iter()
        .find(|info| info.name == name)
        .ok_or_else(|| SchemaError::UnknownFieldType {
            type_name: name.to_string(),
        })
}

/// The closed set of field kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Textarea,
    Wysiwyg,
    Select,
    Color,
    Number,
    Checkbox,
    #[serde(rename = "datetime")]
    DateTime,
    Json,
    Link,
    Media,
    User,
    /// Reference to a document of another collection.
    Document { collection: String },
    /// A repeatable group of child fields stored in its own table.
    Repeater { fields: Vec<FieldDefinition> },
}

impl FieldKind {
    /// Registry name of this kind.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Textarea => "textarea",
            Self::Wysiwyg => "wysiwyg",
            Self::Select => "select",
            Self::Color => "color",
            Self::Number => "number",
            Self::Checkbox => "checkbox",
            Self::DateTime => "datetime",
            Self::Json => "json",
            Self::Link => "link",
            Self::Media => "media",
            Self::User => "user",
            Self::Document { .. } => "document",
            Self::Repeater { .. } => "repeater",
        }
    }

    /// Registry entry for this kind.
    pub fn info(&self) -> &'static FieldTypeInfo {
        match self {
            Self::Text => &TEXT,
            Self::Textarea => &TEXTAREA,
            Self::Wysiwyg => &WYSIWYG,
            Self::Select => &SELECT,
            Self::Color => &COLOR,
            Self::Number => &NUMBER,
            Self::Checkbox => &CHECKBOX,
            Self::DateTime => &DATETIME,
            Self::Json => &JSON,
            Self::Link => &LINK,
            Self::Media => &MEDIA,
            Self::User => &USER,
            Self::Document { .. } => &DOCUMENT,
            Self::Repeater { .. } => &REPEATER,
        }
    }
}

/// Per-field configuration shared by all kinds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldConfig {
    /// Default value for new rows.
    pub default: Option<DefaultValue>,
    /// Whether the value is stored per locale.
    pub translations: bool,
    /// Whether a value is required. Enforced by validation, never by the schema.
    pub required: bool,
}

/// A declared field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    /// Field key, also the column name.
    pub key: String,
    /// Field kind.
    pub kind: FieldKind,
    /// Configuration.
    #[serde(default)]
    pub config: FieldConfig,
}

impl FieldDefinition {
    /// Create a field of the given kind.
    pub fn new(key: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            key: key.into(),
            kind,
            config: FieldConfig::default(),
        }
    }

    pub fn text(key: impl Into<String>) -> Self {
        Self::new(key, FieldKind::Text)
    }

    pub fn textarea(key: impl Into<String>) -> Self {
        Self::new(key, FieldKind::Textarea)
    }

    pub fn wysiwyg(key: impl Into<String>) -> Self {
        Self::new(key, FieldKind::Wysiwyg)
    }

    pub fn select(key: impl Into<String>) -> Self {
        Self::new(key, FieldKind::Select)
    }

    pub fn color(key: impl Into<String>) -> Self {
        Self::new(key, FieldKind::Color)
    }

    pub fn number(key: impl Into<String>) -> Self {
        Self::new(key, FieldKind::Number)
    }

    pub fn checkbox(key: impl Into<String>) -> Self {
        Self::new(key, FieldKind::Checkbox)
    }

    pub fn datetime(key: impl Into<String>) -> Self {
        Self::new(key, FieldKind::DateTime)
    }

    pub fn json(key: impl Into<String>) -> Self {
        Self::new(key, FieldKind::Json)
    }

    pub fn link(key: impl Into<String>) -> Self {
        Self::new(key, FieldKind::Link)
    }

    pub fn media(key: impl Into<String>) -> Self {
        Self::new(key, FieldKind::Media)
    }

    pub fn user(key: impl Into<String>) -> Self {
        Self::new(key, FieldKind::User)
    }

    /// A reference to a document in `collection`.
    pub fn document(key: impl Into<String>, collection: impl Into<String>) -> Self {
        Self::new(
            key,
            FieldKind::Document {
                collection: collection.into(),
            },
        )
    }

    /// A repeater holding `fields` in a child table.
    pub fn repeater(key: impl Into<String>, fields: Vec<FieldDefinition>) -> Self {
        Self::new(key, FieldKind::Repeater { fields })
    }

    /// Set the default value.
    pub fn default_value(mut self, value: impl Into<DefaultValue>) -> Self {
        self.config.default = Some(value.into());
        self
    }

    /// Enable or disable translations.
    pub fn translations(mut self, enabled: bool) -> Self {
        self.config.translations = enabled;
        self
    }

    /// Mark the field as required.
    pub fn required(mut self, required: bool) -> Self {
        self.config.required = required;
        self
    }

    /// Child fields if this is a repeater.
    pub fn repeater_fields(&self) -> Option<&[FieldDefinition]> {
        match &self.kind {
            FieldKind::Repeater { fields } => Some(fields),
            _ => None,
        }
    }

    /// Whether translations are enabled and supported by the kind.
    pub fn translations_enabled(&self) -> bool {
        self.config.translations && self.kind.info().translatable
    }

    /// Describe the columns this field stores.
    ///
    /// Repeaters contribute no columns; their children live in a child table.
    /// Columns are always nullable, `required` is a validation concern.
    pub fn schema_definition(&self, ctx: &dyn SchemaContext) -> SchemaResult<SchemaDefinition> {
        let Some(column_type) = self.kind.info().column_type else {
            return Ok(SchemaDefinition::empty());
        };

        let column = ColumnSpec::new(&self.key, column_type);
        let default = self.config.default.as_ref();

        let column = match &self.kind {
            FieldKind::Repeater { .. } => return Ok(SchemaDefinition::empty()),
            FieldKind::Checkbox => {
                let value = match default {
                    None => false,
                    Some(DefaultValue::Bool(b)) => *b,
                    Some(other) => {
                        return Err(self.bad_default(other, "a boolean"));
                    }
                };
                column.default_value(Some(ctx.capabilities().boolean_default(value)))
            }
            FieldKind::Number => match default {
                None | Some(DefaultValue::Int(_)) | Some(DefaultValue::Float(_)) => {
                    column.default_value(default.cloned())
                }
                Some(other) => return Err(self.bad_default(other, "a number")),
            },
            FieldKind::Text
            | FieldKind::Textarea
            | FieldKind::Wysiwyg
            | FieldKind::Select
            | FieldKind::Color => match default {
                None | Some(DefaultValue::Text(_)) => column.default_value(default.cloned()),
                Some(other) => return Err(self.bad_default(other, "a string")),
            },
            FieldKind::DateTime => match default {
                None | Some(DefaultValue::Text(_)) | Some(DefaultValue::Expression(_)) => {
                    column.default_value(default.cloned())
                }
                Some(other) => return Err(self.bad_default(other, "a timestamp")),
            },
            FieldKind::Json | FieldKind::Link => column.default_value(default.cloned()),
            FieldKind::Media => self.reference(
                column,
                ForeignKey::new(ctx.core_table(CoreTable::Media), "id", OnDelete::SetNull),
            )?,
            FieldKind::User => self.reference(
                column,
                ForeignKey::new(ctx.core_table(CoreTable::Users), "id", OnDelete::SetNull),
            )?,
            FieldKind::Document { collection } => self.reference(
                column,
                ForeignKey::new(ctx.document_table(collection), "id", OnDelete::SetNull),
            )?,
        };

        Ok(SchemaDefinition::single(column))
    }

    fn reference(&self, column: ColumnSpec, foreign_key: ForeignKey) -> SchemaResult<ColumnSpec> {
        if let Some(default) = &self.config.default {
            return Err(self.bad_default(default, "nothing (reference fields take no default)"));
        }
        Ok(column.references(foreign_key))
    }

    fn bad_default(&self, value: &DefaultValue, expected: &str) -> SchemaError {
        SchemaError::invalid_field(
            &self.key,
            "default",
            format!(
                "{} default {} is invalid, expected {}",
                self.kind.type_name(),
                value,
                expected
            ),
        )
    }
}
