//! Declaration resolver.
//!
//! Walks a collection's fields, bricks and repeaters and produces one
//! [`CollectionSchemaTable`] per table, parents before children.

use lucid_schema::system;
use lucid_schema::{
    AdapterCapabilities, CollectionBuilder, ColumnType, CoreTable, DefaultValue, FieldDefinition,
    ForeignKey, OnDelete, SchemaContext, validate_collections,
};
use tracing::debug;

use crate::error::MigrateResult;
use crate::naming::TableNameCodec;
use crate::schema::{
    CollectionSchema, CollectionSchemaColumn, CollectionSchemaTable, TableKey, TableType,
};

/// Resolves declarations into declared schemas.
pub struct SchemaResolver<'a> {
    codec: &'a TableNameCodec,
    capabilities: &'a dyn AdapterCapabilities,
}

impl SchemaContext for SchemaResolver<'_> {
    fn capabilities(&self) -> &dyn AdapterCapabilities {
        self.capabilities
    }

    fn core_table(&self, table: CoreTable) -> String {
        self.codec.core_table(table.base_name())
    }

    fn document_table(&self, collection_key: &str) -> String {
        self.codec.document_table(collection_key)
    }
}

impl<'a> SchemaResolver<'a> {
    /// Create a resolver.
    pub fn new(codec: &'a TableNameCodec, capabilities: &'a dyn AdapterCapabilities) -> Self {
        Self {
            codec,
            capabilities,
        }
    }

    /// Validate and resolve every collection.
    pub fn resolve_all(&self, collections: &[CollectionBuilder]) -> MigrateResult<Vec<CollectionSchema>> {
        validate_collections(collections, self.codec.separator())?;
        collections.iter().map(|c| self.resolve_collection(c)).collect()
    }

    /// Validate and resolve a single collection.
    pub fn resolve(&self, collection: &CollectionBuilder) -> MigrateResult<CollectionSchema> {
        collection.validate(self.codec.separator())?;
        self.resolve_collection(collection)
    }

    fn resolve_collection(&self, collection: &CollectionBuilder) -> MigrateResult<CollectionSchema> {
        let mut schema = CollectionSchema::new(&collection.key);
        let key = TableKey::collection(&collection.key);

        self.push_table(&mut schema, TableType::Document, key.clone(), &[])?;
        self.push_table(&mut schema, TableType::Versions, key.clone(), &[])?;
        self.push_table(&mut schema, TableType::DocumentFields, key.clone(), &collection.fields)?;

        for (_, brick) in collection.bricks() {
            self.push_table(
                &mut schema,
                TableType::Brick,
                key.clone().with_brick(&brick.key),
                &brick.fields,
            )?;
        }

        debug!(
            collection = %collection.key,
            tables = schema.tables.len(),
            "Resolved collection schema"
        );

        Ok(schema)
    }

    /// Push a table, then the tables of its repeaters, depth first.
    fn push_table(
        &self,
        schema: &mut CollectionSchema,
        table_type: TableType,
        key: TableKey,
        fields: &[FieldDefinition],
    ) -> MigrateResult<()> {
        let name = self.codec.build_table_name(table_type, &key)?;
        let mut columns = self.system_columns(table_type, &key, &name)?;
        let mut repeaters = Vec::new();

        for field in fields {
            if let Some(children) = field.repeater_fields() {
                repeaters.push((field.key.as_str(), children));
                continue;
            }
            let definition = field.schema_definition(self)?;
            columns.extend(
                definition
                    .columns
                    .into_iter()
                    .map(|spec| CollectionSchemaColumn::from_field(&field.key, spec)),
            );
        }

        schema.tables.push(CollectionSchemaTable {
            name,
            table_type,
            key: key.clone(),
            columns,
        });

        for (repeater, children) in repeaters {
            self.push_table(
                schema,
                TableType::Repeater,
                key.clone().with_repeater(repeater),
                children,
            )?;
        }

        Ok(())
    }

    /// Linkage and bookkeeping columns every table of a type carries.
    fn system_columns(
        &self,
        table_type: TableType,
        key: &TableKey,
        name: &str,
    ) -> MigrateResult<Vec<CollectionSchemaColumn>> {
        let collection = TableKey::collection(&key.collection);
        let document_table = self.codec.build_table_name(TableType::Document, &collection)?;
        let versions_table = self.codec.build_table_name(TableType::Versions, &collection)?;
        let users = self.core_table(CoreTable::Users);

        let mut columns = vec![
            CollectionSchemaColumn::primary_key(system::ID),
            CollectionSchemaColumn::core(system::COLLECTION_KEY, ColumnType::Text)
                .nullable(false)
                .references(ForeignKey::new(
                    self.core_table(CoreTable::Collections),
                    "key",
                    OnDelete::Cascade,
                )),
        ];

        match table_type {
            TableType::Document => {
                columns.extend([
                    CollectionSchemaColumn::core(system::IS_DELETED, ColumnType::Boolean)
                        .nullable(false)
                        .default_value(self.capabilities.boolean_default(false)),
                    CollectionSchemaColumn::core(system::IS_DELETED_AT, ColumnType::Timestamp),
                    user_reference(system::DELETED_BY, &users),
                    user_reference(system::CREATED_BY, &users),
                    user_reference(system::UPDATED_BY, &users),
                    timestamp(system::CREATED_AT),
                    timestamp(system::UPDATED_AT),
                ]);
            }
            TableType::Versions => {
                columns.extend([
                    CollectionSchemaColumn::core(system::DOCUMENT_ID, ColumnType::Integer)
                        .nullable(false)
                        .references(ForeignKey::new(&document_table, system::ID, OnDelete::Cascade)),
                    CollectionSchemaColumn::core(system::VERSION_TYPE, ColumnType::Text)
                        .nullable(false),
                    CollectionSchemaColumn::core(system::PROMOTED_FROM, ColumnType::Integer)
                        .references(ForeignKey::new(name, system::ID, OnDelete::SetNull)),
                    user_reference(system::CREATED_BY, &users),
                    timestamp(system::CREATED_AT),
                ]);
            }
            TableType::DocumentFields | TableType::Brick | TableType::Repeater => {
                columns.extend([
                    CollectionSchemaColumn::core(system::DOCUMENT_ID, ColumnType::Integer)
                        .nullable(false)
                        .references(ForeignKey::new(&document_table, system::ID, OnDelete::Cascade)),
                    CollectionSchemaColumn::core(system::DOCUMENT_VERSION_ID, ColumnType::Integer)
                        .nullable(false)
                        .references(ForeignKey::new(&versions_table, system::ID, OnDelete::Cascade)),
                    CollectionSchemaColumn::core(system::LOCALE, ColumnType::Text)
                        .nullable(false)
                        .references(ForeignKey::new(
                            self.core_table(CoreTable::Locales),
                            "code",
                            OnDelete::Cascade,
                        )),
                ]);
            }
        }

        if table_type == TableType::Brick {
            columns.push(
                CollectionSchemaColumn::core(system::BRICK_TYPE, ColumnType::Text).nullable(false),
            );
        }

        if table_type == TableType::Repeater {
            let owner = match &key.brick {
                Some(brick) => self.codec.build_table_name(
                    TableType::Brick,
                    &TableKey::collection(&key.collection).with_brick(brick),
                )?,
                None => self
                    .codec
                    .build_table_name(TableType::DocumentFields, &collection)?,
            };
            columns.push(
                CollectionSchemaColumn::core(system::BRICK_ID, ColumnType::Integer)
                    .nullable(false)
                    .references(ForeignKey::new(owner, system::ID, OnDelete::Cascade)),
            );

            if let Some(parent) = key.parent().filter(|p| p.depth() > 0) {
                let parent_table = self.codec.build_table_name(TableType::Repeater, &parent)?;
                columns.push(
                    CollectionSchemaColumn::core(system::PARENT_ID, ColumnType::Integer)
                        .references(ForeignKey::new(parent_table, system::ID, OnDelete::Cascade)),
                );
            }
        }

        if matches!(table_type, TableType::Brick | TableType::Repeater) {
            columns.extend([
                CollectionSchemaColumn::core(system::POSITION, ColumnType::Integer)
                    .nullable(false)
                    .default_value(DefaultValue::Int(0)),
                CollectionSchemaColumn::core(system::IS_OPEN, ColumnType::Boolean)
                    .nullable(false)
                    .default_value(self.capabilities.boolean_default(false)),
            ]);
        }

        Ok(columns)
    }
}

fn user_reference(name: &str, users: &str) -> CollectionSchemaColumn {
    CollectionSchemaColumn::core(name, ColumnType::Integer)
        .references(ForeignKey::new(users, system::ID, OnDelete::SetNull))
}

fn timestamp(name: &str) -> CollectionSchemaColumn {
    CollectionSchemaColumn::core(name, ColumnType::Timestamp)
        .default_value(DefaultValue::expression("now()"))
}
