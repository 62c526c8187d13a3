//! SQLite persistence for entities, driving the attachment hooks.
//!
//! Tables are addressed dynamically from the [`EntityRegistry`]; every table
//! has an integer `id` primary key.

use crate::{
    models::{
        column::{ColumnKind, ColumnMeta},
        entity::{AttributeValue, Entity, EntityType},
    },
    services::{
        attachment_writer::AttachmentError,
        entity_registry::EntityRegistry,
        lifecycle::{EntityHooks, SaveOperation, SaveState},
    },
};
use sqlx::{QueryBuilder, Row, SqlitePool, ValueRef, sqlite::{Sqlite, SqliteRow}};
use std::{collections::BTreeMap, sync::Arc};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("entity type `{0}` not found")]
    UnknownEntityType(String),
    #[error("{entity_type} #{id} not found")]
    NotFound { entity_type: String, id: i64 },
    #[error("attribute `{0}` is required")]
    MissingAttribute(String),
    #[error("failed to process attachment")]
    Attachment(#[from] AttachmentError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[derive(Clone)]
pub struct EntityRepository {
    /// Shared SQLite connection pool.
    pub db: Arc<SqlitePool>,
    registry: Arc<EntityRegistry>,
    hooks: Arc<dyn EntityHooks>,
}

impl EntityRepository {
    pub fn new(db: Arc<SqlitePool>, registry: Arc<EntityRegistry>, hooks: Arc<dyn EntityHooks>) -> Self {
        Self { db, registry, hooks }
    }

    pub fn entity_type(&self, name: &str) -> RepositoryResult<Arc<EntityType>> {
        self.registry
            .get(name)
            .ok_or_else(|| RepositoryError::UnknownEntityType(name.to_string()))
    }

    pub async fn find(&self, entity_type: &Arc<EntityType>, id: i64) -> RepositoryResult<Entity> {
        let mut builder = QueryBuilder::<Sqlite>::new("SELECT * FROM ");
        builder.push(quote_ident(&entity_type.name));
        builder.push(" WHERE id = ");
        builder.push_bind(id);

        let row = builder
            .build()
            .fetch_optional(&*self.db)
            .await?
            .ok_or_else(|| RepositoryError::NotFound {
                entity_type: entity_type.name.clone(),
                id,
            })?;

        let mut attributes = BTreeMap::new();
        for column in entity_type.columns.iter().filter(|c| !c.primary_key) {
            attributes.insert(column.name.clone(), decode_column(&row, column)?);
        }
        Ok(Entity::loaded(entity_type.clone(), id, attributes))
    }

    /// Validate, run the pre-save hook, write and commit, then run the
    /// post-commit hook. Nothing is written when a hook vetoes the save.
    pub async fn save(&self, entity: &mut Entity) -> RepositoryResult<()> {
        let mut op = SaveOperation::begin(entity);
        op.advance(SaveState::Validating)?;

        if let Err(err) = validate(entity) {
            op.fail();
            return Err(err);
        }

        self.hooks.before_save(entity, &mut op).await?;

        let id = match self.write(entity).await {
            Ok(id) => id,
            Err(err) => {
                op.fail();
                warn!(entity_type = %entity.entity_type.name, error = %err, "entity write failed");
                return Err(err);
            }
        };

        entity.mark_committed(id);
        info!(entity_type = %entity.entity_type.name, id, insert = op.is_insert(), "entity saved");

        self.hooks.after_commit(entity, &mut op).await?;
        Ok(())
    }

    /// Delete the row, then let the hooks clean up its files.
    pub async fn delete(&self, entity: &Entity) -> RepositoryResult<()> {
        let entity_type = &entity.entity_type;
        let id = entity.id.ok_or_else(|| RepositoryError::NotFound {
            entity_type: entity_type.name.clone(),
            id: 0,
        })?;

        let mut tx = self.db.begin().await?;
        let mut builder = QueryBuilder::<Sqlite>::new("DELETE FROM ");
        builder.push(quote_ident(&entity_type.name));
        builder.push(" WHERE id = ");
        builder.push_bind(id);
        let result = builder.build().execute(&mut *tx).await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound {
                entity_type: entity_type.name.clone(),
                id,
            });
        }
        tx.commit().await?;

        info!(entity_type = %entity_type.name, id, "entity deleted");
        self.hooks.after_delete(entity).await;
        Ok(())
    }

    async fn write(&self, entity: &Entity) -> RepositoryResult<i64> {
        let entity_type = &entity.entity_type;
        let values: Vec<(&String, &AttributeValue)> = entity
            .attributes()
            .iter()
            .filter(|(name, _)| {
                entity_type
                    .column(name)
                    .is_some_and(|column| !column.primary_key)
            })
            .collect();

        let mut tx = self.db.begin().await?;
        let id = match entity.id {
            None => {
                let mut builder = QueryBuilder::<Sqlite>::new("INSERT INTO ");
                builder.push(quote_ident(&entity_type.name));
                if values.is_empty() {
                    builder.push(" DEFAULT VALUES");
                } else {
                    builder.push(" (");
                    let mut columns = builder.separated(", ");
                    for (name, _) in &values {
                        columns.push(quote_ident(name));
                    }
                    builder.push(") VALUES (");
                    let mut binds = builder.separated(", ");
                    for (_, value) in &values {
                        push_value(&mut binds, value);
                    }
                    builder.push(")");
                }
                builder
                    .build()
                    .execute(&mut *tx)
                    .await?
                    .last_insert_rowid()
            }
            Some(id) => {
                if !values.is_empty() {
                    let mut builder = QueryBuilder::<Sqlite>::new("UPDATE ");
                    builder.push(quote_ident(&entity_type.name));
                    builder.push(" SET ");
                    let mut assignments = builder.separated(", ");
                    for (name, value) in &values {
                        assignments.push(format!("{} = ", quote_ident(name)));
                        push_value_unseparated(&mut assignments, value);
                    }
                    builder.push(" WHERE id = ");
                    builder.push_bind(id);
                    builder.build().execute(&mut *tx).await?;
                }
                id
            }
        };
        tx.commit().await?;
        Ok(id)
    }
}

/// Inserts must supply every non-nullable column that has no default.
fn validate(entity: &Entity) -> RepositoryResult<()> {
    if !entity.is_new_record() {
        return Ok(());
    }
    for column in entity.entity_type.columns.iter().filter(|c| c.is_required()) {
        match entity.get(&column.name) {
            None | Some(AttributeValue::Null) => {
                return Err(RepositoryError::MissingAttribute(column.name.clone()));
            }
            Some(_) => {}
        }
    }
    Ok(())
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn push_value<'qb, 'args>(
    binds: &mut sqlx::query_builder::Separated<'qb, 'args, Sqlite, &'static str>,
    value: &AttributeValue,
) {
    match value {
        AttributeValue::Integer(v) => binds.push_bind(*v),
        AttributeValue::Real(v) => binds.push_bind(*v),
        AttributeValue::Text(v) => binds.push_bind(v.clone()),
        AttributeValue::Null => binds.push_bind(None::<String>),
        AttributeValue::Upload(upload) => {
            warn!(name = %upload.name, "unresolved upload reached persistence, storing NULL");
            binds.push_bind(None::<String>)
        }
    };
}

fn push_value_unseparated<'qb, 'args>(
    binds: &mut sqlx::query_builder::Separated<'qb, 'args, Sqlite, &'static str>,
    value: &AttributeValue,
) {
    match value {
        AttributeValue::Integer(v) => binds.push_bind_unseparated(*v),
        AttributeValue::Real(v) => binds.push_bind_unseparated(*v),
        AttributeValue::Text(v) => binds.push_bind_unseparated(v.clone()),
        AttributeValue::Null => binds.push_bind_unseparated(None::<String>),
        AttributeValue::Upload(upload) => {
            warn!(name = %upload.name, "unresolved upload reached persistence, storing NULL");
            binds.push_bind_unseparated(None::<String>)
        }
    };
}

fn decode_column(row: &SqliteRow, column: &ColumnMeta) -> Result<AttributeValue, sqlx::Error> {
    let name = column.name.as_str();
    if row.try_get_raw(name)?.is_null() {
        return Ok(AttributeValue::Null);
    }

    let value = match column.kind {
        ColumnKind::Integer => row.try_get::<i64, _>(name).map(AttributeValue::Integer),
        ColumnKind::Real => row.try_get::<f64, _>(name).map(AttributeValue::Real),
        ColumnKind::Numeric => row
            .try_get::<i64, _>(name)
            .map(AttributeValue::Integer)
            .or_else(|_| row.try_get::<f64, _>(name).map(AttributeValue::Real)),
        ColumnKind::Text => row.try_get::<String, _>(name).map(AttributeValue::Text),
        ColumnKind::Blob => {
            debug!(column = name, "skipping blob column");
            return Ok(AttributeValue::Null);
        }
    };

    // Loosely typed rows fall back to their text form.
    value.or_else(|_| row.try_get::<String, _>(name).map(AttributeValue::Text))
}
