//! Entity type definitions, loaded from JSON and completed from the schema.

use crate::models::{
    column::{ColumnKind, ColumnMeta, parse_default_literal},
    entity::EntityType,
};
use sqlx::SqlitePool;
use std::{collections::BTreeMap, io, path::Path, sync::Arc};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to read entity definitions: {0}")]
    Read(#[from] io::Error),
    #[error("invalid entity definitions: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("entity type `{0}` is defined more than once")]
    Duplicate(String),
    #[error("table `{0}` does not exist")]
    MissingTable(String),
    #[error("image attribute `{attribute}` is not a column of `{table}`")]
    MissingImageColumn { table: String, attribute: String },
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

#[derive(Clone, Debug, Default)]
pub struct EntityRegistry {
    types: BTreeMap<String, Arc<EntityType>>,
}

impl EntityRegistry {
    pub fn new(types: Vec<EntityType>) -> Result<Self, RegistryError> {
        let mut map = BTreeMap::new();
        for entity_type in types {
            let name = entity_type.name.clone();
            if map.insert(name.clone(), Arc::new(entity_type)).is_some() {
                return Err(RegistryError::Duplicate(name));
            }
        }
        Ok(Self { types: map })
    }

    pub fn from_json(json: &str) -> Result<Self, RegistryError> {
        Self::new(serde_json::from_str(json)?)
    }

    pub async fn load(path: &Path) -> Result<Self, RegistryError> {
        let json = tokio::fs::read_to_string(path).await?;
        Self::from_json(&json)
    }

    pub fn get(&self, name: &str) -> Option<Arc<EntityType>> {
        self.types.get(name).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<EntityType>> {
        self.types.values()
    }

    /// Attach column metadata from the database to every entity type.
    pub async fn introspect(self, db: &SqlitePool) -> Result<Self, RegistryError> {
        let mut types = Vec::with_capacity(self.types.len());
        for entity_type in self.types.into_values() {
            let columns = load_columns(db, &entity_type.name).await?;
            if columns.is_empty() {
                return Err(RegistryError::MissingTable(entity_type.name.clone()));
            }
            for attribute in &entity_type.image_attributes {
                if !columns.iter().any(|column| &column.name == attribute) {
                    return Err(RegistryError::MissingImageColumn {
                        table: entity_type.name.clone(),
                        attribute: attribute.clone(),
                    });
                }
            }
            debug!(entity_type = %entity_type.name, columns = columns.len(), "introspected table");
            types.push(
                Arc::try_unwrap(entity_type)
                    .unwrap_or_else(|shared| (*shared).clone())
                    .with_columns(columns),
            );
        }
        Self::new(types)
    }
}

async fn load_columns(db: &SqlitePool, table: &str) -> Result<Vec<ColumnMeta>, sqlx::Error> {
    let rows = sqlx::query_as::<_, (String, String, i64, Option<String>, i64)>(
        r#"SELECT name, type, "notnull", dflt_value, pk FROM pragma_table_info(?)"#,
    )
    .bind(table)
    .fetch_all(db)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(name, declared, not_null, default, pk)| ColumnMeta {
            name,
            kind: ColumnKind::from_declared(&declared),
            nullable: not_null == 0,
            has_default: default.is_some(),
            default: default.as_deref().and_then(parse_default_literal),
            primary_key: pk > 0,
        })
        .collect())
}
