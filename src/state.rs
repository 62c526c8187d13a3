//! Shared state handed to every request handler.

use crate::{
    config::AppConfig,
    services::{
        attachment_writer::AttachmentWriter, entity_registry::EntityRegistry,
        entity_repository::EntityRepository, lifecycle::AttachmentLifecycle,
        render_engine::RenderEngine, storage_paths::StoragePaths,
    },
};
use anyhow::{Context, Result};
use sqlx::SqlitePool;
use std::{path::PathBuf, sync::Arc};

#[derive(Clone)]
pub struct AppState {
    pub repository: EntityRepository,
    pub paths: StoragePaths,
    /// Spool directory for multipart file parts.
    pub upload_tmp_dir: PathBuf,
    pub max_upload_bytes: u64,
}

impl AppState {
    /// Wire the repository and attachment hooks over an introspected registry.
    pub fn new(
        db: SqlitePool,
        registry: EntityRegistry,
        paths: StoragePaths,
        upload_tmp_dir: PathBuf,
        max_upload_bytes: u64,
    ) -> Self {
        let writer = AttachmentWriter::new(paths.clone(), RenderEngine::default());
        let repository = EntityRepository::new(
            Arc::new(db),
            Arc::new(registry),
            Arc::new(AttachmentLifecycle::new(writer)),
        );
        Self {
            repository,
            paths,
            upload_tmp_dir,
            max_upload_bytes,
        }
    }

    pub async fn from_config(cfg: &AppConfig, db: SqlitePool) -> Result<Self> {
        let registry = EntityRegistry::load(&cfg.entities)
            .await
            .with_context(|| format!("loading entity types from {}", cfg.entities.display()))?
            .introspect(&db)
            .await
            .context("matching entity types against the database schema")?;

        for entity_type in registry.iter() {
            tracing::info!(
                entity_type = %entity_type.name,
                variants = ?entity_type.variants.names().collect::<Vec<_>>(),
                "registered entity type"
            );
        }

        Ok(Self::new(
            db,
            registry,
            StoragePaths::new(cfg.storage_dir.clone(), cfg.public_url.clone()),
            cfg.upload_tmp_dir.clone(),
            cfg.max_upload_bytes,
        ))
    }
}
