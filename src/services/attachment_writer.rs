//! Writes and removes every variant of a stored attachment.

use crate::{
    models::{entity::EntityType, upload::StoredFilename},
    services::{
        lifecycle::SaveState,
        render_engine::{RenderEngine, RenderError},
        storage_paths::StoragePaths,
    },
};
use bytes::Bytes;
use futures::future::join_all;
use std::{
    io,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum AttachmentError {
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("failed to write `{}`: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to read upload `{}`: {source}", path.display())]
    ReadUpload {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("save cannot move from {from:?} to {to:?}")]
    InvalidTransition { from: SaveState, to: SaveState },
}

pub type AttachmentResult<T> = Result<T, AttachmentError>;

#[derive(Clone)]
pub struct AttachmentWriter {
    paths: StoragePaths,
    engine: RenderEngine,
}

impl AttachmentWriter {
    pub fn new(paths: StoragePaths, engine: RenderEngine) -> Self {
        Self { paths, engine }
    }

    pub fn paths(&self) -> &StoragePaths {
        &self.paths
    }

    /// Materialize every variant of `source` under `filename`.
    ///
    /// Variants already written stay on disk when a later one fails.
    #[instrument(skip(self, entity_type, source), fields(entity_type = %entity_type.name, size = source.len()))]
    pub async fn store(
        &self,
        entity_type: &EntityType,
        source: Bytes,
        filename: &StoredFilename,
    ) -> AttachmentResult<()> {
        self.paths
            .ensure_dirs(entity_type)
            .await
            .map_err(|source| AttachmentError::Write {
                path: self.paths.root_dir(entity_type),
                source,
            })?;

        if entity_type.variants.is_empty() {
            let path = self.paths.path_for(entity_type, None, filename.as_str());
            write_atomic(&path, &source).await?;
        } else {
            for spec in entity_type.variants.iter() {
                let rendered = self.engine.render(source.clone(), spec).await?;
                let path = self
                    .paths
                    .path_for(entity_type, Some(&spec.name), filename.as_str());
                write_atomic(&path, &rendered).await?;
                debug!(variant = %spec.name, bytes = rendered.len(), "variant written");
            }
        }

        info!(filename = %filename, "attachment stored");
        Ok(())
    }

    /// Remove `filename` from every variant directory.
    ///
    /// Missing files are ignored and other failures are only logged, so
    /// repeated calls are harmless.
    #[instrument(skip(self, entity_type), fields(entity_type = %entity_type.name))]
    pub async fn discard(&self, entity_type: &EntityType, filename: &str) {
        if !StoredFilename::is_single_segment(filename) {
            warn!(filename, "refusing to discard an unsafe filename");
            return;
        }

        let removals = self
            .paths
            .target_paths(entity_type, filename)
            .into_iter()
            .map(|path| async move {
                match fs::remove_file(&path).await {
                    Ok(()) => debug!("removed {}", path.display()),
                    Err(err) if err.kind() == io::ErrorKind::NotFound => {
                        debug!("{} already missing", path.display());
                    }
                    Err(err) => warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to remove attachment file"
                    ),
                }
            });
        join_all(removals).await;
    }
}

/// Write `data` to a hidden temp file next to `path`, fsync it and rename
/// it into place.
async fn write_atomic(path: &Path, data: &[u8]) -> AttachmentResult<()> {
    let write_err = |source: io::Error| AttachmentError::Write {
        path: path.to_path_buf(),
        source,
    };

    let parent = path.parent().ok_or_else(|| {
        write_err(io::Error::new(
            io::ErrorKind::Other,
            "attachment path missing parent directory",
        ))
    })?;
    let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));

    let result = async {
        let mut file = File::create(&tmp_path).await?;
        file.write_all(data).await?;
        file.flush().await?;
        file.sync_all().await?;
        fs::rename(&tmp_path, path).await
    }
    .await;

    if let Err(err) = result {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(write_err(err));
    }
    Ok(())
}
