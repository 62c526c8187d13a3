//! Storage path resolution for entity attachments.
//!
//! Layout on disk:
//! - `{root}/{entity}/{variant}/{filename}` for each configured variant
//! - `{root}/{entity}/{filename}` when the catalog is empty

use crate::models::entity::EntityType;
use std::{
    io,
    path::{Path, PathBuf},
};
use tokio::fs;
use tracing::debug;

#[derive(Clone, Debug)]
pub struct StoragePaths {
    /// Base directory on disk where all entity roots live.
    root: PathBuf,

    /// Public URL prefix the storage root is served under.
    public_url: String,
}

impl StoragePaths {
    pub fn new(root: impl Into<PathBuf>, public_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_url: public_url.into(),
        }
    }

    pub fn storage_root(&self) -> &Path {
        &self.root
    }

    /// Root directory for every file of an entity type.
    pub fn root_dir(&self, entity_type: &EntityType) -> PathBuf {
        self.root.join(&entity_type.name)
    }

    pub fn variant_dir(&self, entity_type: &EntityType, variant: &str) -> PathBuf {
        self.root_dir(entity_type).join(variant)
    }

    /// Filesystem path of one stored file. `None` omits the variant segment.
    pub fn path_for(
        &self,
        entity_type: &EntityType,
        variant: Option<&str>,
        filename: &str,
    ) -> PathBuf {
        match variant {
            Some(variant) => self.variant_dir(entity_type, variant).join(filename),
            None => self.root_dir(entity_type).join(filename),
        }
    }

    /// Public URL of one stored file. `None` omits the variant segment.
    pub fn url_for(&self, entity_type: &EntityType, variant: Option<&str>, filename: &str) -> String {
        let base = self.public_url.trim_end_matches('/');
        match variant {
            Some(variant) => format!("{}/{}/{}/{}", base, entity_type.name, variant, filename),
            None => format!("{}/{}/{}", base, entity_type.name, filename),
        }
    }

    /// Every on-disk location a stored filename occupies.
    pub fn target_paths(&self, entity_type: &EntityType, filename: &str) -> Vec<PathBuf> {
        if entity_type.variants.is_empty() {
            vec![self.path_for(entity_type, None, filename)]
        } else {
            entity_type
                .variants
                .names()
                .map(|variant| self.path_for(entity_type, Some(variant), filename))
                .collect()
        }
    }

    /// Create the entity root and every variant directory.
    ///
    /// Safe to call repeatedly and concurrently; existing directories are
    /// left untouched.
    pub async fn ensure_dirs(&self, entity_type: &EntityType) -> io::Result<()> {
        let root = self.root_dir(entity_type);
        create_dir(&root).await?;
        for variant in entity_type.variants.names() {
            create_dir(&root.join(variant)).await?;
        }
        Ok(())
    }
}

async fn create_dir(path: &Path) -> io::Result<()> {
    match fs::create_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists && path.is_dir() => {
            debug!("directory {} created concurrently", path.display());
            Ok(())
        }
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::variant::VariantCatalog;
    use tempfile::tempdir;

    #[test]
    fn test_path_and_url_construction() {
        let paths = StoragePaths::new("/srv/images", "/images/");
        let posts = EntityType::new("posts", "Post");

        assert_eq!(
            paths.path_for(&posts, Some("small"), "a.png"),
            PathBuf::from("/srv/images/posts/small/a.png")
        );
        assert_eq!(
            paths.path_for(&posts, None, "a.png"),
            PathBuf::from("/srv/images/posts/a.png")
        );
        assert_eq!(paths.url_for(&posts, Some("full"), "a.png"), "/images/posts/full/a.png");
        assert_eq!(paths.url_for(&posts, None, "a.png"), "/images/posts/a.png");
    }

    #[test]
    fn test_target_paths_follow_catalog() {
        let paths = StoragePaths::new("/data", "/images");
        let posts = EntityType::new("posts", "Post");
        assert_eq!(paths.target_paths(&posts, "x.png").len(), 3);

        let banners = EntityType::new("banners", "Banner").with_variants(VariantCatalog::empty());
        assert_eq!(
            paths.target_paths(&banners, "x.png"),
            vec![PathBuf::from("/data/banners/x.png")]
        );
    }

    #[tokio::test]
    async fn test_ensure_dirs_is_idempotent() {
        let dir = tempdir().unwrap();
        let paths = StoragePaths::new(dir.path(), "/images");
        let posts = EntityType::new("posts", "Post");

        paths.ensure_dirs(&posts).await.unwrap();
        paths.ensure_dirs(&posts).await.unwrap();

        for variant in ["full", "medium", "small"] {
            assert!(paths.variant_dir(&posts, variant).is_dir());
        }
    }

    #[tokio::test]
    async fn test_ensure_dirs_concurrently() {
        let dir = tempdir().unwrap();
        let paths = StoragePaths::new(dir.path(), "/images");
        let posts = EntityType::new("posts", "Post");

        let (a, b) = tokio::join!(paths.ensure_dirs(&posts), paths.ensure_dirs(&posts));
        a.unwrap();
        b.unwrap();
    }

    #[tokio::test]
    async fn test_empty_catalog_creates_root_only() {
        let dir = tempdir().unwrap();
        let paths = StoragePaths::new(dir.path(), "/images");
        let banners = EntityType::new("banners", "Banner").with_variants(VariantCatalog::empty());

        paths.ensure_dirs(&banners).await.unwrap();

        let root = paths.root_dir(&banners);
        assert!(root.is_dir());
        assert_eq!(std::fs::read_dir(&root).unwrap().count(), 0);
    }
}
