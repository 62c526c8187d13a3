//! Variant catalogs: the renditions stored for every uploaded image.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

/// A single stored rendition of an uploaded image.
///
/// `size` is a bounding box; `None` stores the upload byte-for-byte.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct VariantSpec {
    /// Directory name of this rendition under the entity's storage root.
    pub name: String,

    /// Target bounding box `(width, height)`, or `None` for the original.
    #[serde(default)]
    pub size: Option<(u32, u32)>,
}

impl VariantSpec {
    pub fn original(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size: None,
        }
    }

    pub fn resized(name: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            name: name.into(),
            size: Some((width, height)),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("variant `{0}` is declared more than once")]
    DuplicateVariant(String),
    #[error("variant name `{0}` is not a safe directory name")]
    InvalidVariantName(String),
    #[error("variant `{0}` has a zero dimension")]
    ZeroSize(String),
}

/// Ordered set of [`VariantSpec`]s with unique names.
///
/// An empty catalog means files are stored directly under the entity root.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(try_from = "Vec<VariantSpec>", into = "Vec<VariantSpec>")]
pub struct VariantCatalog {
    variants: Vec<VariantSpec>,
}

impl VariantCatalog {
    pub fn new(variants: Vec<VariantSpec>) -> Result<Self, CatalogError> {
        let mut seen = BTreeSet::new();
        for spec in &variants {
            if !is_safe_segment(&spec.name) {
                return Err(CatalogError::InvalidVariantName(spec.name.clone()));
            }
            if !seen.insert(spec.name.as_str()) {
                return Err(CatalogError::DuplicateVariant(spec.name.clone()));
            }
            if matches!(spec.size, Some((0, _)) | Some((_, 0))) {
                return Err(CatalogError::ZeroSize(spec.name.clone()));
            }
        }
        Ok(Self { variants })
    }

    /// Catalog with no variants: uploads land in the entity root.
    pub fn empty() -> Self {
        Self::default()
    }

    /// `full` as uploaded, `medium` 300x300 and `small` 50x50.
    pub fn standard() -> Self {
        Self {
            variants: vec![
                VariantSpec::original("full"),
                VariantSpec::resized("medium", 300, 300),
                VariantSpec::resized("small", 50, 50),
            ],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    pub fn len(&self) -> usize {
        self.variants.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &VariantSpec> {
        self.variants.iter()
    }

    pub fn get(&self, name: &str) -> Option<&VariantSpec> {
        self.variants.iter().find(|spec| spec.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.variants.iter().map(|spec| spec.name.as_str())
    }
}

impl TryFrom<Vec<VariantSpec>> for VariantCatalog {
    type Error = CatalogError;

    fn try_from(variants: Vec<VariantSpec>) -> Result<Self, Self::Error> {
        Self::new(variants)
    }
}

impl From<VariantCatalog> for Vec<VariantSpec> {
    fn from(catalog: VariantCatalog) -> Self {
        catalog.variants
    }
}

/// True when `name` can be used verbatim as one path segment.
pub(crate) fn is_safe_segment(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}
