//! Transient upload values handed over by the form-parsing layer.

use bytes::Bytes;
use std::{
    collections::BTreeMap,
    fmt, io,
    path::{Path, PathBuf},
};
use tokio::fs;
use tracing::{debug, warn};

/// A file received with the current request but not yet persisted.
///
/// Lives for one save operation; the temp file is dropped once every
/// variant has been written.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingUpload {
    /// Where the upload layer spooled the bytes.
    pub temp_path: PathBuf,

    /// Client-declared file name, including extension. Empty when the
    /// form field was submitted without a file.
    pub name: String,

    /// Extension of `name` without the dot.
    pub extension: String,

    pub size_bytes: u64,

    /// Set when the transport failed (size limit, aborted stream, ...).
    pub has_error: bool,
}

impl PendingUpload {
    pub fn new(temp_path: impl Into<PathBuf>, name: impl Into<String>, size_bytes: u64) -> Self {
        let name = name.into();
        let extension = Path::new(&name)
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default()
            .to_string();
        Self {
            temp_path: temp_path.into(),
            name,
            extension,
            size_bytes,
            has_error: false,
        }
    }

    /// An upload the transport could not deliver.
    pub fn failed(temp_path: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            has_error: true,
            ..Self::new(temp_path, name, 0)
        }
    }

    /// Declared name without its extension.
    pub fn base_name(&self) -> &str {
        Path::new(&self.name)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or_default()
    }

    /// Whether this upload carries a file worth storing.
    pub fn is_usable(&self) -> bool {
        !self.name.is_empty() && !self.has_error
    }

    pub async fn read(&self) -> io::Result<Bytes> {
        fs::read(&self.temp_path).await.map(Bytes::from)
    }

    /// Remove the spooled temp file. Missing files are fine.
    pub async fn discard_temp(&self) {
        match fs::remove_file(&self.temp_path).await {
            Ok(()) => debug!(path = %self.temp_path.display(), "removed upload temp file"),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => warn!(
                path = %self.temp_path.display(),
                error = %err,
                "failed to remove upload temp file"
            ),
        }
    }
}

/// The filename stored in an entity attribute and shared by every variant.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StoredFilename(String);

impl StoredFilename {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    /// Whether `name` names a file directly inside one directory.
    pub fn is_single_segment(name: &str) -> bool {
        !name.is_empty()
            && name != "."
            && name != ".."
            && !name.contains(['/', '\\', '\0'])
    }
}

impl fmt::Display for StoredFilename {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StoredFilename {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Values submitted for one entity, with uploads passed explicitly.
#[derive(Clone, Debug, Default)]
pub struct IncomingValues {
    /// Plain attribute values for the entity's form.
    pub values: BTreeMap<String, String>,

    /// Uploaded files keyed by form name, then attribute name.
    pub files: BTreeMap<String, BTreeMap<String, PendingUpload>>,
}

impl IncomingValues {
    pub fn with_value(mut self, attribute: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(attribute.into(), value.into());
        self
    }

    pub fn with_file(
        mut self,
        form: impl Into<String>,
        attribute: impl Into<String>,
        upload: PendingUpload,
    ) -> Self {
        self.files
            .entry(form.into())
            .or_default()
            .insert(attribute.into(), upload);
        self
    }

    pub fn uploads_for(&self, form: &str) -> Option<&BTreeMap<String, PendingUpload>> {
        self.files.get(form)
    }

    /// Drop every temp file still on disk once the request is done.
    pub async fn cleanup(&self) {
        for upload in self.files.values().flat_map(BTreeMap::values) {
            upload.discard_temp().await;
        }
    }
}
