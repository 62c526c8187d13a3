//! Entity types and the in-memory entity record the lifecycle hooks operate on.

use crate::models::{
    column::ColumnMeta,
    upload::{PendingUpload, StoredFilename},
    variant::VariantCatalog,
};
use serde::{Deserialize, Serialize, Serializer};
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

/// Value held by an entity attribute.
///
/// `Upload` only ever appears between attribute assignment and the
/// pre-save hook; it is never persisted.
#[derive(Clone, Debug, PartialEq)]
pub enum AttributeValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Upload(PendingUpload),
}

impl AttributeValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_upload(&self) -> Option<&PendingUpload> {
        match self {
            Self::Upload(upload) => Some(upload),
            _ => None,
        }
    }
}

impl Serialize for AttributeValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null | Self::Upload(_) => serializer.serialize_none(),
            Self::Integer(value) => serializer.serialize_i64(*value),
            Self::Real(value) => serializer.serialize_f64(*value),
            Self::Text(value) => serializer.serialize_str(value),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<StoredFilename> for AttributeValue {
    fn from(value: StoredFilename) -> Self {
        Self::Text(value.into_inner())
    }
}

impl From<PendingUpload> for AttributeValue {
    fn from(value: PendingUpload) -> Self {
        Self::Upload(value)
    }
}

fn default_image_attributes() -> Vec<String> {
    vec!["image".to_string()]
}

/// A kind of persisted record that may own image attachments.
#[derive(Clone, Debug, Deserialize)]
pub struct EntityType {
    /// Table name; also the directory name under the storage root.
    pub name: String,

    /// Name the form layer groups this type's fields under (`Post[image]`).
    pub form_name: String,

    #[serde(default = "VariantCatalog::standard")]
    pub variants: VariantCatalog,

    /// Attributes that hold a stored image filename.
    #[serde(default = "default_image_attributes")]
    pub image_attributes: Vec<String>,

    /// Attributes accepted from incoming values. `None` allows every
    /// non-primary-key column.
    #[serde(default)]
    pub writable: Option<BTreeSet<String>>,

    /// Attributes whose text is HTML-escaped on assignment.
    #[serde(default)]
    pub escaped: BTreeSet<String>,

    /// Filled from schema introspection at startup.
    #[serde(skip)]
    pub columns: Vec<ColumnMeta>,
}

impl EntityType {
    pub fn new(name: impl Into<String>, form_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            form_name: form_name.into(),
            variants: VariantCatalog::standard(),
            image_attributes: default_image_attributes(),
            writable: None,
            escaped: BTreeSet::new(),
            columns: Vec::new(),
        }
    }

    pub fn with_variants(mut self, variants: VariantCatalog) -> Self {
        self.variants = variants;
        self
    }

    pub fn with_image_attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.image_attributes = attributes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_writable<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.writable = Some(attributes.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_escaped<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.escaped = attributes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_columns(mut self, columns: Vec<ColumnMeta>) -> Self {
        self.columns = columns;
        self
    }

    pub fn column(&self, name: &str) -> Option<&ColumnMeta> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub fn is_writable(&self, attribute: &str) -> bool {
        match &self.writable {
            Some(writable) => writable.contains(attribute),
            None => self
                .column(attribute)
                .is_some_and(|column| !column.primary_key),
        }
    }

    pub fn is_image_attribute(&self, attribute: &str) -> bool {
        self.image_attributes.iter().any(|name| name == attribute)
    }
}

/// One record of an [`EntityType`], with its prior committed values.
#[derive(Clone, Debug)]
pub struct Entity {
    pub entity_type: Arc<EntityType>,
    pub id: Option<i64>,
    attributes: BTreeMap<String, AttributeValue>,
    /// `None` until the record has been committed once.
    old_attributes: Option<BTreeMap<String, AttributeValue>>,
}

impl Entity {
    /// A record that has never been persisted.
    pub fn new(entity_type: Arc<EntityType>) -> Self {
        Self {
            entity_type,
            id: None,
            attributes: BTreeMap::new(),
            old_attributes: None,
        }
    }

    /// A record loaded from storage; current and prior values start equal.
    pub fn loaded(
        entity_type: Arc<EntityType>,
        id: i64,
        attributes: BTreeMap<String, AttributeValue>,
    ) -> Self {
        Self {
            entity_type,
            id: Some(id),
            old_attributes: Some(attributes.clone()),
            attributes,
        }
    }

    pub fn is_new_record(&self) -> bool {
        self.old_attributes.is_none()
    }

    pub fn get(&self, attribute: &str) -> Option<&AttributeValue> {
        self.attributes.get(attribute)
    }

    pub fn set(&mut self, attribute: impl Into<String>, value: impl Into<AttributeValue>) {
        self.attributes.insert(attribute.into(), value.into());
    }

    /// Prior committed value, `None` for new records or unknown attributes.
    pub fn old(&self, attribute: &str) -> Option<&AttributeValue> {
        self.old_attributes.as_ref()?.get(attribute)
    }

    pub fn attributes(&self) -> &BTreeMap<String, AttributeValue> {
        &self.attributes
    }

    /// Non-empty stored filename currently held by `attribute`.
    pub fn stored_filename(&self, attribute: &str) -> Option<&str> {
        self.get(attribute)
            .and_then(AttributeValue::as_text)
            .filter(|name| !name.is_empty())
    }

    /// Non-empty stored filename `attribute` held before this save.
    pub fn old_stored_filename(&self, attribute: &str) -> Option<&str> {
        self.old(attribute)
            .and_then(AttributeValue::as_text)
            .filter(|name| !name.is_empty())
    }

    /// Record a successful commit: current values become the prior ones.
    pub fn mark_committed(&mut self, id: i64) {
        self.id = Some(id);
        self.old_attributes = Some(self.attributes.clone());
    }
}
