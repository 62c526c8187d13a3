//! Picks pending uploads out of incoming values and names stored files.

use crate::models::{
    entity::Entity,
    upload::{IncomingValues, PendingUpload, StoredFilename},
};
use std::collections::BTreeMap;
use tracing::debug;
use uuid::Uuid;

const SLUG_SEPARATOR: char = '_';

/// Uploads addressed to `entity`, keyed by attribute.
///
/// Only files posted under the entity type's form name count, and only for
/// attributes that are both writable and declared image attributes.
pub fn detect(entity: &Entity, incoming: &IncomingValues) -> BTreeMap<String, PendingUpload> {
    let entity_type = &entity.entity_type;
    let Some(files) = incoming.uploads_for(&entity_type.form_name) else {
        return BTreeMap::new();
    };

    files
        .iter()
        .filter(|(attribute, _)| {
            let accepted =
                entity_type.is_writable(attribute) && entity_type.is_image_attribute(attribute);
            if !accepted {
                debug!(
                    entity_type = %entity_type.name,
                    attribute = %attribute,
                    "ignoring upload for attribute"
                );
            }
            accepted
        })
        .map(|(attribute, upload)| (attribute.clone(), upload.clone()))
        .collect()
}

/// Unique, single-segment filename for an upload:
/// `{uuid}_{slug(base name)}.{slug(extension)}`.
pub fn generate_name(upload: &PendingUpload) -> StoredFilename {
    let mut name = Uuid::new_v4().simple().to_string();

    let slug = slugify(upload.base_name(), SLUG_SEPARATOR);
    if !slug.is_empty() {
        name.push(SLUG_SEPARATOR);
        name.push_str(&slug);
    }

    let extension = slugify(&upload.extension, SLUG_SEPARATOR);
    if !extension.is_empty() {
        name.push('.');
        name.push_str(&extension);
    }

    StoredFilename::new(name)
}

/// Lowercase ASCII alphanumerics; every other run becomes one `separator`.
pub fn slugify(input: &str, separator: char) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_separator = false;

    for ch in input.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_separator && !slug.is_empty() {
                slug.push(separator);
            }
            pending_separator = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_separator = true;
        }
    }

    slug
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        column::{ColumnKind, ColumnMeta},
        entity::EntityType,
    };
    use std::{collections::HashSet, sync::Arc};

    fn post() -> Entity {
        let entity_type = EntityType::new("posts", "Post")
            .with_image_attributes(["image", "cover"])
            .with_writable(["title", "image"])
            .with_columns(vec![
                ColumnMeta::new("title", ColumnKind::Text),
                ColumnMeta::new("image", ColumnKind::Text),
                ColumnMeta::new("cover", ColumnKind::Text),
            ]);
        Entity::new(Arc::new(entity_type))
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Holiday Photo (1)", '_'), "holiday_photo_1");
        assert_eq!(slugify("--a--b--", '_'), "a_b");
        assert_eq!(slugify("Ünïcode", '-'), "n-code");
        assert_eq!(slugify("***", '_'), "");
    }

    #[test]
    fn test_generate_name_shape() {
        let upload = PendingUpload::new("/tmp/a", "My Cat.JPEG", 10);
        let name = generate_name(&upload);
        let (token, rest) = name.as_str().split_once('_').unwrap();

        assert_eq!(token.len(), 32);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(rest, "my_cat.jpeg");
    }

    #[test]
    fn test_generate_name_without_slug_or_extension() {
        let name = generate_name(&PendingUpload::new("/tmp/a", "???", 1));
        assert_eq!(name.as_str().len(), 32);

        let name = generate_name(&PendingUpload::new("/tmp/a", "notes", 1));
        assert!(name.as_str().ends_with("_notes"));
        assert!(!name.as_str().contains('.'));
    }

    #[test]
    fn test_generate_name_is_unique_and_path_safe() {
        let upload = PendingUpload::new("/tmp/a", "../../etc/pass wd.png", 1);
        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            let name = generate_name(&upload);
            assert!(StoredFilename::is_single_segment(name.as_str()));
            assert!(!name.as_str().contains(['/', '\\']));
            assert!(seen.insert(name));
        }
    }

    #[test]
    fn test_detect_filters_attributes_and_forms() {
        let entity = post();
        let incoming = IncomingValues::default()
            .with_value("title", "Hello")
            .with_file("Post", "image", PendingUpload::new("/tmp/1", "a.png", 1))
            .with_file("Post", "cover", PendingUpload::new("/tmp/2", "b.png", 1))
            .with_file("Post", "title", PendingUpload::new("/tmp/3", "c.png", 1))
            .with_file("Comment", "image", PendingUpload::new("/tmp/4", "d.png", 1));

        let detected = detect(&entity, &incoming);
        assert_eq!(detected.keys().collect::<Vec<_>>(), ["image"]);
        assert_eq!(detected["image"].name, "a.png");
    }

    #[test]
    fn test_detect_without_files() {
        let incoming = IncomingValues::default().with_value("image", "");
        assert!(detect(&post(), &incoming).is_empty());
    }
}
