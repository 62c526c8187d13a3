//! Applies submitted values to an entity before it is saved.

use crate::{
    models::{
        entity::{AttributeValue, Entity},
        upload::IncomingValues,
    },
    services::{
        sanitizer::{purge_xss, sanitize},
        upload_detector::detect,
    },
};
use tracing::debug;

/// Assign writable plain values (escaped and sanitized), then overlay every
/// detected upload as a pending value. Plain values for image attributes are
/// dropped.
pub fn assign(entity: &mut Entity, incoming: &IncomingValues) {
    let entity_type = entity.entity_type.clone();

    for (attribute, raw) in &incoming.values {
        if !entity_type.is_writable(attribute) {
            debug!(entity_type = %entity_type.name, attribute = %attribute, "skipping non-writable attribute");
            continue;
        }
        // Image attributes only ever change through a detected upload.
        if entity_type.is_image_attribute(attribute) {
            debug!(entity_type = %entity_type.name, attribute = %attribute, "ignoring plain value for image attribute");
            continue;
        }

        let text = if entity_type.escaped.contains(attribute) {
            purge_xss(raw)
        } else {
            raw.clone()
        };
        let value = sanitize(&entity_type, attribute, AttributeValue::Text(text));
        if raw.is_empty() && !matches!(value, AttributeValue::Text(_)) {
            debug!(attribute = %attribute, value = ?value, "replaced empty value for non-nullable column");
        }
        entity.set(attribute.clone(), value);
    }

    for (attribute, upload) in detect(entity, incoming) {
        entity.set(attribute, upload);
    }
}
