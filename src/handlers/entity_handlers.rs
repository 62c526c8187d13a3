//! HTTP handlers for entity create, read, update and delete.
//!
//! Request bodies are multipart forms; uploads are spooled to the temp
//! directory and removed once the request has been handled.

use crate::{
    errors::AppError,
    handlers::form::read_form,
    models::entity::{AttributeValue, Entity},
    services::{assignment::assign, storage_paths::StoragePaths},
    state::AppState,
};
use axum::{
    Json,
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::info;

/// JSON view of an entity. `images` maps each stored image attribute to its
/// variant URLs, or to a single URL when the type has no variants.
#[derive(Debug, Serialize)]
pub struct EntityResponse {
    pub id: Option<i64>,
    pub attributes: BTreeMap<String, AttributeValue>,
    pub images: Map<String, Value>,
}

impl EntityResponse {
    pub fn from_entity(entity: &Entity, paths: &StoragePaths) -> Self {
        let entity_type = &entity.entity_type;
        let mut images = Map::new();

        for attribute in &entity_type.image_attributes {
            let Some(filename) = entity.stored_filename(attribute) else {
                continue;
            };
            let urls = if entity_type.variants.is_empty() {
                Value::String(paths.url_for(entity_type, None, filename))
            } else {
                Value::Object(
                    entity_type
                        .variants
                        .names()
                        .map(|variant| {
                            let url = paths.url_for(entity_type, Some(variant), filename);
                            (variant.to_string(), Value::String(url))
                        })
                        .collect(),
                )
            };
            images.insert(attribute.clone(), urls);
        }

        Self {
            id: entity.id,
            attributes: entity.attributes().clone(),
            images,
        }
    }
}

/// `POST /{entity}`
pub async fn create_entity(
    State(state): State<AppState>,
    Path(entity_type): Path<String>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let entity_type = state.repository.entity_type(&entity_type)?;
    let incoming = read_form(
        multipart,
        &entity_type.form_name,
        &state.upload_tmp_dir,
        state.max_upload_bytes,
    )
    .await?;

    let mut entity = Entity::new(entity_type);
    assign(&mut entity, &incoming);
    let saved = state.repository.save(&mut entity).await;
    incoming.cleanup().await;
    saved?;

    info!(entity_type = %entity.entity_type.name, id = ?entity.id, "created entity");
    Ok((
        StatusCode::CREATED,
        Json(EntityResponse::from_entity(&entity, &state.paths)),
    ))
}

/// `GET /{entity}/{id}`
pub async fn get_entity(
    State(state): State<AppState>,
    Path((entity_type, id)): Path<(String, i64)>,
) -> Result<Json<EntityResponse>, AppError> {
    let entity_type = state.repository.entity_type(&entity_type)?;
    let entity = state.repository.find(&entity_type, id).await?;
    Ok(Json(EntityResponse::from_entity(&entity, &state.paths)))
}

/// `POST /{entity}/{id}`
pub async fn update_entity(
    State(state): State<AppState>,
    Path((entity_type, id)): Path<(String, i64)>,
    multipart: Multipart,
) -> Result<Json<EntityResponse>, AppError> {
    let entity_type = state.repository.entity_type(&entity_type)?;
    let mut entity = state.repository.find(&entity_type, id).await?;
    let incoming = read_form(
        multipart,
        &entity_type.form_name,
        &state.upload_tmp_dir,
        state.max_upload_bytes,
    )
    .await?;

    assign(&mut entity, &incoming);
    let saved = state.repository.save(&mut entity).await;
    incoming.cleanup().await;
    saved?;

    Ok(Json(EntityResponse::from_entity(&entity, &state.paths)))
}

/// `DELETE /{entity}/{id}`
pub async fn delete_entity(
    State(state): State<AppState>,
    Path((entity_type, id)): Path<(String, i64)>,
) -> Result<StatusCode, AppError> {
    let entity_type = state.repository.entity_type(&entity_type)?;
    let entity = state.repository.find(&entity_type, id).await?;
    state.repository.delete(&entity).await?;
    Ok(StatusCode::NO_CONTENT)
}
