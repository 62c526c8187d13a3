//! Streams stored image files back to clients.

use crate::{
    errors::AppError,
    models::{upload::StoredFilename, variant::is_safe_segment},
    state::AppState,
};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{HeaderValue, StatusCode, header},
    response::Response,
};
use std::io;
use tokio::fs::File;
use tokio_util::io::ReaderStream;

/// `GET /images/{entity}/{variant}/{file}`
pub async fn get_variant_image(
    State(state): State<AppState>,
    Path((entity_type, variant, file)): Path<(String, String, String)>,
) -> Result<Response, AppError> {
    serve(&state, &entity_type, Some(&variant), &file).await
}

/// `GET /images/{entity}/{file}`, for types without variants.
pub async fn get_image(
    State(state): State<AppState>,
    Path((entity_type, file)): Path<(String, String)>,
) -> Result<Response, AppError> {
    serve(&state, &entity_type, None, &file).await
}

async fn serve(
    state: &AppState,
    entity_type: &str,
    variant: Option<&str>,
    file: &str,
) -> Result<Response, AppError> {
    let entity_type = state.repository.entity_type(entity_type)?;
    let variant_known = match variant {
        Some(name) => is_safe_segment(name) && entity_type.variants.get(name).is_some(),
        None => entity_type.variants.is_empty(),
    };
    if !variant_known || !StoredFilename::is_single_segment(file) {
        return Err(AppError::not_found("image not found"));
    }

    let path = state.paths.path_for(&entity_type, variant, file);
    let handle = match File::open(&path).await {
        Ok(handle) => handle,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Err(AppError::not_found("image not found"));
        }
        Err(err) => return Err(err.into()),
    };
    let size = handle.metadata().await?.len();

    let content_type = mime_guess::from_path(file)
        .first()
        .map(|mime| mime.to_string())
        .unwrap_or_else(|| "application/octet-stream".to_string());

    let mut response = Response::new(Body::from_stream(ReaderStream::new(handle)));
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&content_type) {
        headers.insert(header::CONTENT_TYPE, value);
    }
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(size));
    Ok(response)
}
