//! Defines routes for entity and image operations.
//!
//! ## Structure
//! - **Entity endpoints** (multipart bodies, fields named `Form[attribute]`)
//!   - `POST   /{entity}`      create
//!   - `GET    /{entity}/{id}` fetch
//!   - `POST   /{entity}/{id}` update
//!   - `DELETE /{entity}/{id}` delete, removing stored images
//!
//! - **Image endpoints**
//!   - `GET /images/{entity}/{variant}/{file}`
//!   - `GET /images/{entity}/{file}` for types without variants

use crate::{
    handlers::{
        entity_handlers::{create_entity, delete_entity, get_entity, update_entity},
        health_handlers::{healthz, readyz},
        image_handlers::{get_image, get_variant_image},
    },
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

/// Build the router. Request bodies may carry one full upload plus form
/// overhead, so the body limit is raised above `max_upload_bytes`.
pub fn routes(max_upload_bytes: u64) -> Router<AppState> {
    let body_limit = usize::try_from(max_upload_bytes)
        .unwrap_or(usize::MAX)
        .saturating_mul(4)
        .max(1024 * 1024);

    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // Image files
        .route("/images/{entity}/{variant}/{file}", get(get_variant_image))
        .route("/images/{entity}/{file}", get(get_image))
        // Entity routes
        .route(
            "/{entity}/{id}",
            get(get_entity).post(update_entity).delete(delete_entity),
        )
        .route("/{entity}", post(create_entity))
        .layer(DefaultBodyLimit::max(body_limit))
}
