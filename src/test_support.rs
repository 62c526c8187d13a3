//! Fixtures shared by unit tests.

use bytes::Bytes;
use image::{ImageFormat, Rgba, RgbaImage};
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use std::io::Cursor;

/// A solid-colour PNG of the given size.
pub fn png_bytes(width: u32, height: u32) -> Bytes {
    let image = RgbaImage::from_pixel(width, height, Rgba([200, 40, 40, 255]));
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, ImageFormat::Png).unwrap();
    Bytes::from(out.into_inner())
}

/// In-memory database with the application schema applied.
///
/// A single never-recycled connection keeps the in-memory database alive
/// for the whole test.
pub async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    crate::db::apply_sql(&pool, include_str!("../migrations/0001_init.sql"))
        .await
        .unwrap();
    pool
}
