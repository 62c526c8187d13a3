//! Attachment lifecycle services and the persistence layer that drives them.

pub mod assignment;
pub mod attachment_writer;
pub mod entity_registry;
pub mod entity_repository;
pub mod lifecycle;
pub mod render_engine;
pub mod sanitizer;
pub mod storage_paths;
pub mod upload_detector;
