//! Core data models for image attachments.
//!
//! Entity types describe where files live and which variants exist; entities
//! carry attribute values, including pending uploads between assignment and
//! save.

pub mod column;
pub mod entity;
pub mod upload;
pub mod variant;
