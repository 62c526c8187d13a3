//! Image attachments for database-backed entities.
//!
//! Uploaded images are stored once per configured variant under
//! `{storage_dir}/{entity}/{variant}/{filename}` and kept in step with the
//! owning record: replaced on update, removed on delete.

pub mod config;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;

#[cfg(test)]
mod test_support;
