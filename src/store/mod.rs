//! Persistence layer: libSQL-backed catalog storage.

pub mod catalog_store;
pub mod migrations;

pub use catalog_store::CatalogStore;
