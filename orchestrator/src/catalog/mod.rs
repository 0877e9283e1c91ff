//! Product catalog

pub mod store;
pub mod validation;

pub use store::ProductCatalog;
