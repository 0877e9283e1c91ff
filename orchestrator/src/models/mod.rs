//! Domain models

pub mod device;
pub mod instance;
pub mod product;
