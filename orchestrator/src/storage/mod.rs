//! Persistent state and settings

pub mod layout;
pub mod routes;
pub mod settings;
pub mod ssh_users;
