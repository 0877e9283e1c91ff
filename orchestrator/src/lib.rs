//! Ark Orchestrator Library
//!
//! Product catalog, mesh device directory and the CI-driven deployment
//! registry behind the Ark admin API.

pub mod app;
pub mod catalog;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod http;
pub mod jobs;
pub mod logs;
pub mod mesh;
pub mod models;
pub mod server;
pub mod storage;
pub mod utils;
pub mod workers;
