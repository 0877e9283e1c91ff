//! Ark orchestrator HTTP API models

pub mod models;
