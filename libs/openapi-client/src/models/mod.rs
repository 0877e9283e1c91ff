//! Upstream wire models
//!
//! Only the fields the orchestrator reads are modelled; everything else in the
//! upstream payloads is ignored by serde.

pub mod jenkins;
pub mod tailscale;
