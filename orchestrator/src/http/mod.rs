//! Upstream HTTP clients

pub mod client;
pub mod jenkins;
pub mod proxy;
pub mod tailscale;

pub use client::{BasicAuth, HttpClient};
pub use proxy::{InstanceProxy, ProxyOptions};
