//! Deployment module

pub mod fsm;
pub mod registry;
