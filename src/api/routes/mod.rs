//! HTTP handlers for the read-only query API

pub mod alerts;
pub mod components;
pub mod health;
pub mod index;
pub mod metrics;
pub mod status;
