//! Error types shared across the gateway.

pub mod types;
