//! WNS feed sync: Betradar lottery feed client.

pub mod config;
pub mod delivery;
pub mod diagnostics;
pub mod document;
pub mod engine;
pub mod envelope;
pub mod error;
