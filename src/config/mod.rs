//! Configuration and shared types
//!
//! Error types and the JSON-loaded deployment settings.

pub mod settings;
pub mod types;
