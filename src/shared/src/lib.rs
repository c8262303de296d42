//! Shared types for the ExpoBuild admin platform

pub mod types;

pub use types::*;
