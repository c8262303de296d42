//! Shared type definitions for the ExpoBuild admin platform
//!
//! `core` holds the notification engine's data model; `api` holds the admin
//! endpoint's request and response bodies.

pub mod api;
pub mod core;

pub use self::api::*;
pub use self::core::*;
