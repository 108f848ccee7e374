//! # Mealwise Common Library
//!
//! Shared code for the Mealwise service crates:
//! - Bootstrap configuration loading
//! - Database initialization and versioned schema migrations
//! - Password hashing and opaque session tokens
//! - SSE event envelopes for streamed extraction progress

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod sse;

pub use error::{Error, Result};
