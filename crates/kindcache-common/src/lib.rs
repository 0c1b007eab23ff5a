//! kindcache Common - Shared types and utilities
//!
//! This crate provides the identifiers, error definitions and configuration
//! types used across all kindcache components.

pub mod config;
pub mod error;
pub mod types;

pub use config::CacheConfig;
pub use error::{Error, Result};
pub use types::*;
