//! # mc-core
//!
//! Core types, errors, and configuration for Metacat.
//!
//! This crate provides the foundational building blocks used across all
//! other crates:
//! - The catalog-wide error type and result alias
//! - Shared value types (URNs, aspect kinds, parameter maps)
//! - Correlation ids for log cross-referencing
//! - Configuration types and loading

pub mod config;
pub mod error;
pub mod result;
pub mod types;

pub use error::*;
pub use result::*;
pub use types::*;
