//! # mc-registry
//!
//! The declarative Registry that drives the whole catalog: entity types,
//! aspect types, URN construction rules, relationship rules, and lineage
//! transformation templates.
//!
//! A registry document is loaded once at boot, validated in full, and then
//! shared read-only (`Arc<Registry>`) across every component. Partial or
//! invalid registries are never exposed: any validation failure fails the
//! load.

pub mod error;
pub mod loader;
pub mod model;
pub mod validate;

pub use error::RegistryError;
pub use loader::{EntityType, Registry};
pub use model::*;
pub use validate::{validate_aspect_write, ValidationError};
