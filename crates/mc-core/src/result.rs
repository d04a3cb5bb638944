//! Result alias used across the catalog crates.

use crate::error::CatalogError;

pub type CatalogResult<T> = Result<T, CatalogError>;
