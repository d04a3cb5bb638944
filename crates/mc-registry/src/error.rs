//! Registry load and validation errors. All of these are fatal at boot.

use mc_core::CatalogError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to read registry document {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse registry document: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("duplicate {section} key {key} while merging includes")]
    DuplicateInclude { section: &'static str, key: String },

    #[error("unresolved reference: {0}")]
    Reference(String),

    #[error("aspect kind mismatch: {0}")]
    KindMismatch(String),

    #[error("invalid urn template for entity {entity}: {source}")]
    Template {
        entity: String,
        #[source]
        source: mc_urn::TemplateError,
    },
}

impl From<RegistryError> for CatalogError {
    fn from(err: RegistryError) -> Self {
        CatalogError::Registry(err.to_string())
    }
}
