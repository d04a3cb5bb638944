//! Rule evaluation errors. These roll back the surrounding transaction.

use mc_core::CatalogError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("invalid projection path {path}: {message}")]
    BadPath { path: String, message: String },

    #[error("projection {path} expected {expected}, found {found}")]
    TypeError {
        path: String,
        expected: &'static str,
        found: String,
    },

    #[error("rule {rule} failed: {message}")]
    Evaluation { rule: String, message: String },
}

impl From<RuleError> for CatalogError {
    fn from(err: RuleError) -> Self {
        let rule = match &err {
            RuleError::Evaluation { rule, .. } => rule.clone(),
            _ => "projection".to_string(),
        };
        CatalogError::RuleEvaluation { rule, message: err.to_string() }
    }
}
