//! Shared application state handed to every handler.

use std::sync::Arc;

use mc_services::OperationCatalog;

#[derive(Clone)]
pub struct AppState {
    catalog: Arc<OperationCatalog>,
}

impl AppState {
    pub fn new(catalog: Arc<OperationCatalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &OperationCatalog {
        &self.catalog
    }
}
