//! # mc-api
//!
//! The HTTP surface of Metacat. Handlers are thin: they look up a
//! synthesized operation in the catalog and invoke it; all semantics live
//! in the core. Errors map onto status codes with a JSON body carrying the
//! error kind, message, correlation id, and transient flag.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use routes::router;
pub use state::AppState;
