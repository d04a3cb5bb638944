//! # mc-urn
//!
//! URN template compilation for Metacat.
//!
//! Each entity type in the registry declares a URN template such as
//! `urn:li:dataset:(urn:li:dataPlatform:{platform},{name},{env})`. This
//! crate compiles the template once at boot into a [`UrnTemplate`] that
//! builds URNs from caller-supplied parameters, and parses URNs back into
//! parameters where the template is unambiguous.

pub mod escape;
pub mod template;

pub use escape::{escape_value, unescape_value};
pub use template::{TemplateError, UrnBuildError, UrnTemplate};
