//! # mc-services
//!
//! The operation layer of Metacat. At boot the synthesizer walks the
//! registry and emits a static table of operation descriptors, one
//! upsert/get/delete triplet per entity type and per aspect, each bound
//! to its validator, compiled URN template, writer call, and relationship
//! rules. Transport layers invoke operations from this table by name; no
//! per-request reflection happens anywhere.

pub mod catalog;
pub mod coordinator;
pub mod descriptor;
pub mod request;

pub use catalog::OperationCatalog;
pub use descriptor::{OpDescriptor, OpKind};
pub use request::{
    AspectView, CreatedRelationship, DeleteOutcome, EntityView, OpOutcome, OpRequest, OpResponse,
    TimeseriesView,
};
