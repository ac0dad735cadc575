//! Lowers relational requests into ordered native pipeline stages.

pub mod compiler;
pub mod filter;
pub mod group;
pub mod joints;
pub mod projection;
pub mod reparent;
pub mod stage;

pub use compiler::PipelineCompiler;
pub use stage::{
    INDEX_FIELD, MAX_FIELDS_PER_STAGE, PipelineStage, RECORD_DOES_NOT_EXIST, STRING_PREFIX, VERSION_FIELD,
    to_documents,
};
