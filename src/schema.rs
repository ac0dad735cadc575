//! Schema model: a navigable tree built from a native per-model field description.

pub mod model;
pub mod native;
pub mod node;
pub mod stack;

pub use model::{
    CONTENT_FIELD, ID_FIELD, ModelSchema, PARENT_FIELD, PARENT_ID_FIELD, SchemaRegistry,
};
pub use native::{NativeField, NativeModel, NativePath, NativeSchema, NativeType};
pub use node::{Fields, Leaf, SchemaNode};
pub use stack::{Stack, StackEntry};
