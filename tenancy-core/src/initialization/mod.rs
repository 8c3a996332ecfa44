//! Idempotent tenant provisioning.

mod compare;
mod controller;
mod source;

pub use compare::resources_equivalent;
pub use controller::InitializationController;
pub use source::{JsonFileDefinitions, ResourceDefinitionSource, StaticDefinitions};
