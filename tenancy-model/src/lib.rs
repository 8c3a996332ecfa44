//! Core data model definitions shared across the tenancy crates.
#![allow(missing_docs)]

pub mod error;
pub mod events;
pub mod ids;
pub mod kind;
pub mod project;
pub mod resource;
pub mod tenant;

// Intentionally curated re-exports for downstream consumers.
pub use error::{ModelError, Result as ModelResult};
pub use events::{EventKind, InventoryEvent};
pub use ids::{ProjectId, ResourceId, TenantId};
pub use kind::ResourceKind;
pub use project::{ActiveWatcher, Project, WatcherStatus};
pub use resource::{
    Endpoint, Host, Instance, LocalAccount, NetworkSegment, OperatingSystem,
    OrganizationalUnit, Provider, Region, RepeatedSchedule, Resource, ResourceBody,
    SingleSchedule, Site, TelemetryGroup, TelemetryKind, TelemetryProfile, Workload,
    WorkloadMember,
};
pub use tenant::{LifecycleState, Tenant};
