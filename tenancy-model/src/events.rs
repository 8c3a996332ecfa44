use std::fmt;

use crate::ids::{ResourceId, TenantId};
use crate::kind::ResourceKind;
use crate::resource::Resource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum EventKind {
    Created,
    Updated,
    Deleted,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EventKind::Created => "created",
            EventKind::Updated => "updated",
            EventKind::Deleted => "deleted",
        };
        f.write_str(label)
    }
}

/// Change notification emitted by the inventory for every mutation.
///
/// `resource` carries the post-mutation snapshot when the inventory provides
/// one (the pre-deletion snapshot for `Deleted`).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InventoryEvent {
    pub kind: EventKind,
    pub resource_kind: ResourceKind,
    pub tenant_id: TenantId,
    pub resource_id: ResourceId,
    #[cfg_attr(feature = "serde", serde(default))]
    pub resource: Option<Resource>,
}

impl InventoryEvent {
    pub fn new(
        kind: EventKind,
        tenant_id: TenantId,
        resource_id: ResourceId,
        resource_kind: ResourceKind,
    ) -> Self {
        Self {
            kind,
            resource_kind,
            tenant_id,
            resource_id,
            resource: None,
        }
    }

    pub fn for_resource(kind: EventKind, tenant_id: TenantId, resource: &Resource) -> Option<Self> {
        let resource_id = resource.resource_id.clone()?;
        Some(Self {
            kind,
            resource_kind: resource.kind(),
            tenant_id,
            resource_id,
            resource: Some(resource.clone()),
        })
    }

    pub fn concerns(&self, tenant_id: TenantId, kinds: &[ResourceKind]) -> bool {
        self.tenant_id == tenant_id && kinds.contains(&self.resource_kind)
    }
}
