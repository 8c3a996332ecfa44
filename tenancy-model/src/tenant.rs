use std::fmt;

use crate::error::ModelError;
use crate::ids::{ResourceId, TenantId};

/// Lifecycle state shared by every inventory record that is converged by an
/// owning resource manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum LifecycleState {
    #[default]
    Unspecified,
    Created,
    Deleted,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LifecycleState::Unspecified => "unspecified",
            LifecycleState::Created => "created",
            LifecycleState::Deleted => "deleted",
        };
        f.write_str(label)
    }
}

/// The inventory record representing a tenant.
///
/// `watcher_os_manager` is owned by the OS resource manager: it raises the
/// flag once it has provisioned its per-tenant resources and clears it after
/// cleaning them up on deletion.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Tenant {
    pub tenant_id: TenantId,
    #[cfg_attr(feature = "serde", serde(default))]
    pub resource_id: Option<ResourceId>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub current_state: LifecycleState,
    #[cfg_attr(feature = "serde", serde(default))]
    pub desired_state: LifecycleState,
    #[cfg_attr(feature = "serde", serde(default))]
    pub watcher_os_manager: bool,
}

impl Tenant {
    /// A new tenant record asking to be created.
    pub fn requested(tenant_id: TenantId) -> Self {
        Self {
            tenant_id,
            resource_id: None,
            current_state: LifecycleState::Unspecified,
            desired_state: LifecycleState::Created,
            watcher_os_manager: false,
        }
    }

    /// True while the record still asks for creation and has not been
    /// acknowledged as created.
    pub fn awaiting_creation(&self) -> bool {
        self.desired_state == LifecycleState::Created
            && self.current_state != LifecycleState::Created
    }

    pub fn is_created(&self) -> bool {
        self.current_state == LifecycleState::Created
    }

    /// Moves `current_state` to `target`. The current state only ever moves
    /// toward the desired state; anything else is rejected.
    pub fn advance_current_state(&mut self, target: LifecycleState) -> Result<bool, ModelError> {
        if self.current_state == target {
            return Ok(false);
        }
        if target != self.desired_state {
            return Err(ModelError::InvalidTransition {
                from: self.current_state,
                to: target,
                desired: self.desired_state,
            });
        }
        self.current_state = target;
        Ok(true)
    }
}
