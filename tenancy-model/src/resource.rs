use chrono::{DateTime, Utc};

use crate::error::ModelError;
use crate::ids::{ResourceId, TenantId};
use crate::kind::ResourceKind;
use crate::tenant::{LifecycleState, Tenant};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Provider {
    pub name: String,
    pub vendor: String,
    pub api_endpoint: String,
    pub api_credentials: Vec<String>,
    pub config: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum TelemetryKind {
    #[default]
    Logs,
    Metrics,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TelemetryGroup {
    pub name: String,
    pub kind: TelemetryKind,
    pub collector: String,
    pub groups: Vec<String>,
    /// Back-reference maintained by the inventory.
    pub profiles: Vec<ResourceId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TelemetryProfile {
    pub group: String,
    pub target: Option<ResourceId>,
    pub log_level: Option<String>,
    pub metrics_interval_secs: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SingleSchedule {
    pub name: String,
    pub status: String,
    pub start_seconds: u64,
    pub end_seconds: Option<u64>,
    pub target: Option<ResourceId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RepeatedSchedule {
    pub name: String,
    pub status: String,
    pub duration_seconds: u32,
    pub cron_minutes: String,
    pub cron_hours: String,
    pub cron_day_month: String,
    pub cron_month: String,
    pub cron_day_week: String,
    pub target: Option<ResourceId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Workload {
    pub name: String,
    pub kind: String,
    pub status: String,
    /// Back-reference maintained by the inventory.
    pub members: Vec<ResourceId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct WorkloadMember {
    pub kind: String,
    pub workload: Option<ResourceId>,
    pub instance: Option<ResourceId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Instance {
    pub name: String,
    pub kind: String,
    pub host: Option<ResourceId>,
    pub os: Option<ResourceId>,
    pub desired_state: LifecycleState,
    pub current_state: LifecycleState,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Host {
    pub name: String,
    pub serial_number: String,
    pub site: Option<ResourceId>,
    pub desired_state: LifecycleState,
    pub current_state: LifecycleState,
    /// Back-reference maintained by the inventory.
    pub instances: Vec<ResourceId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct OperatingSystem {
    pub name: String,
    pub profile_name: String,
    pub image_url: String,
    pub sha256: String,
    pub security_feature: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Endpoint {
    pub name: String,
    pub host: Option<ResourceId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct NetworkSegment {
    pub name: String,
    pub vlan_id: u32,
    pub site: Option<ResourceId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Site {
    pub name: String,
    pub region: Option<ResourceId>,
    pub address: String,
    /// Back-reference maintained by the inventory.
    pub hosts: Vec<ResourceId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Region {
    pub name: String,
    pub parent: Option<ResourceId>,
    pub metadata: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct OrganizationalUnit {
    pub name: String,
    pub kind: String,
    pub parent: Option<ResourceId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct LocalAccount {
    pub username: String,
    pub ssh_key: String,
}

/// The typed payload of a [`Resource`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(tag = "kind", content = "spec", rename_all = "snake_case")
)]
pub enum ResourceBody {
    Tenant(Tenant),
    TelemetryProfile(TelemetryProfile),
    TelemetryGroup(TelemetryGroup),
    SingleSchedule(SingleSchedule),
    RepeatedSchedule(RepeatedSchedule),
    Workload(Workload),
    WorkloadMember(WorkloadMember),
    Instance(Instance),
    Host(Host),
    Os(OperatingSystem),
    Endpoint(Endpoint),
    NetworkSegment(NetworkSegment),
    Site(Site),
    Region(Region),
    Provider(Provider),
    Ou(OrganizationalUnit),
    LocalAccount(LocalAccount),
}

impl ResourceBody {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceBody::Tenant(_) => ResourceKind::Tenant,
            ResourceBody::TelemetryProfile(_) => ResourceKind::TelemetryProfile,
            ResourceBody::TelemetryGroup(_) => ResourceKind::TelemetryGroup,
            ResourceBody::SingleSchedule(_) => ResourceKind::SingleSchedule,
            ResourceBody::RepeatedSchedule(_) => ResourceKind::RepeatedSchedule,
            ResourceBody::Workload(_) => ResourceKind::Workload,
            ResourceBody::WorkloadMember(_) => ResourceKind::WorkloadMember,
            ResourceBody::Instance(_) => ResourceKind::Instance,
            ResourceBody::Host(_) => ResourceKind::Host,
            ResourceBody::Os(_) => ResourceKind::Os,
            ResourceBody::Endpoint(_) => ResourceKind::Endpoint,
            ResourceBody::NetworkSegment(_) => ResourceKind::NetworkSegment,
            ResourceBody::Site(_) => ResourceKind::Site,
            ResourceBody::Region(_) => ResourceKind::Region,
            ResourceBody::Provider(_) => ResourceKind::Provider,
            ResourceBody::Ou(_) => ResourceKind::Ou,
            ResourceBody::LocalAccount(_) => ResourceKind::LocalAccount,
        }
    }

    /// Copy of the body with identity fields and inventory-maintained
    /// back-references cleared, leaving only the declared content.
    pub fn normalized(&self) -> ResourceBody {
        let mut body = self.clone();
        match &mut body {
            ResourceBody::Tenant(tenant) => {
                tenant.tenant_id = TenantId(uuid::Uuid::nil());
                tenant.resource_id = None;
            }
            ResourceBody::TelemetryGroup(group) => group.profiles.clear(),
            ResourceBody::Workload(workload) => workload.members.clear(),
            ResourceBody::Host(host) => host.instances.clear(),
            ResourceBody::Site(site) => site.hosts.clear(),
            _ => {}
        }
        body
    }

    pub fn desired_state(&self) -> Option<LifecycleState> {
        match self {
            ResourceBody::Tenant(tenant) => Some(tenant.desired_state),
            ResourceBody::Instance(instance) => Some(instance.desired_state),
            ResourceBody::Host(host) => Some(host.desired_state),
            _ => None,
        }
    }

    /// Sets the desired state on lifecycle-bearing bodies. Returns false for
    /// kinds without a lifecycle.
    pub fn set_desired_state(&mut self, state: LifecycleState) -> bool {
        match self {
            ResourceBody::Tenant(tenant) => tenant.desired_state = state,
            ResourceBody::Instance(instance) => instance.desired_state = state,
            ResourceBody::Host(host) => host.desired_state = state,
            _ => return false,
        }
        true
    }
}

/// Generic inventory envelope wrapping exactly one typed resource.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Resource {
    #[cfg_attr(feature = "serde", serde(default))]
    pub resource_id: Option<ResourceId>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub tenant_id: Option<TenantId>,
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub body: ResourceBody,
    #[cfg_attr(feature = "serde", serde(default))]
    pub created_at: Option<DateTime<Utc>>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Resource {
    pub fn new(body: ResourceBody) -> Self {
        Self {
            resource_id: None,
            tenant_id: None,
            body,
            created_at: None,
            updated_at: None,
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.body.kind()
    }

    /// Stamps the envelope (and a typed tenant body) with `tenant_id`.
    pub fn with_tenant(mut self, tenant_id: TenantId) -> Self {
        self.tenant_id = Some(tenant_id);
        if let ResourceBody::Tenant(tenant) = &mut self.body {
            tenant.tenant_id = tenant_id;
        }
        self
    }

    pub fn with_resource_id(mut self, resource_id: ResourceId) -> Self {
        if let ResourceBody::Tenant(tenant) = &mut self.body {
            tenant.resource_id = Some(resource_id.clone());
        }
        self.resource_id = Some(resource_id);
        self
    }

    pub fn as_tenant(&self) -> Option<&Tenant> {
        match &self.body {
            ResourceBody::Tenant(tenant) => Some(tenant),
            _ => None,
        }
    }

    pub fn into_tenant(self) -> Result<Tenant, ModelError> {
        let kind = self.kind();
        match self.body {
            ResourceBody::Tenant(mut tenant) => {
                if tenant.resource_id.is_none() {
                    tenant.resource_id = self.resource_id;
                }
                Ok(tenant)
            }
            _ => Err(ModelError::KindMismatch {
                expected: ResourceKind::Tenant,
                actual: kind,
            }),
        }
    }
}

impl From<Tenant> for Resource {
    fn from(tenant: Tenant) -> Self {
        let tenant_id = tenant.tenant_id;
        let resource_id = tenant.resource_id.clone();
        Resource {
            resource_id,
            tenant_id: Some(tenant_id),
            body: ResourceBody::Tenant(tenant),
            created_at: None,
            updated_at: None,
        }
    }
}
