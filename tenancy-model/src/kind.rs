use std::fmt;

/// Discriminator for the typed resource carried by a [`crate::Resource`]
/// envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ResourceKind {
    Tenant,
    TelemetryProfile,
    TelemetryGroup,
    SingleSchedule,
    RepeatedSchedule,
    Workload,
    WorkloadMember,
    Instance,
    Host,
    Os,
    Endpoint,
    NetworkSegment,
    Site,
    Region,
    Provider,
    Ou,
    LocalAccount,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 17] = [
        ResourceKind::Tenant,
        ResourceKind::TelemetryProfile,
        ResourceKind::TelemetryGroup,
        ResourceKind::SingleSchedule,
        ResourceKind::RepeatedSchedule,
        ResourceKind::Workload,
        ResourceKind::WorkloadMember,
        ResourceKind::Instance,
        ResourceKind::Host,
        ResourceKind::Os,
        ResourceKind::Endpoint,
        ResourceKind::NetworkSegment,
        ResourceKind::Site,
        ResourceKind::Region,
        ResourceKind::Provider,
        ResourceKind::Ou,
        ResourceKind::LocalAccount,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Tenant => "tenant",
            ResourceKind::TelemetryProfile => "telemetry_profile",
            ResourceKind::TelemetryGroup => "telemetry_group",
            ResourceKind::SingleSchedule => "single_schedule",
            ResourceKind::RepeatedSchedule => "repeated_schedule",
            ResourceKind::Workload => "workload",
            ResourceKind::WorkloadMember => "workload_member",
            ResourceKind::Instance => "instance",
            ResourceKind::Host => "host",
            ResourceKind::Os => "os",
            ResourceKind::Endpoint => "endpoint",
            ResourceKind::NetworkSegment => "network_segment",
            ResourceKind::Site => "site",
            ResourceKind::Region => "region",
            ResourceKind::Provider => "provider",
            ResourceKind::Ou => "ou",
            ResourceKind::LocalAccount => "local_account",
        }
    }

    /// Prefix used by inventory resource identifiers of this kind.
    pub fn id_prefix(self) -> &'static str {
        match self {
            ResourceKind::Tenant => "tenant",
            ResourceKind::TelemetryProfile => "telemetryprofile",
            ResourceKind::TelemetryGroup => "telemetrygroup",
            ResourceKind::SingleSchedule => "singlesche",
            ResourceKind::RepeatedSchedule => "repeatedsche",
            ResourceKind::Workload => "workload",
            ResourceKind::WorkloadMember => "workloadmember",
            ResourceKind::Instance => "inst",
            ResourceKind::Host => "host",
            ResourceKind::Os => "os",
            ResourceKind::Endpoint => "endpoint",
            ResourceKind::NetworkSegment => "netseg",
            ResourceKind::Site => "site",
            ResourceKind::Region => "region",
            ResourceKind::Provider => "provider",
            ResourceKind::Ou => "ou",
            ResourceKind::LocalAccount => "localaccount",
        }
    }

    pub fn from_id_prefix(prefix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.id_prefix() == prefix)
    }

    /// Kinds whose records carry a desired/current state pair and are
    /// converged by an owning resource manager.
    pub fn has_lifecycle(self) -> bool {
        matches!(
            self,
            ResourceKind::Tenant | ResourceKind::Instance | ResourceKind::Host
        )
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
