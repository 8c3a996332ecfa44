use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

use crate::error::ModelError;
use crate::kind::ResourceKind;

/// Strongly typed tenant identifier. Tenants are keyed by the UID of the
/// project they were created for, so the same value doubles as a [`ProjectId`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct TenantId(pub Uuid);

/// Reconciliation key for the external project datamodel.
pub type ProjectId = TenantId;

impl Default for TenantId {
    fn default() -> Self {
        Self::new()
    }
}

impl TenantId {
    pub fn new() -> Self {
        TenantId(Uuid::now_v7())
    }

    pub fn as_str(&self) -> String {
        self.0.to_string()
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    pub fn to_uuid(&self) -> Uuid {
        self.0
    }
}

impl AsRef<Uuid> for TenantId {
    fn as_ref(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for TenantId {
    fn from(value: Uuid) -> Self {
        TenantId(value)
    }
}

impl FromStr for TenantId {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(TenantId)
            .map_err(|err| ModelError::InvalidIdentifier(format!("{s}: {err}")))
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Inventory resource identifier in the `<prefix>-<8 hex digits>` form, e.g.
/// `host-1a2b3c4d`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct ResourceId(String);

impl ResourceId {
    /// Mints a fresh identifier for `kind`.
    pub fn generate(kind: ResourceKind) -> Self {
        let uuid = Uuid::new_v4().simple().to_string();
        ResourceId(format!("{}-{}", kind.id_prefix(), &uuid[..8]))
    }

    /// Parses an identifier, checking that the prefix names a known kind.
    pub fn parse(raw: impl Into<String>) -> Result<Self, ModelError> {
        let raw = raw.into();
        let Some((prefix, suffix)) = raw.split_once('-') else {
            return Err(ModelError::InvalidIdentifier(raw));
        };
        if ResourceKind::from_id_prefix(prefix).is_none()
            || suffix.len() != 8
            || !suffix.chars().all(|c| c.is_ascii_hexdigit())
        {
            return Err(ModelError::InvalidIdentifier(raw));
        }
        Ok(ResourceId(raw))
    }

    /// Kind encoded in the identifier prefix.
    pub fn kind(&self) -> Option<ResourceKind> {
        self.0
            .split_once('-')
            .and_then(|(prefix, _)| ResourceKind::from_id_prefix(prefix))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_round_trip_through_parse() {
        let id = ResourceId::generate(ResourceKind::Host);
        assert!(id.as_str().starts_with("host-"));
        let parsed = ResourceId::parse(id.as_str()).expect("generated id parses");
        assert_eq!(parsed, id);
        assert_eq!(parsed.kind(), Some(ResourceKind::Host));
    }

    #[test]
    fn parse_rejects_unknown_prefix_and_bad_suffix() {
        assert!(ResourceId::parse("bogus-12345678").is_err());
        assert!(ResourceId::parse("host-xyz").is_err());
        assert!(ResourceId::parse("host").is_err());
    }

    #[test]
    fn tenant_id_parses_uuid_strings() {
        let id = TenantId::new();
        let parsed: TenantId = id.as_str().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-a-uuid".parse::<TenantId>().is_err());
    }
}
