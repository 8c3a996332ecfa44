use std::fs;
use std::path::PathBuf;

use tenancy_model::Resource;
use tracing::debug;

use crate::error::Result;

/// Declarative set of baseline resources every new tenant receives.
pub trait ResourceDefinitionSource: Send + Sync {
    /// Label used in logs.
    fn name(&self) -> String;

    /// May block; callers run it on the blocking pool.
    fn get(&self) -> Result<Vec<Resource>>;
}

/// Definitions held in memory.
#[derive(Debug, Clone, Default)]
pub struct StaticDefinitions {
    name: String,
    resources: Vec<Resource>,
}

impl StaticDefinitions {
    pub fn new(name: impl Into<String>, resources: Vec<Resource>) -> Self {
        Self {
            name: name.into(),
            resources,
        }
    }
}

impl ResourceDefinitionSource for StaticDefinitions {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn get(&self) -> Result<Vec<Resource>> {
        Ok(self.resources.clone())
    }
}

/// Definitions read from a JSON file holding an array of resources, e.g.
///
/// ```json
/// [{ "kind": "provider", "spec": { "name": "infra_onboarding", "vendor": "baremetal" } }]
/// ```
///
/// The file is re-read on every call so edits apply to the next tenant.
#[derive(Debug, Clone)]
pub struct JsonFileDefinitions {
    path: PathBuf,
}

impl JsonFileDefinitions {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ResourceDefinitionSource for JsonFileDefinitions {
    fn name(&self) -> String {
        self.path.display().to_string()
    }

    fn get(&self) -> Result<Vec<Resource>> {
        let raw = fs::read_to_string(&self.path)?;
        let resources: Vec<Resource> = serde_json::from_str(&raw)?;
        debug!(
            target: "tenancy::initialization",
            path = %self.path.display(),
            count = resources.len(),
            "loaded resource definitions"
        );
        Ok(resources)
    }
}
