use std::fmt;

use chrono::{DateTime, Utc};

use crate::ids::ProjectId;

/// Runtime view of a project hosted by the external datamodel.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Project {
    pub uid: ProjectId,
    pub name: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub deletion_requested: bool,
}

impl Project {
    pub fn new(uid: ProjectId, name: impl Into<String>) -> Self {
        Self {
            uid,
            name: name.into(),
            deletion_requested: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum WatcherStatus {
    #[default]
    InProgress,
    Idle,
    Error,
}

impl fmt::Display for WatcherStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            WatcherStatus::InProgress => "in-progress",
            WatcherStatus::Idle => "idle",
            WatcherStatus::Error => "error",
        };
        f.write_str(label)
    }
}

/// Marker registered on a project to mirror this controller's progress to
/// the upstream orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ActiveWatcher {
    pub project_id: ProjectId,
    pub owner: String,
    pub status: WatcherStatus,
    pub message: String,
    pub updated_at: DateTime<Utc>,
}

impl ActiveWatcher {
    pub fn new(project_id: ProjectId, owner: impl Into<String>) -> Self {
        Self {
            project_id,
            owner: owner.into(),
            status: WatcherStatus::InProgress,
            message: String::new(),
            updated_at: Utc::now(),
        }
    }

    pub fn set_status(&mut self, status: WatcherStatus, message: impl Into<String>) {
        self.status = status;
        self.message = message.into();
        self.updated_at = Utc::now();
    }

    pub fn is_idle(&self) -> bool {
        self.status == WatcherStatus::Idle
    }
}
