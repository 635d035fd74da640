//! Instance registry - identity, role, and liveness of running instances
//!
//! One shared document lists every instance spawned during a run. Entries
//! are appended at spawn time and mutated only by status updates; the list
//! is never pruned except by a full reset.

use chrono::{DateTime, Utc};
use docstore::{DocStore, Document};
use eyre::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Lifecycle status of a registered instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    Starting,
    Running,
    Stopped,
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Starting => write!(f, "starting"),
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Info about a running instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceInfo {
    pub instance_id: String,
    pub role: String,
    pub pid: u32,
    pub started_at: DateTime<Utc>,
    pub status: InstanceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_heartbeat: Option<DateTime<Utc>>,
}

impl InstanceInfo {
    /// New entry in the `starting` state with no heartbeat yet
    pub fn new(instance_id: impl Into<String>, role: impl Into<String>, pid: u32) -> Self {
        Self {
            instance_id: instance_id.into(),
            role: role.into(),
            pid,
            started_at: Utc::now(),
            status: InstanceStatus::Starting,
            last_heartbeat: None,
        }
    }
}

/// The shared registry document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryDoc {
    pub instances: Vec<InstanceInfo>,
}

impl Document for RegistryDoc {
    const KEY: &'static str = "instance_registry";
}

/// Shared instance registry
///
/// A malformed registry document reads as empty (fail-open), so a corrupted
/// file silently resets coordination state rather than wedging callers.
#[derive(Debug, Clone)]
pub struct InstanceRegistry {
    store: DocStore,
}

impl InstanceRegistry {
    pub fn new(store: DocStore) -> Self {
        Self { store }
    }

    /// Append a new instance entry.
    ///
    /// Duplicate instance ids are not rejected: re-registration appends a
    /// second entry rather than refreshing the first.
    pub fn register(&self, info: InstanceInfo) -> Result<()> {
        let mut doc: RegistryDoc = self.store.load()?;
        info!(instance_id = %info.instance_id, role = %info.role, pid = info.pid, "Registering instance");
        doc.instances.push(info);
        self.store.save(&doc)
    }

    /// Set an instance's status and refresh its heartbeat.
    ///
    /// Silently a no-op when the id is absent.
    pub fn update_status(&self, instance_id: &str, status: InstanceStatus) -> Result<()> {
        let mut doc: RegistryDoc = self.store.load()?;

        match doc.instances.iter_mut().find(|i| i.instance_id == instance_id) {
            Some(entry) => {
                debug!(%instance_id, %status, "Updating instance status");
                entry.status = status;
                entry.last_heartbeat = Some(Utc::now());
                self.store.save(&doc)
            }
            None => {
                debug!(%instance_id, "Status update for unknown instance, ignoring");
                Ok(())
            }
        }
    }

    /// Snapshot of all registered instances
    pub fn list(&self) -> Result<Vec<InstanceInfo>> {
        let doc: RegistryDoc = self.store.load()?;
        Ok(doc.instances)
    }

    /// Snapshot of every instance except the given one
    pub fn others(&self, instance_id: &str) -> Result<Vec<InstanceInfo>> {
        let doc: RegistryDoc = self.store.load()?;
        Ok(doc
            .instances
            .into_iter()
            .filter(|i| i.instance_id != instance_id)
            .collect())
    }

    /// Clear the registry. The only operation that removes entries.
    pub fn reset(&self) -> Result<()> {
        info!("Resetting instance registry");
        self.store.save(&RegistryDoc::default())
    }
}
