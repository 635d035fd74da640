//! Task claim registry - single-owner work claiming with progress updates
//!
//! A claim is strictly first-come: while a non-completed task with the same
//! id exists, every further claim fails no matter who holds it. Only the
//! owning instance may append updates or complete the task. Lost races at
//! the store level degrade to a failed claim on the next read, never to two
//! silently coexisting owners.

use chrono::{DateTime, Utc};
use docstore::{DocStore, Document};
use eyre::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::bus::{BROADCAST, MessageBus, MessageMetadata};

/// Task lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    InProgress,
    Completed,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "in_progress" | "in-progress" => Ok(Self::InProgress),
            "completed" | "complete" => Ok(Self::Completed),
            _ => Err(format!("Unknown status: {}. Use: in_progress or completed", s)),
        }
    }
}

/// One progress note appended by the owning instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskUpdate {
    pub timestamp: DateTime<Utc>,
    pub content: String,
}

/// A claimed unit of work
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    pub description: String,
    /// First successful claimant; immutable once set
    pub claimed_by: String,
    pub claimed_at: DateTime<Utc>,
    pub status: TaskStatus,
    #[serde(default)]
    pub updates: Vec<TaskUpdate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

/// The shared task log document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskLog {
    pub tasks: Vec<Task>,
}

impl Document for TaskLog {
    const KEY: &'static str = "shared_tasks";
}

/// Shared task board
#[derive(Debug, Clone)]
pub struct TaskBoard {
    store: DocStore,
    bus: MessageBus,
}

impl TaskBoard {
    pub fn new(store: DocStore, bus: MessageBus) -> Self {
        Self { store, bus }
    }

    /// Claim a task id.
    ///
    /// Fails while any non-completed task with this id exists, regardless of
    /// claimant. A completed task's id can be claimed again: a fresh entry is
    /// appended under the new owner, leaving the completed record in place
    /// (see `test_completed_task_id_is_reclaimable`).
    ///
    /// A successful claim also posts a `task_claim` message to the bus.
    pub fn claim(
        &self,
        task_id: impl Into<String>,
        description: impl Into<String>,
        claimant: impl Into<String>,
    ) -> Result<bool> {
        let task_id = task_id.into();
        let description = description.into();
        let claimant = claimant.into();

        let mut doc: TaskLog = self.store.load()?;

        if let Some(existing) = doc
            .tasks
            .iter()
            .find(|t| t.task_id == task_id && t.status != TaskStatus::Completed)
        {
            debug!(%task_id, claimed_by = %existing.claimed_by, "Claim rejected, task already active");
            return Ok(false);
        }

        doc.tasks.push(Task {
            task_id: task_id.clone(),
            description: description.clone(),
            claimed_by: claimant.clone(),
            claimed_at: Utc::now(),
            status: TaskStatus::InProgress,
            updates: Vec::new(),
            completed_at: None,
            result: None,
        });
        self.store.save(&doc)?;

        info!(%task_id, %claimant, "Task claimed");
        self.bus.post(
            claimant,
            BROADCAST,
            "task_claim",
            format!("Claimed task: {}", description),
            MessageMetadata::for_task(task_id),
        )?;

        Ok(true)
    }

    /// Append a progress update. Fails without mutation unless the task
    /// exists and is owned by `claimant`.
    pub fn update(&self, task_id: &str, claimant: &str, content: impl Into<String>) -> Result<bool> {
        let mut doc: TaskLog = self.store.load()?;

        match doc
            .tasks
            .iter_mut()
            .find(|t| t.task_id == task_id && t.claimed_by == claimant)
        {
            Some(task) => {
                task.updates.push(TaskUpdate {
                    timestamp: Utc::now(),
                    content: content.into(),
                });
                self.store.save(&doc)?;
                debug!(%task_id, %claimant, "Task updated");
                Ok(true)
            }
            None => {
                debug!(%task_id, %claimant, "Update rejected, task missing or not owned");
                Ok(false)
            }
        }
    }

    /// Mark a task completed. Ownership is checked the same way as `update`;
    /// a successful completion also posts a `task_complete` message.
    pub fn complete(&self, task_id: &str, claimant: &str, result: Option<String>) -> Result<bool> {
        let mut doc: TaskLog = self.store.load()?;

        let Some(task) = doc
            .tasks
            .iter_mut()
            .find(|t| t.task_id == task_id && t.claimed_by == claimant)
        else {
            debug!(%task_id, %claimant, "Complete rejected, task missing or not owned");
            return Ok(false);
        };

        task.status = TaskStatus::Completed;
        task.completed_at = Some(Utc::now());
        if result.is_some() {
            task.result = result.clone();
        }
        let description = task.description.clone();
        self.store.save(&doc)?;

        info!(%task_id, %claimant, "Task completed");
        let mut metadata = MessageMetadata::for_task(task_id);
        metadata.result = result;
        self.bus.post(
            claimant,
            BROADCAST,
            "task_complete",
            format!("Completed task: {}", description),
            metadata,
        )?;

        Ok(true)
    }

    /// Full snapshot, optionally filtered by status
    pub fn list(&self, status: Option<TaskStatus>) -> Result<Vec<Task>> {
        let doc: TaskLog = self.store.load()?;

        Ok(doc
            .tasks
            .into_iter()
            .filter(|t| status.is_none_or(|s| t.status == s))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn board(dir: &std::path::Path) -> TaskBoard {
        let store = DocStore::open(dir).unwrap();
        let bus = MessageBus::new(store.clone(), 1000);
        TaskBoard::new(store, bus)
    }

    #[test]
    fn test_first_claim_wins() {
        let temp = tempdir().unwrap();
        let board = board(temp.path());

        assert!(board.claim("T1", "investigate cache", "i1").unwrap());
        assert!(!board.claim("T1", "investigate cache", "i2").unwrap());

        let tasks = board.list(None).unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].claimed_by, "i1");
    }

    #[test]
    fn test_claim_posts_bus_message() {
        let temp = tempdir().unwrap();
        let board = board(temp.path());
        let bus = MessageBus::new(DocStore::open(temp.path()).unwrap(), 1000);

        board.claim("T1", "investigate cache", "i1").unwrap();

        let messages = bus.query("i2", None).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].msg_type, "task_claim");
        assert_eq!(messages[0].metadata.task_id.as_deref(), Some("T1"));
    }

    #[test]
    fn test_owner_can_update() {
        let temp = tempdir().unwrap();
        let board = board(temp.path());

        board.claim("T1", "desc", "i1").unwrap();
        assert!(board.update("T1", "i1", "halfway there").unwrap());

        let tasks = board.list(None).unwrap();
        assert_eq!(tasks[0].updates.len(), 1);
        assert_eq!(tasks[0].updates[0].content, "halfway there");
    }

    #[test]
    fn test_non_owner_update_fails_without_mutation() {
        let temp = tempdir().unwrap();
        let board = board(temp.path());

        board.claim("T1", "desc", "i1").unwrap();
        assert!(!board.update("T1", "i2", "sneaky update").unwrap());

        let tasks = board.list(None).unwrap();
        assert!(tasks[0].updates.is_empty());
    }

    #[test]
    fn test_update_unknown_task_fails() {
        let temp = tempdir().unwrap();
        let board = board(temp.path());

        assert!(!board.update("nope", "i1", "update").unwrap());
        assert!(board.list(None).unwrap().is_empty());
    }

    #[test]
    fn test_complete_sets_result_and_posts_message() {
        let temp = tempdir().unwrap();
        let board = board(temp.path());
        let bus = MessageBus::new(DocStore::open(temp.path()).unwrap(), 1000);

        board.claim("T1", "desc", "i1").unwrap();
        assert!(board.complete("T1", "i1", Some("done".to_string())).unwrap());

        let tasks = board.list(Some(TaskStatus::Completed)).unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].result.as_deref(), Some("done"));
        assert!(tasks[0].completed_at.is_some());

        let messages = bus.query("i2", None).unwrap();
        let complete_msg = messages.iter().find(|m| m.msg_type == "task_complete").unwrap();
        assert_eq!(complete_msg.metadata.result.as_deref(), Some("done"));
    }

    #[test]
    fn test_non_owner_complete_fails_without_mutation() {
        let temp = tempdir().unwrap();
        let board = board(temp.path());

        board.claim("T1", "desc", "i1").unwrap();
        assert!(!board.complete("T1", "i2", None).unwrap());

        let tasks = board.list(None).unwrap();
        assert_eq!(tasks[0].status, TaskStatus::InProgress);
    }

    // Re-claiming a completed task id is allowed: the claim check only
    // blocks on active tasks, so a completed id effectively restarts under
    // new ownership with a fresh entry. Deliberate retry semantics or a
    // loophole, this test pins it either way.
    #[test]
    fn test_completed_task_id_is_reclaimable() {
        let temp = tempdir().unwrap();
        let board = board(temp.path());

        assert!(board.claim("T1", "first run", "i1").unwrap());
        assert!(board.complete("T1", "i1", Some("done".to_string())).unwrap());

        assert!(board.claim("T1", "second run", "i2").unwrap());

        let tasks = board.list(None).unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].claimed_by, "i1");
        assert_eq!(tasks[0].status, TaskStatus::Completed);
        assert_eq!(tasks[1].claimed_by, "i2");
        assert_eq!(tasks[1].status, TaskStatus::InProgress);

        // And the active entry blocks a third claim again
        assert!(!board.claim("T1", "third run", "i3").unwrap());
    }

    #[test]
    fn test_list_status_filter() {
        let temp = tempdir().unwrap();
        let board = board(temp.path());

        board.claim("T1", "a", "i1").unwrap();
        board.claim("T2", "b", "i1").unwrap();
        board.complete("T1", "i1", None).unwrap();

        assert_eq!(board.list(Some(TaskStatus::InProgress)).unwrap().len(), 1);
        assert_eq!(board.list(Some(TaskStatus::Completed)).unwrap().len(), 1);
        assert_eq!(board.list(None).unwrap().len(), 2);
    }

    #[test]
    fn test_status_from_str() {
        assert_eq!("in_progress".parse::<TaskStatus>().unwrap(), TaskStatus::InProgress);
        assert_eq!("completed".parse::<TaskStatus>().unwrap(), TaskStatus::Completed);
        assert!("bogus".parse::<TaskStatus>().is_err());
    }
}
