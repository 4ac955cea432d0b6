use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_GROUP_NAME: &str = "Tasks";

/// Ordered, named bucket of tasks. `order` is the tab position.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TaskGroup {
    pub group_id: String,
    pub user_id: String,
    pub name: String,
    pub order: u32,
    /// Exactly one per user; cannot be deleted.
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
}

impl TaskGroup {
    pub fn default_for(user_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            group_id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            name: DEFAULT_GROUP_NAME.to_string(),
            order: 0,
            is_default: true,
            created_at: now,
        }
    }
}

/// Task domain model - one unit of work inside a task group
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TaskItem {
    pub task_id: String,
    pub user_id: String,
    pub group_id: String,
    pub name: String,
    pub description: Option<String>,
    /// Seconds, > 0
    pub time_estimate: u64,
    /// Dense ordering key among incomplete tasks of the group.
    pub position: u32,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,

    pub batch_id: Option<String>,
    /// Collective estimate, stored only on the batch leader.
    pub batch_time_estimate: Option<u64>,

    pub chain_id: Option<String>,
    /// 1-based, contiguous within the chain.
    pub chain_order: Option<u32>,

    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Grouping<'a> {
    Ungrouped,
    Batch(&'a str),
    Chain(&'a str),
}

impl TaskItem {
    pub fn grouping(&self) -> Grouping<'_> {
        match (&self.batch_id, &self.chain_id) {
            (Some(batch), _) => Grouping::Batch(batch),
            (None, Some(chain)) => Grouping::Chain(chain),
            (None, None) => Grouping::Ungrouped,
        }
    }

    pub fn is_ungrouped(&self) -> bool {
        self.grouping() == Grouping::Ungrouped
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateGroupPayload {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct RenameGroupPayload {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct ReorderGroupsPayload {
    pub group_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTaskPayload {
    pub name: String,
    pub description: Option<String>,
    pub time_estimate: u64,
}

#[derive(Debug, Deserialize)]
pub struct MoveTaskPayload {
    pub position: u32,
}

#[derive(Debug, Deserialize)]
pub struct CreateBatchPayload {
    pub group_id: String,
    pub task_ids: Vec<String>,
    /// Defaults to the sum of the members' estimates.
    pub batch_time_estimate: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct CreateChainPayload {
    pub group_id: String,
    /// In chain order.
    pub task_ids: Vec<String>,
}

/// Result of completing several items as one unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CompletionReport {
    pub completed: Vec<String>,
    /// Items whose write still failed after retries.
    pub failed: Vec<String>,
    /// Items someone else finished first; their original timestamp stands.
    pub already_completed: Vec<String>,
}
