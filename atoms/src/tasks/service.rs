use chrono::{DateTime, Utc};
use std::collections::HashSet;

use super::model::{
    CompletionReport, CreateBatchPayload, CreateChainPayload, CreateGroupPayload, CreateTaskPayload,
    Grouping, TaskGroup, TaskItem,
};
use crate::error::{CoreError, CoreResult, StoreError};
use crate::store::{self, keys, with_retry, Condition, DocumentStore, FieldUpdate, WriteOp};

const MAX_NAME_LEN: usize = 200;
/// Batches and chains are written in one transaction.
const MAX_GROUPING_SIZE: usize = 50;

fn validate_name(raw: &str) -> CoreResult<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.chars().count() > MAX_NAME_LEN {
        return Err(CoreError::InvalidInput(format!("name must be 1-{} characters", MAX_NAME_LEN)));
    }
    Ok(trimmed.to_string())
}

/// Maps a failed Exists condition to NotFound.
fn missing(what: String) -> impl FnOnce(StoreError) -> CoreError {
    move |e| match e {
        StoreError::ConditionFailed => CoreError::NotFound(what),
        other => other.into(),
    }
}

// ========== GROUPS ==========

pub async fn list_groups(store: &dyn DocumentStore, user_id: &str) -> CoreResult<Vec<TaskGroup>> {
    let mut groups: Vec<TaskGroup> = store::list_as(store, &keys::task_groups(user_id)).await?;
    groups.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.created_at.cmp(&b.created_at)));
    Ok(groups)
}

pub async fn get_group(store: &dyn DocumentStore, user_id: &str, group_id: &str) -> CoreResult<TaskGroup> {
    store::get_as(store, &keys::task_group(user_id, group_id))
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("task group {}", group_id)))
}

/// New groups are appended after the last tab.
pub async fn create_group(
    store: &dyn DocumentStore,
    now: DateTime<Utc>,
    user_id: &str,
    payload: CreateGroupPayload,
) -> CoreResult<TaskGroup> {
    let name = validate_name(&payload.name)?;
    let groups = list_groups(store, user_id).await?;
    let order = groups.iter().map(|g| g.order + 1).max().unwrap_or(0);

    let group = TaskGroup {
        group_id: uuid::Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        name,
        order,
        is_default: false,
        created_at: now,
    };
    let key = keys::task_group(user_id, &group.group_id);
    store
        .put(&key, store::to_document(&key, &group)?, &[Condition::NotExists])
        .await?;
    Ok(group)
}

pub async fn rename_group(
    store: &dyn DocumentStore,
    user_id: &str,
    group_id: &str,
    name: &str,
) -> CoreResult<TaskGroup> {
    let name = validate_name(name)?;
    let mut group = get_group(store, user_id, group_id).await?;
    store
        .update(
            &keys::task_group(user_id, group_id),
            &[FieldUpdate::set("name", name.clone())],
            &[Condition::Exists],
        )
        .await
        .map_err(missing(format!("task group {}", group_id)))?;
    group.name = name;
    Ok(group)
}

/// `group_ids` must list every group of the user exactly once.
pub async fn reorder_groups(
    store: &dyn DocumentStore,
    user_id: &str,
    group_ids: &[String],
) -> CoreResult<Vec<TaskGroup>> {
    let groups = list_groups(store, user_id).await?;
    let existing: HashSet<&str> = groups.iter().map(|g| g.group_id.as_str()).collect();
    let requested: HashSet<&str> = group_ids.iter().map(String::as_str).collect();
    if requested.len() != group_ids.len() || requested != existing {
        return Err(CoreError::InvalidInput(
            "reorder must list every task group exactly once".to_string(),
        ));
    }

    let ops: Vec<WriteOp> = group_ids
        .iter()
        .enumerate()
        .map(|(i, id)| WriteOp::Update {
            key: keys::task_group(user_id, id),
            updates: vec![FieldUpdate::set("order", i as u32)],
            conditions: vec![Condition::Exists],
        })
        .collect();
    for chunk in ops.chunks(MAX_GROUPING_SIZE) {
        store
            .transact(chunk.to_vec())
            .await
            .map_err(missing("task group".to_string()))?;
    }

    list_groups(store, user_id).await
}

/// Deletes a non-default group together with its tasks.
pub async fn delete_group(store: &dyn DocumentStore, user_id: &str, group_id: &str) -> CoreResult<()> {
    let group = get_group(store, user_id, group_id).await?;
    if group.is_default {
        return Err(CoreError::DefaultGroupProtected);
    }

    let tasks: Vec<TaskItem> = list_user_tasks(store, user_id)
        .await?
        .into_iter()
        .filter(|t| t.group_id == group_id)
        .collect();
    for task in &tasks {
        let key = keys::task(user_id, &task.task_id);
        with_retry("delete_task", || store.delete(&key)).await?;
    }

    let key = keys::task_group(user_id, group_id);
    with_retry("delete_task_group", || store.delete(&key)).await?;
    tracing::info!("Deleted task group {} ({} tasks) for {}", group_id, tasks.len(), user_id);
    Ok(())
}

// ========== TASKS ==========

pub async fn get_task(store: &dyn DocumentStore, user_id: &str, task_id: &str) -> CoreResult<TaskItem> {
    store::get_as(store, &keys::task(user_id, task_id))
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("task {}", task_id)))
}

pub async fn list_user_tasks(store: &dyn DocumentStore, user_id: &str) -> CoreResult<Vec<TaskItem>> {
    Ok(store::list_as(store, &keys::tasks(user_id)).await?)
}

/// Incomplete tasks by position, then completed tasks by completion time.
pub async fn list_tasks(
    store: &dyn DocumentStore,
    user_id: &str,
    group_id: &str,
) -> CoreResult<Vec<TaskItem>> {
    let mut tasks: Vec<TaskItem> = list_user_tasks(store, user_id)
        .await?
        .into_iter()
        .filter(|t| t.group_id == group_id)
        .collect();
    tasks.sort_by(|a, b| {
        a.completed
            .cmp(&b.completed)
            .then_with(|| match a.completed {
                false => a.position.cmp(&b.position),
                true => a.completed_at.cmp(&b.completed_at),
            })
            .then_with(|| a.created_at.cmp(&b.created_at))
    });
    Ok(tasks)
}

async fn incomplete_in_group(
    store: &dyn DocumentStore,
    user_id: &str,
    group_id: &str,
) -> CoreResult<Vec<TaskItem>> {
    Ok(list_tasks(store, user_id, group_id)
        .await?
        .into_iter()
        .filter(|t| !t.completed)
        .collect())
}

pub async fn create_task(
    store: &dyn DocumentStore,
    now: DateTime<Utc>,
    user_id: &str,
    group_id: &str,
    payload: CreateTaskPayload,
) -> CoreResult<TaskItem> {
    let name = validate_name(&payload.name)?;
    if payload.time_estimate == 0 {
        return Err(CoreError::InvalidInput("time estimate must be positive".to_string()));
    }
    get_group(store, user_id, group_id).await?;
    let position = incomplete_in_group(store, user_id, group_id).await?.len() as u32;

    let task = TaskItem {
        task_id: uuid::Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        group_id: group_id.to_string(),
        name,
        description: payload.description.filter(|d| !d.trim().is_empty()),
        time_estimate: payload.time_estimate,
        position,
        completed: false,
        completed_at: None,
        batch_id: None,
        batch_time_estimate: None,
        chain_id: None,
        chain_order: None,
        created_at: now,
    };
    let key = keys::task(user_id, &task.task_id);
    store
        .put(&key, store::to_document(&key, &task)?, &[Condition::NotExists])
        .await?;
    Ok(task)
}

/// Writes dense positions 0..n in the given order, skipping unchanged rows.
async fn write_positions(
    store: &dyn DocumentStore,
    user_id: &str,
    ordered: &mut [TaskItem],
) -> CoreResult<()> {
    for (i, task) in ordered.iter_mut().enumerate() {
        let position = i as u32;
        if task.position == position {
            continue;
        }
        let key = keys::task(user_id, &task.task_id);
        let updates = [FieldUpdate::set("position", position)];
        with_retry("write_task_position", || store.update(&key, &updates, &[Condition::Exists]))
            .await
            .map_err(missing(format!("task {}", task.task_id)))?;
        task.position = position;
    }
    Ok(())
}

/// Closes gaps left by completed or deleted tasks.
pub async fn renumber_group(store: &dyn DocumentStore, user_id: &str, group_id: &str) -> CoreResult<()> {
    let mut remaining = incomplete_in_group(store, user_id, group_id).await?;
    write_positions(store, user_id, &mut remaining).await
}

pub async fn move_task(
    store: &dyn DocumentStore,
    user_id: &str,
    task_id: &str,
    new_position: u32,
) -> CoreResult<Vec<TaskItem>> {
    let task = get_task(store, user_id, task_id).await?;
    if task.completed {
        return Err(CoreError::InvalidInput("completed tasks have no position".to_string()));
    }
    let mut ordered: Vec<TaskItem> = incomplete_in_group(store, user_id, &task.group_id)
        .await?
        .into_iter()
        .filter(|t| t.task_id != task_id)
        .collect();
    let index = (new_position as usize).min(ordered.len());
    ordered.insert(index, task);

    write_positions(store, user_id, &mut ordered).await?;
    Ok(ordered)
}

pub async fn delete_task(store: &dyn DocumentStore, user_id: &str, task_id: &str) -> CoreResult<()> {
    let task = get_task(store, user_id, task_id).await?;
    let key = keys::task(user_id, task_id);
    with_retry("delete_task", || store.delete(&key)).await?;

    match task.grouping() {
        Grouping::Batch(batch_id) => repair_batch(store, user_id, batch_id).await?,
        Grouping::Chain(chain_id) => repair_chain(store, user_id, chain_id).await?,
        Grouping::Ungrouped => {}
    }
    if !task.completed {
        renumber_group(store, user_id, &task.group_id).await?;
    }
    Ok(())
}

// ========== BATCHES & CHAINS ==========

pub async fn batch_members(
    store: &dyn DocumentStore,
    user_id: &str,
    batch_id: &str,
) -> CoreResult<Vec<TaskItem>> {
    let mut members: Vec<TaskItem> = list_user_tasks(store, user_id)
        .await?
        .into_iter()
        .filter(|t| t.batch_id.as_deref() == Some(batch_id))
        .collect();
    members.sort_by(|a, b| {
        b.batch_time_estimate
            .is_some()
            .cmp(&a.batch_time_estimate.is_some())
            .then_with(|| a.position.cmp(&b.position))
    });
    Ok(members)
}

pub async fn chain_steps(
    store: &dyn DocumentStore,
    user_id: &str,
    chain_id: &str,
) -> CoreResult<Vec<TaskItem>> {
    let mut steps: Vec<TaskItem> = list_user_tasks(store, user_id)
        .await?
        .into_iter()
        .filter(|t| t.chain_id.as_deref() == Some(chain_id))
        .collect();
    steps.sort_by_key(|t| t.chain_order.unwrap_or(u32::MAX));
    Ok(steps)
}

/// The member carrying the batch estimate, or the first member.
pub fn batch_leader(members: &[TaskItem]) -> Option<&TaskItem> {
    members
        .iter()
        .find(|t| t.batch_time_estimate.is_some())
        .or_else(|| members.first())
}

pub fn batch_is_complete(members: &[TaskItem]) -> bool {
    !members.is_empty() && members.iter().all(|t| t.completed)
}

pub fn next_incomplete_chain_step(steps: &[TaskItem]) -> Option<&TaskItem> {
    steps
        .iter()
        .filter(|t| !t.completed)
        .min_by_key(|t| t.chain_order.unwrap_or(u32::MAX))
}

/// Lowest-order incomplete step, or the first step once all are done.
pub fn chain_leader(steps: &[TaskItem]) -> Option<&TaskItem> {
    next_incomplete_chain_step(steps)
        .or_else(|| steps.iter().min_by_key(|t| t.chain_order.unwrap_or(u32::MAX)))
}

async fn load_groupable(
    store: &dyn DocumentStore,
    user_id: &str,
    group_id: &str,
    task_ids: &[String],
) -> CoreResult<Vec<TaskItem>> {
    if task_ids.len() < 2 || task_ids.len() > MAX_GROUPING_SIZE {
        return Err(CoreError::InvalidInput(format!(
            "batches and chains need 2-{} tasks",
            MAX_GROUPING_SIZE
        )));
    }
    let unique: HashSet<&String> = task_ids.iter().collect();
    if unique.len() != task_ids.len() {
        return Err(CoreError::InvalidInput("duplicate task id".to_string()));
    }
    get_group(store, user_id, group_id).await?;

    let mut tasks = Vec::with_capacity(task_ids.len());
    for id in task_ids {
        let task = get_task(store, user_id, id).await?;
        if task.group_id != group_id {
            return Err(CoreError::InvalidInput(format!("task {} is in another group", id)));
        }
        if task.completed {
            return Err(CoreError::InvalidInput(format!("task {} is already complete", id)));
        }
        if !task.is_ungrouped() {
            return Err(CoreError::InvalidInput(format!("task {} is already in a batch or chain", id)));
        }
        tasks.push(task);
    }
    Ok(tasks)
}

fn ungrouped_guard() -> Vec<Condition> {
    vec![
        Condition::Exists,
        Condition::field_equals("completed", false),
        Condition::field_absent("batch_id"),
        Condition::field_absent("chain_id"),
    ]
}

fn grouping_conflict(e: StoreError) -> CoreError {
    match e {
        StoreError::ConditionFailed => {
            CoreError::Conflict("a task changed while it was being grouped".to_string())
        }
        other => other.into(),
    }
}

/// Groups tasks into a batch. The member with the lowest position becomes
/// the leader and carries the collective estimate.
pub async fn create_batch(
    store: &dyn DocumentStore,
    user_id: &str,
    payload: CreateBatchPayload,
) -> CoreResult<Vec<TaskItem>> {
    let mut members = load_groupable(store, user_id, &payload.group_id, &payload.task_ids).await?;
    members.sort_by_key(|t| t.position);

    let estimate = payload
        .batch_time_estimate
        .unwrap_or_else(|| members.iter().map(|t| t.time_estimate).sum());
    if estimate == 0 {
        return Err(CoreError::InvalidInput("batch estimate must be positive".to_string()));
    }

    let batch_id = uuid::Uuid::new_v4().to_string();
    let mut ops = Vec::with_capacity(members.len());
    for (i, member) in members.iter_mut().enumerate() {
        let mut updates = vec![FieldUpdate::set("batch_id", batch_id.clone())];
        member.batch_id = Some(batch_id.clone());
        if i == 0 {
            updates.push(FieldUpdate::set("batch_time_estimate", estimate));
            member.batch_time_estimate = Some(estimate);
        }
        ops.push(WriteOp::Update {
            key: keys::task(user_id, &member.task_id),
            updates,
            conditions: ungrouped_guard(),
        });
    }
    store.transact(ops).await.map_err(grouping_conflict)?;

    tracing::info!("Created batch {} with {} tasks for {}", batch_id, members.len(), user_id);
    Ok(members)
}

/// Chains tasks in the given order with `chain_order` 1..=n.
pub async fn create_chain(
    store: &dyn DocumentStore,
    user_id: &str,
    payload: CreateChainPayload,
) -> CoreResult<Vec<TaskItem>> {
    let mut steps = load_groupable(store, user_id, &payload.group_id, &payload.task_ids).await?;

    let chain_id = uuid::Uuid::new_v4().to_string();
    let mut ops = Vec::with_capacity(steps.len());
    for (i, step) in steps.iter_mut().enumerate() {
        let order = i as u32 + 1;
        step.chain_id = Some(chain_id.clone());
        step.chain_order = Some(order);
        ops.push(WriteOp::Update {
            key: keys::task(user_id, &step.task_id),
            updates: vec![
                FieldUpdate::set("chain_id", chain_id.clone()),
                FieldUpdate::set("chain_order", order),
            ],
            conditions: ungrouped_guard(),
        });
    }
    store.transact(ops).await.map_err(grouping_conflict)?;

    tracing::info!("Created chain {} with {} steps for {}", chain_id, steps.len(), user_id);
    Ok(steps)
}

pub async fn ungroup_batch(
    store: &dyn DocumentStore,
    user_id: &str,
    batch_id: &str,
) -> CoreResult<Vec<TaskItem>> {
    let mut members = batch_members(store, user_id, batch_id).await?;
    if members.is_empty() {
        return Err(CoreError::NotFound(format!("batch {}", batch_id)));
    }
    let ops = members
        .iter()
        .map(|t| WriteOp::Update {
            key: keys::task(user_id, &t.task_id),
            updates: vec![FieldUpdate::remove("batch_id"), FieldUpdate::remove("batch_time_estimate")],
            conditions: vec![Condition::Exists],
        })
        .collect();
    store.transact(ops).await.map_err(missing(format!("batch {}", batch_id)))?;
    for member in members.iter_mut() {
        member.batch_id = None;
        member.batch_time_estimate = None;
    }
    Ok(members)
}

pub async fn ungroup_chain(
    store: &dyn DocumentStore,
    user_id: &str,
    chain_id: &str,
) -> CoreResult<Vec<TaskItem>> {
    let mut steps = chain_steps(store, user_id, chain_id).await?;
    if steps.is_empty() {
        return Err(CoreError::NotFound(format!("chain {}", chain_id)));
    }
    let ops = steps
        .iter()
        .map(|t| WriteOp::Update {
            key: keys::task(user_id, &t.task_id),
            updates: vec![FieldUpdate::remove("chain_id"), FieldUpdate::remove("chain_order")],
            conditions: vec![Condition::Exists],
        })
        .collect();
    store.transact(ops).await.map_err(missing(format!("chain {}", chain_id)))?;
    for step in steps.iter_mut() {
        step.chain_id = None;
        step.chain_order = None;
    }
    Ok(steps)
}

/// After a member is deleted: a single survivor is released from the batch,
/// otherwise the estimate moves to a new leader if the old one left.
async fn repair_batch(store: &dyn DocumentStore, user_id: &str, batch_id: &str) -> CoreResult<()> {
    let members = batch_members(store, user_id, batch_id).await?;
    if members.len() <= 1 {
        if !members.is_empty() {
            ungroup_batch(store, user_id, batch_id).await?;
        }
        return Ok(());
    }
    if members.iter().all(|t| t.batch_time_estimate.is_none()) {
        let estimate: u64 = members.iter().map(|t| t.time_estimate).sum();
        let leader = &members[0];
        let key = keys::task(user_id, &leader.task_id);
        let updates = [FieldUpdate::set("batch_time_estimate", estimate)];
        with_retry("promote_batch_leader", || store.update(&key, &updates, &[Condition::Exists])).await?;
    }
    Ok(())
}

/// Keeps `chain_order` contiguous from 1 after a step is deleted.
async fn repair_chain(store: &dyn DocumentStore, user_id: &str, chain_id: &str) -> CoreResult<()> {
    let steps = chain_steps(store, user_id, chain_id).await?;
    if steps.len() <= 1 {
        if !steps.is_empty() {
            ungroup_chain(store, user_id, chain_id).await?;
        }
        return Ok(());
    }
    for (i, step) in steps.iter().enumerate() {
        let order = i as u32 + 1;
        if step.chain_order == Some(order) {
            continue;
        }
        let key = keys::task(user_id, &step.task_id);
        let updates = [FieldUpdate::set("chain_order", order)];
        with_retry("renumber_chain", || store.update(&key, &updates, &[Condition::Exists])).await?;
    }
    Ok(())
}

// ========== COMPLETION ==========

/// Incomplete items that complete together with `task`: every open member
/// of its batch, otherwise just the task itself (a chain step completes
/// alone). Empty when the work is already done.
pub async fn completion_set(
    store: &dyn DocumentStore,
    user_id: &str,
    task: &TaskItem,
) -> CoreResult<Vec<TaskItem>> {
    let items = match task.grouping() {
        Grouping::Batch(batch_id) => batch_members(store, user_id, batch_id).await?,
        Grouping::Chain(_) | Grouping::Ungrouped => vec![task.clone()],
    };
    Ok(items.into_iter().filter(|t| !t.completed).collect())
}

/// Marks every item complete with the same timestamp. Each write is retried
/// on its own; items that still fail are reported, never dropped silently.
pub async fn complete_tasks(
    store: &dyn DocumentStore,
    user_id: &str,
    tasks: &[TaskItem],
    at: DateTime<Utc>,
) -> CoreResult<CompletionReport> {
    let completed_at = store::to_value(&at)?;
    let mut report = CompletionReport::default();
    let mut groups: Vec<&str> = Vec::new();

    for task in tasks {
        let key = keys::task(user_id, &task.task_id);
        let updates = [
            FieldUpdate::set("completed", true),
            FieldUpdate::Set("completed_at".to_string(), completed_at.clone()),
        ];
        let conditions = [Condition::Exists, Condition::field_equals("completed", false)];
        match with_retry("complete_task", || store.update(&key, &updates, &conditions)).await {
            Ok(()) => {
                report.completed.push(task.task_id.clone());
                if !groups.contains(&task.group_id.as_str()) {
                    groups.push(&task.group_id);
                }
            }
            Err(StoreError::ConditionFailed) => match store::get_as::<TaskItem>(store, &key).await {
                Ok(Some(current)) if current.completed => {
                    report.already_completed.push(task.task_id.clone());
                }
                _ => {
                    tracing::warn!("Task {} vanished before it could be completed", task.task_id);
                    report.failed.push(task.task_id.clone());
                }
            },
            Err(e) => {
                tracing::error!("Failed to complete task {} for {}: {}", task.task_id, user_id, e);
                report.failed.push(task.task_id.clone());
            }
        }
    }

    for group_id in groups {
        if let Err(e) = renumber_group(store, user_id, group_id).await {
            tracing::warn!("Could not renumber group {} after completion: {}", group_id, e);
        }
    }
    Ok(report)
}

/// Plain check-off outside a focused session: completes the task (and its
/// batch) but awards no XP.
pub async fn complete_task(
    store: &dyn DocumentStore,
    now: DateTime<Utc>,
    user_id: &str,
    task_id: &str,
) -> CoreResult<CompletionReport> {
    let task = get_task(store, user_id, task_id).await?;
    let items = completion_set(store, user_id, &task).await?;
    complete_tasks(store, user_id, &items, now).await
}
