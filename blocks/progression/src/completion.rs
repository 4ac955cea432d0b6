use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use taskgo_atoms::error::{CoreError, CoreResult};
use taskgo_atoms::social::{self, MirrorFailure};
use taskgo_atoms::store::{self, keys, with_retry, DocumentStore};
use taskgo_atoms::tasks::{self, Grouping, TaskItem};
use taskgo_atoms::users::{self, AwardOutcome, UserProfile};
use taskgo_atoms::xp::{ActivityReport, AwardDecision};

use crate::ProgressionRules;

/// An award whose commit failed after retries, kept server side at
/// `users/{userId}/pendingAwards/{taskId}` until `retry_pending_award`
/// lands it. The XP was decided when the session completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAward {
    pub user_id: String,
    pub task_id: String,
    /// Receipt id: the batch for a batch member, otherwise the task.
    pub award_key: String,
    pub report: ActivityReport,
    pub xp: u64,
    pub earned_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum XpStatus {
    Committed { profile: UserProfile },
    AlreadyAwarded,
    /// The work was finished before this session; nothing to award.
    AlreadyCompleted,
    /// Nothing to award: below threshold or unverified.
    Skipped { decision: AwardDecision },
    Queued { pending: PendingAward },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AwardResult {
    pub xp: XpStatus,
    pub mirror_failures: Vec<MirrorFailure>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionOutcome {
    pub completed_task_ids: Vec<String>,
    /// XP the session earned under the award policy.
    pub awarded_xp: u64,
    pub decision: AwardDecision,
    pub xp: XpStatus,
    pub task_failures: Vec<String>,
    pub mirror_failures: Vec<MirrorFailure>,
    /// Set when the finished item was a chain step and steps remain.
    pub next_chain_step: Option<TaskItem>,
}

/// One session's work earns one receipt, so finishing a batch through any
/// of its members cannot be rewarded twice.
pub fn award_key(task: &TaskItem) -> String {
    match task.grouping() {
        Grouping::Batch(batch_id) => batch_id.to_string(),
        Grouping::Chain(_) | Grouping::Ungrouped => task.task_id.clone(),
    }
}

async fn get_pending(
    store: &dyn DocumentStore,
    user_id: &str,
    task_id: &str,
) -> CoreResult<Option<PendingAward>> {
    Ok(store::get_as(store, &keys::pending_award(user_id, task_id)).await?)
}

async fn queue_award(store: &dyn DocumentStore, pending: &PendingAward) {
    let key = keys::pending_award(&pending.user_id, &pending.task_id);
    let stored = match store::to_document(&key, pending) {
        Ok(doc) => with_retry("queue_pending_award", || store.put(&key, doc.clone(), &[])).await,
        Err(e) => Err(e),
    };
    if let Err(e) = stored {
        tracing::error!("Could not store pending award {}: {}", key, e);
    }
}

async fn clear_pending(store: &dyn DocumentStore, pending: &PendingAward) {
    let key = keys::pending_award(&pending.user_id, &pending.task_id);
    if let Err(e) = with_retry("clear_pending_award", || store.delete(&key)).await {
        tracing::warn!("Could not clear pending award {}: {}", key, e);
    }
}

/// Commits with retries and mirrors the new weekly XP. Transient failures
/// and lost optimistic races that outlast the retries become `Queued`, and
/// the pending award is stored for `retry_pending_award`.
async fn commit_and_mirror(
    store: &dyn DocumentStore,
    rules: &ProgressionRules,
    now: DateTime<Utc>,
    pending: PendingAward,
) -> CoreResult<AwardResult> {
    let committed = with_retry("commit_xp_award", || {
        users::commit_xp_award(store, now, rules.week, &pending.user_id, &pending.award_key, pending.xp)
    })
    .await;

    match committed {
        Ok(AwardOutcome::Committed(profile)) => {
            let mirror_failures = social::sync_member_mirrors(store, &profile).await?;
            Ok(AwardResult {
                xp: XpStatus::Committed { profile },
                mirror_failures,
            })
        }
        Ok(AwardOutcome::AlreadyAwarded) => Ok(AwardResult {
            xp: XpStatus::AlreadyAwarded,
            mirror_failures: Vec::new(),
        }),
        Err(e) if e.is_transient() || matches!(e, CoreError::Conflict(_)) => {
            tracing::error!(
                "Queueing {} XP for {} on {}: {}",
                pending.xp,
                pending.user_id,
                pending.task_id,
                e
            );
            queue_award(store, &pending).await;
            Ok(AwardResult {
                xp: XpStatus::Queued { pending },
                mirror_failures: Vec::new(),
            })
        }
        Err(e) => Err(e),
    }
}

/// What a session on already finished work reports: the earlier award if
/// there was one, the queued award if it is still pending.
async fn settled_status(
    store: &dyn DocumentStore,
    user_id: &str,
    task: &TaskItem,
) -> CoreResult<XpStatus> {
    if let Some(pending) = get_pending(store, user_id, &task.task_id).await? {
        return Ok(XpStatus::Queued { pending });
    }
    if store.get(&keys::xp_award(user_id, &award_key(task))).await?.is_some() {
        return Ok(XpStatus::AlreadyAwarded);
    }
    Ok(XpStatus::AlreadyCompleted)
}

/// Finalizes a focused session on `task_id`.
///
/// The task (its whole batch, for a batch member) is marked complete
/// whatever the award turns out to be. XP comes only from the verified
/// activity in `report`, only when this session finished open work, and at
/// most once per task or batch. It is mirrored into every group the user
/// belongs to. An XP write that keeps failing is stored and returned as
/// `Queued` instead of failing the completion.
pub async fn complete_focus_session(
    store: &dyn DocumentStore,
    rules: &ProgressionRules,
    now: DateTime<Utc>,
    user_id: &str,
    task_id: &str,
    report: ActivityReport,
) -> CoreResult<CompletionOutcome> {
    let task = tasks::get_task(store, user_id, task_id).await?;
    let items = tasks::completion_set(store, user_id, &task).await?;
    let decision = rules.award.decide(&report);

    if items.is_empty() {
        let xp = settled_status(store, user_id, &task).await?;
        tracing::info!("Session on finished task {} for {}: {:?}", task_id, user_id, xp);
        return Ok(CompletionOutcome {
            completed_task_ids: Vec::new(),
            awarded_xp: 0,
            decision,
            xp,
            task_failures: Vec::new(),
            mirror_failures: Vec::new(),
            next_chain_step: next_chain_step(store, user_id, &task).await?,
        });
    }

    let task_report = tasks::complete_tasks(store, user_id, &items, now).await?;

    let awarded_xp = decision.xp();
    let award = if awarded_xp == 0 {
        tracing::info!("No XP for {} on {}: {:?}", user_id, task_id, decision);
        AwardResult {
            xp: XpStatus::Skipped { decision },
            mirror_failures: Vec::new(),
        }
    } else {
        let pending = PendingAward {
            user_id: user_id.to_string(),
            task_id: task_id.to_string(),
            award_key: award_key(&task),
            report,
            xp: awarded_xp,
            earned_at: now,
        };
        commit_and_mirror(store, rules, now, pending).await?
    };

    Ok(CompletionOutcome {
        completed_task_ids: task_report.completed,
        awarded_xp,
        decision,
        xp: award.xp,
        task_failures: task_report.failed,
        mirror_failures: award.mirror_failures,
        next_chain_step: next_chain_step(store, user_id, &task).await?,
    })
}

async fn next_chain_step(
    store: &dyn DocumentStore,
    user_id: &str,
    task: &TaskItem,
) -> CoreResult<Option<TaskItem>> {
    match task.grouping() {
        Grouping::Chain(chain_id) => {
            let steps = tasks::chain_steps(store, user_id, chain_id).await?;
            Ok(tasks::next_incomplete_chain_step(&steps).cloned())
        }
        Grouping::Batch(_) | Grouping::Ungrouped => Ok(None),
    }
}

/// Re-submits the award queued for `task_id`. Only an award stored by a
/// completed session can be retried; the record is removed once the XP has
/// landed (or is found to have landed earlier).
pub async fn retry_pending_award(
    store: &dyn DocumentStore,
    rules: &ProgressionRules,
    now: DateTime<Utc>,
    user_id: &str,
    task_id: &str,
) -> CoreResult<AwardResult> {
    let pending = get_pending(store, user_id, task_id)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("pending award for task {}", task_id)))?;

    let result = commit_and_mirror(store, rules, now, pending.clone()).await?;
    match result.xp {
        XpStatus::Committed { .. } | XpStatus::AlreadyAwarded => clear_pending(store, &pending).await,
        XpStatus::Queued { .. } | XpStatus::Skipped { .. } | XpStatus::AlreadyCompleted => {}
    }
    Ok(result)
}
