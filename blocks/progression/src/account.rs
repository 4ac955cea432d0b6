//! Account lifecycle reconciler.
//!
//! Runs on the account-deleted event. Every step is an idempotent delete
//! with its own retries; a failing step is recorded and the remaining steps
//! still run, so re-delivering the event finishes whatever is left.

use std::future::Future;

use serde::Serialize;

use taskgo_atoms::error::{CoreResult, StoreError};
use taskgo_atoms::social::{self, MemberRole, Membership};
use taskgo_atoms::store::{self, keys, with_retry, Condition, CollectionPath, DocumentStore, WriteOp};
use taskgo_atoms::users::UsernameClaim;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletionStep {
    Profile,
    UsernameClaims,
    HostedGroups,
    Memberships,
    Invites,
    Tasks,
    TaskGroups,
    XpAwards,
    PendingAwards,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepResult {
    pub step: DeletionStep,
    /// Documents removed by this step.
    pub removed: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeletionReport {
    pub user_id: String,
    pub steps: Vec<StepResult>,
}

impl DeletionReport {
    pub fn is_complete(&self) -> bool {
        self.steps.iter().all(|s| s.error.is_none())
    }

    pub fn failed_steps(&self) -> Vec<DeletionStep> {
        self.steps.iter().filter(|s| s.error.is_some()).map(|s| s.step).collect()
    }
}

async fn run_step<F>(step: DeletionStep, user_id: &str, work: F) -> StepResult
where
    F: Future<Output = CoreResult<usize>>,
{
    match work.await {
        Ok(removed) => StepResult {
            step,
            removed,
            error: None,
        },
        Err(e) => {
            tracing::error!("Account deletion step {:?} failed for {}: {}", step, user_id, e);
            StepResult {
                step,
                removed: 0,
                error: Some(e.to_string()),
            }
        }
    }
}

async fn delete_profile(store: &dyn DocumentStore, user_id: &str) -> CoreResult<usize> {
    let key = keys::user(user_id);
    let existed = store.get(&key).await?.is_some();
    with_retry("delete_profile", || store.delete(&key)).await?;
    Ok(existed as usize)
}

/// Claims are found through the owner's reverse index. The registry entry
/// is removed only while it still points at this user.
async fn delete_username_claims(store: &dyn DocumentStore, user_id: &str) -> CoreResult<usize> {
    let claims: Vec<UsernameClaim> = store::list_as(store, &keys::username_claims(user_id)).await?;
    let mut removed = 0;
    for claim in claims {
        let ops = vec![WriteOp::Delete {
            key: keys::username(&claim.username),
            conditions: vec![Condition::field_equals("user_id", user_id)],
        }];
        match with_retry("delete_username_claim", || store.transact(ops.clone())).await {
            Ok(()) => removed += 1,
            Err(StoreError::ConditionFailed) => {
                tracing::warn!("Username '{}' is gone or no longer owned by {}", claim.username, user_id);
            }
            Err(e) => return Err(e.into()),
        }
        let index_key = keys::username_claim(user_id, &claim.username);
        with_retry("delete_username_claim_index", || store.delete(&index_key)).await?;
    }
    Ok(removed)
}

async fn hosted_memberships(store: &dyn DocumentStore, user_id: &str) -> CoreResult<Vec<Membership>> {
    Ok(social::list_user_groups(store, user_id)
        .await?
        .into_iter()
        .filter(|m| m.role == MemberRole::Host)
        .collect())
}

async fn dissolve_hosted_groups(store: &dyn DocumentStore, user_id: &str) -> CoreResult<usize> {
    let hosted = hosted_memberships(store, user_id).await?;
    for membership in &hosted {
        social::purge_group(store, &membership.group_id).await?;
    }
    Ok(hosted.len())
}

async fn leave_all_groups(store: &dyn DocumentStore, user_id: &str) -> CoreResult<usize> {
    let memberships = social::list_user_groups(store, user_id).await?;
    for membership in &memberships {
        social::remove_membership(store, &membership.group_id, user_id).await?;
    }
    Ok(memberships.len())
}

async fn delete_collection(store: &dyn DocumentStore, path: CollectionPath) -> CoreResult<usize> {
    let entries = store.list(&path).await?;
    for (id, _) in &entries {
        let key = path.doc(id);
        with_retry("delete_user_document", || store.delete(&key)).await?;
    }
    Ok(entries.len())
}

/// Removes every trace of `user_id`: profile, username claims, group
/// memberships (groups the user hosts are dissolved), and the user's own
/// invites, tasks, task groups, award receipts and queued awards.
pub async fn delete_account(store: &dyn DocumentStore, user_id: &str) -> DeletionReport {
    tracing::info!("Deleting account {}", user_id);

    let steps = vec![
        run_step(DeletionStep::Profile, user_id, delete_profile(store, user_id)).await,
        run_step(
            DeletionStep::UsernameClaims,
            user_id,
            delete_username_claims(store, user_id),
        )
        .await,
        run_step(
            DeletionStep::HostedGroups,
            user_id,
            dissolve_hosted_groups(store, user_id),
        )
        .await,
        run_step(DeletionStep::Memberships, user_id, leave_all_groups(store, user_id)).await,
        run_step(
            DeletionStep::Invites,
            user_id,
            delete_collection(store, keys::invites(user_id)),
        )
        .await,
        run_step(
            DeletionStep::Tasks,
            user_id,
            delete_collection(store, keys::tasks(user_id)),
        )
        .await,
        run_step(
            DeletionStep::TaskGroups,
            user_id,
            delete_collection(store, keys::task_groups(user_id)),
        )
        .await,
        run_step(
            DeletionStep::XpAwards,
            user_id,
            delete_collection(store, keys::xp_awards(user_id)),
        )
        .await,
        run_step(
            DeletionStep::PendingAwards,
            user_id,
            delete_collection(store, keys::pending_awards(user_id)),
        )
        .await,
    ];

    let report = DeletionReport {
        user_id: user_id.to_string(),
        steps,
    };
    if report.is_complete() {
        tracing::info!("Account {} fully removed", user_id);
    } else {
        tracing::warn!("Account {} partially removed, failed steps: {:?}", user_id, report.failed_steps());
    }
    report
}
