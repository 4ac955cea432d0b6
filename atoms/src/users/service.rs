use chrono::{DateTime, Utc};
use serde_json::Value;

use super::model::{
    AwardOutcome, SignUpPayload, UserProfile, UsernameClaim, XpAwardReceipt,
};
use crate::clock::WeekBoundary;
use crate::error::{CoreError, CoreResult, StoreError};
use crate::social::mirror;
use crate::store::{self, keys, Condition, DocumentStore, WriteOp};
use crate::tasks::model::TaskGroup;
use crate::xp;

const MIN_USERNAME_LEN: usize = 3;
const MAX_USERNAME_LEN: usize = 20;
const MAX_DISPLAY_NAME_LEN: usize = 40;
/// Optimistic profile writes give up after this many lost races.
pub const MAX_PROFILE_CAS_ATTEMPTS: u32 = 5;

/// Trims and lowercases a username, rejecting names outside the allowed shape.
pub fn normalize_username(raw: &str) -> CoreResult<String> {
    let trimmed = raw.trim();
    let valid_len = (MIN_USERNAME_LEN..=MAX_USERNAME_LEN).contains(&trimmed.chars().count());
    let valid_chars = trimmed
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
    if !valid_len || !valid_chars {
        return Err(CoreError::InvalidUsername(raw.to_string()));
    }
    Ok(trimmed.to_lowercase())
}

fn validate_display_name(raw: &str) -> CoreResult<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.chars().count() > MAX_DISPLAY_NAME_LEN {
        return Err(CoreError::InvalidInput(format!(
            "display name must be 1-{} characters",
            MAX_DISPLAY_NAME_LEN
        )));
    }
    Ok(trimmed.to_string())
}

// ========== USERNAME REGISTRY ==========

pub async fn is_available(store: &dyn DocumentStore, name: &str) -> CoreResult<bool> {
    let lower = normalize_username(name)?;
    Ok(store.get(&keys::username(&lower)).await?.is_none())
}

pub async fn lookup(store: &dyn DocumentStore, name: &str) -> CoreResult<Option<String>> {
    let lower = match normalize_username(name) {
        Ok(lower) => lower,
        Err(_) => return Ok(None),
    };
    let claim: Option<UsernameClaim> = store::get_as(store, &keys::username(&lower)).await?;
    Ok(claim.map(|c| c.user_id))
}

fn claim_ops(claim: &UsernameClaim) -> Result<Vec<WriteOp>, StoreError> {
    Ok(vec![
        store::put_op(
            keys::username(&claim.username),
            claim,
            vec![Condition::NotExists],
        )?,
        store::put_op(
            keys::username_claim(&claim.user_id, &claim.username),
            claim,
            vec![],
        )?,
    ])
}

/// Claims a username for `user_id`.
///
/// The existence re-check and the write happen in one conditional
/// transaction, so of two concurrent claims exactly one wins.
pub async fn claim_username(
    store: &dyn DocumentStore,
    now: DateTime<Utc>,
    user_id: &str,
    name: &str,
) -> CoreResult<UsernameClaim> {
    let lower = normalize_username(name)?;
    let claim = UsernameClaim {
        username: lower.clone(),
        user_id: user_id.to_string(),
        claimed_at: now,
    };

    match store.transact(claim_ops(&claim)?).await {
        Ok(()) => {
            tracing::info!("Username '{}' claimed by {}", lower, user_id);
            Ok(claim)
        }
        Err(StoreError::ConditionFailed) => {
            let existing: Option<UsernameClaim> = store::get_as(store, &keys::username(&lower)).await?;
            match existing {
                Some(existing) if existing.user_id == user_id => Ok(existing),
                _ => Err(CoreError::AlreadyTaken(lower)),
            }
        }
        Err(e) => Err(e.into()),
    }
}

/// Creates the profile, the username claim and the default task group in a
/// single transaction. A lost username race writes nothing, so the caller
/// can retry with another name against the same auth identity.
pub async fn sign_up(
    store: &dyn DocumentStore,
    now: DateTime<Utc>,
    week: WeekBoundary,
    user_id: &str,
    payload: SignUpPayload,
) -> CoreResult<UserProfile> {
    let lower = normalize_username(&payload.username)?;
    let email = payload.email.trim().to_string();
    if email.is_empty() || !email.contains('@') {
        return Err(CoreError::InvalidInput("a valid email address is required".to_string()));
    }
    let display_name = match payload.display_name.as_deref() {
        Some(name) => validate_display_name(name)?,
        None => payload.username.trim().to_string(),
    };

    let profile = UserProfile {
        user_id: user_id.to_string(),
        email,
        username: payload.username.trim().to_string(),
        display_name,
        total_xp: 0,
        level: 1,
        weekly_xp: 0,
        weekly_xp_reset_date: week.next_after(now),
        created_at: now,
        revision: 0,
    };
    let claim = UsernameClaim {
        username: lower.clone(),
        user_id: user_id.to_string(),
        claimed_at: now,
    };
    let default_group = TaskGroup::default_for(user_id, now);

    let mut ops = claim_ops(&claim)?;
    ops.push(store::put_op(keys::user(user_id), &profile, vec![Condition::NotExists])?);
    ops.push(store::put_op(
        keys::task_group(user_id, &default_group.group_id),
        &default_group,
        vec![],
    )?);

    match store.transact(ops).await {
        Ok(()) => {
            tracing::info!("Signed up user {} as '{}'", user_id, lower);
            Ok(profile)
        }
        Err(StoreError::ConditionFailed) => {
            if store.get(&keys::user(user_id)).await?.is_some() {
                Err(CoreError::Conflict(format!("profile for {} already exists", user_id)))
            } else {
                Err(CoreError::AlreadyTaken(lower))
            }
        }
        Err(e) => Err(e.into()),
    }
}

// ========== PROFILE ==========

pub async fn get_profile(store: &dyn DocumentStore, user_id: &str) -> CoreResult<UserProfile> {
    store::get_as(store, &keys::user(user_id))
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("user {}", user_id)))
}

/// Whole-document replace guarded by the revision the change was computed from.
pub fn replace_profile_op(current: &UserProfile, next: &UserProfile) -> Result<WriteOp, StoreError> {
    let mut next = next.clone();
    next.revision = current.revision + 1;
    store::put_op(
        keys::user(&current.user_id),
        &next,
        vec![
            Condition::Exists,
            Condition::FieldEquals("revision".to_string(), Value::from(current.revision)),
        ],
    )
}

/// Read-modify-write on a profile with optimistic concurrency.
/// `change` returns `None` when there is nothing to write.
pub async fn update_profile<F>(
    store: &dyn DocumentStore,
    user_id: &str,
    mut change: F,
) -> CoreResult<Option<UserProfile>>
where
    F: FnMut(&UserProfile) -> CoreResult<Option<UserProfile>>,
{
    for _ in 0..MAX_PROFILE_CAS_ATTEMPTS {
        let current = get_profile(store, user_id).await?;
        let Some(next) = change(&current)? else {
            return Ok(None);
        };
        let op = replace_profile_op(&current, &next)?;
        match store.transact(vec![op]).await {
            Ok(()) => {
                let mut written = next;
                written.revision = current.revision + 1;
                return Ok(Some(written));
            }
            Err(StoreError::ConditionFailed) => {
                tracing::info!("Profile {} changed underneath us, re-reading", user_id);
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(CoreError::Conflict(format!("profile {} is under heavy contention", user_id)))
}

/// Renames the user's display name and pushes it to every leaderboard mirror.
pub async fn update_display_name(
    store: &dyn DocumentStore,
    user_id: &str,
    display_name: &str,
) -> CoreResult<UserProfile> {
    let display_name = validate_display_name(display_name)?;
    let updated = update_profile(store, user_id, |current| {
        if current.display_name == display_name {
            return Ok(None);
        }
        let mut next = current.clone();
        next.display_name = display_name.clone();
        Ok(Some(next))
    })
    .await?;

    match updated {
        Some(profile) => {
            mirror::sync_member_mirrors(store, &profile).await?;
            Ok(profile)
        }
        None => get_profile(store, user_id).await,
    }
}

// ========== XP ==========

/// Grants `xp` to the user at most once per `award_key` (the completed task id).
///
/// The receipt and the profile change commit together; a receipt that is
/// already present means the award happened earlier and nothing is written.
/// If the profile's weekly window has already ended, the window is rolled
/// over before the XP lands in it.
pub async fn commit_xp_award(
    store: &dyn DocumentStore,
    now: DateTime<Utc>,
    week: WeekBoundary,
    user_id: &str,
    award_key: &str,
    xp_amount: u64,
) -> CoreResult<AwardOutcome> {
    let receipt_key = keys::xp_award(user_id, award_key);
    let receipt = XpAwardReceipt {
        task_id: award_key.to_string(),
        xp: xp_amount,
        awarded_at: now,
    };

    for _ in 0..MAX_PROFILE_CAS_ATTEMPTS {
        let current = get_profile(store, user_id).await?;
        let mut next = current.clone();
        if current.weekly_xp_reset_date <= now {
            next.weekly_xp = 0;
            next.weekly_xp_reset_date = week.roll_forward(current.weekly_xp_reset_date, now);
        }
        next.total_xp = current.total_xp.saturating_add(xp_amount);
        next.weekly_xp = next.weekly_xp.saturating_add(xp_amount);
        next.level = xp::level_for_xp(next.total_xp);

        let ops = vec![
            store::put_op(receipt_key.clone(), &receipt, vec![Condition::NotExists])?,
            replace_profile_op(&current, &next)?,
        ];
        match store.transact(ops).await {
            Ok(()) => {
                next.revision = current.revision + 1;
                tracing::info!(
                    "Awarded {} XP to {} for {} (total {}, level {})",
                    xp_amount,
                    user_id,
                    award_key,
                    next.total_xp,
                    next.level
                );
                return Ok(AwardOutcome::Committed(next));
            }
            Err(StoreError::ConditionFailed) => {
                if store.get(&receipt_key).await?.is_some() {
                    tracing::info!("XP for {} already awarded to {}", award_key, user_id);
                    return Ok(AwardOutcome::AlreadyAwarded);
                }
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(CoreError::Conflict(format!("profile {} is under heavy contention", user_id)))
}

/// Zeroes weekly XP if the reset instant has passed. A no-op (returns
/// `None`) when the reset date is still in the future.
pub async fn reset_weekly_xp_if_due(
    store: &dyn DocumentStore,
    now: DateTime<Utc>,
    week: WeekBoundary,
    user_id: &str,
) -> CoreResult<Option<UserProfile>> {
    update_profile(store, user_id, |current| {
        if current.weekly_xp_reset_date > now {
            return Ok(None);
        }
        let mut next = current.clone();
        next.weekly_xp = 0;
        next.weekly_xp_reset_date = week.roll_forward(current.weekly_xp_reset_date, now);
        Ok(Some(next))
    })
    .await
}

pub async fn list_profiles(store: &dyn DocumentStore) -> CoreResult<Vec<UserProfile>> {
    Ok(store::list_as(store, &keys::users()).await?)
}
