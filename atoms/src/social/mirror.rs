//! Leaderboard mirror propagation.
//!
//! Every write that changes a profile's weekly XP, level, display name or
//! username must be followed by `sync_member_mirrors`. The mirror is copied
//! from the profile that was just written; it is never recomputed. Copies
//! carry the profile revision, and a copy never replaces a newer one.

use futures::future::join_all;

use super::model::{Membership, MirrorFailure, SocialGroupMember};
use crate::error::{CoreResult, StoreError};
use crate::store::{self, keys, with_retry, Condition, DocumentStore, FieldUpdate};
use crate::users::UserProfile;

fn mirror_updates(profile: &UserProfile) -> Vec<FieldUpdate> {
    vec![
        FieldUpdate::set("weekly_xp", profile.weekly_xp),
        FieldUpdate::set("level", profile.level),
        FieldUpdate::set("display_name", profile.display_name.clone()),
        FieldUpdate::set("username", profile.username.clone()),
        FieldUpdate::set("profile_revision", profile.revision),
    ]
}

/// Copies the profile's mirrored fields into every group membership of the
/// user, concurrently. Each write is retried on its own; the ones that still
/// fail are logged and returned rather than aborting the rest.
pub async fn sync_member_mirrors(
    store: &dyn DocumentStore,
    profile: &UserProfile,
) -> CoreResult<Vec<MirrorFailure>> {
    let memberships: Vec<Membership> = store::list_as(store, &keys::memberships(&profile.user_id)).await?;
    if memberships.is_empty() {
        return Ok(Vec::new());
    }

    let updates = mirror_updates(profile);
    let results = join_all(
        memberships
            .iter()
            .map(|m| sync_one(store, profile, &m.group_id, &updates)),
    )
    .await;

    let failures: Vec<MirrorFailure> = results.into_iter().filter_map(Result::err).collect();
    tracing::info!(
        "Mirrored profile {} into {} groups ({} failed)",
        profile.user_id,
        memberships.len(),
        failures.len()
    );
    Ok(failures)
}

async fn sync_one(
    store: &dyn DocumentStore,
    profile: &UserProfile,
    group_id: &str,
    updates: &[FieldUpdate],
) -> Result<(), MirrorFailure> {
    let user_id = profile.user_id.as_str();
    let key = keys::member(group_id, user_id);
    let conditions = [
        Condition::Exists,
        Condition::field_less_than("profile_revision", profile.revision),
    ];
    let failure = |e: StoreError| {
        tracing::error!(
            "Mirror write for {} in group {} failed after retries: {}",
            user_id,
            group_id,
            e
        );
        MirrorFailure {
            group_id: group_id.to_string(),
            user_id: user_id.to_string(),
            error: e.to_string(),
        }
    };

    match with_retry("sync_member_mirror", || store.update(&key, updates, &conditions)).await {
        Ok(()) => Ok(()),
        Err(StoreError::ConditionFailed) => {
            let current: Option<SocialGroupMember> =
                with_retry("read_member_mirror", || store::get_as(store, &key))
                    .await
                    .map_err(failure)?;
            if let Some(current) = current {
                tracing::info!(
                    "Mirror of {} in {} already at revision {}, skipping revision {}",
                    user_id,
                    group_id,
                    current.profile_revision,
                    profile.revision
                );
                return Ok(());
            }
            // Member record is gone (kicked, or the group was dissolved); drop the index entry.
            tracing::warn!("Stale membership index {} -> {}, removing", user_id, group_id);
            let index_key = keys::membership(user_id, group_id);
            if let Err(e) = with_retry("drop_stale_membership", || store.delete(&index_key)).await {
                tracing::warn!("Could not remove stale membership index {}: {}", index_key, e);
            }
            Ok(())
        }
        Err(e) => Err(failure(e)),
    }
}
