use chrono::{DateTime, Utc};
use std::cmp::Ordering;

use super::model::{
    GroupInvite, InviteResponse, InviteStatus, LeaderboardEntry, MemberRole, Membership, SocialGroup,
    SocialGroupMember,
};
use crate::error::{CoreError, CoreResult, StoreError};
use crate::store::{self, keys, with_retry, Condition, DocumentStore, FieldUpdate, WriteOp};
use crate::users;

const MAX_GROUP_NAME_LEN: usize = 60;

fn validate_group_name(raw: &str) -> CoreResult<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.chars().count() > MAX_GROUP_NAME_LEN {
        return Err(CoreError::InvalidInput(format!(
            "group name must be 1-{} characters",
            MAX_GROUP_NAME_LEN
        )));
    }
    Ok(trimmed.to_string())
}

fn join_ops(group: &SocialGroup, member: &SocialGroupMember) -> Result<Vec<WriteOp>, StoreError> {
    let membership = Membership {
        group_id: group.group_id.clone(),
        group_name: group.name.clone(),
        role: member.role,
        joined_at: member.joined_at,
    };
    Ok(vec![
        store::put_op(
            keys::member(&group.group_id, &member.user_id),
            member,
            vec![Condition::NotExists],
        )?,
        store::put_op(
            keys::membership(&member.user_id, &group.group_id),
            &membership,
            vec![],
        )?,
    ])
}

// ========== GROUPS ==========

pub async fn get_group(store: &dyn DocumentStore, group_id: &str) -> CoreResult<SocialGroup> {
    store::get_as(store, &keys::social_group(group_id))
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("social group {}", group_id)))
}

pub async fn get_member(
    store: &dyn DocumentStore,
    group_id: &str,
    user_id: &str,
) -> CoreResult<Option<SocialGroupMember>> {
    Ok(store::get_as(store, &keys::member(group_id, user_id)).await?)
}

async fn require_member(
    store: &dyn DocumentStore,
    group_id: &str,
    user_id: &str,
) -> CoreResult<SocialGroupMember> {
    get_member(store, group_id, user_id)
        .await?
        .ok_or(CoreError::NotAMember)
}

/// Creates the group with the host seeded as its first member, mirroring
/// the host's current profile.
pub async fn create_group(
    store: &dyn DocumentStore,
    now: DateTime<Utc>,
    host_id: &str,
    name: &str,
) -> CoreResult<SocialGroup> {
    let name = validate_group_name(name)?;
    let host = users::get_profile(store, host_id).await?;

    let group = SocialGroup {
        group_id: uuid::Uuid::new_v4().to_string(),
        name,
        host_id: host_id.to_string(),
        created_at: now,
    };
    let member = SocialGroupMember::mirror_of(&host, MemberRole::Host, now);

    let mut ops = vec![store::put_op(
        keys::social_group(&group.group_id),
        &group,
        vec![Condition::NotExists],
    )?];
    ops.extend(join_ops(&group, &member)?);
    store.transact(ops).await?;

    tracing::info!("Social group {} '{}' created by {}", group.group_id, group.name, host_id);
    Ok(group)
}

pub async fn list_members(store: &dyn DocumentStore, group_id: &str) -> CoreResult<Vec<SocialGroupMember>> {
    Ok(store::list_as(store, &keys::members(group_id)).await?)
}

/// Groups the user belongs to, read from the reverse index.
pub async fn list_user_groups(store: &dyn DocumentStore, user_id: &str) -> CoreResult<Vec<Membership>> {
    let mut groups: Vec<Membership> = store::list_as(store, &keys::memberships(user_id)).await?;
    groups.sort_by(|a, b| a.joined_at.cmp(&b.joined_at).then_with(|| a.group_id.cmp(&b.group_id)));
    Ok(groups)
}

/// Removes one membership and its index entry. Both deletes are idempotent.
pub async fn remove_membership(store: &dyn DocumentStore, group_id: &str, user_id: &str) -> CoreResult<()> {
    let member_key = keys::member(group_id, user_id);
    let index_key = keys::membership(user_id, group_id);
    with_retry("delete_member", || store.delete(&member_key)).await?;
    with_retry("delete_membership_index", || store.delete(&index_key)).await?;
    Ok(())
}

/// Removes the group, every member record and every member's index entry.
/// Callers check permissions; the reconciler calls this directly.
pub async fn purge_group(store: &dyn DocumentStore, group_id: &str) -> CoreResult<usize> {
    let members = list_members(store, group_id).await?;
    for member in &members {
        remove_membership(store, group_id, &member.user_id).await?;
    }
    let key = keys::social_group(group_id);
    with_retry("delete_social_group", || store.delete(&key)).await?;
    tracing::info!("Social group {} removed with {} members", group_id, members.len());
    Ok(members.len())
}

pub async fn dissolve_group(store: &dyn DocumentStore, user_id: &str, group_id: &str) -> CoreResult<()> {
    let group = get_group(store, group_id).await?;
    if group.host_id != user_id {
        return Err(CoreError::NotHost);
    }
    purge_group(store, group_id).await?;
    Ok(())
}

pub async fn kick(
    store: &dyn DocumentStore,
    host_id: &str,
    group_id: &str,
    target_user_id: &str,
) -> CoreResult<()> {
    let group = get_group(store, group_id).await?;
    if group.host_id != host_id {
        return Err(CoreError::NotHost);
    }
    if target_user_id == group.host_id {
        return Err(CoreError::HostCannotBeKicked);
    }
    require_member(store, group_id, target_user_id).await?;

    remove_membership(store, group_id, target_user_id).await?;
    tracing::info!("{} removed {} from group {}", host_id, target_user_id, group_id);
    Ok(())
}

/// The host cannot leave; they dissolve the group instead.
pub async fn leave_group(store: &dyn DocumentStore, user_id: &str, group_id: &str) -> CoreResult<()> {
    let group = get_group(store, group_id).await?;
    if group.host_id == user_id {
        return Err(CoreError::HostCannotBeKicked);
    }
    require_member(store, group_id, user_id).await?;

    remove_membership(store, group_id, user_id).await?;
    tracing::info!("{} left group {}", user_id, group_id);
    Ok(())
}

// ========== INVITES ==========

/// Invites the user registered as `to_username`. Any member may invite.
/// Re-inviting someone with a pending invite to the same group returns
/// that invite.
pub async fn invite(
    store: &dyn DocumentStore,
    now: DateTime<Utc>,
    from_user_id: &str,
    group_id: &str,
    to_username: &str,
) -> CoreResult<GroupInvite> {
    let group = get_group(store, group_id).await?;
    require_member(store, group_id, from_user_id).await?;

    let invitee_id = users::lookup(store, to_username)
        .await?
        .ok_or_else(|| CoreError::UserNotFound(to_username.trim().to_string()))?;
    if get_member(store, group_id, &invitee_id).await?.is_some() {
        return Err(CoreError::AlreadyMember);
    }
    if let Some(existing) = list_invites(store, &invitee_id)
        .await?
        .into_iter()
        .find(|i| i.group_id == group_id)
    {
        return Ok(existing);
    }

    let inviter = users::get_profile(store, from_user_id).await?;
    let invite = GroupInvite {
        invite_id: uuid::Uuid::new_v4().to_string(),
        group_id: group.group_id.clone(),
        group_name: group.name.clone(),
        inviter_id: from_user_id.to_string(),
        inviter_username: inviter.username,
        invitee_id: invitee_id.clone(),
        status: InviteStatus::Pending,
        created_at: now,
        responded_at: None,
    };
    let key = keys::invite(&invitee_id, &invite.invite_id);
    store
        .put(&key, store::to_document(&key, &invite)?, &[Condition::NotExists])
        .await?;

    tracing::info!("{} invited {} to group {}", from_user_id, invitee_id, group_id);
    Ok(invite)
}

/// Pending invites addressed to the user, oldest first.
pub async fn list_invites(store: &dyn DocumentStore, user_id: &str) -> CoreResult<Vec<GroupInvite>> {
    let mut invites: Vec<GroupInvite> = store::list_as(store, &keys::invites(user_id))
        .await?
        .into_iter()
        .filter(|i: &GroupInvite| i.status == InviteStatus::Pending)
        .collect();
    invites.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    Ok(invites)
}

pub async fn get_invite(store: &dyn DocumentStore, user_id: &str, invite_id: &str) -> CoreResult<GroupInvite> {
    store::get_as(store, &keys::invite(user_id, invite_id))
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("invite {}", invite_id)))
}

/// Accepts or declines an invite.
///
/// The status flip is conditional on the invite still being pending and,
/// for an accept, commits in the same transaction as the new membership.
/// Answering twice yields `AlreadyResolved`; it never adds a second member.
pub async fn respond_to_invite(
    store: &dyn DocumentStore,
    now: DateTime<Utc>,
    user_id: &str,
    invite_id: &str,
    response: InviteResponse,
) -> CoreResult<GroupInvite> {
    let mut invite = get_invite(store, user_id, invite_id).await?;
    if invite.status != InviteStatus::Pending {
        return Err(CoreError::AlreadyResolved);
    }

    let status = match response {
        InviteResponse::Accept => InviteStatus::Accepted,
        InviteResponse::Decline => InviteStatus::Declined,
    };
    let invite_key = keys::invite(user_id, invite_id);
    let mut ops = vec![WriteOp::Update {
        key: invite_key.clone(),
        updates: vec![
            FieldUpdate::Set("status".to_string(), store::to_value(&status)?),
            FieldUpdate::Set("responded_at".to_string(), store::to_value(&now)?),
        ],
        conditions: vec![
            Condition::Exists,
            Condition::FieldEquals("status".to_string(), store::to_value(&InviteStatus::Pending)?),
        ],
    }];
    if response == InviteResponse::Accept {
        let group = get_group(store, &invite.group_id).await?;
        let profile = users::get_profile(store, user_id).await?;
        let member = SocialGroupMember::mirror_of(&profile, MemberRole::Member, now);
        ops.push(WriteOp::Check {
            key: keys::social_group(&group.group_id),
            conditions: vec![Condition::Exists],
        });
        ops.extend(join_ops(&group, &member)?);
    }

    match store.transact(ops).await {
        Ok(()) => {
            invite.status = status;
            invite.responded_at = Some(now);
            tracing::info!("{} answered invite {} with {:?}", user_id, invite_id, status);
            Ok(invite)
        }
        Err(StoreError::ConditionFailed) => {
            let current = get_invite(store, user_id, invite_id).await?;
            if current.status != InviteStatus::Pending {
                Err(CoreError::AlreadyResolved)
            } else if store.get(&keys::social_group(&invite.group_id)).await?.is_none() {
                Err(CoreError::NotFound(format!("social group {}", invite.group_id)))
            } else {
                Err(CoreError::AlreadyMember)
            }
        }
        Err(e) => Err(e.into()),
    }
}

// ========== LEADERBOARD ==========

/// Leaderboard order: weekly XP descending, then lowercase username, then
/// user id, so equal scores always rank the same way.
pub fn leaderboard_order(a: &SocialGroupMember, b: &SocialGroupMember) -> Ordering {
    b.weekly_xp
        .cmp(&a.weekly_xp)
        .then_with(|| a.username.to_lowercase().cmp(&b.username.to_lowercase()))
        .then_with(|| a.user_id.cmp(&b.user_id))
}

/// Ranks members by `leaderboard_order`. Equal weekly XP shares a rank
/// (1, 2, 2, 4).
pub fn rank_members(mut members: Vec<SocialGroupMember>) -> Vec<LeaderboardEntry> {
    members.sort_by(leaderboard_order);

    let mut entries: Vec<LeaderboardEntry> = Vec::with_capacity(members.len());
    for (i, member) in members.into_iter().enumerate() {
        let rank = match entries.last() {
            Some(prev) if prev.weekly_xp == member.weekly_xp => prev.rank,
            _ => i as u32 + 1,
        };
        entries.push(LeaderboardEntry {
            rank,
            user_id: member.user_id,
            username: member.username,
            display_name: member.display_name,
            weekly_xp: member.weekly_xp,
            level: member.level,
            role: member.role,
        });
    }
    entries
}

/// Visible to members only.
pub async fn leaderboard(
    store: &dyn DocumentStore,
    user_id: &str,
    group_id: &str,
) -> CoreResult<Vec<LeaderboardEntry>> {
    get_group(store, group_id).await?;
    require_member(store, group_id, user_id).await?;
    Ok(rank_members(list_members(store, group_id).await?))
}
