use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::users::UserProfile;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MemberRole {
    Host,
    Member,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SocialGroup {
    pub group_id: String,
    pub name: String,
    pub host_id: String,
    pub created_at: DateTime<Utc>,
}

/// Per-group copy of the profile fields the leaderboard shows.
/// Always written from a `UserProfile`, never computed in place.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SocialGroupMember {
    pub user_id: String,
    pub role: MemberRole,
    pub weekly_xp: u64,
    pub display_name: String,
    pub username: String,
    pub level: u32,
    pub joined_at: DateTime<Utc>,
    /// Revision of the profile this copy was taken from.
    #[serde(default)]
    pub profile_revision: u64,
}

impl SocialGroupMember {
    pub fn mirror_of(profile: &UserProfile, role: MemberRole, joined_at: DateTime<Utc>) -> Self {
        Self {
            user_id: profile.user_id.clone(),
            role,
            weekly_xp: profile.weekly_xp,
            display_name: profile.display_name.clone(),
            username: profile.username.clone(),
            level: profile.level,
            joined_at,
            profile_revision: profile.revision,
        }
    }
}

/// Reverse index entry at `users/{userId}/memberships/{groupId}`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Membership {
    pub group_id: String,
    pub group_name: String,
    pub role: MemberRole,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InviteStatus {
    Pending,
    Accepted,
    Declined,
}

/// Stored under the invitee: `users/{inviteeId}/invites/{inviteId}`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct GroupInvite {
    pub invite_id: String,
    pub group_id: String,
    pub group_name: String,
    pub inviter_id: String,
    pub inviter_username: String,
    pub invitee_id: String,
    pub status: InviteStatus,
    pub created_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InviteResponse {
    Accept,
    Decline,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct LeaderboardEntry {
    /// 1-based
    pub rank: u32,
    pub user_id: String,
    pub username: String,
    pub display_name: String,
    pub weekly_xp: u64,
    pub level: u32,
    pub role: MemberRole,
}

/// A mirror write that still failed after retries; kept for out-of-band repair.
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct MirrorFailure {
    pub group_id: String,
    pub user_id: String,
    pub error: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateSocialGroupPayload {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct InvitePayload {
    pub username: String,
}
