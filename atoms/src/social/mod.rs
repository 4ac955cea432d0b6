//! Social groups, invites, leaderboard and the membership mirror
pub mod http;
pub mod mirror;
pub mod model;
pub mod service;

pub use mirror::sync_member_mirrors;
pub use model::{
    GroupInvite, InviteResponse, InviteStatus, LeaderboardEntry, MemberRole, Membership, MirrorFailure,
    SocialGroup, SocialGroupMember,
};
pub use service::*;
